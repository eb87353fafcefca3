//! Synthetic train runs for exercising the pipeline without hardware.

use crate::sensor::{SensorEvent, TrackLayout};

/// A train entering the track at a fixed speed under constant acceleration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockTrainRun {
    /// Trigger time of the furthest sensor.
    pub start_secs: f64,
    /// Speed when passing the furthest sensor.
    pub entry_speed: f64,
    pub acceleration: f64,
}

impl MockTrainRun {
    pub fn constant_speed(entry_speed: f64) -> Self {
        Self {
            start_secs: 0.0,
            entry_speed,
            acceleration: 0.0,
        }
    }

    pub fn accelerating(entry_speed: f64, acceleration: f64) -> Self {
        Self {
            start_secs: 0.0,
            entry_speed,
            acceleration,
        }
    }

    pub fn starting_at(mut self, start_secs: f64) -> Self {
        self.start_secs = start_secs;
        self
    }

    /// Seconds after the first trigger until the front has moved `distance`.
    ///
    /// `None` when the train stops first.
    pub fn time_to_travel(&self, distance: f64) -> Option<f64> {
        if distance <= 0.0 {
            return Some(0.0);
        }
        if self.acceleration == 0.0 {
            return (self.entry_speed > 0.0).then(|| distance / self.entry_speed);
        }
        let discriminant =
            self.entry_speed * self.entry_speed + 2.0 * self.acceleration * distance;
        if discriminant < 0.0 {
            return None;
        }
        let t = (-self.entry_speed + discriminant.sqrt()) / self.acceleration;
        (t > 0.0).then_some(t)
    }

    /// Triggers for every sensor the train reaches, furthest first.
    pub fn events(&self, layout: &TrackLayout) -> Vec<SensorEvent> {
        let Some(first) = layout.sensors().first() else {
            return Vec::new();
        };
        layout
            .sensors()
            .iter()
            .map_while(|sensor| {
                let elapsed = self.time_to_travel(first.position - sensor.position)?;
                Some(SensorEvent {
                    sensor_index: sensor.sensor_index,
                    timestamp_secs: self.start_secs + elapsed,
                    position: sensor.position,
                })
            })
            .collect()
    }

    /// True seconds from the nearest sensor's trigger until the front reaches the crossing.
    pub fn arrival_after_last_trigger(&self, layout: &TrackLayout) -> Option<f64> {
        let first = layout.sensors().first()?;
        let last = layout.sensors().last()?;
        let at_last = self.time_to_travel(first.position - last.position)?;
        let at_crossing = self.time_to_travel(first.position)?;
        Some(at_crossing - at_last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn constant_speed_run_triggers_every_sensor() -> Result<(), AppError> {
        let layout = TrackLayout::new(&[300.0, 200.0, 100.0])?;

        let events = MockTrainRun::constant_speed(10.0)
            .starting_at(5.0)
            .events(&layout);

        let times: Vec<f64> = events.iter().map(|e| e.timestamp_secs).collect();
        assert_eq!(times, vec![5.0, 15.0, 25.0]);
        assert_eq!(events[2].position, 100.0);
        Ok(())
    }

    #[test]
    fn accelerating_run_matches_closed_form() -> Result<(), AppError> {
        let layout = TrackLayout::new(&[1500.0, 1000.0, 800.0])?;

        let events = MockTrainRun::accelerating(20.0, 0.5).events(&layout);

        // 0.25 t^2 + 20 t = 500 -> t = 20
        assert_eq!(events.len(), 3);
        assert!((events[1].timestamp_secs - 20.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn train_stopping_short_skips_remaining_sensors() -> Result<(), AppError> {
        let layout = TrackLayout::new(&[300.0, 200.0, 100.0])?;

        // Stops after 10^2 / (2 * 0.4) = 125 units.
        let run = MockTrainRun::accelerating(10.0, -0.4);

        assert_eq!(run.events(&layout).len(), 2);
        assert_eq!(run.arrival_after_last_trigger(&layout), None);
        Ok(())
    }

    #[test]
    fn arrival_is_measured_from_nearest_sensor() -> Result<(), AppError> {
        let layout = TrackLayout::new(&[300.0, 200.0, 100.0])?;

        let arrival = MockTrainRun::constant_speed(10.0).arrival_after_last_trigger(&layout);

        assert_eq!(arrival, Some(10.0));
        Ok(())
    }
}
