use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod window;

/// Position of a sensor along the track, counted from the furthest sensor (0).
pub type SensorIndex = u8;

/// One trigger of a track sensor by the front of a train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub sensor_index: SensorIndex,
    /// Monotonic trigger time in seconds.
    pub timestamp_secs: f64,
    /// Distance from the crossing, in the track's length unit.
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub sensor_index: SensorIndex,
    pub position: f64,
}

/// Fixed sensor positions of one approach, furthest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLayout {
    sensors: Vec<SensorConfig>,
}

impl TrackLayout {
    /// Positions must be finite, positive and strictly decreasing toward the crossing.
    pub fn new(positions: &[f64]) -> Result<Self, AppError> {
        if positions.len() < 2 {
            return Err(AppError::Layout(format!(
                "at least 2 sensors required, got {}",
                positions.len()
            )));
        }
        if positions.len() > SensorIndex::MAX as usize + 1 {
            return Err(AppError::Layout(format!(
                "too many sensors: {}",
                positions.len()
            )));
        }
        for position in positions {
            if !position.is_finite() || *position <= 0.0 {
                return Err(AppError::Layout(format!(
                    "sensor position must be finite and positive, got {position}"
                )));
            }
        }
        if positions.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(AppError::Layout(
                "sensors must be ordered furthest to nearest".to_string(),
            ));
        }

        Ok(Self {
            sensors: build_sensor_configs(positions),
        })
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensors
    }

    pub fn position_of(&self, sensor_index: SensorIndex) -> Option<f64> {
        self.sensors
            .get(sensor_index as usize)
            .map(|sensor| sensor.position)
    }

    /// Resolve a raw trigger into a positioned event.
    pub fn event(
        &self,
        sensor_index: SensorIndex,
        timestamp_secs: f64,
    ) -> Result<SensorEvent, AppError> {
        let position = self
            .position_of(sensor_index)
            .ok_or(AppError::UnknownSensor(sensor_index))?;
        if !timestamp_secs.is_finite() {
            return Err(AppError::InvalidTimestamp(timestamp_secs));
        }
        Ok(SensorEvent {
            sensor_index,
            timestamp_secs,
            position,
        })
    }
}

/// Build deterministic sensor configs from an ordered list of positions.
pub fn build_sensor_configs(positions: &[f64]) -> Vec<SensorConfig> {
    positions
        .iter()
        .enumerate()
        .map(|(index, position)| SensorConfig {
            sensor_index: index as SensorIndex,
            position: *position,
        })
        .collect()
}
