//! Rolling window of the most recent sensor events for one train run.

use crate::estimation::features::MAX_FEATURE_EVENTS;
use crate::sensor::SensorEvent;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_WINDOW_CAPACITY: usize = 3;
pub const MIN_WINDOW_CAPACITY: usize = 2;
/// Events beyond this never reach a feature vector.
pub const MAX_WINDOW_CAPACITY: usize = MAX_FEATURE_EVENTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Sensor index did not advance toward the crossing.
    SensorOrder,
    /// Gap since the previous trigger exceeded the configured limit.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUpdate {
    Appended,
    Restarted(RestartReason),
}

#[derive(Debug, Clone)]
pub struct EventWindow {
    events: VecDeque<SensorEvent>,
    capacity: usize,
    max_gap_secs: Option<f64>,
}

impl EventWindow {
    pub fn new(capacity: usize, max_gap_secs: Option<f64>) -> Self {
        let capacity = capacity.clamp(MIN_WINDOW_CAPACITY, MAX_WINDOW_CAPACITY);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            max_gap_secs,
        }
    }

    /// Record a trigger, starting a new run when it cannot belong to the current one.
    ///
    /// Timestamps that run backwards are kept so feature extraction can report them.
    pub fn push(&mut self, event: SensorEvent) -> WindowUpdate {
        let restart = self.events.back().and_then(|newest| {
            if event.sensor_index <= newest.sensor_index {
                Some(RestartReason::SensorOrder)
            } else if self
                .max_gap_secs
                .is_some_and(|max_gap| event.timestamp_secs - newest.timestamp_secs > max_gap)
            {
                Some(RestartReason::Stale)
            } else {
                None
            }
        });

        if let Some(reason) = restart {
            debug!(
                sensor_index = event.sensor_index,
                reason = ?reason,
                dropped = self.events.len(),
                "Starting new train run"
            );
            self.events.clear();
        }

        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }

        match restart {
            Some(reason) => WindowUpdate::Restarted(reason),
            None => WindowUpdate::Appended,
        }
    }

    /// Events oldest to newest.
    pub fn events(&self) -> Vec<SensorEvent> {
        self.events.iter().copied().collect()
    }

    pub fn newest(&self) -> Option<&SensorEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY, None)
    }
}
