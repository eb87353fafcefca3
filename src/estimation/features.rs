//! Kinematic feature extraction from a short window of sensor triggers.
//!
//! Every model family reads a fixed-length vector whose slot meanings are
//! enumerated by a [`FeatureContract`]. The contract travels with the vector,
//! so a predictor can never be handed values laid out for another family.

use crate::sensor::SensorEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Newest triggers that feed one vector; older events in a window are ignored.
pub const MAX_FEATURE_EVENTS: usize = 3;

/// Slot indices of each contract.
pub mod slot {
    /// `physics_eta` (6 slots) and `physics_etd` (7 slots).
    pub mod physics {
        pub const TIME_0_TO_1: usize = 0;
        pub const TIME_1_TO_2: usize = 1;
        pub const SPEED_0_TO_1: usize = 2;
        pub const SPEED_1_TO_2: usize = 3;
        pub const ACCEL: usize = 4;
        pub const DISTANCE: usize = 5;
        /// Only present in `physics_etd`.
        pub const TRAIN_LENGTH: usize = 6;
    }

    /// `polynomial` (4 slots).
    pub mod polynomial {
        pub const TIME_0_TO_1: usize = 0;
        pub const TIME_1_TO_2: usize = 1;
        pub const SPEED_0_TO_1: usize = 2;
        pub const SPEED_1_TO_2: usize = 3;
    }

    /// `kinematic_11` (11 slots).
    pub mod kinematic11 {
        pub const DISTANCE_REMAINING: usize = 0;
        pub const LAST_SPEED: usize = 1;
        pub const LAST_ACCEL: usize = 2;
        pub const SPEED_TREND: usize = 3;
        pub const SPEED_VARIANCE: usize = 4;
        pub const TIME_VARIANCE: usize = 5;
        pub const AVG_SPEED_OVERALL: usize = 6;
        pub const DT_INTERVAL_0: usize = 7;
        pub const DT_INTERVAL_1: usize = 8;
        pub const AVG_SPEED_0: usize = 9;
        pub const AVG_SPEED_1: usize = 10;
    }

    /// `kinematic_14` (14 slots).
    pub mod kinematic14 {
        pub const DISTANCE_REMAINING: usize = 0;
        pub const TRAIN_LENGTH: usize = 1;
        pub const LAST_SPEED: usize = 2;
        pub const LAST_ACCEL: usize = 3;
        pub const SPEED_TREND: usize = 4;
        pub const SPEED_VARIANCE: usize = 5;
        pub const TIME_VARIANCE: usize = 6;
        pub const AVG_SPEED_OVERALL: usize = 7;
        pub const LENGTH_SPEED_RATIO: usize = 8;
        pub const DISTANCE_LENGTH_RATIO: usize = 9;
        pub const DT_INTERVAL_0: usize = 10;
        pub const DT_INTERVAL_1: usize = 11;
        pub const AVG_SPEED_0: usize = 12;
        pub const AVG_SPEED_1: usize = 13;
    }
}

const PHYSICS_ETA_SLOTS: [&str; 6] = [
    "time_0_to_1",
    "time_1_to_2",
    "speed_0_to_1",
    "speed_1_to_2",
    "accel",
    "distance_remaining",
];

const PHYSICS_ETD_SLOTS: [&str; 7] = [
    "time_0_to_1",
    "time_1_to_2",
    "speed_0_to_1",
    "speed_1_to_2",
    "accel",
    "distance_remaining",
    "train_length",
];

const POLYNOMIAL_SLOTS: [&str; 4] = ["time_0_to_1", "time_1_to_2", "speed_0_to_1", "speed_1_to_2"];

const KINEMATIC_11_SLOTS: [&str; 11] = [
    "distance_remaining",
    "last_speed",
    "last_accel",
    "speed_trend",
    "speed_variance",
    "time_variance",
    "avg_speed_overall",
    "dt_interval_0",
    "dt_interval_1",
    "avg_speed_0",
    "avg_speed_1",
];

const KINEMATIC_14_SLOTS: [&str; 14] = [
    "distance_remaining",
    "train_length",
    "last_speed",
    "last_accel",
    "speed_trend",
    "speed_variance",
    "time_variance",
    "avg_speed_overall",
    "length_speed_ratio",
    "distance_length_ratio",
    "dt_interval_0",
    "dt_interval_1",
    "avg_speed_0",
    "avg_speed_1",
];

/// Field layout of a feature vector, fixed per model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureContract {
    #[serde(rename = "physics_eta")]
    PhysicsEta,
    #[serde(rename = "physics_etd")]
    PhysicsEtd,
    #[serde(rename = "polynomial")]
    Polynomial,
    #[serde(rename = "kinematic_11")]
    Kinematic11,
    #[serde(rename = "kinematic_14")]
    Kinematic14,
}

impl FeatureContract {
    pub fn slot_names(self) -> &'static [&'static str] {
        match self {
            Self::PhysicsEta => &PHYSICS_ETA_SLOTS,
            Self::PhysicsEtd => &PHYSICS_ETD_SLOTS,
            Self::Polynomial => &POLYNOMIAL_SLOTS,
            Self::Kinematic11 => &KINEMATIC_11_SLOTS,
            Self::Kinematic14 => &KINEMATIC_14_SLOTS,
        }
    }

    pub fn len(self) -> usize {
        self.slot_names().len()
    }

    /// Number of triggers needed before a vector of this layout can be built.
    pub fn min_events(self) -> usize {
        match self {
            Self::PhysicsEta | Self::PhysicsEtd => 2,
            Self::Polynomial | Self::Kinematic11 | Self::Kinematic14 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PhysicsEta => "physics_eta",
            Self::PhysicsEtd => "physics_etd",
            Self::Polynomial => "polynomial",
            Self::Kinematic11 => "kinematic_11",
            Self::Kinematic14 => "kinematic_14",
        }
    }
}

impl fmt::Display for FeatureContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("insufficient data: {available} events available, {required} required")]
    InsufficientData { required: usize, available: usize },
    #[error("non-positive interval {interval_secs}s after event {index}")]
    NonPositiveInterval { index: usize, interval_secs: f64 },
    #[error("feature vector for {contract} needs {expected} values, got {actual}")]
    LengthMismatch {
        contract: FeatureContract,
        expected: usize,
        actual: usize,
    },
    #[error("predictor expects {expected} features, got {actual}")]
    ContractMismatch {
        expected: FeatureContract,
        actual: FeatureContract,
    },
}

/// Ordered feature values tagged with the contract that lays them out.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    contract: FeatureContract,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(contract: FeatureContract, values: Vec<f64>) -> Result<Self, FeatureError> {
        if values.len() != contract.len() {
            return Err(FeatureError::LengthMismatch {
                contract,
                expected: contract.len(),
                actual: values.len(),
            });
        }
        Ok(Self { contract, values })
    }

    pub fn contract(&self) -> FeatureContract {
        self.contract
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, slot: usize) -> f64 {
        self.values[slot]
    }
}

/// Speed and timing primitives derived from consecutive triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    /// `timestamp[i + 1] - timestamp[i]`, oldest first.
    pub intervals: Vec<f64>,
    /// Mean speed over each interval, oldest first.
    pub speeds: Vec<f64>,
    pub last_speed: f64,
    pub acceleration: f64,
    pub speed_trend: f64,
    pub distance_remaining: f64,
}

impl Kinematics {
    /// Build primitives from the newest [`MAX_FEATURE_EVENTS`] of `events`,
    /// ordered oldest to newest.
    pub fn from_events(events: &[SensorEvent]) -> Result<Self, FeatureError> {
        let events = &events[events.len().saturating_sub(MAX_FEATURE_EVENTS)..];
        if events.len() < 2 {
            return Err(FeatureError::InsufficientData {
                required: 2,
                available: events.len(),
            });
        }

        let mut intervals = Vec::with_capacity(events.len() - 1);
        let mut speeds = Vec::with_capacity(events.len() - 1);
        for (index, pair) in events.windows(2).enumerate() {
            let interval_secs = pair[1].timestamp_secs - pair[0].timestamp_secs;
            // NaN fails this comparison too.
            if !(interval_secs > 0.0) {
                return Err(FeatureError::NonPositiveInterval {
                    index,
                    interval_secs,
                });
            }
            intervals.push(interval_secs);
            speeds.push((pair[0].position - pair[1].position) / interval_secs);
        }

        let n = speeds.len();
        let last_speed = speeds[n - 1];
        let acceleration = if n >= 2 {
            (speeds[n - 1] - speeds[n - 2]) / intervals[n - 1]
        } else {
            0.0
        };
        let elapsed = events[events.len() - 1].timestamp_secs - events[0].timestamp_secs;
        let speed_trend = if n >= 2 {
            (speeds[n - 1] - speeds[0]) / elapsed
        } else {
            0.0
        };

        Ok(Self {
            intervals,
            speeds,
            last_speed,
            acceleration,
            speed_trend,
            distance_remaining: events[events.len() - 1].position,
        })
    }

    pub fn mean_speed(&self) -> f64 {
        mean(&self.speeds)
    }

    pub fn speed_variance(&self) -> f64 {
        variance(&self.speeds)
    }

    pub fn time_variance(&self) -> f64 {
        variance(&self.intervals)
    }

    pub fn length_speed_ratio(&self, train_length: f64) -> f64 {
        if self.last_speed > 0.0 {
            train_length / self.last_speed
        } else {
            0.0
        }
    }

    pub fn distance_length_ratio(&self, train_length: f64) -> f64 {
        if train_length > 0.0 {
            self.distance_remaining / train_length
        } else {
            0.0
        }
    }

    /// The two most recent intervals and their speeds as `(dt_0, dt_1, v_0, v_1)`.
    ///
    /// With a single interval both pairs repeat it.
    fn recent_pair(&self) -> (f64, f64, f64, f64) {
        let n = self.intervals.len();
        let older = n.saturating_sub(2);
        (
            self.intervals[older],
            self.intervals[n - 1],
            self.speeds[older],
            self.speeds[n - 1],
        )
    }
}

/// Build the feature vector `contract` expects from the current window.
pub fn extract_features(
    events: &[SensorEvent],
    contract: FeatureContract,
    train_length: f64,
) -> Result<FeatureVector, FeatureError> {
    if events.len() < contract.min_events() {
        return Err(FeatureError::InsufficientData {
            required: contract.min_events(),
            available: events.len(),
        });
    }

    let kinematics = Kinematics::from_events(events)?;
    Ok(features_from_kinematics(&kinematics, contract, train_length))
}

/// Lay out already computed primitives in the order `contract` defines.
pub fn features_from_kinematics(
    kinematics: &Kinematics,
    contract: FeatureContract,
    train_length: f64,
) -> FeatureVector {
    let (dt_0, dt_1, speed_0, speed_1) = kinematics.recent_pair();
    let values = match contract {
        FeatureContract::PhysicsEta => vec![
            dt_0,
            dt_1,
            speed_0,
            speed_1,
            kinematics.acceleration,
            kinematics.distance_remaining,
        ],
        FeatureContract::PhysicsEtd => vec![
            dt_0,
            dt_1,
            speed_0,
            speed_1,
            kinematics.acceleration,
            kinematics.distance_remaining,
            train_length,
        ],
        FeatureContract::Polynomial => vec![dt_0, dt_1, speed_0, speed_1],
        FeatureContract::Kinematic11 => vec![
            kinematics.distance_remaining,
            kinematics.last_speed,
            kinematics.acceleration,
            kinematics.speed_trend,
            kinematics.speed_variance(),
            kinematics.time_variance(),
            kinematics.mean_speed(),
            dt_0,
            dt_1,
            speed_0,
            speed_1,
        ],
        FeatureContract::Kinematic14 => vec![
            kinematics.distance_remaining,
            train_length,
            kinematics.last_speed,
            kinematics.acceleration,
            kinematics.speed_trend,
            kinematics.speed_variance(),
            kinematics.time_variance(),
            kinematics.mean_speed(),
            kinematics.length_speed_ratio(train_length),
            kinematics.distance_length_ratio(train_length),
            dt_0,
            dt_1,
            speed_0,
            speed_1,
        ],
    };

    FeatureVector { contract, values }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}
