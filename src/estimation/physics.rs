//! Closed-form arrival and departure times under constant acceleration.
//!
//! Solves `0.5 * a * t^2 + v * t - d = 0` for the first positive root and
//! falls back to `d / v` whenever the quadratic has no usable answer.

use crate::estimation::features::{slot, FeatureContract, FeatureVector};
use crate::estimation::model::Predictor;
use crate::estimation::selector::ModelTier;

/// Accelerations with a smaller magnitude are treated as constant velocity.
pub const ACCEL_EPSILON: f64 = 0.1;
/// Largest root accepted from the quadratic, in seconds.
pub const MAX_PHYSICAL_SECS: f64 = 1000.0;

/// Seconds until the train front covers `distance`.
///
/// `None` when the train is stopped, receding, or already at the crossing.
pub fn predict_eta(speed: f64, accel: f64, distance: f64) -> Option<f64> {
    if !(speed > 0.0) || !(distance > 0.0) {
        return None;
    }
    Some(time_to_cover(speed, accel, distance))
}

/// Seconds until the train rear clears the crossing.
pub fn predict_etd(speed: f64, accel: f64, distance: f64, train_length: f64) -> Option<f64> {
    if !(speed > 0.0) || !(distance > 0.0) || !(train_length > 0.0) {
        return None;
    }
    Some(time_to_cover(speed, accel, distance + train_length))
}

/// Departure time derived from an arrival time when the train length is unknown.
pub fn estimate_etd(eta: f64, last_speed: f64, default_train_length: f64) -> Option<f64> {
    if !(eta > 0.0) || !(last_speed > 0.0) || !(default_train_length > 0.0) {
        return None;
    }
    Some(eta + default_train_length / last_speed)
}

// Callers guarantee speed > 0 and distance > 0.
fn time_to_cover(speed: f64, accel: f64, distance: f64) -> f64 {
    let constant_velocity = distance / speed;
    if accel.abs() < ACCEL_EPSILON {
        return constant_velocity;
    }

    let discriminant = speed * speed + 2.0 * accel * distance;
    if discriminant < 0.0 {
        // Decelerates to a stop before reaching the crossing.
        return constant_velocity;
    }

    let t = (-speed + discriminant.sqrt()) / accel;
    if t > 0.0 && t <= MAX_PHYSICAL_SECS {
        t
    } else {
        constant_velocity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsTarget {
    Arrival,
    Departure,
}

/// Stateless kinematic predictor over the `physics_eta` / `physics_etd` layouts.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsPredictor {
    target: PhysicsTarget,
}

impl PhysicsPredictor {
    pub fn eta() -> Self {
        Self {
            target: PhysicsTarget::Arrival,
        }
    }

    pub fn etd() -> Self {
        Self {
            target: PhysicsTarget::Departure,
        }
    }

    pub fn target(&self) -> PhysicsTarget {
        self.target
    }
}

impl Predictor for PhysicsPredictor {
    fn contract(&self) -> FeatureContract {
        match self.target {
            PhysicsTarget::Arrival => FeatureContract::PhysicsEta,
            PhysicsTarget::Departure => FeatureContract::PhysicsEtd,
        }
    }

    fn predict(&self, features: &FeatureVector) -> Option<f64> {
        debug_assert_eq!(features.contract(), self.contract());
        let speed = features.get(slot::physics::SPEED_1_TO_2);
        let accel = features.get(slot::physics::ACCEL);
        let distance = features.get(slot::physics::DISTANCE);
        match self.target {
            PhysicsTarget::Arrival => predict_eta(speed, accel, distance),
            PhysicsTarget::Departure => predict_etd(
                speed,
                accel,
                distance,
                features.get(slot::physics::TRAIN_LENGTH),
            ),
        }
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Physics
    }
}
