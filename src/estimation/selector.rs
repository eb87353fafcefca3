//! Tier dispatch and ETA to ETD composition.

use crate::estimation::features::{
    FeatureContract, FeatureError, Kinematics, features_from_kinematics,
};
use crate::estimation::model::BoundPredictor;
use crate::estimation::physics::{self, PhysicsPredictor};
use crate::sensor::SensorEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Physics,
    Polynomial,
    Forest,
}

impl ModelTier {
    pub fn name(self) -> &'static str {
        match self {
            ModelTier::Physics => "physics",
            ModelTier::Polynomial => "polynomial",
            ModelTier::Forest => "forest",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtdSource {
    /// Evaluated by a dedicated departure model.
    Direct,
    /// Derived from the arrival time and the default train length.
    Estimated,
}

/// What is known about the approaching train's length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainProfile {
    /// Measured or announced length; enables direct physics ETD.
    pub known_length: Option<f64>,
    /// Length assumed when deriving ETD from ETA.
    pub default_length: f64,
}

impl TrainProfile {
    pub fn unknown(default_length: f64) -> Self {
        Self {
            known_length: None,
            default_length,
        }
    }

    /// Length written into feature slots that carry one.
    pub fn feature_length(&self) -> f64 {
        self.known_length.unwrap_or(self.default_length)
    }
}

/// Result of one prediction over the current window.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingPrediction {
    pub tier: ModelTier,
    pub model: &'static str,
    pub eta_secs: Option<f64>,
    pub etd_secs: Option<f64>,
    pub etd_source: EtdSource,
    pub last_speed: f64,
    pub distance_remaining: f64,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    tier: ModelTier,
    eta: BoundPredictor,
    etd: Option<BoundPredictor>,
    physics_fallback: bool,
}

impl ModelSelector {
    /// The tier is the arrival predictor's family.
    pub fn new(eta: BoundPredictor, etd: Option<BoundPredictor>) -> Self {
        Self {
            tier: eta.tier(),
            eta,
            etd,
            physics_fallback: false,
        }
    }

    /// Closed-form tier; always available.
    pub fn physics() -> Self {
        Self::new(
            BoundPredictor::new(Arc::new(PhysicsPredictor::eta())),
            Some(BoundPredictor::new(Arc::new(PhysicsPredictor::etd()))),
        )
    }

    /// Use the physics tier for windows too short for this tier's contract.
    pub fn with_physics_fallback(mut self, enabled: bool) -> Self {
        self.physics_fallback = enabled;
        self
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn eta_contract(&self) -> FeatureContract {
        self.eta.contract()
    }

    pub fn etd_contract(&self) -> Option<FeatureContract> {
        self.etd.as_ref().map(BoundPredictor::contract)
    }

    pub fn physics_fallback(&self) -> bool {
        self.physics_fallback
    }

    /// Fewest events that produce any prediction.
    pub fn min_events(&self) -> usize {
        if self.physics_fallback {
            FeatureContract::PhysicsEta.min_events()
        } else {
            self.eta.contract().min_events()
        }
    }

    /// Predict ETA and ETD from events ordered oldest to newest.
    pub fn predict(
        &self,
        events: &[SensorEvent],
        train: &TrainProfile,
    ) -> Result<CrossingPrediction, FeatureError> {
        let required = self.eta.contract().min_events();
        if events.len() < required {
            if self.physics_fallback && self.tier != ModelTier::Physics {
                debug!(
                    tier = %self.tier,
                    available = events.len(),
                    required,
                    "Window too short for tier, using physics"
                );
                return Self::physics().predict(events, train);
            }
            return Err(FeatureError::InsufficientData {
                required,
                available: events.len(),
            });
        }

        let kinematics = Kinematics::from_events(events)?;
        let train_length = train.feature_length();

        let eta_features = features_from_kinematics(&kinematics, self.eta.contract(), train_length);
        let eta_secs = self.eta.predict(&eta_features)?;

        let direct = self
            .direct_etd(train)
            .filter(|etd| events.len() >= etd.contract().min_events());
        let (etd_secs, etd_source) = match direct {
            Some(etd) => {
                let features = features_from_kinematics(&kinematics, etd.contract(), train_length);
                (etd.predict(&features)?, EtdSource::Direct)
            }
            None => (
                eta_secs.and_then(|eta| {
                    physics::estimate_etd(eta, kinematics.last_speed, train.default_length)
                }),
                EtdSource::Estimated,
            ),
        };

        Ok(CrossingPrediction {
            tier: self.tier,
            model: self.eta.name(),
            eta_secs,
            etd_secs,
            etd_source,
            last_speed: kinematics.last_speed,
            distance_remaining: kinematics.distance_remaining,
        })
    }

    // Physics needs a real train length for the direct departure formula.
    fn direct_etd(&self, train: &TrainProfile) -> Option<&BoundPredictor> {
        self.etd
            .as_ref()
            .filter(|etd| etd.tier() != ModelTier::Physics || train.known_length.is_some())
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::physics()
    }
}
