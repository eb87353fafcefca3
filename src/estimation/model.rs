//! Predictor trait shared by every model family.
//!
//! A predictor owns only immutable parameters loaded at startup, so one
//! instance can be shared behind an `Arc` and evaluated from any thread
//! without locking.

use crate::estimation::features::{
    FeatureContract, FeatureError, FeatureVector, extract_features,
};
use crate::estimation::selector::ModelTier;
use crate::sensor::SensorEvent;
use std::fmt;
use std::sync::Arc;

/// Wire value for "no valid prediction this cycle".
pub const INVALID_SENTINEL: f64 = -1.0;

/// Trait for models that turn a feature vector into seconds.
///
/// Implement this trait to add a new model family; the selector pairs each
/// instance with the contract it reports.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Feature layout this predictor indexes into.
    fn contract(&self) -> FeatureContract;

    /// Seconds until the event, or `None` when the inputs admit no finite answer.
    fn predict(&self, features: &FeatureVector) -> Option<f64>;

    /// Model family, which decides the selector's tier.
    fn tier(&self) -> ModelTier;

    /// Short family name for logs and responses.
    fn name(&self) -> &'static str {
        self.tier().name()
    }
}

/// A predictor fixed to the contract it was loaded with.
///
/// Features are always extracted with the bound contract, so a vector laid
/// out for another family can never reach the predictor.
#[derive(Debug, Clone)]
pub struct BoundPredictor {
    predictor: Arc<dyn Predictor>,
    contract: FeatureContract,
}

impl BoundPredictor {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        let contract = predictor.contract();
        Self {
            predictor,
            contract,
        }
    }

    pub fn contract(&self) -> FeatureContract {
        self.contract
    }

    pub fn tier(&self) -> ModelTier {
        self.predictor.tier()
    }

    pub fn name(&self) -> &'static str {
        self.predictor.name()
    }

    /// Extract this predictor's features from `events` and evaluate them.
    pub fn predict_events(
        &self,
        events: &[SensorEvent],
        train_length: f64,
    ) -> Result<Option<f64>, FeatureError> {
        let features = extract_features(events, self.contract, train_length)?;
        self.predict(&features)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Option<f64>, FeatureError> {
        if features.contract() != self.contract {
            return Err(FeatureError::ContractMismatch {
                expected: self.contract,
                actual: features.contract(),
            });
        }
        Ok(self.predictor.predict(features))
    }
}

/// Collapse an optional estimate into its wire form.
pub fn to_sentinel(estimate: Option<f64>) -> f64 {
    estimate.unwrap_or(INVALID_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::physics::PhysicsPredictor;

    #[test]
    fn missing_estimate_maps_to_sentinel() {
        assert_eq!(to_sentinel(None), INVALID_SENTINEL);
        assert_eq!(to_sentinel(Some(4.5)), 4.5);
    }

    #[test]
    fn bound_predictor_rejects_foreign_layout() -> Result<(), FeatureError> {
        let bound = BoundPredictor::new(Arc::new(PhysicsPredictor::eta()));
        let features = FeatureVector::new(FeatureContract::Polynomial, vec![1.0, 1.0, 5.0, 5.0])?;

        let result = bound.predict(&features);

        assert_eq!(
            result,
            Err(FeatureError::ContractMismatch {
                expected: FeatureContract::PhysicsEta,
                actual: FeatureContract::Polynomial
            })
        );
        Ok(())
    }

    #[test]
    fn bound_predictor_extracts_its_own_contract() -> Result<(), FeatureError> {
        let bound = BoundPredictor::new(Arc::new(PhysicsPredictor::eta()));
        let events = [
            SensorEvent {
                sensor_index: 0,
                timestamp_secs: 0.0,
                position: 200.0,
            },
            SensorEvent {
                sensor_index: 1,
                timestamp_secs: 10.0,
                position: 100.0,
            },
        ];

        let eta = bound.predict_events(&events, 50.0)?;

        assert_eq!(bound.contract(), FeatureContract::PhysicsEta);
        assert_eq!(eta, Some(10.0));
        Ok(())
    }
}
