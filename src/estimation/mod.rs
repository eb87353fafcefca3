use crate::crossing::CrossingDecision;
use crate::error::AppError;
use crate::sensor::SensorIndex;
use crate::state::{AppState, PredictionErrorCode, PredictionRecord};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod features;
pub mod forest;
pub mod model;
pub mod physics;
pub mod polynomial;
pub mod selector;

use features::{FeatureContract, FeatureError};
use forest::{Forest, ForestParams};
use model::BoundPredictor;
use polynomial::{PolynomialParams, PolynomialPredictor};
use selector::ModelSelector;

#[derive(Debug, Deserialize)]
pub struct ModelArtifact {
    pub model: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PolynomialArtifactParams {
    intercept: f64,
    coefficients: Vec<f64>,
    #[serde(default)]
    etd: Option<EtdParams>,
}

#[derive(Debug, Deserialize)]
struct ForestArtifactParams {
    eta: ForestParams,
    #[serde(default)]
    etd: Option<ForestParams>,
}

/// Dedicated departure model inside a polynomial artifact.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EtdParams {
    Polynomial(PolynomialParams),
    Forest(ForestParams),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("expected {expected} polynomial coefficients, got {actual}")]
    CoefficientCount { expected: usize, actual: usize },
    #[error("malformed tree: {0}")]
    MalformedTree(String),
    #[error("tree {tree} reads feature {feature}, outside the {contract} layout")]
    FeatureIndex {
        tree: usize,
        feature: usize,
        contract: FeatureContract,
    },
}

// Model Factory
pub fn create_selector(artifact: &ModelArtifact) -> Result<ModelSelector, ModelError> {
    match artifact.model.as_str() {
        "physics" => Ok(ModelSelector::physics()),
        "polynomial" => {
            let params: PolynomialArtifactParams =
                serde_json::from_value(artifact.params.clone())?;
            let eta = PolynomialPredictor::new(params.intercept, &params.coefficients)?;
            let etd = match &params.etd {
                Some(EtdParams::Polynomial(etd)) => Some(BoundPredictor::new(Arc::new(
                    PolynomialPredictor::from_params(etd)?,
                ))),
                Some(EtdParams::Forest(etd)) => {
                    Some(BoundPredictor::new(Arc::new(Forest::from_params(etd)?)))
                }
                None => None,
            };
            Ok(ModelSelector::new(
                BoundPredictor::new(Arc::new(eta)),
                etd,
            ))
        }
        "forest" => {
            let params: ForestArtifactParams = serde_json::from_value(artifact.params.clone())?;
            let eta = Forest::from_params(&params.eta)?;
            let etd = params
                .etd
                .as_ref()
                .map(Forest::from_params)
                .transpose()?
                .map(|forest| BoundPredictor::new(Arc::new(forest)));
            Ok(ModelSelector::new(
                BoundPredictor::new(Arc::new(eta)),
                etd,
            ))
        }
        other => Err(ModelError::Invalid(format!("unknown model: {other}"))),
    }
}

pub fn load_model_from_path(path: impl AsRef<Path>) -> Result<ModelSelector, ModelError> {
    let contents = std::fs::read_to_string(path)?;
    let artifact: ModelArtifact = serde_json::from_str(&contents)?;
    let selector = create_selector(&artifact)?;
    info!(
        tier = %selector.tier(),
        eta_features = %selector.eta_contract(),
        etd_features = ?selector.etd_contract().map(|contract| contract.name()),
        "Model artifact validated"
    );
    Ok(selector)
}

/// Resolve a sensor trigger, add it to the window and predict from the result.
///
/// The event and the prediction it produces are published under one write
/// lock, so a stored record always describes the newest window.
pub fn process_sensor_event(
    state: &Arc<RwLock<AppState>>,
    sensor_index: SensorIndex,
    timestamp_secs: f64,
) -> Result<PredictionRecord, AppError> {
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    guard.record_event(sensor_index, timestamp_secs)?;
    Ok(predict_window(&mut guard, SystemTime::now()))
}

pub fn run_prediction_cycle(state: &Arc<RwLock<AppState>>) -> Result<PredictionRecord, AppError> {
    run_prediction_cycle_at(state, SystemTime::now())
}

fn run_prediction_cycle_at(
    state: &Arc<RwLock<AppState>>,
    timestamp: SystemTime,
) -> Result<PredictionRecord, AppError> {
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    Ok(predict_window(&mut guard, timestamp))
}

// Prediction is bounded work over at most three events; callers hold the write lock.
fn predict_window(state: &mut AppState, timestamp: SystemTime) -> PredictionRecord {
    let events = state.window().events();
    let train = state.train();

    let record = match state.selector().predict(&events, &train) {
        Ok(prediction) => {
            let decision = CrossingDecision::evaluate(
                state.crossing_config(),
                prediction.eta_secs,
                prediction.etd_secs,
            );
            match prediction.eta_secs {
                Some(eta_secs) => debug!(
                    tier = %prediction.tier,
                    eta_secs,
                    etd_secs = ?prediction.etd_secs,
                    close_gate = decision.is_some_and(|d| d.close_gate),
                    "Prediction updated"
                ),
                None => warn!(
                    last_speed = prediction.last_speed,
                    distance_remaining = prediction.distance_remaining,
                    "No valid ETA for current window"
                ),
            }
            PredictionRecord::from_prediction(prediction, decision, events.len(), timestamp)
        }
        Err(err) => {
            let code = match &err {
                FeatureError::InsufficientData { .. } => PredictionErrorCode::InsufficientData,
                FeatureError::NonPositiveInterval { .. } => PredictionErrorCode::InvalidInterval,
                FeatureError::LengthMismatch { .. } | FeatureError::ContractMismatch { .. } => {
                    PredictionErrorCode::ContractMismatch
                }
            };
            if code == PredictionErrorCode::InsufficientData {
                debug!(events = events.len(), "Waiting for more sensor events");
            } else {
                warn!(error = %err, "Prediction skipped");
            }
            PredictionRecord::unavailable(code, events.len(), timestamp)
        }
    };

    state.set_prediction(record.clone());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::selector::ModelTier;
    use crate::sensor::TrackLayout;
    use crate::state::PredictionStatus;
    use serde_json::json;
    use std::time::{Duration, UNIX_EPOCH};

    fn artifact(value: serde_json::Value) -> Result<ModelArtifact, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn state_with_layout() -> Result<Arc<RwLock<AppState>>, AppError> {
        let layout = TrackLayout::new(&[300.0, 200.0, 100.0])?;
        Ok(Arc::new(RwLock::new(AppState::new(layout, 50.0))))
    }

    #[test]
    fn physics_artifact_needs_no_params() -> Result<(), Box<dyn std::error::Error>> {
        let selector = create_selector(&artifact(json!({ "model": "physics" }))?)?;

        assert_eq!(selector.tier(), ModelTier::Physics);
        assert_eq!(selector.eta_contract(), FeatureContract::PhysicsEta);
        Ok(())
    }

    #[test]
    fn polynomial_artifact_builds_polynomial_tier() -> Result<(), Box<dyn std::error::Error>> {
        let value = json!({
            "model": "polynomial",
            "params": {
                "intercept": 1.5,
                "coefficients": vec![0.0_f64; 15],
                "etd": { "forest": { "features": "kinematic_14", "trees": [ { "nodes": [ { "leaf": 3.0 } ] } ] } }
            }
        });

        let selector = create_selector(&artifact(value)?)?;

        assert_eq!(selector.tier(), ModelTier::Polynomial);
        assert_eq!(selector.eta_contract(), FeatureContract::Polynomial);
        assert_eq!(selector.etd_contract(), Some(FeatureContract::Kinematic14));
        Ok(())
    }

    #[test]
    fn polynomial_artifact_rejects_short_coefficients() -> Result<(), serde_json::Error> {
        let value = json!({
            "model": "polynomial",
            "params": { "intercept": 0.0, "coefficients": [1.0, 2.0] }
        });

        let result = create_selector(&artifact(value)?);

        assert!(matches!(
            result,
            Err(ModelError::CoefficientCount {
                expected: 15,
                actual: 2
            })
        ));
        Ok(())
    }

    #[test]
    fn forest_artifact_rejects_out_of_contract_feature() -> Result<(), serde_json::Error> {
        let value = json!({
            "model": "forest",
            "params": {
                "eta": {
                    "features": "physics_eta",
                    "trees": [ { "nodes": [
                        { "split": { "feature": 6, "threshold": 1.0, "left": 1, "right": 2 } },
                        { "leaf": 1.0 },
                        { "leaf": 2.0 }
                    ] } ]
                }
            }
        });

        let result = create_selector(&artifact(value)?);

        assert!(matches!(result, Err(ModelError::FeatureIndex { feature: 6, .. })));
        Ok(())
    }

    #[test]
    fn unknown_model_is_rejected() -> Result<(), serde_json::Error> {
        let result = create_selector(&artifact(json!({ "model": "neural", "params": {} }))?);

        assert!(matches!(result, Err(ModelError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn missing_artifact_returns_read_error() {
        let path = std::env::temp_dir().join("crossing-eta-no-such-model.json");

        assert!(matches!(
            load_model_from_path(&path),
            Err(ModelError::Read(_))
        ));
    }

    #[test]
    fn shipped_artifacts_load() -> Result<(), ModelError> {
        let forest = load_model_from_path("config/model.json")?;
        let polynomial = load_model_from_path("config/polynomial.json")?;

        assert_eq!(forest.tier(), ModelTier::Forest);
        assert_eq!(forest.etd_contract(), Some(FeatureContract::Kinematic14));
        assert_eq!(polynomial.tier(), ModelTier::Polynomial);
        Ok(())
    }

    #[test]
    fn cycle_without_events_reports_insufficient_data() -> Result<(), AppError> {
        let state = state_with_layout()?;

        let record = run_prediction_cycle_at(&state, UNIX_EPOCH + Duration::from_secs(1))?;

        assert_eq!(record.status, PredictionStatus::Degraded);
        assert_eq!(record.error_code, Some(PredictionErrorCode::InsufficientData));
        Ok(())
    }

    #[test]
    fn events_feed_prediction_and_decision() -> Result<(), AppError> {
        let state = state_with_layout()?;

        process_sensor_event(&state, 0, 0.0)?;
        let record = process_sensor_event(&state, 1, 10.0)?;

        assert_eq!(record.status, PredictionStatus::Ok);
        let prediction = record.prediction.as_ref().map(|p| (p.eta_secs, p.etd_secs));
        assert_eq!(prediction, Some((Some(20.0), Some(25.0))));
        assert_eq!(record.decision.map(|d| d.notify), Some(true));

        let guard = state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.prediction(), Some(&record));
        Ok(())
    }

    #[test]
    fn duplicate_timestamp_is_reported_as_invalid_interval() -> Result<(), AppError> {
        let state = state_with_layout()?;

        process_sensor_event(&state, 0, 4.0)?;
        let record = process_sensor_event(&state, 1, 4.0)?;

        assert_eq!(record.status, PredictionStatus::Degraded);
        assert_eq!(record.error_code, Some(PredictionErrorCode::InvalidInterval));
        Ok(())
    }

    #[test]
    fn concurrent_events_leave_prediction_of_newest_window() -> Result<(), Box<dyn std::error::Error>> {
        let state = state_with_layout()?;

        let workers: Vec<_> = (0u8..8)
            .map(|run| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || -> Result<(), AppError> {
                    let start = f64::from(run) * 100.0;
                    for (sensor_index, offset) in [(0, 0.0), (1, 10.0), (2, 20.0)] {
                        process_sensor_event(&state, sensor_index, start + offset)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().map_err(|_| "worker panicked")??;
        }

        let guard = state.read().map_err(|_| AppError::StateLock)?;
        let events = guard.window().events();
        let record = guard.prediction().ok_or("no prediction stored")?;
        let expected = guard.selector().predict(&events, &guard.train()).ok();
        assert_eq!(record.events_used, events.len());
        assert_eq!(record.prediction, expected);
        Ok(())
    }

    #[test]
    fn unknown_sensor_is_rejected_before_prediction() -> Result<(), AppError> {
        let state = state_with_layout()?;

        let result = process_sensor_event(&state, 9, 1.0);

        assert!(matches!(result, Err(AppError::UnknownSensor(9))));
        let guard = state.read().map_err(|_| AppError::StateLock)?;
        assert!(guard.window().is_empty());
        Ok(())
    }
}
