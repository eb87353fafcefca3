use crate::crossing::CrossingConfigError;
use crate::sensor::SensorIndex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid track layout: {0}")]
    Layout(String),
    #[error("unknown sensor index: {0}")]
    UnknownSensor(SensorIndex),
    #[error("invalid event timestamp: {0}")]
    InvalidTimestamp(f64),
    #[error("crossing config error: {0}")]
    Crossing(#[from] CrossingConfigError),
    #[error("state lock poisoned")]
    StateLock,
}
