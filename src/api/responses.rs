use crate::estimation::selector::{EtdSource, ModelTier};
use serde::{Deserialize, Serialize};

/// One raw trigger posted by the sensor layer.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EventRequest {
    pub sensor_index: u8,
    pub timestamp_secs: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PredictionSuccessResponse {
    pub eta_secs: f64,
    /// `-1.0` when no departure time could be derived.
    pub etd_secs: f64,
    pub etd_source: EtdSource,
    pub tier: ModelTier,
    pub model: String,
    pub close_gate: bool,
    pub notify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_open_after_secs: Option<f64>,
    pub events_used: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoData,
    InsufficientData,
    InvalidInterval,
    InvalidInput,
    ContractMismatch,
    UnknownSensor,
    InvalidTimestamp,
    InvalidThreshold,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub tier: ModelTier,
    pub window_events: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CrossingConfigResponse {
    pub gate_close_threshold_secs: f64,
    pub notification_threshold_secs: f64,
    pub safety_buffer_secs: f64,
    pub clearance_delay_secs: f64,
    pub timestamp: String,
}
