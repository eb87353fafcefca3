use crate::api::responses::{
    CrossingConfigResponse, ErrorCode, ErrorResponse, EventRequest, HealthStatus,
    HealthSuccessResponse, PredictionSuccessResponse,
};
use crate::crossing::{CrossingConfig, CrossingUpdate};
use crate::error::AppError;
use crate::estimation::model::to_sentinel;
use crate::estimation::process_sensor_event;
use crate::state::{AppState, PredictionErrorCode, PredictionRecord, PredictionStatus};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum PredictionResponse {
    Success(PredictionSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for PredictionResponse {
    fn into_response(self) -> Response {
        match self {
            PredictionResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            PredictionResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_prediction(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_prediction_response(state, SystemTime::now())
}

pub async fn post_event(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(request): Json<EventRequest>,
) -> impl IntoResponse {
    build_event_response(state, request, SystemTime::now())
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

pub enum CrossingResponse {
    Success(CrossingConfigResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for CrossingResponse {
    fn into_response(self) -> Response {
        match self {
            CrossingResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            CrossingResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_crossing(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_crossing_response(state, SystemTime::now())
}

pub async fn put_crossing(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(update): Json<CrossingUpdate>,
) -> impl IntoResponse {
    build_crossing_update_response(state, update, SystemTime::now())
}

fn build_prediction_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> PredictionResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return prediction_internal_error("state lock poisoned while reading prediction");
        }
    };
    let record = guard.prediction().cloned();
    drop(guard);

    match record {
        Some(record) => record_response(&record, StatusCode::SERVICE_UNAVAILABLE),
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NoData,
            "No prediction available",
            now,
        ),
    }
}

fn build_event_response(
    state: Arc<RwLock<AppState>>,
    request: EventRequest,
    now: SystemTime,
) -> PredictionResponse {
    match process_sensor_event(&state, request.sensor_index, request.timestamp_secs) {
        // The event itself was accepted even when no prediction came of it.
        Ok(record) => record_response(&record, StatusCode::ACCEPTED),
        Err(AppError::UnknownSensor(sensor_index)) => {
            warn!(sensor_index, "Rejected event from unknown sensor");
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::UnknownSensor,
                &format!("Unknown sensor index {sensor_index}"),
                now,
            )
        }
        Err(AppError::InvalidTimestamp(timestamp_secs)) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InvalidTimestamp,
            &format!("Invalid timestamp {timestamp_secs}"),
            now,
        ),
        Err(err) => {
            error!(error = %err, "Failed to process sensor event");
            prediction_internal_error("event processing failure")
        }
    }
}

fn record_response(record: &PredictionRecord, degraded_status: StatusCode) -> PredictionResponse {
    let timestamp = match format_timestamp(record.timestamp) {
        Ok(formatted) => formatted,
        Err(_) => return prediction_internal_error("timestamp formatting failure"),
    };

    match (&record.prediction, record.status) {
        (Some(prediction), PredictionStatus::Ok) => {
            let Some(eta_secs) = prediction.eta_secs.filter(|eta| eta.is_finite()) else {
                return prediction_internal_error("prediction status ok but eta missing or invalid");
            };
            PredictionResponse::Success(PredictionSuccessResponse {
                eta_secs,
                etd_secs: to_sentinel(prediction.etd_secs),
                etd_source: prediction.etd_source,
                tier: prediction.tier,
                model: prediction.model.to_string(),
                close_gate: record.decision.is_some_and(|d| d.close_gate),
                notify: record.decision.is_some_and(|d| d.notify),
                gate_open_after_secs: record.decision.and_then(|d| d.gate_open_after_secs),
                events_used: record.events_used,
                timestamp,
            })
        }
        _ => {
            let (error_code, message) = match record.error_code {
                Some(PredictionErrorCode::InsufficientData) => (
                    ErrorCode::InsufficientData,
                    "Waiting for more sensor events",
                ),
                Some(PredictionErrorCode::InvalidInterval) => (
                    ErrorCode::InvalidInterval,
                    "Sensor events have non-increasing timestamps",
                ),
                Some(PredictionErrorCode::InvalidInput) => (
                    ErrorCode::InvalidInput,
                    "Train is stopped or moving away from the crossing",
                ),
                Some(PredictionErrorCode::ContractMismatch) => {
                    return prediction_internal_error("feature layout mismatch");
                }
                None => (ErrorCode::NoData, "No prediction available"),
            };
            PredictionResponse::Error {
                status: degraded_status,
                body: ErrorResponse {
                    error_code,
                    error_message: message.to_string(),
                    timestamp,
                },
            }
        }
    }
}

fn error_response(
    status: StatusCode,
    error_code: ErrorCode,
    message: &str,
    now: SystemTime,
) -> PredictionResponse {
    match format_timestamp(now) {
        Ok(formatted) => PredictionResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message: message.to_string(),
                timestamp: formatted,
            },
        },
        Err(_err) => prediction_internal_error("timestamp formatting failure"),
    }
}

fn prediction_internal_error(message: &str) -> PredictionResponse {
    let (status, body) = internal_error_body(message, "/api/prediction");
    PredictionResponse::Error { status, body }
}

fn internal_error_body(message: &str, route: &str) -> (StatusCode, ErrorResponse) {
    error!(message = message, route = route, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    )
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => return health_internal_error("state lock poisoned while reading state"),
    };

    let status = derive_health_status(guard.prediction());
    let tier = guard.selector().tier();
    let window_events = guard.window().len();
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return health_internal_error("timestamp formatting failure"),
    };

    HealthResponse::Success(HealthSuccessResponse {
        status,
        tier,
        window_events,
        timestamp,
    })
}

// A window still filling up is normal operation, not degradation.
fn derive_health_status(record: Option<&PredictionRecord>) -> HealthStatus {
    match record.and_then(|r| r.error_code) {
        None | Some(PredictionErrorCode::InsufficientData) => HealthStatus::Ok,
        Some(_) => HealthStatus::Degraded,
    }
}

fn health_internal_error(message: &str) -> HealthResponse {
    let (status, body) = internal_error_body(message, "/api/health");
    HealthResponse::Error { status, body }
}

fn build_crossing_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> CrossingResponse {
    let config = match state.read() {
        Ok(guard) => *guard.crossing_config(),
        Err(_) => return crossing_internal_error("state lock poisoned while reading thresholds"),
    };
    crossing_config_response(&config, now)
}

fn build_crossing_update_response(
    state: Arc<RwLock<AppState>>,
    update: CrossingUpdate,
    now: SystemTime,
) -> CrossingResponse {
    let result = match state.write() {
        Ok(mut guard) => guard.update_crossing(&update).map_err(AppError::from),
        Err(_) => return crossing_internal_error("state lock poisoned while updating thresholds"),
    };

    match result {
        Ok(config) => crossing_config_response(&config, now),
        Err(err) => match format_timestamp(now) {
            Ok(timestamp) => CrossingResponse::Error {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: ErrorResponse {
                    error_code: ErrorCode::InvalidThreshold,
                    error_message: err.to_string(),
                    timestamp,
                },
            },
            Err(_) => crossing_internal_error("timestamp formatting failure"),
        },
    }
}

fn crossing_config_response(config: &CrossingConfig, now: SystemTime) -> CrossingResponse {
    match format_timestamp(now) {
        Ok(timestamp) => CrossingResponse::Success(CrossingConfigResponse {
            gate_close_threshold_secs: config.gate_close_threshold_secs(),
            notification_threshold_secs: config.notification_threshold_secs(),
            safety_buffer_secs: config.safety_buffer_secs(),
            clearance_delay_secs: config.clearance_delay_secs(),
            timestamp,
        }),
        Err(_) => crossing_internal_error("timestamp formatting failure"),
    }
}

fn crossing_internal_error(message: &str) -> CrossingResponse {
    let (status, body) = internal_error_body(message, "/api/crossing");
    CrossingResponse::Error { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::selector::{CrossingPrediction, EtdSource, ModelTier};
    use crate::sensor::TrackLayout;
    use axum::http::StatusCode;
    use std::sync::{Arc, RwLock};
    use std::time::{Duration, UNIX_EPOCH};

    fn app_state() -> AppState {
        let layout = match TrackLayout::new(&[300.0, 200.0, 100.0]) {
            Ok(layout) => layout,
            Err(err) => panic!("test layout rejected: {err}"),
        };
        AppState::new(layout, 50.0)
    }

    fn poisoned_state() -> Arc<RwLock<AppState>> {
        let state = Arc::new(RwLock::new(app_state()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
        state
    }

    fn physics_prediction(eta_secs: Option<f64>, etd_secs: Option<f64>) -> CrossingPrediction {
        CrossingPrediction {
            tier: ModelTier::Physics,
            model: "physics",
            eta_secs,
            etd_secs,
            etd_source: EtdSource::Estimated,
            last_speed: 10.0,
            distance_remaining: 100.0,
        }
    }

    #[test]
    fn prediction_handler_returns_success_when_available() {
        let mut app_state = app_state();
        app_state.set_prediction(PredictionRecord::from_prediction(
            physics_prediction(Some(10.0), None),
            None,
            3,
            UNIX_EPOCH + Duration::from_secs(1),
        ));
        let state = Arc::new(RwLock::new(app_state));

        let response = build_prediction_response(state, UNIX_EPOCH);

        match response {
            PredictionResponse::Success(body) => {
                assert_eq!(body.eta_secs, 10.0);
                assert_eq!(body.etd_secs, -1.0);
                assert_eq!(body.events_used, 3);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            PredictionResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn prediction_handler_returns_no_data_when_missing() {
        let state = Arc::new(RwLock::new(app_state()));

        let response = build_prediction_response(state, UNIX_EPOCH + Duration::from_secs(2));

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::NoData);
                assert_eq!(body.timestamp, "1970-01-01T00:00:02Z");
            }
            PredictionResponse::Success(_) => panic!("expected no data error response"),
        }
    }

    #[test]
    fn prediction_handler_reports_invalid_input_for_stopped_train() {
        let mut app_state = app_state();
        app_state.set_prediction(PredictionRecord::from_prediction(
            physics_prediction(None, None),
            None,
            2,
            UNIX_EPOCH,
        ));
        let state = Arc::new(RwLock::new(app_state));

        let response = build_prediction_response(state, UNIX_EPOCH);

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::InvalidInput);
            }
            PredictionResponse::Success(_) => panic!("expected invalid input response"),
        }
    }

    #[test]
    fn prediction_handler_returns_internal_error_when_lock_poisoned() {
        let response = build_prediction_response(poisoned_state(), UNIX_EPOCH);

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            PredictionResponse::Success(_) => panic!("expected internal error response"),
        }
    }

    #[test]
    fn event_handler_accepts_first_event_without_prediction() {
        let state = Arc::new(RwLock::new(app_state()));
        let request = EventRequest {
            sensor_index: 0,
            timestamp_secs: 0.0,
        };

        let response = build_event_response(state, request, UNIX_EPOCH);

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::ACCEPTED);
                assert_eq!(body.error_code, ErrorCode::InsufficientData);
            }
            PredictionResponse::Success(_) => panic!("expected insufficient data response"),
        }
    }

    #[test]
    fn event_handler_returns_prediction_once_window_fills() {
        let state = Arc::new(RwLock::new(app_state()));
        let first = EventRequest {
            sensor_index: 0,
            timestamp_secs: 0.0,
        };
        let second = EventRequest {
            sensor_index: 1,
            timestamp_secs: 10.0,
        };

        let _ = build_event_response(Arc::clone(&state), first, UNIX_EPOCH);
        let response = build_event_response(state, second, UNIX_EPOCH);

        match response {
            PredictionResponse::Success(body) => {
                assert_eq!(body.eta_secs, 20.0);
                assert_eq!(body.etd_secs, 25.0);
                assert_eq!(body.tier, ModelTier::Physics);
                assert!(body.notify);
                assert!(!body.close_gate);
                assert_eq!(body.gate_open_after_secs, Some(30.0));
            }
            PredictionResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn event_handler_rejects_unknown_sensor() {
        let state = Arc::new(RwLock::new(app_state()));
        let request = EventRequest {
            sensor_index: 5,
            timestamp_secs: 1.0,
        };

        let response = build_event_response(state, request, UNIX_EPOCH);

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(body.error_code, ErrorCode::UnknownSensor);
            }
            PredictionResponse::Success(_) => panic!("expected unknown sensor response"),
        }
    }

    #[test]
    fn event_handler_rejects_non_finite_timestamp() {
        let state = Arc::new(RwLock::new(app_state()));
        let request = EventRequest {
            sensor_index: 0,
            timestamp_secs: f64::NAN,
        };

        let response = build_event_response(state, request, UNIX_EPOCH);

        match response {
            PredictionResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(body.error_code, ErrorCode::InvalidTimestamp);
            }
            PredictionResponse::Success(_) => panic!("expected invalid timestamp response"),
        }
    }

    #[test]
    fn health_handler_is_ok_while_window_fills() {
        let mut app_state = app_state();
        app_state.set_prediction(PredictionRecord::unavailable(
            PredictionErrorCode::InsufficientData,
            1,
            UNIX_EPOCH,
        ));
        let state = Arc::new(RwLock::new(app_state));

        let response = build_health_response(state, UNIX_EPOCH + Duration::from_secs(3));

        match response {
            HealthResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.tier, ModelTier::Physics);
                assert_eq!(body.timestamp, "1970-01-01T00:00:03Z");
            }
            HealthResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_handler_is_degraded_after_invalid_interval() {
        let mut app_state = app_state();
        app_state.set_prediction(PredictionRecord::unavailable(
            PredictionErrorCode::InvalidInterval,
            2,
            UNIX_EPOCH,
        ));
        let state = Arc::new(RwLock::new(app_state));

        let response = build_health_response(state, UNIX_EPOCH);

        match response {
            HealthResponse::Success(body) => assert_eq!(body.status, HealthStatus::Degraded),
            HealthResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_handler_returns_internal_error_when_lock_poisoned() {
        let response = build_health_response(poisoned_state(), UNIX_EPOCH);

        match response {
            HealthResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
            }
            HealthResponse::Success(_) => panic!("expected internal error response"),
        }
    }

    #[test]
    fn crossing_update_applies_valid_thresholds() {
        let state = Arc::new(RwLock::new(app_state()));
        let update = CrossingUpdate {
            gate_close_threshold_secs: Some(15.0),
            ..CrossingUpdate::default()
        };

        let response = build_crossing_update_response(Arc::clone(&state), update, UNIX_EPOCH);

        match response {
            CrossingResponse::Success(body) => {
                assert_eq!(body.gate_close_threshold_secs, 15.0);
                assert_eq!(body.notification_threshold_secs, 189.1);
            }
            CrossingResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
        match build_crossing_response(state, UNIX_EPOCH) {
            CrossingResponse::Success(body) => assert_eq!(body.gate_close_threshold_secs, 15.0),
            CrossingResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn crossing_update_refreshes_stored_gate_decision() {
        let state = Arc::new(RwLock::new(app_state()));
        let first = EventRequest {
            sensor_index: 0,
            timestamp_secs: 0.0,
        };
        let second = EventRequest {
            sensor_index: 1,
            timestamp_secs: 10.0,
        };
        let _ = build_event_response(Arc::clone(&state), first, UNIX_EPOCH);
        let _ = build_event_response(Arc::clone(&state), second, UNIX_EPOCH);
        let update = CrossingUpdate {
            gate_close_threshold_secs: Some(18.0),
            ..CrossingUpdate::default()
        };

        let before = build_prediction_response(Arc::clone(&state), UNIX_EPOCH);
        let _ = build_crossing_update_response(Arc::clone(&state), update, UNIX_EPOCH);
        let after = build_prediction_response(state, UNIX_EPOCH);

        match (before, after) {
            (PredictionResponse::Success(before), PredictionResponse::Success(after)) => {
                assert_eq!(before.eta_secs, 20.0);
                assert!(!before.close_gate);
                assert!(after.close_gate);
            }
            _ => panic!("expected success responses"),
        }
    }

    #[test]
    fn crossing_update_rejects_invalid_thresholds() {
        let state = Arc::new(RwLock::new(app_state()));
        let update = CrossingUpdate {
            safety_buffer_secs: Some(-3.0),
            ..CrossingUpdate::default()
        };

        let response = build_crossing_update_response(Arc::clone(&state), update, UNIX_EPOCH);

        match response {
            CrossingResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(body.error_code, ErrorCode::InvalidThreshold);
            }
            CrossingResponse::Success(_) => panic!("expected invalid threshold response"),
        }
        let unchanged = state.read().map(|guard| *guard.crossing_config()).ok();
        assert_eq!(unchanged, Some(CrossingConfig::default()));
    }
}
