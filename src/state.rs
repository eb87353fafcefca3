use crate::crossing::{CrossingConfig, CrossingConfigError, CrossingDecision, CrossingUpdate};
use crate::error::AppError;
use crate::estimation::selector::{CrossingPrediction, ModelSelector, TrainProfile};
use crate::sensor::window::{EventWindow, WindowUpdate};
use crate::sensor::{SensorIndex, TrackLayout};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionErrorCode {
    /// Window holds fewer events than the active contract needs.
    InsufficientData,
    /// Duplicate or backwards timestamps in the window.
    InvalidInterval,
    /// Stopped or receding train.
    InvalidInput,
    ContractMismatch,
}

/// Outcome of the latest prediction cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub prediction: Option<CrossingPrediction>,
    pub decision: Option<CrossingDecision>,
    pub events_used: usize,
    pub timestamp: SystemTime,
    pub status: PredictionStatus,
    pub error_code: Option<PredictionErrorCode>,
}

impl PredictionRecord {
    pub fn from_prediction(
        prediction: CrossingPrediction,
        decision: Option<CrossingDecision>,
        events_used: usize,
        timestamp: SystemTime,
    ) -> Self {
        let (status, error_code) = if prediction.eta_secs.is_some() {
            (PredictionStatus::Ok, None)
        } else {
            (
                PredictionStatus::Degraded,
                Some(PredictionErrorCode::InvalidInput),
            )
        };
        Self {
            prediction: Some(prediction),
            decision,
            events_used,
            timestamp,
            status,
            error_code,
        }
    }

    pub fn unavailable(
        error_code: PredictionErrorCode,
        events_used: usize,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            prediction: None,
            decision: None,
            events_used,
            timestamp,
            status: PredictionStatus::Degraded,
            error_code: Some(error_code),
        }
    }
}

#[derive(Debug)]
pub struct AppState {
    layout: TrackLayout,
    window: EventWindow,
    selector: ModelSelector,
    train: TrainProfile,
    crossing: CrossingConfig,
    prediction: Option<PredictionRecord>,
    prediction_tx: watch::Sender<Option<PredictionRecord>>,
}

impl AppState {
    pub fn new(layout: TrackLayout, default_train_length: f64) -> Self {
        let (prediction_tx, _prediction_rx) = watch::channel(None);
        Self {
            layout,
            window: EventWindow::default(),
            selector: ModelSelector::physics(),
            train: TrainProfile::unknown(default_train_length),
            crossing: CrossingConfig::default(),
            prediction: None,
            prediction_tx,
        }
    }

    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    pub fn window(&self) -> &EventWindow {
        &self.window
    }

    /// Replace the window, dropping any events already collected.
    pub fn set_window(&mut self, window: EventWindow) {
        self.window = window;
    }

    /// Resolve a trigger against the layout and append it to the window.
    pub fn record_event(
        &mut self,
        sensor_index: SensorIndex,
        timestamp_secs: f64,
    ) -> Result<WindowUpdate, AppError> {
        let event = self.layout.event(sensor_index, timestamp_secs)?;
        Ok(self.window.push(event))
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    pub fn set_selector(&mut self, selector: ModelSelector) {
        self.selector = selector;
    }

    pub fn train(&self) -> TrainProfile {
        self.train
    }

    pub fn set_known_train_length(&mut self, length: Option<f64>) {
        self.train.known_length = length;
    }

    pub fn crossing_config(&self) -> &CrossingConfig {
        &self.crossing
    }

    /// Apply a threshold change and re-evaluate the stored prediction against it.
    pub fn update_crossing(
        &mut self,
        update: &CrossingUpdate,
    ) -> Result<CrossingConfig, CrossingConfigError> {
        self.crossing.apply(update)?;
        if let Some(mut record) = self.prediction.clone() {
            record.decision = record.prediction.as_ref().and_then(|prediction| {
                CrossingDecision::evaluate(&self.crossing, prediction.eta_secs, prediction.etd_secs)
            });
            self.set_prediction(record);
        }
        Ok(self.crossing)
    }

    pub fn set_crossing_config(&mut self, crossing: CrossingConfig) {
        self.crossing = crossing;
    }

    pub fn prediction(&self) -> Option<&PredictionRecord> {
        self.prediction.as_ref()
    }

    pub fn subscribe_prediction(&self) -> watch::Receiver<Option<PredictionRecord>> {
        self.prediction_tx.subscribe()
    }

    pub fn set_prediction(&mut self, record: PredictionRecord) {
        self.prediction = Some(record.clone());
        self.prediction_tx.send_replace(Some(record));
    }
}
