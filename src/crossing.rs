//! Gate and notification decisions derived from a prediction.
//!
//! The thresholds are an explicit value owned by whoever drives the
//! actuators. Predictors never read them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_GATE_CLOSE_THRESHOLD_SECS: f64 = 10.0;
pub const DEFAULT_NOTIFICATION_THRESHOLD_SECS: f64 = 189.1;
pub const DEFAULT_SAFETY_BUFFER_SECS: f64 = 2.0;
pub const DEFAULT_CLEARANCE_DELAY_SECS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrossingConfigError {
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("notification threshold {notification}s is below gate-close threshold {gate_close}s")]
    NotificationBeforeGate { notification: f64, gate_close: f64 },
}

/// Partial threshold change; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct CrossingUpdate {
    pub gate_close_threshold_secs: Option<f64>,
    pub notification_threshold_secs: Option<f64>,
    pub safety_buffer_secs: Option<f64>,
    pub clearance_delay_secs: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingConfig {
    gate_close_threshold_secs: f64,
    notification_threshold_secs: f64,
    safety_buffer_secs: f64,
    clearance_delay_secs: f64,
}

impl CrossingConfig {
    pub fn new(
        gate_close_threshold_secs: f64,
        notification_threshold_secs: f64,
        safety_buffer_secs: f64,
        clearance_delay_secs: f64,
    ) -> Result<Self, CrossingConfigError> {
        let mut config = Self::default();
        config.set_safety_buffer(safety_buffer_secs)?;
        config.set_clearance_delay(clearance_delay_secs)?;
        check("gate_close_threshold_secs", gate_close_threshold_secs)?;
        check("notification_threshold_secs", notification_threshold_secs)?;
        check_order(notification_threshold_secs, gate_close_threshold_secs)?;
        config.gate_close_threshold_secs = gate_close_threshold_secs;
        config.notification_threshold_secs = notification_threshold_secs;
        Ok(config)
    }

    pub fn gate_close_threshold_secs(&self) -> f64 {
        self.gate_close_threshold_secs
    }

    pub fn notification_threshold_secs(&self) -> f64 {
        self.notification_threshold_secs
    }

    pub fn safety_buffer_secs(&self) -> f64 {
        self.safety_buffer_secs
    }

    pub fn clearance_delay_secs(&self) -> f64 {
        self.clearance_delay_secs
    }

    pub fn set_gate_close_threshold(&mut self, secs: f64) -> Result<(), CrossingConfigError> {
        check("gate_close_threshold_secs", secs)?;
        check_order(self.notification_threshold_secs, secs)?;
        self.gate_close_threshold_secs = secs;
        Ok(())
    }

    pub fn set_notification_threshold(&mut self, secs: f64) -> Result<(), CrossingConfigError> {
        check("notification_threshold_secs", secs)?;
        check_order(secs, self.gate_close_threshold_secs)?;
        self.notification_threshold_secs = secs;
        Ok(())
    }

    pub fn set_safety_buffer(&mut self, secs: f64) -> Result<(), CrossingConfigError> {
        check("safety_buffer_secs", secs)?;
        self.safety_buffer_secs = secs;
        Ok(())
    }

    pub fn set_clearance_delay(&mut self, secs: f64) -> Result<(), CrossingConfigError> {
        check("clearance_delay_secs", secs)?;
        self.clearance_delay_secs = secs;
        Ok(())
    }

    /// Validate the merged values as a whole; `self` is untouched on error.
    pub fn apply(&mut self, update: &CrossingUpdate) -> Result<(), CrossingConfigError> {
        *self = Self::new(
            update
                .gate_close_threshold_secs
                .unwrap_or(self.gate_close_threshold_secs),
            update
                .notification_threshold_secs
                .unwrap_or(self.notification_threshold_secs),
            update.safety_buffer_secs.unwrap_or(self.safety_buffer_secs),
            update
                .clearance_delay_secs
                .unwrap_or(self.clearance_delay_secs),
        )?;
        Ok(())
    }

    /// Warning the furthest sensor gives a train at `max_train_speed`.
    ///
    /// The notification lead plus the safety buffer must fit inside it.
    /// `None` for a non-positive distance or speed.
    pub fn warning_check(&self, furthest_sensor: f64, max_train_speed: f64) -> Option<WarningCheck> {
        if !(furthest_sensor > 0.0) || !(max_train_speed > 0.0) {
            return None;
        }
        Some(WarningCheck {
            available_secs: furthest_sensor / max_train_speed,
            required_secs: self.notification_threshold_secs + self.safety_buffer_secs,
        })
    }
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            gate_close_threshold_secs: DEFAULT_GATE_CLOSE_THRESHOLD_SECS,
            notification_threshold_secs: DEFAULT_NOTIFICATION_THRESHOLD_SECS,
            safety_buffer_secs: DEFAULT_SAFETY_BUFFER_SECS,
            clearance_delay_secs: DEFAULT_CLEARANCE_DELAY_SECS,
        }
    }
}

fn check(name: &'static str, value: f64) -> Result<(), CrossingConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CrossingConfigError::InvalidValue { name, value })
    }
}

fn check_order(notification: f64, gate_close: f64) -> Result<(), CrossingConfigError> {
    if notification >= gate_close {
        Ok(())
    } else {
        Err(CrossingConfigError::NotificationBeforeGate {
            notification,
            gate_close,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarningCheck {
    pub available_secs: f64,
    pub required_secs: f64,
}

impl WarningCheck {
    pub fn meets_requirement(&self) -> bool {
        self.available_secs >= self.required_secs
    }

    pub fn shortfall_secs(&self) -> f64 {
        (self.required_secs - self.available_secs).max(0.0)
    }
}

/// Actions implied by one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingDecision {
    pub close_gate: bool,
    pub notify: bool,
    /// Seconds until the gate may reopen; absent without a valid ETD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_open_after_secs: Option<f64>,
}

impl CrossingDecision {
    /// `None` when there is no valid ETA this cycle.
    pub fn evaluate(
        config: &CrossingConfig,
        eta_secs: Option<f64>,
        etd_secs: Option<f64>,
    ) -> Option<Self> {
        let eta = eta_secs.filter(|eta| eta.is_finite())?;
        Some(Self {
            close_gate: eta <= config.gate_close_threshold_secs + config.safety_buffer_secs,
            notify: eta <= config.notification_threshold_secs,
            gate_open_after_secs: etd_secs
                .filter(|etd| etd.is_finite())
                .map(|etd| etd + config.clearance_delay_secs),
        })
    }
}
