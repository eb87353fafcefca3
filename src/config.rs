use crate::crossing::{
    CrossingConfig, CrossingConfigError, WarningCheck, DEFAULT_CLEARANCE_DELAY_SECS,
    DEFAULT_GATE_CLOSE_THRESHOLD_SECS, DEFAULT_NOTIFICATION_THRESHOLD_SECS,
    DEFAULT_SAFETY_BUFFER_SECS,
};
use crate::estimation::selector::{ModelSelector, TrainProfile};
use crate::sensor::TrackLayout;
use crate::sensor::window::{DEFAULT_WINDOW_CAPACITY, EventWindow, MAX_WINDOW_CAPACITY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub model: Option<ModelSection>,
    pub track: TrackSection,
    #[serde(default)]
    pub crossing: Option<CrossingSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSection {
    pub path: Option<PathBuf>,
    /// Use physics when the artifact fails to load or the window is too short (default: true)
    pub fallback_to_physics: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackSection {
    /// Distance of each sensor from the crossing, furthest first
    pub sensor_positions: Vec<f64>,
    /// Train length assumed when none is known, in the same unit as the positions
    pub default_train_length: f64,
    /// Known length of the expected train
    pub train_length: Option<f64>,
    /// Events kept per train run (default: 3)
    pub window_capacity: Option<usize>,
    /// Longest gap between consecutive triggers of one run
    pub max_event_gap_secs: Option<f64>,
    /// Fastest expected train, in position units per second
    pub max_train_speed: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrossingSection {
    pub gate_close_threshold_secs: Option<f64>,
    pub notification_threshold_secs: Option<f64>,
    pub safety_buffer_secs: Option<f64>,
    pub clearance_delay_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid crossing thresholds: {0}")]
    Crossing(#[from] CrossingConfigError),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.logging.level.trim()).map_err(|_| {
            ConfigError::Invalid(format!("unknown log level: {}", self.logging.level))
        })
    }

    pub fn model_path(&self) -> Option<&Path> {
        let path = self.model.as_ref()?.path.as_deref()?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }

    pub fn fallback_to_physics(&self) -> bool {
        self.model
            .as_ref()
            .and_then(|m| m.fallback_to_physics)
            .unwrap_or(true)
    }

    pub fn track_layout(&self) -> Result<TrackLayout, ConfigError> {
        TrackLayout::new(&self.track.sensor_positions)
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn train_profile(&self) -> Result<TrainProfile, ConfigError> {
        let default_length = self.track.default_train_length;
        if !default_length.is_finite() || default_length <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_train_length must be positive, got {default_length}"
            )));
        }
        if let Some(length) = self.track.train_length
            && (!length.is_finite() || length <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "train_length must be positive, got {length}"
            )));
        }
        Ok(TrainProfile {
            known_length: self.track.train_length,
            default_length,
        })
    }

    /// Window sized for `selector`: large enough for its shortest usable
    /// contract and no larger than feature extraction reads.
    pub fn event_window(&self, selector: &ModelSelector) -> Result<EventWindow, ConfigError> {
        let capacity = self
            .track
            .window_capacity
            .unwrap_or(DEFAULT_WINDOW_CAPACITY);
        let min_capacity = selector.min_events();
        if capacity < min_capacity || capacity > MAX_WINDOW_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "window_capacity must be between {min_capacity} and {MAX_WINDOW_CAPACITY} \
                 for the {} model, got {capacity}",
                selector.tier()
            )));
        }
        if let Some(gap) = self.track.max_event_gap_secs
            && (!gap.is_finite() || gap <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "max_event_gap_secs must be positive, got {gap}"
            )));
        }
        Ok(EventWindow::new(capacity, self.track.max_event_gap_secs))
    }

    pub fn max_train_speed(&self) -> Result<Option<f64>, ConfigError> {
        match self.track.max_train_speed {
            Some(speed) if !speed.is_finite() || speed <= 0.0 => Err(ConfigError::Invalid(
                format!("max_train_speed must be positive, got {speed}"),
            )),
            speed => Ok(speed),
        }
    }

    pub fn crossing_config(&self) -> Result<CrossingConfig, ConfigError> {
        let section = self.crossing.as_ref();
        let config = CrossingConfig::new(
            section
                .and_then(|c| c.gate_close_threshold_secs)
                .unwrap_or(DEFAULT_GATE_CLOSE_THRESHOLD_SECS),
            section
                .and_then(|c| c.notification_threshold_secs)
                .unwrap_or(DEFAULT_NOTIFICATION_THRESHOLD_SECS),
            section
                .and_then(|c| c.safety_buffer_secs)
                .unwrap_or(DEFAULT_SAFETY_BUFFER_SECS),
            section
                .and_then(|c| c.clearance_delay_secs)
                .unwrap_or(DEFAULT_CLEARANCE_DELAY_SECS),
        )?;
        Ok(config)
    }

    /// Warning time at the furthest sensor, when a maximum train speed is configured.
    pub fn warning_check(&self) -> Result<Option<WarningCheck>, ConfigError> {
        let Some(max_speed) = self.max_train_speed()? else {
            return Ok(None);
        };
        let layout = self.track_layout()?;
        let crossing = self.crossing_config()?;
        Ok(layout
            .sensors()
            .first()
            .and_then(|sensor| crossing.warning_check(sensor.position, max_speed)))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}
