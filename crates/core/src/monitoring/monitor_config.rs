use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::onnx_yolo_detector::DEFAULT_CONFIDENCE;
use crate::monitoring::domain::gaze_estimator::GazeThresholds;
use crate::shared::constants::{
    APP_DIR_NAME, DEFAULT_READINESS_POLL_MS, DEFAULT_SAMPLE_INTERVAL_MS,
};

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no platform config directory")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Monitor tuning. Missing fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_interval_ms: u64,
    pub readiness_poll_ms: u64,
    /// Minimum detector score for a face to count.
    pub confidence: f64,
    pub gaze: GazeThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            readiness_poll_ms: DEFAULT_READINESS_POLL_MS,
            confidence: DEFAULT_CONFIDENCE,
            gaze: GazeThresholds::default(),
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms.max(1))
    }

    /// `<config dir>/Proctor/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Rejects values the monitor cannot run with: zero cadences, a
    /// confidence outside `0.0..=1.0`, and negative or non-finite gaze
    /// thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be at least 1".into(),
            ));
        }
        if self.readiness_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "readiness_poll_ms must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            )));
        }

        let g = &self.gaze;
        let fractions = [
            ("low_confidence", g.low_confidence),
            ("min_consistency", g.min_consistency),
            ("short_history_consistency", g.short_history_consistency),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "gaze.{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        let magnitudes = [
            ("deviation_x", g.deviation_x),
            ("deviation_y", g.deviation_y),
            ("low_confidence_deviation_y", g.low_confidence_deviation_y),
            ("stable_head_speed", g.stable_head_speed),
            ("fast_head_speed", g.fast_head_speed),
            ("fast_head_deviation_x", g.fast_head_deviation_x),
            ("fast_head_deviation_y", g.fast_head_deviation_y),
            ("eye_distance_variation", g.eye_distance_variation),
            ("inconsistent_deviation_x", g.inconsistent_deviation_x),
            ("inconsistent_deviation_y", g.inconsistent_deviation_y),
        ];
        for (name, value) in magnitudes {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "gaze.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the user config, or defaults when none has been saved.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }
}
