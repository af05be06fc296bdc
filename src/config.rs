//! Configuration for the sensor filter pipeline.

use crate::filter::rate_gate::{
    BIOHARNESS_VITALS_INTERVAL_MS, BIOHARNESS_WAVEFORM_INTERVAL_MS, DEFAULT_INTERVAL_MS,
    EMOTIV_INTERVAL_MS, KINECT_INTERVAL_MS,
};
use crate::filter::{GsrConfig, QrsServiceConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the filter pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which filters to run
    pub filters: FilterSelection,

    /// Conductance feature extraction settings
    pub gsr: GsrConfig,

    /// External QRS detection service endpoint
    pub qrs: QrsServiceConfig,

    /// Minimum forwarding intervals per sensor family
    pub intervals: IntervalConfig,

    /// Cadence of the synthetic producer in `run`
    #[serde(with = "duration_serde")]
    pub sample_period: Duration,

    /// Path for storing state and session stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-filter-pipeline");

        Self {
            filters: FilterSelection::default(),
            gsr: GsrConfig::default(),
            qrs: QrsServiceConfig::default(),
            intervals: IntervalConfig::default(),
            sample_period: Duration::from_millis(100),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-filter-pipeline")
            .join("config.json")
    }

    /// Path of the persisted session stats file.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Which filters the pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSelection {
    pub sine_wave: bool,
    pub gsr: bool,
    pub qrs: bool,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            sine_wave: true,
            gsr: true,
            qrs: false,
        }
    }
}

impl FilterSelection {
    /// Parse filter selection from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            sine_wave: names.iter().any(|s| s == "sine" || s == "sine_wave" || s == "all"),
            gsr: names.iter().any(|s| s == "gsr" || s == "all"),
            qrs: names.iter().any(|s| s == "qrs" || s == "all"),
        }
    }

    /// Check if at least one filter is enabled.
    pub fn any_enabled(&self) -> bool {
        self.sine_wave || self.gsr || self.qrs
    }
}

/// Minimum forwarding intervals, in milliseconds, per sensor family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub generic_ms: i64,
    pub emotiv_ms: i64,
    pub kinect_ms: i64,
    pub bioharness_waveform_ms: i64,
    pub bioharness_vitals_ms: i64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            generic_ms: DEFAULT_INTERVAL_MS,
            emotiv_ms: EMOTIV_INTERVAL_MS,
            kinect_ms: KINECT_INTERVAL_MS,
            bioharness_waveform_ms: BIOHARNESS_WAVEFORM_INTERVAL_MS,
            bioharness_vitals_ms: BIOHARNESS_VITALS_INTERVAL_MS,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_selection_parsing() {
        let selection = FilterSelection::from_csv("sine,gsr");
        assert!(selection.sine_wave);
        assert!(selection.gsr);
        assert!(!selection.qrs);

        let selection = FilterSelection::from_csv("qrs");
        assert!(!selection.sine_wave);
        assert!(selection.qrs);

        let selection = FilterSelection::from_csv("all");
        assert!(selection.sine_wave);
        assert!(selection.gsr);
        assert!(selection.qrs);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.intervals.generic_ms, 1000);
        assert_eq!(config.intervals.kinect_ms, 5000);
        assert_eq!(config.gsr.sampling_rate_hz, 60.0);
        assert!(config.filters.sine_wave);
        assert!(!config.filters.qrs);
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.sample_period = Duration::from_millis(250);
        config.intervals.generic_ms = 500;

        let json = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.sample_period, Duration::from_millis(250));
        assert_eq!(decoded.intervals.generic_ms, 500);
    }
}
