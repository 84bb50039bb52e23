//! Persistent monitor configuration
//!
//! Stores sampling, logging, and simulation parameters in a JSON file
//! at `<data_dir>/ventmon/config.json`. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use ventmon_core::sensor::sim::CircuitParams;
use ventmon_core::Settings;

fn default_tick_ms() -> u64 {
    ventmon_core::DEFAULT_TICK_MS
}

fn default_capacity() -> usize {
    ventmon_core::DEFAULT_CAPACITY
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prime_reads() -> usize {
    ventmon_core::PRIME_READS
}

fn default_rate_bpm() -> f64 {
    15.0
}

fn default_duty() -> f64 {
    1.0 / 3.0
}

/// Simulated patient circuit, used when no hardware is attached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Valve cycling rate in breaths per minute
    #[serde(default = "default_rate_bpm")]
    pub rate_bpm: f64,
    /// Inspiratory fraction of each breath
    #[serde(default = "default_duty")]
    pub duty: f64,
    /// Seconds into expiration at which the patient starts an effort
    #[serde(default)]
    pub effort_after_s: Option<f64>,
    /// Inspiratory pressure drop of that effort (Pa)
    #[serde(default)]
    pub effort_depth: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_bpm: default_rate_bpm(),
            duty: default_duty(),
            effort_after_s: None,
            effort_depth: 0.0,
        }
    }
}

/// Persistent monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sampling period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Ring buffer capacity in samples
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Directory receiving session logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Discard reads per calibration priming pass
    #[serde(default = "default_prime_reads")]
    pub prime_reads: usize,
    /// Clinician settings applied at startup
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            capacity: default_capacity(),
            log_dir: default_log_dir(),
            prime_reads: default_prime_reads(),
            settings: Settings::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Config file path: `<data_dir>/ventmon/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ventmon")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Sampling period, never shorter than 1 ms
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Simulated circuit parameters at this config's tick period
    pub fn circuit_params(&self) -> CircuitParams {
        CircuitParams {
            tick: self.tick_period(),
            effort: self
                .simulation
                .effort_after_s
                .map(|after| (after, self.simulation.effort_depth)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_ms, 5);
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.log_dir, PathBuf::from("."));
        assert_eq!(config.prime_reads, 100);
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn test_round_trip() {
        let config = MonitorConfig {
            tick_ms: 10,
            capacity: 64,
            log_dir: PathBuf::from("/var/log/ventmon"),
            prime_reads: 200,
            settings: Settings {
                assist_threshold: 10.0,
                ..Default::default()
            },
            simulation: SimulationConfig {
                effort_after_s: Some(1.0),
                effort_depth: 40.0,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"capacity": 50, "settings": {"assist": 8}}"#;
        let config: MonitorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.capacity, 50);
        assert_eq!(config.tick_ms, 5);
        assert_eq!(config.settings.assist_threshold, 8.0);
        assert_eq!(config.settings.respiratory_rate, 15.0);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: MonitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_load_from_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(MonitorConfig::load_from(&path), MonitorConfig::default());
        assert_eq!(
            MonitorConfig::load_from(&dir.path().join("missing.json")),
            MonitorConfig::default()
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = MonitorConfig {
            capacity: 42,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MonitorConfig::load_from(&path), config);
    }

    #[test]
    fn test_circuit_params() {
        let mut config = MonitorConfig::default();
        assert!(config.circuit_params().effort.is_none());
        config.simulation.effort_after_s = Some(0.5);
        config.simulation.effort_depth = 30.0;
        assert_eq!(config.circuit_params().effort, Some((0.5, 30.0)));
        assert_eq!(config.circuit_params().tick, Duration::from_millis(5));
    }

    #[test]
    fn test_tick_period_floor() {
        let config = MonitorConfig {
            tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_period(), Duration::from_millis(1));
    }
}
