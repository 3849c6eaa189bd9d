//! Runtime configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`cnc-sim.toml` in the working directory, or an explicit path)
//! 2. Environment variables (with `CNC_SIM_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [cnc_sim]
//! programs_dir = "/data/nc"
//! results_dir = "/data/sim_results"
//! capacity_bytes = 107374182400
//! program_extension = "nc"
//! poll_interval_ms = 1000
//! job_deadline_secs = 21600
//! lane = "exclusive"
//! max_retained_tasks = 1000
//! cleanup_interval_secs = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionLane;

/// Default file looked up by [`SimConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "cnc-sim.toml";

/// 100 GiB.
pub const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024 * 1024;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Directory holding uploaded programs.
    pub programs_dir: PathBuf,

    /// Directory holding one telemetry file per task.
    pub results_dir: PathBuf,

    /// Ceiling on the summed size of stored programs.
    pub capacity_bytes: u64,

    /// Program file extension, without the dot. Matched case-insensitively.
    pub program_extension: String,

    /// Delay between controller idle polls.
    pub poll_interval_ms: u64,

    /// Upper bound on a single run. `0` disables the deadline.
    pub job_deadline_secs: u64,

    /// How jobs share the controller.
    pub lane: ExecutionLane,

    /// Number of finished or failed tasks to remember. Unbounded when unset.
    pub max_retained_tasks: Option<usize>,

    /// Period of the background eviction pass. Disabled when unset.
    pub cleanup_interval_secs: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            programs_dir: PathBuf::from("./data/nc"),
            results_dir: PathBuf::from("./sim_results"),
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            program_extension: "nc".to_string(),
            poll_interval_ms: 1000,
            job_deadline_secs: 6 * 60 * 60,
            lane: ExecutionLane::Exclusive,
            max_retained_tasks: None,
            cleanup_interval_secs: None,
        }
    }
}

impl SimConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `cnc-sim.toml` in the working directory
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply the
    /// environment on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content.
    ///
    /// Values live under a `[cnc_sim]` table; a document without one yields
    /// the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            cnc_sim: SimConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(full.cnc_sim)
    }

    /// Checks values that would make the core unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity_bytes == 0 {
            return Err(ConfigError::Invalid("capacity_bytes must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.program_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid("program_extension must not be empty".into()));
        }
        Ok(())
    }

    /// Delay between idle polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-run deadline, if any.
    pub fn job_deadline(&self) -> Option<Duration> {
        (self.job_deadline_secs > 0).then(|| Duration::from_secs(self.job_deadline_secs))
    }

    /// Period of the background eviction pass, if enabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        self.cleanup_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CNC_SIM_PROGRAMS_DIR") {
            self.programs_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("CNC_SIM_RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }

        if let Ok(capacity) = std::env::var("CNC_SIM_CAPACITY_BYTES") {
            if let Ok(v) = capacity.parse() {
                self.capacity_bytes = v;
            }
        }

        if let Ok(ext) = std::env::var("CNC_SIM_PROGRAM_EXTENSION") {
            self.program_extension = ext;
        }

        if let Ok(interval) = std::env::var("CNC_SIM_POLL_INTERVAL_MS") {
            if let Ok(v) = interval.parse() {
                self.poll_interval_ms = v;
            }
        }

        if let Ok(deadline) = std::env::var("CNC_SIM_JOB_DEADLINE_SECS") {
            if let Ok(v) = deadline.parse() {
                self.job_deadline_secs = v;
            }
        }

        if let Ok(lane) = std::env::var("CNC_SIM_LANE") {
            match lane.to_ascii_lowercase().as_str() {
                "exclusive" => self.lane = ExecutionLane::Exclusive,
                "concurrent" => self.lane = ExecutionLane::Concurrent,
                other => tracing::warn!(lane = other, "ignoring unknown CNC_SIM_LANE"),
            }
        }

        if let Ok(retained) = std::env::var("CNC_SIM_MAX_RETAINED_TASKS") {
            if let Ok(v) = retained.parse() {
                self.max_retained_tasks = Some(v);
            }
        }

        if let Ok(cleanup) = std::env::var("CNC_SIM_CLEANUP_INTERVAL_SECS") {
            if let Ok(v) = cleanup.parse() {
                self.cleanup_interval_secs = Some(v);
            }
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("Failed to read config file '{path}': {error}")]
    Io {
        /// Path to the config file.
        path: String,
        /// Error message.
        error: String,
    },

    /// Parse error in config file.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = SimConfig::default();
        assert_eq!(config.capacity_bytes, DEFAULT_CAPACITY_BYTES);
        assert_eq!(config.program_extension, "nc");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.job_deadline(), Some(Duration::from_secs(21_600)));
        assert_eq!(config.lane, ExecutionLane::Exclusive);
        assert!(config.max_retained_tasks.is_none());
        assert!(config.cleanup_interval().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
[cnc_sim]
programs_dir = "/data/nc"
capacity_bytes = 100
poll_interval_ms = 250
job_deadline_secs = 0
lane = "concurrent"
max_retained_tasks = 5
"#;
        let config = SimConfig::from_toml(toml).unwrap();
        assert_eq!(config.programs_dir, PathBuf::from("/data/nc"));
        assert_eq!(config.results_dir, PathBuf::from("./sim_results"));
        assert_eq!(config.capacity_bytes, 100);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.job_deadline(), None);
        assert_eq!(config.lane, ExecutionLane::Concurrent);
        assert_eq!(config.max_retained_tasks, Some(5));
    }

    #[test]
    fn missing_table_yields_defaults() {
        let config = SimConfig::from_toml("[other]\nkey = 1\n").unwrap();
        assert_eq!(config.capacity_bytes, DEFAULT_CAPACITY_BYTES);
    }

    #[test]
    fn parse_error() {
        let err = SimConfig::from_toml("[cnc_sim\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation() {
        let config = SimConfig {
            capacity_bytes: 0,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = SimConfig {
            program_extension: ".".to_string(),
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file() {
        let err = SimConfig::from_file("/nonexistent/cnc-sim.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cnc-sim.toml"));
    }
}
