//! Configuration management
//!
//! Settings live in `.batchline/config.yaml`. Every field is optional; a
//! missing file or key falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or saving the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read or written
    #[error("config file {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`Config`]
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Seconds between passes of `sync --watch`
    pub sync_interval_secs: u64,
    /// Job-script template replacing the built-in one
    pub job_template: Option<PathBuf>,
    /// Scheduler commands
    pub scheduler: SchedulerConfig,
    /// Defaults for batch preparation
    pub defaults: BatchDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sync_interval_secs: 60,
            job_template: None,
            scheduler: SchedulerConfig::default(),
            defaults: BatchDefaults::default(),
        }
    }
}

impl Config {
    /// Loads the configuration at `path`, or the defaults if it is missing
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the configuration to `path`
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_yaml::to_string(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Time allowed for one scheduler command
    #[must_use]
    pub fn scheduler_timeout(&self) -> Duration {
        self.scheduler.timeout()
    }

    /// Interval between sync passes in watch mode
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}

/// Commands used to reach the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Submits a script (`msub`)
    pub submit: String,
    /// Cancels a job (`canceljob`)
    pub cancel: String,
    /// Lists queued jobs (`showq`)
    pub list: String,
    /// Shows one job (`checkjob`)
    pub detail: String,
    /// User whose jobs are listed; `$USER` when unset
    pub user: Option<String>,
    /// Seconds any single scheduler command may take
    pub timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit: "msub".to_string(),
            cancel: "canceljob".to_string(),
            list: "showq".to_string(),
            detail: "checkjob".to_string(),
            user: None,
            timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Time allowed for one scheduler command
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// User whose jobs are listed
    #[must_use]
    pub fn user(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|user| !user.is_empty())
    }
}

/// Defaults applied to batch preparation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
    /// Samples per worker
    pub worker_num: usize,
    /// Processors per node
    pub ppn: u32,
    /// Scheduler queue
    pub queue: String,
    /// Requested walltime
    pub walltime: String,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            worker_num: 1,
            ppn: 1,
            queue: "batch".to_string(),
            walltime: "24:00:00".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.scheduler.submit, "msub");
        assert_eq!(config.scheduler_timeout(), Duration::from_secs(30));
        assert_eq!(config.defaults.walltime, "24:00:00");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "scheduler:\n  user: alice\n  timeout_secs: 5\ndefaults:\n  worker_num: 4\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scheduler.user(), Some("alice".to_string()));
        assert_eq!(config.scheduler.timeout(), Duration::from_secs(5));
        assert_eq!(config.scheduler.list, "showq");
        assert_eq!(config.defaults.worker_num, 4);
        assert_eq!(config.defaults.queue, "batch");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.sync_interval_secs = 15;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "defaults: [1, 2]\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
