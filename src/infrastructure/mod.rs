//! Infrastructure layer
//!
//! Configuration loading and logging setup.

pub mod config;
pub mod logging;

pub use config::{BatchDefaults, Config, ConfigError, SchedulerConfig};
pub use logging::init_logging;
