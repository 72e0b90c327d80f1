//! tmon Core - Shared types for the temperature monitor mesh
//!
//! This crate provides the domain types and configuration shared between
//! the sensor node (`tmon-sensor`) and the monitor node (`tmon-monitor`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod error;
pub mod sensor;
pub mod temperature;

// Re-exports for convenience
pub use config::{
    Config, ConfigError, MonitorConfig, SensorConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
    MAX_HOSTNAME_LEN,
};
pub use error::{DomainError, DomainResult};
pub use sensor::{Sensor, SensorStatus};
pub use temperature::Celsius;
