//! Temperature acquisition.
//!
//! Two strategies exist, selected by `is_embedded_device` in the sensor
//! configuration:
//! - [`ThermalZoneProbe`] reads a milli-degree count from a sysfs thermal zone
//! - [`LmSensorsProbe`] runs `sensors -u <chip>` and picks one feature's input
//!
//! Both return an explicit [`ProbeError`] when no value can be determined,
//! so a failed acquisition is never confused with a real reading.

mod lm_sensors;
mod thermal_zone;

pub use lm_sensors::{parse_sensors_output, LmSensorsProbe};
pub use thermal_zone::ThermalZoneProbe;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use tmon_core::{Celsius, SensorConfig};

/// Source of temperature readings for a sensor node.
///
/// Implementations are shared by every request handler, so they must be
/// safe to call concurrently.
#[async_trait]
pub trait TemperatureProbe: Send + Sync {
    /// Takes one reading in whole degrees Celsius.
    async fn read_temperature(&self) -> Result<Celsius, ProbeError>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

/// Errors that can occur while taking a reading.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The thermal zone file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external utility could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external utility exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The configured feature does not appear in the utility output.
    #[error("sensor {sensor_id:?} not found in output")]
    SensorNotFound { sensor_id: String },

    /// The feature exists but has no `_input` reading after it.
    #[error("sensor {sensor_id:?} has no _input reading")]
    NoInput { sensor_id: String },

    /// A value was found but could not be parsed.
    #[error("could not parse reading {value:?}: {reason}")]
    Parse { value: String, reason: String },

    /// The acquisition did not finish in time.
    #[error("reading timed out after {0:?}")]
    Timeout(Duration),
}

/// Builds the probe strategy selected by the configuration.
pub fn probe_from_config(config: &SensorConfig) -> Arc<dyn TemperatureProbe> {
    if config.is_embedded_device {
        Arc::new(ThermalZoneProbe::new(config.thermal_zone_path.clone()))
    } else {
        Arc::new(LmSensorsProbe::new(
            config.sensors_program.clone(),
            config.sensor_name.clone(),
            config.sensor_id.clone(),
        ))
    }
}
