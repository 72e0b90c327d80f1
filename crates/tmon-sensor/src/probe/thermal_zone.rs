use std::path::PathBuf;

use async_trait::async_trait;
use tracing::trace;

use tmon_core::Celsius;

use super::{ProbeError, TemperatureProbe};

/// Reads a sysfs thermal zone such as `/sys/class/thermal/thermal_zone0/temp`.
///
/// The file holds an integer count of milli-degrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZoneProbe {
    path: PathBuf,
}

impl ThermalZoneProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TemperatureProbe for ThermalZoneProbe {
    async fn read_temperature(&self) -> Result<Celsius, ProbeError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ProbeError::Io {
                path: self.path.clone(),
                source,
            })?;

        let raw = content.trim();
        let millis: i64 = raw.parse().map_err(|e: std::num::ParseIntError| ProbeError::Parse {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

        trace!(path = %self.path.display(), millis, "Read thermal zone");

        Celsius::from_millidegrees(millis).map_err(|e| ProbeError::Parse {
            value: raw.to_string(),
            reason: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        format!("thermal zone {}", self.path.display())
    }
}
