//! Configuration file for both node roles.
//!
//! A single TOML file carries a `[monitor]` section and a `[sensor]` section;
//! each binary reads only the section for its role:
//!
//! ```toml
//! [monitor]
//! port = 5005
//!
//! [sensor]
//! hostname = "kitchen"
//! port = 5005
//! is_embedded_device = false
//! sensor_name = "coretemp-isa-0000"
//! sensor_id = "Package id 0"
//! ```
//!
//! Every field other than the port, hostname and probe selectors has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that points at the configuration file.
pub const CONFIG_ENV_VAR: &str = "TMON_CONFIG";

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "temperature-monitor.toml";

/// Default thermal zone exposed by Linux on single-board computers.
pub const DEFAULT_THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Longest hostname a sensor may advertise; a reply must fit the 2048-byte
/// receive buffer on the monitor.
pub const MAX_HOSTNAME_LEN: usize = 2048;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while locating or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was found in any search location.
    #[error("no configuration file found (searched: {})", format_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has wrong field types.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The section required by this node role is absent.
    #[error("configuration has no [{0}] section")]
    MissingSection(&'static str),

    /// A field has a value outside its allowed range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Settings for the monitor node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// TCP port every sensor listens on.
    pub port: u16,

    /// Subnet to scan in CIDR notation. Defaults to the /24 around the
    /// local outward-facing address.
    #[serde(default)]
    pub subnet: Option<String>,

    /// Seconds between the start of consecutive poll rounds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum concurrent sensor requests within one round.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Deadline for establishing a connection to a sensor.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline for each read or write on a sensor connection.
    #[serde(default = "default_monitor_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Per-host connect deadline during discovery scans.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    /// Maximum concurrent connect attempts during discovery scans.
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Rounds between re-discovery scans; 0 disables re-discovery.
    #[serde(default)]
    pub rediscover_every: u32,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_max_in_flight() -> usize {
    16
}

fn default_connect_timeout_ms() -> u64 {
    1_000
}

fn default_monitor_io_timeout_ms() -> u64 {
    2_000
}

fn default_scan_timeout_ms() -> u64 {
    300
}

fn default_scan_concurrency() -> usize {
    64
}

impl MonitorConfig {
    /// Creates a configuration for the given port with every other field defaulted.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            subnet: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_in_flight: default_max_in_flight(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_monitor_io_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
            scan_concurrency: default_scan_concurrency(),
            rediscover_every: 0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Checks ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(invalid("monitor.port", "must be between 1 and 65535"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("monitor.poll_interval_secs", "must be at least 1"));
        }
        if self.max_in_flight == 0 {
            return Err(invalid("monitor.max_in_flight", "must be at least 1"));
        }
        if self.scan_concurrency == 0 {
            return Err(invalid("monitor.scan_concurrency", "must be at least 1"));
        }
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 || self.scan_timeout_ms == 0 {
            return Err(invalid("monitor timeouts", "must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Sensor Configuration
// ============================================================================

/// Settings for a sensor node. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    /// Identity advertised in reply to `hostname`.
    pub hostname: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Selects the thermal-zone probe instead of the `sensors` utility.
    #[serde(default, alias = "is_rpi")]
    pub is_embedded_device: bool,

    /// Chip name passed to `sensors -u` (e.g. `coretemp-isa-0000`).
    #[serde(default)]
    pub sensor_name: String,

    /// Feature label within the chip output (e.g. `Package id 0`).
    #[serde(default)]
    pub sensor_id: String,

    /// Milli-degree file read by the thermal-zone probe.
    #[serde(default = "default_thermal_zone_path")]
    pub thermal_zone_path: PathBuf,

    /// Program invoked by the external-utility probe.
    #[serde(default = "default_sensors_program")]
    pub sensors_program: String,

    /// Maximum connections served concurrently.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Deadline for each read or write on a client connection.
    #[serde(default = "default_sensor_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Deadline for a single temperature acquisition.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_thermal_zone_path() -> PathBuf {
    PathBuf::from(DEFAULT_THERMAL_ZONE_PATH)
}

fn default_sensors_program() -> String {
    "sensors".to_string()
}

fn default_max_connections() -> usize {
    256
}

fn default_sensor_io_timeout_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl SensorConfig {
    /// Creates a thermal-zone configuration with every optional field defaulted.
    pub fn embedded(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            is_embedded_device: true,
            sensor_name: String::new(),
            sensor_id: String::new(),
            thermal_zone_path: default_thermal_zone_path(),
            sensors_program: default_sensors_program(),
            max_connections: default_max_connections(),
            io_timeout_ms: default_sensor_io_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Checks ranges and cross-field requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(invalid("sensor.hostname", "must not be empty"));
        }
        if self.hostname.len() > MAX_HOSTNAME_LEN {
            return Err(ConfigError::Invalid {
                field: "sensor.hostname",
                reason: format!("must be at most {MAX_HOSTNAME_LEN} bytes"),
            });
        }
        if self.port == 0 {
            return Err(invalid("sensor.port", "must be between 1 and 65535"));
        }
        if self.max_connections == 0 {
            return Err(invalid("sensor.max_connections", "must be at least 1"));
        }
        if self.io_timeout_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(invalid("sensor timeouts", "must be non-zero"));
        }
        if !self.is_embedded_device {
            if self.sensor_name.is_empty() {
                return Err(invalid(
                    "sensor.sensor_name",
                    "required unless is_embedded_device is set",
                ));
            }
            if self.sensor_id.is_empty() {
                return Err(invalid(
                    "sensor.sensor_id",
                    "required unless is_embedded_device is set",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ============================================================================
// Configuration File
// ============================================================================

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,

    #[serde(default)]
    pub sensor: Option<SensorConfig>,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Locates and loads the configuration file.
    ///
    /// An explicit path always wins and must exist. Otherwise the search
    /// order is `$TMON_CONFIG`, `./temperature-monitor.toml`, then
    /// `<config dir>/temperature-monitor/config.toml`.
    ///
    /// Returns the parsed configuration and the path it was read from.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_path(path)?, path.to_path_buf()));
        }

        let candidates = search_paths();
        for candidate in &candidates {
            if candidate.is_file() {
                return Ok((Self::from_path(candidate)?, candidate.clone()));
            }
        }

        Err(ConfigError::NotFound {
            searched: candidates,
        })
    }

    /// Returns the validated `[monitor]` section.
    pub fn monitor(&self) -> Result<&MonitorConfig, ConfigError> {
        let section = self
            .monitor
            .as_ref()
            .ok_or(ConfigError::MissingSection("monitor"))?;
        section.validate()?;
        Ok(section)
    }

    /// Returns the validated `[sensor]` section.
    pub fn sensor(&self) -> Result<&SensorConfig, ConfigError> {
        let section = self
            .sensor
            .as_ref()
            .ok_or(ConfigError::MissingSection("sensor"))?;
        section.validate()?;
        Ok(section)
    }
}

/// Returns the implicit search locations, in priority order.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if !env_path.is_empty() {
            paths.push(PathBuf::from(env_path));
        }
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("temperature-monitor").join("config.toml"));
    }
    paths
}
