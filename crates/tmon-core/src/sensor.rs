//! Sensor entity as seen from the monitor node.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Celsius;

// ============================================================================
// Sensor Status
// ============================================================================

/// Freshness of a sensor's last known reading.
///
/// The temperature field of a [`Sensor`] always holds the last value that was
/// read successfully; this status says whether that value is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SensorStatus {
    /// Registered but never polled successfully.
    #[default]
    Unpolled,

    /// The most recent poll succeeded.
    Fresh,

    /// The most recent poll failed; the temperature is a retained value.
    Stale {
        /// Number of consecutive failed polls.
        failures: u32,
    },

    /// The sensor was not found by the latest discovery scan.
    Vanished,
}

impl SensorStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unpolled => "no reading yet",
            Self::Fresh => "fresh",
            Self::Stale { .. } => "stale",
            Self::Vanished => "vanished",
        }
    }

    /// Returns true if the last poll produced the current temperature.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    /// Returns true if the sensor should be included in poll rounds.
    #[must_use]
    pub fn is_pollable(&self) -> bool {
        !matches!(self, Self::Vanished)
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { failures } => write!(f, "stale ({failures} failed)"),
            other => write!(f, "{}", other.label()),
        }
    }
}

// ============================================================================
// Sensor
// ============================================================================

/// A sensor node known to the monitor.
///
/// Created with an empty hostname and a zero temperature. The hostname is
/// filled in once at discovery; the temperature is overwritten by every
/// successful poll and retained when a poll fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    /// Network address of the sensor node (unique within a registry)
    pub address: IpAddr,

    /// TCP port the sensor listens on
    pub port: u16,

    /// Advertised identity, empty until fetched
    pub hostname: String,

    /// Last successfully read temperature
    pub temperature: Celsius,

    /// Freshness of `temperature`
    pub status: SensorStatus,

    /// When `temperature` was last read successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Sensor {
    /// Creates a freshly registered sensor.
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            hostname: String::new(),
            temperature: Celsius::default(),
            status: SensorStatus::Unpolled,
            last_updated: None,
        }
    }

    /// Returns the socket address used to reach this sensor.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Records a successful reading.
    pub fn record_reading(&mut self, value: Celsius) {
        self.temperature = value;
        self.status = SensorStatus::Fresh;
        self.last_updated = Some(Utc::now());
    }

    /// Records a failed poll, keeping the last known temperature.
    pub fn record_failure(&mut self) {
        self.status = match self.status {
            SensorStatus::Stale { failures } => SensorStatus::Stale {
                failures: failures.saturating_add(1),
            },
            _ => SensorStatus::Stale { failures: 1 },
        };
    }

    /// Returns the name to show for this sensor.
    ///
    /// Falls back to the address while the hostname is unknown.
    pub fn display_name(&self) -> String {
        if self.hostname.is_empty() {
            self.address.to_string()
        } else {
            self.hostname.clone()
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) : {} °C",
            self.display_name(),
            self.address,
            self.temperature
        )
    }
}
