//! Sensor discovery - finds sensor nodes on the local subnet.
//!
//! Discovery works in two steps:
//! 1. Pick the subnet: the configured override, or the /24 around the
//!    local outward-facing IPv4 address
//! 2. Scan it for hosts with the sensor port open
//!
//! The outward-facing address is found by connecting a UDP socket toward a
//! public address and reading back the local address the kernel picked.
//! No packet is sent.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Discovery errors are logged but never fatal

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use tmon_core::MonitorConfig;

// ============================================================================
// Constants
// ============================================================================

/// Destination used to pick the outward-facing interface.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 1);

/// Prefix length of the subnet derived from the local address.
pub const DEFAULT_PREFIX: u8 = 24;

/// Shortest accepted prefix; a /16 is already 65534 hosts.
pub const MIN_PREFIX: u8 = 16;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The subnet string is not valid CIDR notation
    #[error("invalid subnet {input:?}: {reason}")]
    InvalidSubnet { input: String, reason: String },

    /// The local address could not be determined
    #[error("failed to determine local address: {0}")]
    LocalAddress(#[source] std::io::Error),

    /// The host has no outward-facing IPv4 address
    #[error("no IPv4 route found (local address {0})")]
    NoIpv4Route(IpAddr),

    /// The scan could not run to completion
    #[error("scan aborted: {0}")]
    ScanAborted(String),
}

fn invalid_subnet(input: &str, reason: impl Into<String>) -> DiscoveryError {
    DiscoveryError::InvalidSubnet {
        input: input.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// Subnet
// ============================================================================

/// An IPv4 network in CIDR notation, e.g. `192.168.1.0/24`.
///
/// Host bits of the address are cleared on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Creates the subnet of `prefix` bits containing `addr`.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, DiscoveryError> {
        if !(MIN_PREFIX..=32).contains(&prefix) {
            return Err(invalid_subnet(
                &format!("{addr}/{prefix}"),
                format!("prefix must be between {MIN_PREFIX} and 32"),
            ));
        }
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }

    /// Returns the /24 containing `addr`.
    pub fn around(addr: Ipv4Addr) -> Self {
        let [a, b, c, _] = addr.octets();
        Self {
            network: Ipv4Addr::new(a, b, c, 0),
            prefix: DEFAULT_PREFIX,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the network, including network and broadcast.
    fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let start = u64::from(u32::from(self.network));
        let candidate = u64::from(u32::from(addr));
        candidate >= start && candidate < start + self.size()
    }

    /// Enumerates the host addresses in ascending order.
    ///
    /// Network and broadcast addresses are skipped for prefixes up to /30;
    /// /31 and /32 have no such addresses.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let start = u64::from(u32::from(self.network));
        let size = self.size();
        let (first, last) = if self.prefix <= 30 {
            (start + 1, start + size - 1)
        } else {
            (start, start + size)
        };
        (first..last).filter_map(|n| u32::try_from(n).ok().map(Ipv4Addr::from))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid_subnet(s, "expected <address>/<prefix>"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid_subnet(s, e.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid_subnet(s, e.to_string()))?;
        Self::new(addr, prefix).map_err(|_| {
            invalid_subnet(s, format!("prefix must be between {MIN_PREFIX} and 32"))
        })
    }
}

/// Returns the local IPv4 address used for outbound traffic.
pub async fn local_ip() -> Result<Ipv4Addr, DiscoveryError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(DiscoveryError::LocalAddress)?;
    socket
        .connect(ROUTE_PROBE)
        .await
        .map_err(DiscoveryError::LocalAddress)?;

    match socket.local_addr().map_err(DiscoveryError::LocalAddress)?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(DiscoveryError::NoIpv4Route(other)),
    }
}

// ============================================================================
// Network Scanner
// ============================================================================

/// Finds hosts that accept connections on a port.
#[async_trait]
pub trait NetworkScanner: Send + Sync {
    /// Returns the addresses in `subnet` with `port` open, in ascending order.
    ///
    /// Hosts that do not answer are simply absent. No retries.
    async fn scan(&self, subnet: &Subnet, port: u16) -> Result<Vec<IpAddr>, DiscoveryError>;
}

/// TCP connect scan with a per-host deadline and bounded concurrency.
///
/// Each probe opens a connection and drops it straight away; sensors see
/// an empty request and close without replying.
#[derive(Debug, Clone)]
pub struct TcpConnectScanner {
    connect_timeout: Duration,
    concurrency: usize,
}

impl TcpConnectScanner {
    pub fn new(connect_timeout: Duration, concurrency: usize) -> Self {
        Self {
            connect_timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.scan_timeout(), config.scan_concurrency)
    }
}

#[async_trait]
impl NetworkScanner for TcpConnectScanner {
    async fn scan(&self, subnet: &Subnet, port: u16) -> Result<Vec<IpAddr>, DiscoveryError> {
        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut probes = JoinSet::new();

        for host in subnet.hosts() {
            let permit = Arc::clone(&limiter)
                .acquire_owned()
                .await
                .map_err(|e| DiscoveryError::ScanAborted(e.to_string()))?;
            let connect_timeout = self.connect_timeout;

            probes.spawn(async move {
                let addr = SocketAddr::from((host, port));
                let open = matches!(timeout(connect_timeout, TcpStream::connect(addr)).await, Ok(Ok(_)));
                drop(permit);
                open.then_some(IpAddr::V4(host))
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(addr)) => {
                    debug!(%addr, port, "Port open");
                    found.push(addr);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Scan probe task failed"),
            }
        }

        found.sort();
        Ok(found)
    }
}

// ============================================================================
// Discovery Service
// ============================================================================

/// Result of a discovery operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Subnet that was scanned, if one could be determined
    pub subnet: Option<Subnet>,
    /// Hosts with the sensor port open, ascending
    pub addresses: Vec<IpAddr>,
}

/// Resolves the subnet and runs the scanner.
pub struct DiscoveryService {
    scanner: Arc<dyn NetworkScanner>,
    subnet: Option<Subnet>,
    port: u16,
}

impl DiscoveryService {
    /// Creates a discovery service; `subnet` of `None` means the local /24.
    pub fn new(scanner: Arc<dyn NetworkScanner>, subnet: Option<Subnet>, port: u16) -> Self {
        Self {
            scanner,
            subnet,
            port,
        }
    }

    /// Builds a TCP connect scanner from monitor settings.
    ///
    /// Fails only if the configured subnet override is not valid CIDR.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, DiscoveryError> {
        let subnet = config.subnet.as_deref().map(str::parse::<Subnet>).transpose()?;
        Ok(Self::new(
            Arc::new(TcpConnectScanner::from_config(config)),
            subnet,
            config.port,
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Determines which subnet to scan.
    pub async fn resolve_subnet(&self) -> Result<Subnet, DiscoveryError> {
        match self.subnet {
            Some(subnet) => Ok(subnet),
            None => {
                let ip = local_ip().await?;
                debug!(local_ip = %ip, "Resolved outward-facing address");
                Ok(Subnet::around(ip))
            }
        }
    }

    /// Discovers sensor nodes.
    ///
    /// Errors are logged and yield an empty result.
    pub async fn discover(&self) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();

        let subnet = match self.resolve_subnet().await {
            Ok(subnet) => subnet,
            Err(e) => {
                warn!(error = %e, "Cannot determine subnet to scan");
                return result;
            }
        };
        result.subnet = Some(subnet);

        info!(%subnet, port = self.port, "Scanning for sensors");
        match self.scanner.scan(&subnet, self.port).await {
            Ok(addresses) => {
                info!(%subnet, found = addresses.len(), "Discovery complete");
                result.addresses = addresses;
            }
            Err(e) => warn!(%subnet, error = %e, "Scan failed"),
        }

        result
    }
}
