//! tmon Monitor - Discovers sensor nodes and polls their temperatures
//!
//! This crate provides the monitor side of the mesh:
//! - `discovery` - Subnet resolution and TCP connect scanning
//! - `registry` - Ordered store of known sensors and their last readings
//! - `client` - One-shot request client for the sensor protocol
//! - `poller` - Discovery followed by periodic, bounded fan-out poll rounds
//! - `report` - Console output of each round
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       tmon-monitor                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐  addresses  ┌─────────────────────┐   │
//! │  │ DiscoveryService │────────────▶│   SensorRegistry    │   │
//! │  │ (NetworkScanner) │             │ (owned by the loop) │   │
//! │  └──────────────────┘             └──────────┬──────────┘   │
//! │                                              │              │
//! │                                   PollingLoop│ every round  │
//! │                                              ▼              │
//! │  ┌──────────────────┐  snapshot   ┌─────────────────────┐   │
//! │  │     Reporter     │◀────────────│    SensorClient     │   │
//! │  │  (text / json)   │             │ (fan-out, bounded)  │   │
//! │  └──────────────────┘             └─────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A failing sensor only ever makes that sensor stale

pub mod client;
pub mod discovery;
pub mod poller;
pub mod registry;
pub mod report;

pub use client::{ClientConfig, ClientError, SensorClient};
pub use discovery::{
    local_ip, DiscoveryError, DiscoveryResult, DiscoveryService, NetworkScanner, Subnet,
    TcpConnectScanner,
};
pub use poller::PollingLoop;
pub use registry::{ReconcileSummary, RegistryError, SensorRegistry};
pub use report::{ConsoleReporter, ReportFormat, Reporter};
