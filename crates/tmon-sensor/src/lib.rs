//! tmon Sensor - Temperature sensor node
//!
//! This crate provides the sensor side of the mesh:
//! - `probe` - Temperature acquisition strategies behind `TemperatureProbe`
//! - `server` - TCP listener and one-shot request handler
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    tmon-sensor                       │
//! ├──────────────────────────────────────────────────────┤
//! │                                                      │
//! │  ┌─────────────────┐  accept()  ┌────────────────┐   │
//! │  │  SensorServer   │───────────▶│ RequestHandler │   │
//! │  │ (TcpListener)   │  per conn  │  (one-shot)    │   │
//! │  └─────────────────┘            └───────┬────────┘   │
//! │                                         │            │
//! │                                         ▼            │
//! │                              ┌──────────────────┐    │
//! │                              │ TemperatureProbe │    │
//! │                              └──────────────────┘    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-connection failures are logged and never reach the accept loop

pub mod probe;
pub mod server;

pub use probe::{probe_from_config, LmSensorsProbe, ProbeError, TemperatureProbe, ThermalZoneProbe};
pub use server::{HandlerContext, SensorServer, ServerError};
