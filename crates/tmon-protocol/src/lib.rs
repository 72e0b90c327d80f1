//! tmon Protocol - Wire protocol between monitor and sensor nodes
//!
//! The protocol is unframed plain text over a one-shot TCP connection:
//! the client sends a single command, the sensor writes a single reply
//! and closes the connection.
//!
//! | Direction | Payload | Meaning |
//! |---|---|---|
//! | monitor → sensor | `hostname` | request identity |
//! | sensor → monitor | UTF-8 hostname | reply |
//! | monitor → sensor | `temperature` | request reading |
//! | sensor → monitor | decimal digits, optionally signed | integer Celsius |
//!
//! Payloads on both sides fit in [`MAX_PAYLOAD`] bytes.

pub mod command;
pub mod reply;

pub use command::Command;
pub use reply::{decode_hostname, decode_temperature, encode_hostname, encode_temperature};

use thiserror::Error;

/// Size of the receive buffer on both ends of a connection.
pub const MAX_PAYLOAD: usize = 2048;

/// Errors produced while decoding requests or replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Nothing was received before the peer closed.
    #[error("empty payload")]
    Empty,

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// The request is not a known command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// A temperature reply is not a decimal integer.
    #[error("invalid temperature reply: {0:?}")]
    InvalidTemperature(String),
}
