//! Request commands.

use std::fmt;

use crate::ProtocolError;

/// A request sent by the monitor to a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask for the sensor's configured hostname.
    Hostname,

    /// Ask for a fresh temperature reading.
    Temperature,
}

impl Command {
    /// Returns the on-the-wire spelling of the command.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Temperature => "temperature",
        }
    }

    /// Returns the bytes written to the socket.
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Decodes a received request.
    ///
    /// Trailing ASCII whitespace is ignored so that line-oriented tools
    /// such as `nc` can be used against a sensor; anything else must match
    /// a command exactly.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
        let text = text.trim_end_matches(|c: char| c.is_ascii_whitespace());

        match text {
            "" => Err(ProtocolError::Empty),
            "hostname" => Ok(Self::Hostname),
            "temperature" => Ok(Self::Temperature),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
