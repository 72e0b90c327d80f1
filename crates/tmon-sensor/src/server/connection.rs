//! Handler for a single accepted connection.
//!
//! Each connection carries exactly one request:
//! - Reads once, up to `MAX_PAYLOAD` bytes
//! - Dispatches `hostname` or `temperature`
//! - Writes one reply and closes
//!
//! Unknown or undecodable requests get no reply. Peer resets, timeouts and
//! probe failures end the connection quietly; they are logged here and
//! never reported to the accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use tmon_core::Celsius;
use tmon_protocol::{encode_hostname, encode_temperature, Command, ProtocolError, MAX_PAYLOAD};

use crate::probe::{ProbeError, TemperatureProbe};

/// Default deadline for a single read or write.
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a single temperature acquisition.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable state shared by all handlers of one server.
pub struct HandlerContext {
    hostname: String,
    probe: Arc<dyn TemperatureProbe>,
    io_timeout: Duration,
    probe_timeout: Duration,
}

impl HandlerContext {
    pub fn new(hostname: impl Into<String>, probe: Arc<dyn TemperatureProbe>) -> Self {
        Self {
            hostname: hostname.into(),
            probe,
            io_timeout: DEFAULT_IO_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn probe_description(&self) -> String {
        self.probe.describe()
    }
}

/// What happened on a connection that ended without an I/O failure.
#[derive(Debug)]
pub enum Outcome {
    /// A reply was written for this command.
    Replied(Command),

    /// The request was not a command; nothing was written.
    Ignored(ProtocolError),

    /// The probe failed; nothing was written.
    ProbeFailed(ProbeError),
}

/// I/O failures while serving a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("peer reset the connection")]
    PeerReset,

    #[error("timed out after {0:?} while {1}")]
    Timeout(Duration, &'static str),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::PeerReset,
            _ => Self::Io(e),
        }
    }
}

/// One-shot request handler.
pub struct RequestHandler {
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<HandlerContext>,
    connection_number: u64,
}

impl RequestHandler {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        context: Arc<HandlerContext>,
        connection_number: u64,
    ) -> Self {
        Self {
            stream,
            peer,
            context,
            connection_number,
        }
    }

    /// Serves the connection and logs how it ended.
    pub async fn run(mut self) {
        let peer = self.peer;
        let connection = self.connection_number;

        match self.serve().await {
            Ok(Outcome::Replied(command)) => {
                info!(%peer, connection, %command, "Request served");
            }
            Ok(Outcome::Ignored(reason)) => {
                debug!(%peer, connection, reason = %reason, "Ignoring request");
            }
            Ok(Outcome::ProbeFailed(e)) => {
                warn!(%peer, connection, error = %e, "Temperature unavailable, closing without reply");
            }
            Err(e) => {
                debug!(%peer, connection, error = %e, "Connection dropped");
            }
        }
    }

    /// Reads one request, writes at most one reply, and closes the write side.
    pub async fn serve(&mut self) -> Result<Outcome, ConnectionError> {
        let io_timeout = self.context.io_timeout;

        let mut buf = [0u8; MAX_PAYLOAD];
        let n = timeout(io_timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| ConnectionError::Timeout(io_timeout, "reading request"))??;

        let command = match Command::parse(buf.get(..n).unwrap_or_default()) {
            Ok(command) => command,
            Err(reason) => return Ok(Outcome::Ignored(reason)),
        };

        let reply = match command {
            Command::Hostname => encode_hostname(&self.context.hostname),
            Command::Temperature => match self.read_temperature().await {
                Ok(value) => encode_temperature(value),
                Err(e) => return Ok(Outcome::ProbeFailed(e)),
            },
        };

        timeout(io_timeout, async {
            self.stream.write_all(&reply).await?;
            self.stream.shutdown().await
        })
        .await
        .map_err(|_| ConnectionError::Timeout(io_timeout, "writing reply"))??;

        Ok(Outcome::Replied(command))
    }

    async fn read_temperature(&self) -> Result<Celsius, ProbeError> {
        let probe_timeout = self.context.probe_timeout;
        timeout(probe_timeout, self.context.probe.read_temperature())
            .await
            .map_err(|_| ProbeError::Timeout(probe_timeout))?
    }
}
