//! Sensor client for the monitor node.
//!
//! Every request uses a fresh TCP connection:
//! - Connect (with a connect deadline)
//! - Write the command bytes
//! - Read the reply until EOF or until `MAX_PAYLOAD` bytes arrived
//! - Close
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use tmon_core::{Celsius, MonitorConfig};
use tmon_protocol::{decode_hostname, decode_temperature, Command, ProtocolError, MAX_PAYLOAD};

// ============================================================================
// Configuration
// ============================================================================

/// Deadlines applied to every sensor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,

    /// Deadline for writing the command and for reading the reply.
    pub io_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&MonitorConfig> for ClientConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by sensor requests.
///
/// None of these are fatal to the monitor; the poll loop marks the
/// affected sensor stale and keeps going.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection was refused, reset or unreachable.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A connect, write or read did not finish in time.
    #[error("timed out after {timeout:?} {stage} {addr}")]
    Timeout {
        addr: SocketAddr,
        stage: &'static str,
        timeout: Duration,
    },

    /// The connection failed after it was established.
    #[error("I/O error talking to {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The reply could not be decoded.
    #[error("malformed {command} reply from {addr}: {source}")]
    Malformed {
        addr: SocketAddr,
        command: Command,
        #[source]
        source: ProtocolError,
    },
}

impl ClientError {
    /// Returns the sensor address the failed request was sent to.
    pub fn addr(&self) -> SocketAddr {
        match self {
            Self::Connect { addr, .. }
            | Self::Timeout { addr, .. }
            | Self::Io { addr, .. }
            | Self::Malformed { addr, .. } => *addr,
        }
    }
}

// ============================================================================
// Sensor Client
// ============================================================================

/// Stateless client for the sensor protocol.
///
/// Cheap to clone; poll tasks each take their own copy.
#[derive(Debug, Clone, Default)]
pub struct SensorClient {
    config: ClientConfig,
}

impl SensorClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Asks a sensor for its advertised hostname.
    pub async fn get_hostname(&self, address: IpAddr, port: u16) -> Result<String, ClientError> {
        let reply = self.request(address, port, Command::Hostname).await?;
        decode_hostname(&reply).map_err(|source| ClientError::Malformed {
            addr: SocketAddr::new(address, port),
            command: Command::Hostname,
            source,
        })
    }

    /// Asks a sensor for a fresh temperature reading.
    ///
    /// An empty reply (the sensor could not read its probe) is `Malformed`.
    pub async fn get_temperature(&self, address: IpAddr, port: u16) -> Result<Celsius, ClientError> {
        let reply = self.request(address, port, Command::Temperature).await?;
        decode_temperature(&reply).map_err(|source| ClientError::Malformed {
            addr: SocketAddr::new(address, port),
            command: Command::Temperature,
            source,
        })
    }

    /// Performs one request on a new connection and returns the raw reply.
    async fn request(&self, address: IpAddr, port: u16, command: Command) -> Result<Vec<u8>, ClientError> {
        let addr = SocketAddr::new(address, port);
        let ClientConfig {
            connect_timeout,
            io_timeout,
        } = self.config;

        let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout {
                addr,
                stage: "connecting to",
                timeout: connect_timeout,
            })?
            .map_err(|source| ClientError::Connect { addr, source })?;

        timeout(io_timeout, stream.write_all(command.as_bytes()))
            .await
            .map_err(|_| ClientError::Timeout {
                addr,
                stage: "sending to",
                timeout: io_timeout,
            })?
            .map_err(|source| ClientError::Io { addr, source })?;

        let mut reply = Vec::with_capacity(64);
        timeout(io_timeout, stream.take(MAX_PAYLOAD as u64).read_to_end(&mut reply))
            .await
            .map_err(|_| ClientError::Timeout {
                addr,
                stage: "awaiting reply from",
                timeout: io_timeout,
            })?
            .map_err(|source| ClientError::Io { addr, source })?;

        trace!(%addr, %command, bytes = reply.len(), "Reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn fast_client() -> SensorClient {
        SensorClient::new(ClientConfig {
            connect_timeout: Duration::from_millis(500),
            io_timeout: Duration::from_millis(300),
        })
    }

    /// Accepts one connection, records the request and writes `reply`.
    async fn one_shot_server(reply: Vec<u8>) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; MAX_PAYLOAD];
            let n = stream.read(&mut request).await.unwrap();
            request.truncate(n);
            stream.write_all(&reply).await.unwrap();
            request
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_hostname_request() {
        let (port, server) = one_shot_server(b"kitchen".to_vec()).await;
        let hostname = fast_client().get_hostname(LOCALHOST, port).await.unwrap();
        assert_eq!(hostname, "kitchen");
        assert_eq!(server.await.unwrap(), b"hostname");
    }

    #[tokio::test]
    async fn test_temperature_request() {
        let (port, server) = one_shot_server(b"23".to_vec()).await;
        let value = fast_client().get_temperature(LOCALHOST, port).await.unwrap();
        assert_eq!(value, Celsius(23));
        assert_eq!(server.await.unwrap(), b"temperature");
    }

    #[tokio::test]
    async fn test_empty_temperature_reply_is_malformed() {
        let (port, _server) = one_shot_server(Vec::new()).await;
        let err = fast_client().get_temperature(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Malformed {
                source: ProtocolError::Empty,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_numeric_temperature_is_malformed() {
        let (port, _server) = one_shot_server(b"warm".to_vec()).await;
        let err = fast_client().get_temperature(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(err, ClientError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_non_utf8_hostname_is_malformed() {
        let (port, _server) = one_shot_server(vec![0xc3, 0x28]).await;
        let err = fast_client().get_hostname(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Malformed {
                source: ProtocolError::NotUtf8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reply_is_capped_at_buffer_size() {
        let (port, _server) = one_shot_server(vec![b'a'; MAX_PAYLOAD * 2]).await;
        let hostname = fast_client().get_hostname(LOCALHOST, port).await.unwrap();
        assert_eq!(hostname.len(), MAX_PAYLOAD);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = fast_client().get_temperature(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert_eq!(err.addr(), SocketAddr::new(LOCALHOST, port));
    }

    #[tokio::test]
    async fn test_silent_sensor_times_out() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let err = fast_client().get_temperature(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Timeout {
                stage: "awaiting reply from",
                ..
            }
        ));
    }

    #[test]
    fn test_config_from_monitor_config() {
        let mut monitor = MonitorConfig::with_port(5005);
        monitor.connect_timeout_ms = 250;
        monitor.io_timeout_ms = 750;

        let config = ClientConfig::from(&monitor);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.io_timeout, Duration::from_millis(750));
    }
}
