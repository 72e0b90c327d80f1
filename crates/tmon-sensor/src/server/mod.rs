//! TCP server for the sensor node.
//!
//! The server:
//! - Listens on a TCP port with address reuse enabled
//! - Spawns a `RequestHandler` task for each accepted connection
//! - Caps concurrently served connections with a semaphore
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  SensorServer   │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept() (one permit per connection)
//!         ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ RequestHandler  │────▶│ TemperatureProbe │
//! │   (per client)  │     │                  │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, HandlerContext, Outcome, RequestHandler};

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tmon_core::SensorConfig;

use crate::probe::TemperatureProbe;

/// Pending-connection backlog passed to `listen(2)`.
const LISTEN_BACKLOG: u32 = 128;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server answering `hostname` and `temperature` requests.
pub struct SensorServer {
    /// Bound listening socket
    listener: TcpListener,

    /// Address the listener is bound to
    local_addr: SocketAddr,

    /// Immutable state shared by every handler
    context: Arc<HandlerContext>,

    /// Limits concurrently served connections
    limiter: Arc<Semaphore>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter used to tag handler logs
    connection_counter: AtomicU64,
}

impl SensorServer {
    /// Binds a listening socket at `addr`.
    ///
    /// `SO_REUSEADDR` is set so a restarted sensor can rebind immediately.
    /// Binding port 0 picks an ephemeral port; see [`Self::local_addr`].
    pub fn bind(
        addr: SocketAddr,
        context: HandlerContext,
        max_connections: usize,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let bind_error = |source| ServerError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            listener,
            local_addr,
            context: Arc::new(context),
            limiter: Arc::new(Semaphore::new(max_connections.max(1))),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Binds on all interfaces at the configured port with the configured probe.
    pub fn from_config(
        config: &SensorConfig,
        probe: Arc<dyn TemperatureProbe>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let context = HandlerContext::new(config.hostname.clone(), probe)
            .with_io_timeout(config.io_timeout())
            .with_probe_timeout(config.probe_timeout());
        Self::bind(addr, context, config.max_connections, cancel_token)
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop.
    ///
    /// A permit is taken before each accept, so once `max_connections`
    /// handlers are in flight new connections wait in the backlog.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr,
            hostname = %self.context.hostname(),
            probe = %self.context.probe_description(),
            max_connections = self.limiter.available_permits(),
            "Sensor server listening"
        );

        loop {
            let permit = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                permit = Arc::clone(&self.limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("Connection limiter closed");
                        break;
                    }
                },
            };

            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num, permit);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                            sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        info!(
            served = self.connection_counter.load(Ordering::Relaxed),
            "Sensor server stopped"
        );
        Ok(())
    }

    /// Spawns a handler task; the permit is released when it finishes.
    fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        connection_number: u64,
        permit: OwnedSemaphorePermit,
    ) {
        let context = Arc::clone(&self.context);

        tokio::spawn(async move {
            let handler = RequestHandler::new(stream, peer, context, connection_number);
            handler.run().await;
            drop(permit);
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
