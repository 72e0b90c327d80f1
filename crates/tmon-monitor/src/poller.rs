//! Polling loop - discovery followed by periodic poll rounds.
//!
//! ```text
//! ┌─────────────┐      ┌──────────────────────────────────────────┐
//! │ Discovering │─────▶│ Polling (every poll_interval)            │
//! └─────────────┘      │  fan out ≤ max_in_flight requests        │
//!        ▲             │  join, apply in registry order, report   │
//!        │             └───────────────────┬──────────────────────┘
//!        └──── every rediscover_every rounds (when enabled) ─┘
//! ```
//!
//! The loop owns the registry. Results are applied only after every request
//! of a round has finished, so each report is a consistent snapshot.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Request failures mark the sensor stale and never end the loop

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tmon_core::MonitorConfig;

use crate::client::{ClientConfig, ClientError, SensorClient};
use crate::discovery::DiscoveryService;
use crate::registry::SensorRegistry;
use crate::report::Reporter;

/// Drives discovery and poll rounds until cancelled.
pub struct PollingLoop<R> {
    registry: SensorRegistry,
    client: SensorClient,
    discovery: DiscoveryService,
    reporter: R,
    poll_interval: Duration,
    max_in_flight: usize,
    rediscover_every: u32,
    round: u64,
    cancel_token: CancellationToken,
}

impl<R: Reporter> PollingLoop<R> {
    pub fn new(
        config: &MonitorConfig,
        discovery: DiscoveryService,
        reporter: R,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            registry: SensorRegistry::new(),
            client: SensorClient::new(ClientConfig::from(config)),
            discovery,
            reporter,
            poll_interval: config.poll_interval(),
            max_in_flight: config.max_in_flight.max(1),
            rediscover_every: config.rediscover_every,
            round: 0,
            cancel_token,
        }
    }

    /// Overrides the round period (the config only allows whole seconds).
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Number of completed poll rounds.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Runs discovery, then polls every `poll_interval` until cancelled.
    pub async fn run(&mut self) {
        let cancel = self.cancel_token.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Shutdown requested during discovery");
                return;
            }
            _ = self.discover() => {}
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.rediscovery_due() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.discover() => {}
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.poll_round() => {}
            }
        }

        info!(rounds = self.round, sensors = self.registry.len(), "Polling stopped");
    }

    fn rediscovery_due(&self) -> bool {
        self.rediscover_every > 0
            && self.round > 0
            && self.round % u64::from(self.rediscover_every) == 0
    }

    /// Scans for sensors, reconciles the registry and fetches the hostnames
    /// of newly found sensors.
    ///
    /// Returns the number of sensors added.
    pub async fn discover(&mut self) -> usize {
        let result = self.discovery.discover().await;
        let port = self.discovery.port();
        let summary = self.registry.reconcile(&result.addresses, port);

        if summary.added.is_empty() {
            if self.registry.is_empty() {
                warn!("No sensors found");
            }
            return 0;
        }

        let targets: Vec<(IpAddr, u16)> = summary.added.iter().map(|&address| (address, port)).collect();
        let mut hostnames = self
            .fan_out(&targets, |client, address, port| async move {
                client.get_hostname(address, port).await
            })
            .await;

        for &address in &summary.added {
            match hostnames.remove(&address) {
                Some(Ok(hostname)) => {
                    info!(%address, %hostname, "Sensor identified");
                    if let Err(e) = self.registry.set_hostname(address, hostname) {
                        warn!(error = %e, "Failed to store hostname");
                    }
                }
                Some(Err(e)) => {
                    warn!(%address, error = %e, "Hostname request failed, leaving it empty");
                }
                None => {
                    warn!(%address, "Hostname request did not complete");
                }
            }
        }

        summary.added.len()
    }

    /// Polls every pollable sensor once and reports the result.
    pub async fn poll_round(&mut self) {
        let targets = self.registry.poll_targets();
        let mut readings = self
            .fan_out(&targets, |client, address, port| async move {
                client.get_temperature(address, port).await
            })
            .await;

        let mut failed = 0usize;
        for &(address, _) in &targets {
            let applied = match readings.remove(&address) {
                Some(Ok(value)) => {
                    debug!(%address, %value, "Temperature read");
                    self.registry.update_temperature(address, value)
                }
                Some(Err(e)) => {
                    failed += 1;
                    warn!(%address, error = %e, "Poll failed, keeping last value");
                    self.registry.mark_stale(address).map(|_| ())
                }
                None => {
                    failed += 1;
                    warn!(%address, "Poll did not complete, keeping last value");
                    self.registry.mark_stale(address).map(|_| ())
                }
            };
            if let Err(e) = applied {
                warn!(error = %e, "Failed to apply poll result");
            }
        }

        self.round += 1;
        debug!(round = self.round, polled = targets.len(), failed, "Poll round complete");

        if let Err(e) = self.reporter.report(self.round, self.registry.all()) {
            warn!(error = %e, "Failed to write report");
        }
    }

    /// Runs `request` against every target with at most `max_in_flight`
    /// in flight, and collects the results by address.
    async fn fan_out<T, F, Fut>(
        &self,
        targets: &[(IpAddr, u16)],
        request: F,
    ) -> HashMap<IpAddr, Result<T, ClientError>>
    where
        T: Send + 'static,
        F: Fn(SensorClient, IpAddr, u16) -> Fut,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut requests = JoinSet::new();

        for &(address, port) in targets {
            let limiter = Arc::clone(&limiter);
            let pending = request(self.client.clone(), address, port);
            requests.spawn(async move {
                let _permit = limiter.acquire_owned().await;
                (address, pending.await)
            });
        }

        let mut results = HashMap::with_capacity(targets.len());
        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((address, result)) => {
                    results.insert(address, result);
                }
                Err(e) => warn!(error = %e, "Sensor request task failed"),
            }
        }
        results
    }
}
