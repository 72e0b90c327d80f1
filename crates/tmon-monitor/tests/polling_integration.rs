//! Integration tests for discovery and polling against real sensor servers.
//!
//! Each test runs `tmon_sensor::SensorServer`s on distinct loopback
//! addresses that share one port, so a subnet scan behaves as it would on a
//! LAN. Every test uses its own /29 of 127.0.0.0/8.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![cfg(target_os = "linux")]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tmon_core::{Celsius, MonitorConfig, Sensor, SensorStatus};
use tmon_monitor::{
    DiscoveryError, DiscoveryService, NetworkScanner, PollingLoop, Reporter, Subnet,
    TcpConnectScanner,
};
use tmon_sensor::{HandlerContext, ProbeError, SensorServer, TemperatureProbe};

// ============================================================================
// Test Probes
// ============================================================================

struct FixedProbe(i32);

#[async_trait]
impl TemperatureProbe for FixedProbe {
    async fn read_temperature(&self) -> Result<Celsius, ProbeError> {
        Ok(Celsius(self.0))
    }

    fn describe(&self) -> String {
        format!("fixed {}", self.0)
    }
}

struct BrokenProbe;

#[async_trait]
impl TemperatureProbe for BrokenProbe {
    async fn read_temperature(&self) -> Result<Celsius, ProbeError> {
        Err(ProbeError::NoInput {
            sensor_id: "temp1".to_string(),
        })
    }

    fn describe(&self) -> String {
        "broken".to_string()
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn loopback(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
}

/// A sensor node running on a loopback address.
struct TestSensor {
    port: u16,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestSensor {
    async fn spawn(address: IpAddr, port: u16, hostname: &str, probe: Arc<dyn TemperatureProbe>) -> Self {
        let cancel_token = CancellationToken::new();
        let server = SensorServer::bind(
            SocketAddr::new(address, port),
            HandlerContext::new(hostname, probe),
            16,
            cancel_token.clone(),
        )
        .expect("bind test sensor");
        let port = server.local_addr().port();

        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestSensor {
            port,
            cancel_token,
            task,
        }
    }

    /// Stops the server and waits until its listener is closed.
    async fn stop(self) {
        self.cancel_token.cancel();
        self.task.await.unwrap();
    }
}

/// Spawns one fixed-reading sensor per `(address, hostname, reading)` on a shared port.
async fn spawn_sensors(nodes: &[(u8, &str, i32)]) -> Vec<TestSensor> {
    let mut sensors: Vec<TestSensor> = Vec::new();
    for &(last, hostname, reading) in nodes {
        let port = sensors.first().map(|s| s.port).unwrap_or(0);
        let probe: Arc<dyn TemperatureProbe> = Arc::new(FixedProbe(reading));
        sensors.push(TestSensor::spawn(loopback(last), port, hostname, probe).await);
    }
    sensors
}

/// Snapshots shared with the test body.
#[derive(Clone, Default)]
struct RecordingReporter {
    rounds: Arc<Mutex<Vec<(u64, Vec<Sensor>)>>>,
}

impl RecordingReporter {
    fn snapshots(&self) -> Vec<(u64, Vec<Sensor>)> {
        self.rounds.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&mut self, round: u64, sensors: &[Sensor]) -> std::io::Result<()> {
        self.rounds.lock().unwrap().push((round, sensors.to_vec()));
        Ok(())
    }
}

/// Scanner that returns a scripted list of results, one per scan.
struct ScriptedScanner {
    results: Mutex<Vec<Vec<IpAddr>>>,
}

#[async_trait]
impl NetworkScanner for ScriptedScanner {
    async fn scan(&self, _subnet: &Subnet, _port: u16) -> Result<Vec<IpAddr>, DiscoveryError> {
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(results.remove(0))
        }
    }
}

fn monitor_config(port: u16) -> MonitorConfig {
    let mut config = MonitorConfig::with_port(port);
    config.connect_timeout_ms = 500;
    config.io_timeout_ms = 1_000;
    config.scan_timeout_ms = 200;
    config
}

fn scanning_poller(
    subnet: &str,
    port: u16,
    reporter: RecordingReporter,
    cancel_token: CancellationToken,
) -> PollingLoop<RecordingReporter> {
    let mut config = monitor_config(port);
    config.subnet = Some(subnet.to_string());
    let discovery = DiscoveryService::from_config(&config).unwrap();
    PollingLoop::new(&config, discovery, reporter, cancel_token)
}

// ============================================================================
// Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_discovery_finds_exactly_the_open_hosts() {
    let sensors = spawn_sensors(&[
        (19, "attic", 30),
        (18, "kitchen", 23),
    ])
    .await;
    let port = sensors[0].port;

    let scanner = TcpConnectScanner::new(Duration::from_millis(200), 8);
    let subnet: Subnet = "127.0.0.16/29".parse().unwrap();
    let found = scanner.scan(&subnet, port).await.unwrap();

    assert_eq!(found, vec![loopback(18), loopback(19)]);
}

#[tokio::test]
async fn test_discover_registers_and_names_sensors() {
    let sensors = spawn_sensors(&[
        (10, "kitchen", 23),
        (12, "garage", 8),
    ])
    .await;
    let port = sensors[0].port;

    let mut poller = scanning_poller(
        "127.0.0.8/29",
        port,
        RecordingReporter::default(),
        CancellationToken::new(),
    );
    assert_eq!(poller.discover().await, 2);

    let registry = poller.registry();
    assert_eq!(registry.addresses(), vec![loopback(10), loopback(12)]);
    assert_eq!(registry.get(loopback(10)).unwrap().hostname, "kitchen");
    assert_eq!(registry.get(loopback(12)).unwrap().hostname, "garage");
    assert!(registry
        .all()
        .iter()
        .all(|s| s.status == SensorStatus::Unpolled && s.temperature == Celsius(0)));

    // A second scan finds nothing new and keeps one entry per address
    assert_eq!(poller.discover().await, 0);
    assert_eq!(poller.registry().len(), 2);
}

// ============================================================================
// Polling Tests
// ============================================================================

#[tokio::test]
async fn test_refused_sensor_goes_stale_without_disturbing_others() {
    let mut sensors = spawn_sensors(&[
        (26, "kitchen", 23),
        (27, "garage", 8),
        (28, "attic", 31),
    ])
    .await;
    let port = sensors[0].port;

    let reporter = RecordingReporter::default();
    let mut poller = scanning_poller("127.0.0.24/29", port, reporter.clone(), CancellationToken::new());
    assert_eq!(poller.discover().await, 3);

    poller.poll_round().await;
    assert!(poller.registry().all().iter().all(|s| s.status.is_fresh()));

    // Take the garage sensor offline
    sensors.remove(1).stop().await;
    poller.poll_round().await;

    let registry = poller.registry();
    let garage = registry.get(loopback(27)).unwrap();
    assert_eq!(garage.status, SensorStatus::Stale { failures: 1 });
    assert_eq!(garage.temperature, Celsius(8));
    assert_eq!(registry.get(loopback(26)).unwrap().temperature, Celsius(23));
    assert!(registry.get(loopback(26)).unwrap().status.is_fresh());
    assert_eq!(registry.get(loopback(28)).unwrap().temperature, Celsius(31));
    assert!(registry.get(loopback(28)).unwrap().status.is_fresh());

    // Each report is a complete snapshot in registry order
    let snapshots = reporter.snapshots();
    assert_eq!(snapshots.len(), 2);
    let (round, last) = &snapshots[1];
    assert_eq!(*round, 2);
    let hostnames: Vec<_> = last.iter().map(|s| s.hostname.as_str()).collect();
    assert_eq!(hostnames, vec!["kitchen", "garage", "attic"]);
    assert!(!last[1].status.is_fresh());
}

#[tokio::test]
async fn test_probe_failure_marks_sensor_stale() {
    let sensor = TestSensor::spawn(loopback(34), 0, "cellar", Arc::new(BrokenProbe)).await;
    let port = sensor.port;

    let mut poller = scanning_poller(
        "127.0.0.32/29",
        port,
        RecordingReporter::default(),
        CancellationToken::new(),
    );
    poller.discover().await;
    poller.poll_round().await;
    poller.poll_round().await;

    let cellar = poller.registry().get(loopback(34)).unwrap();
    assert_eq!(cellar.hostname, "cellar");
    assert_eq!(cellar.temperature, Celsius(0));
    assert_eq!(cellar.status, SensorStatus::Stale { failures: 2 });
    assert!(cellar.last_updated.is_none());
}

#[tokio::test]
async fn test_rediscovery_reconciles_registry() {
    let sensors = spawn_sensors(&[
        (42, "kitchen", 23),
        (43, "garage", 8),
    ])
    .await;
    let port = sensors[0].port;

    let scanner = ScriptedScanner {
        results: Mutex::new(vec![vec![loopback(42)], vec![loopback(43)]]),
    };
    let subnet: Subnet = "127.0.0.40/29".parse().unwrap();
    let discovery = DiscoveryService::new(Arc::new(scanner), Some(subnet), port);
    let mut poller = PollingLoop::new(
        &monitor_config(port),
        discovery,
        RecordingReporter::default(),
        CancellationToken::new(),
    );

    assert_eq!(poller.discover().await, 1);
    poller.poll_round().await;
    assert_eq!(poller.discover().await, 1);
    poller.poll_round().await;

    let registry = poller.registry();
    assert_eq!(registry.addresses(), vec![loopback(42), loopback(43)]);

    let kitchen = registry.get(loopback(42)).unwrap();
    assert_eq!(kitchen.status, SensorStatus::Vanished);
    assert_eq!(kitchen.temperature, Celsius(23));

    let garage = registry.get(loopback(43)).unwrap();
    assert_eq!(garage.hostname, "garage");
    assert!(garage.status.is_fresh());
    assert_eq!(garage.temperature, Celsius(8));
}

#[tokio::test]
async fn test_run_polls_until_cancelled() {
    let sensors = spawn_sensors(&[(50, "kitchen", 23)]).await;
    let port = sensors[0].port;

    let cancel = CancellationToken::new();
    let reporter = RecordingReporter::default();
    let mut poller = scanning_poller("127.0.0.48/29", port, reporter.clone(), cancel.clone())
        .with_poll_interval(Duration::from_millis(50));

    let stopper = {
        let reporter = reporter.clone();
        tokio::spawn(async move {
            while reporter.snapshots().len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            cancel.cancel();
        })
    };

    tokio::time::timeout(Duration::from_secs(10), poller.run())
        .await
        .expect("poll loop did not stop after cancellation");
    stopper.await.unwrap();

    let snapshots = reporter.snapshots();
    assert!(snapshots.len() >= 3);
    for (index, (round, sensors)) in snapshots.iter().enumerate() {
        assert_eq!(*round, index as u64 + 1);
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].to_string(), "kitchen (127.0.0.50) : 23 °C");
    }
}
