//! Sensor registry - owns every sensor known to the monitor.
//!
//! The registry is owned by the polling loop and mutated only between
//! rounds, so it needs no locking.
//!
//! # Storage
//!
//! - `sensors`: insertion-ordered storage (registry order is report order)
//! - `index`: address → position, for O(1) lookups by address
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Index lookups go through `get`/`get_mut`

use std::collections::HashMap;
use std::net::IpAddr;

use thiserror::Error;
use tracing::{debug, info};

use tmon_core::{Celsius, Sensor, SensorStatus};

/// Errors that can occur in registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no sensor registered at {0}")]
    UnknownSensor(IpAddr),
}

/// Changes made by [`SensorRegistry::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Addresses registered for the first time
    pub added: Vec<IpAddr>,

    /// Previously vanished sensors found again
    pub returned: Vec<IpAddr>,

    /// Sensors missing from the scan
    pub vanished: Vec<IpAddr>,
}

impl ReconcileSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.returned.is_empty() && self.vanished.is_empty()
    }
}

/// Ordered set of sensors keyed by address.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: Vec<Sensor>,
    index: HashMap<IpAddr, usize>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sensor, or returns the existing one for a known address.
    ///
    /// New sensors start with an empty hostname, a zero temperature and
    /// status `Unpolled`.
    pub fn register(&mut self, address: IpAddr, port: u16) -> Sensor {
        if let Some(existing) = self.get(address) {
            debug!(%address, "Sensor already registered");
            return existing.clone();
        }

        let sensor = Sensor::new(address, port);
        self.index.insert(address, self.sensors.len());
        self.sensors.push(sensor.clone());
        info!(%address, port, total = self.sensors.len(), "Sensor registered");
        sensor
    }

    /// Returns every sensor in registration order.
    pub fn all(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn get(&self, address: IpAddr) -> Option<&Sensor> {
        self.index
            .get(&address)
            .and_then(|&position| self.sensors.get(position))
    }

    /// Returns every registered address in registration order.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.sensors.iter().map(|sensor| sensor.address).collect()
    }

    /// Returns `(address, port)` of every sensor that takes part in poll rounds.
    pub fn poll_targets(&self) -> Vec<(IpAddr, u16)> {
        self.sensors
            .iter()
            .filter(|sensor| sensor.status.is_pollable())
            .map(|sensor| (sensor.address, sensor.port))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Stores a successful reading and marks the sensor fresh.
    pub fn update_temperature(&mut self, address: IpAddr, value: Celsius) -> Result<(), RegistryError> {
        self.sensor_mut(address)?.record_reading(value);
        Ok(())
    }

    pub fn set_hostname(&mut self, address: IpAddr, hostname: impl Into<String>) -> Result<(), RegistryError> {
        self.sensor_mut(address)?.hostname = hostname.into();
        Ok(())
    }

    /// Records a failed poll, keeping the last temperature.
    ///
    /// Returns the number of consecutive failures.
    pub fn mark_stale(&mut self, address: IpAddr) -> Result<u32, RegistryError> {
        let sensor = self.sensor_mut(address)?;
        sensor.record_failure();
        Ok(match sensor.status {
            SensorStatus::Stale { failures } => failures,
            _ => 0,
        })
    }

    /// Brings the registry in line with a fresh discovery scan.
    ///
    /// New addresses are registered, sensors missing from `found` are marked
    /// vanished and stop being polled, and vanished sensors that show up
    /// again resume polling with their last known values.
    pub fn reconcile(&mut self, found: &[IpAddr], port: u16) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for sensor in &mut self.sensors {
            let present = found.contains(&sensor.address);
            match (present, sensor.status) {
                (true, SensorStatus::Vanished) => {
                    sensor.status = if sensor.last_updated.is_some() {
                        SensorStatus::Stale { failures: 0 }
                    } else {
                        SensorStatus::Unpolled
                    };
                    summary.returned.push(sensor.address);
                }
                (false, SensorStatus::Vanished) | (true, _) => {}
                (false, _) => {
                    sensor.status = SensorStatus::Vanished;
                    summary.vanished.push(sensor.address);
                }
            }
        }

        for &address in found {
            if !self.index.contains_key(&address) {
                self.register(address, port);
                summary.added.push(address);
            }
        }

        if !summary.is_unchanged() {
            info!(
                added = summary.added.len(),
                returned = summary.returned.len(),
                vanished = summary.vanished.len(),
                "Registry reconciled"
            );
        }

        summary
    }

    fn sensor_mut(&mut self, address: IpAddr) -> Result<&mut Sensor, RegistryError> {
        self.index
            .get(&address)
            .and_then(|&position| self.sensors.get_mut(position))
            .ok_or(RegistryError::UnknownSensor(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const PORT: u16 = 5005;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_register_new_sensor() {
        let mut registry = SensorRegistry::new();
        let sensor = registry.register(addr(10), PORT);

        assert_eq!(sensor.address, addr(10));
        assert_eq!(sensor.hostname, "");
        assert_eq!(sensor.temperature, Celsius(0));
        assert_eq!(sensor.status, SensorStatus::Unpolled);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_keeps_one_entry() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.update_temperature(addr(10), Celsius(19)).unwrap();

        let sensor = registry.register(addr(10), PORT);
        assert_eq!(sensor.temperature, Celsius(19));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_all_preserves_insertion_order() {
        let mut registry = SensorRegistry::new();
        for last in [30, 10, 20] {
            registry.register(addr(last), PORT);
        }
        registry.update_temperature(addr(10), Celsius(1)).unwrap();

        assert_eq!(registry.addresses(), vec![addr(30), addr(10), addr(20)]);
    }

    #[test]
    fn test_update_temperature_marks_fresh() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.update_temperature(addr(10), Celsius(23)).unwrap();

        let sensor = registry.get(addr(10)).unwrap();
        assert_eq!(sensor.temperature, Celsius(23));
        assert!(sensor.status.is_fresh());
        assert!(sensor.last_updated.is_some());
    }

    #[test]
    fn test_unknown_sensor_errors() {
        let mut registry = SensorRegistry::new();
        assert_eq!(
            registry.update_temperature(addr(99), Celsius(1)),
            Err(RegistryError::UnknownSensor(addr(99)))
        );
        assert_eq!(
            registry.set_hostname(addr(99), "ghost"),
            Err(RegistryError::UnknownSensor(addr(99)))
        );
        assert_eq!(
            registry.mark_stale(addr(99)),
            Err(RegistryError::UnknownSensor(addr(99)))
        );
        assert!(registry.get(addr(99)).is_none());
    }

    #[test]
    fn test_mark_stale_keeps_value_and_counts_failures() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.update_temperature(addr(10), Celsius(21)).unwrap();

        assert_eq!(registry.mark_stale(addr(10)), Ok(1));
        assert_eq!(registry.mark_stale(addr(10)), Ok(2));

        let sensor = registry.get(addr(10)).unwrap();
        assert_eq!(sensor.temperature, Celsius(21));
        assert_eq!(sensor.status, SensorStatus::Stale { failures: 2 });

        registry.update_temperature(addr(10), Celsius(22)).unwrap();
        assert!(registry.get(addr(10)).unwrap().status.is_fresh());
    }

    #[test]
    fn test_set_hostname() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.set_hostname(addr(10), "kitchen").unwrap();
        assert_eq!(registry.get(addr(10)).unwrap().hostname, "kitchen");
    }

    #[test]
    fn test_reconcile_adds_and_vanishes() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.register(addr(11), PORT);

        let summary = registry.reconcile(&[addr(11), addr(12)], PORT);

        assert_eq!(summary.added, vec![addr(12)]);
        assert_eq!(summary.vanished, vec![addr(10)]);
        assert!(summary.returned.is_empty());
        assert_eq!(registry.addresses(), vec![addr(10), addr(11), addr(12)]);
        assert_eq!(registry.get(addr(10)).unwrap().status, SensorStatus::Vanished);
        assert_eq!(
            registry.poll_targets(),
            vec![(addr(11), PORT), (addr(12), PORT)]
        );
    }

    #[test]
    fn test_reconcile_returning_sensor_resumes_polling() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        registry.update_temperature(addr(10), Celsius(18)).unwrap();

        registry.reconcile(&[], PORT);
        assert!(registry.poll_targets().is_empty());

        let summary = registry.reconcile(&[addr(10)], PORT);
        assert_eq!(summary.returned, vec![addr(10)]);

        let sensor = registry.get(addr(10)).unwrap();
        assert_eq!(sensor.temperature, Celsius(18));
        assert_eq!(sensor.status, SensorStatus::Stale { failures: 0 });
        assert_eq!(registry.poll_targets(), vec![(addr(10), PORT)]);
    }

    #[test]
    fn test_reconcile_same_set_is_unchanged() {
        let mut registry = SensorRegistry::new();
        registry.register(addr(10), PORT);
        assert!(registry.reconcile(&[addr(10)], PORT).is_unchanged());
    }
}
