//! Simulated device.
//!
//! Stands in for phone hardware on hosts that have none: it offers a small
//! reference catalog and produces synthetic readings on one background
//! thread per subscription, delivered through the registered handler just
//! like a real sensor callback would.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::RegistryError;
use crate::sensors::catalog::SensorCatalog;
use crate::sensors::registry::{LocationHandler, SampleHandler, SourceRegistry};
use crate::sensors::types::{
    LocationCapabilities, LocationSample, ReportingMode, SensorDescriptor, SensorSample,
};

/// Fastest rate the simulated hardware reports at.
const MIN_INTERVAL: Duration = Duration::from_millis(5);

/// On-change sensors report at most this often.
const ON_CHANGE_INTERVAL: Duration = Duration::from_millis(200);

/// GPS fix rate.
const LOCATION_INTERVAL: Duration = Duration::from_secs(1);

/// Reference position for synthetic fixes.
const ORIGIN_LAT: f64 = 33.6844;
const ORIGIN_LON: f64 = 73.0479;

/// A running producer thread and the channel that stops it.
struct Producer {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Producer {
    fn spawn<F>(name: String, period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new().name(name).spawn(move || {
            let mut n = 0u64;
            loop {
                tick(n);
                n += 1;
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;
        Ok(Self { stop, handle })
    }

    fn shutdown(self) {
        let _ = self.stop.try_send(());
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

/// A fake phone: catalog, source registry and location provider in one.
pub struct SimulatedDevice {
    sensors: Vec<SensorDescriptor>,
    capabilities: LocationCapabilities,
    epoch: Instant,
    producers: Mutex<HashMap<String, Producer>>,
    location: Mutex<Option<Producer>>,
}

impl SimulatedDevice {
    /// Device with the reference catalog and every location capability.
    pub fn new() -> Self {
        Self::with_capabilities(LocationCapabilities::all())
    }

    /// Device with the reference catalog and the given location capabilities.
    pub fn with_capabilities(capabilities: LocationCapabilities) -> Self {
        Self {
            sensors: reference_sensors(),
            capabilities,
            epoch: Instant::now(),
            producers: Mutex::new(HashMap::new()),
            location: Mutex::new(None),
        }
    }

    /// Optional location fields this device fills in.
    pub fn capabilities(&self) -> LocationCapabilities {
        self.capabilities
    }

    /// Type tags with a live producer.
    pub fn active_subscriptions(&self) -> Vec<String> {
        let mut active: Vec<String> = self.producers.lock().keys().cloned().collect();
        active.sort();
        active
    }

    pub fn is_location_active(&self) -> bool {
        self.location.lock().is_some()
    }

    fn period_for(descriptor: &SensorDescriptor, interval_micros: u32) -> Duration {
        let requested = Duration::from_micros(u64::from(interval_micros)).max(MIN_INTERVAL);
        match descriptor.reporting_mode {
            ReportingMode::Continuous => requested,
            _ => requested.max(ON_CHANGE_INTERVAL),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        for (_, producer) in self.producers.lock().drain() {
            producer.shutdown();
        }
        if let Some(producer) = self.location.lock().take() {
            producer.shutdown();
        }
    }
}

impl SensorCatalog for SimulatedDevice {
    fn all_sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors.clone()
    }
}

impl SourceRegistry for SimulatedDevice {
    fn subscribe(
        &self,
        descriptor: &SensorDescriptor,
        interval_micros: u32,
        on_sample: SampleHandler,
    ) -> Result<(), RegistryError> {
        let known = self
            .sensors
            .iter()
            .find(|s| s.matches_type(&descriptor.string_type))
            .ok_or_else(|| RegistryError::UnknownSensor(descriptor.string_type.clone()))?;

        let mut producers = self.producers.lock();
        if producers.contains_key(&known.string_type) {
            return Err(RegistryError::AlreadySubscribed(known.string_type.clone()));
        }

        let period = Self::period_for(known, interval_micros);
        let string_type = known.string_type.clone();
        let type_code = known.type_code;
        let epoch = self.epoch;

        let producer = Producer::spawn(format!("sim-{}", known.name), period, move |n| {
            let timestamp = epoch.elapsed().as_nanos() as i64;
            let sample = SensorSample::new(string_type.clone(), timestamp, synth_values(type_code, n));
            trace!(sensor = %string_type, n, "simulated sample");
            on_sample(sample);
        })
        .map_err(|e| RegistryError::Platform(e.to_string()))?;

        debug!(sensor = %known.string_type, ?period, "simulated sensor subscribed");
        producers.insert(known.string_type.clone(), producer);
        Ok(())
    }

    fn unsubscribe(&self, descriptor: &SensorDescriptor) {
        let removed = {
            let mut producers = self.producers.lock();
            let key = producers
                .keys()
                .find(|k| descriptor.matches_type(k))
                .cloned();
            key.and_then(|k| producers.remove(&k))
        };
        if let Some(producer) = removed {
            producer.shutdown();
            debug!(sensor = %descriptor.string_type, "simulated sensor unsubscribed");
        }
    }

    fn subscribe_location(&self, on_fix: LocationHandler) -> Result<(), RegistryError> {
        let mut location = self.location.lock();
        if location.is_some() {
            return Err(RegistryError::AlreadySubscribed("location".to_string()));
        }

        let capabilities = self.capabilities;
        let epoch = self.epoch;
        let producer = Producer::spawn("sim-gps".to_string(), LOCATION_INTERVAL, move |n| {
            let mut fix = synth_fix(n, epoch);
            capabilities.apply(&mut fix);
            on_fix(fix);
        })
        .map_err(|e| RegistryError::Platform(e.to_string()))?;

        debug!("simulated location subscribed");
        *location = Some(producer);
        Ok(())
    }

    fn unsubscribe_location(&self) {
        let removed = self.location.lock().take();
        if let Some(producer) = removed {
            producer.shutdown();
            debug!("simulated location unsubscribed");
        }
    }
}

fn synth_values(type_code: i32, n: u64) -> Vec<f32> {
    let t = n as f32 * 0.05;
    match type_code {
        // accelerometer
        1 => vec![0.2 * t.sin(), 0.2 * t.cos(), 9.81 + 0.05 * (2.0 * t).sin()],
        // magnetic field
        2 => vec![22.0 + t.sin(), -5.0 + t.cos(), -40.0],
        // gyroscope
        4 => vec![0.01 * t.cos(), 0.01 * t.sin(), 0.0],
        // light
        5 => vec![300.0 + 50.0 * (0.1 * t).sin()],
        // proximity
        8 => vec![if (n / 10) % 2 == 0 { 5.0 } else { 0.0 }],
        // significant motion
        17 => vec![1.0],
        _ => vec![0.0],
    }
}

fn synth_fix(n: u64, epoch: Instant) -> LocationSample {
    let step = n as f64 * 1e-5;
    LocationSample {
        longitude: ORIGIN_LON + step,
        latitude: ORIGIN_LAT + step * 0.5,
        altitude: 540.0,
        bearing: 63.4,
        accuracy: 4.5,
        speed: 1.2,
        time: Utc::now().timestamp_millis(),
        speed_accuracy_meters_per_second: Some(0.3),
        bearing_accuracy_degrees: Some(8.0),
        elapsed_realtime_nanos: Some(epoch.elapsed().as_nanos() as i64),
        vertical_accuracy_meters: Some(3.0),
        elapsed_realtime_age_millis: Some(0),
        elapsed_realtime_uncertainty_nanos: Some(1_000.0),
    }
}

#[allow(clippy::too_many_arguments)]
fn sensor(
    name: &str,
    string_type: &str,
    type_code: i32,
    mode: ReportingMode,
    maximum_range: f32,
    power: f32,
    resolution: f32,
    is_wake_up: bool,
) -> SensorDescriptor {
    SensorDescriptor {
        string_type: string_type.to_string(),
        name: name.to_string(),
        type_code,
        reporting_mode: mode,
        vendor: "Simulated".to_string(),
        power,
        resolution,
        maximum_range,
        min_delay: if mode == ReportingMode::Continuous { 5_000 } else { 0 },
        max_delay: if mode == ReportingMode::OneShot { 0 } else { 200_000 },
        is_wake_up,
    }
}

/// The catalog the simulated device reports.
pub fn reference_sensors() -> Vec<SensorDescriptor> {
    use ReportingMode::*;
    vec![
        sensor("Accelerometer", "android.sensor.accelerometer", 1, Continuous, 19.6133, 0.13, 0.0029, false),
        sensor("Gyroscope", "android.sensor.gyroscope", 4, Continuous, 34.9066, 0.13, 0.0011, false),
        sensor("Light", "android.sensor.light", 5, OnChange, 40000.0, 0.13, 1.0, false),
        sensor("Proximity", "android.sensor.proximity", 8, OnChange, 5.0, 0.5, 1.0, true),
        sensor("Magnetic Field", "android.sensor.magnetic_field", 2, Continuous, 2000.0, 0.35, 0.1, false),
        sensor("Significant Motion", "android.sensor.significant_motion", 17, OneShot, 1.0, 0.3, 1.0, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn accelerometer(device: &SimulatedDevice) -> SensorDescriptor {
        device.find("android.sensor.accelerometer").unwrap()
    }

    #[test]
    fn test_catalog_hides_one_shot() {
        let device = SimulatedDevice::new();
        assert_eq!(device.all_sensors().len(), 6);
        assert_eq!(device.selectable_sensors().len(), 5);
    }

    #[test]
    fn test_subscribe_delivers_samples() {
        let device = SimulatedDevice::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();

        device
            .subscribe(
                &accelerometer(&device),
                5_000,
                Arc::new(move |sample| {
                    assert_eq!(sample.string_type, "android.sensor.accelerometer");
                    assert_eq!(sample.values.len(), 3);
                    c.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        device.unsubscribe(&accelerometer(&device));
        let after_stop = count.load(Ordering::Relaxed);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
        assert!(device.active_subscriptions().is_empty());
    }

    #[test]
    fn test_double_subscribe_rejected() {
        let device = SimulatedDevice::new();
        let accel = accelerometer(&device);
        device.subscribe(&accel, 20_000, Arc::new(|_| {})).unwrap();
        let err = device.subscribe(&accel, 20_000, Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadySubscribed(_)));
        device.unsubscribe(&accel);
    }

    #[test]
    fn test_unknown_sensor_rejected() {
        let device = SimulatedDevice::new();
        let mut bogus = accelerometer(&device);
        bogus.string_type = "vendor.sensor.bogus".to_string();
        let err = device.subscribe(&bogus, 20_000, Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSensor(_)));
    }

    #[test]
    fn test_location_fixes_respect_capabilities() {
        let device = SimulatedDevice::with_capabilities(LocationCapabilities::for_api_level(21));
        assert_eq!(device.capabilities(), LocationCapabilities::for_api_level(21));
        let (tx, rx) = crossbeam_channel::unbounded();
        device
            .subscribe_location(Arc::new(move |fix| {
                let _ = tx.send(fix);
            }))
            .unwrap();
        assert!(device.is_location_active());

        let fix = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fix.speed_accuracy_meters_per_second.is_none());
        assert!(fix.elapsed_realtime_age_millis.is_none());

        device.unsubscribe_location();
        device.unsubscribe_location();
        assert!(!device.is_location_active());
    }
}
