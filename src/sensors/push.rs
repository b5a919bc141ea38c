//! Registry fed by the host application.
//!
//! For embedders that already own the platform sensor callbacks: they
//! forward each reading with [`PushRegistry::push_sample`] and the registry
//! routes it to whichever handler the session registered for that type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::RegistryError;
use crate::sensors::catalog::SensorCatalog;
use crate::sensors::registry::{LocationHandler, SampleHandler, SourceRegistry};
use crate::sensors::types::{LocationSample, SensorDescriptor, SensorSample};

struct Subscription {
    interval_micros: u32,
    handler: SampleHandler,
}

/// A source registry whose samples are pushed in from outside.
pub struct PushRegistry {
    sensors: Vec<SensorDescriptor>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    location: RwLock<Option<LocationHandler>>,
}

impl PushRegistry {
    /// Registry offering exactly `sensors`.
    pub fn new(sensors: Vec<SensorDescriptor>) -> Self {
        Self {
            sensors,
            subscriptions: RwLock::new(HashMap::new()),
            location: RwLock::new(None),
        }
    }

    /// Route a reading to its subscriber. Returns `false` when nobody is subscribed.
    pub fn push_sample(&self, sample: SensorSample) -> bool {
        let handler = self
            .subscriptions
            .read()
            .get(&sample.string_type.to_ascii_lowercase())
            .map(|s| s.handler.clone());
        match handler {
            Some(handler) => {
                handler(sample);
                true
            }
            None => {
                trace!(sensor = %sample.string_type, "no subscriber for pushed sample");
                false
            }
        }
    }

    /// Route a location fix. Returns `false` when location is not subscribed.
    pub fn push_fix(&self, fix: LocationSample) -> bool {
        let handler = self.location.read().clone();
        match handler {
            Some(handler) => {
                handler(fix);
                true
            }
            None => false,
        }
    }

    /// Subscribed type tags (lowercased), sorted.
    pub fn subscribed(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Interval requested for a subscribed type.
    pub fn interval_of(&self, string_type: &str) -> Option<u32> {
        self.subscriptions
            .read()
            .get(&string_type.to_ascii_lowercase())
            .map(|s| s.interval_micros)
    }

    pub fn is_location_subscribed(&self) -> bool {
        self.location.read().is_some()
    }
}

impl SensorCatalog for PushRegistry {
    fn all_sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors.clone()
    }
}

impl SourceRegistry for PushRegistry {
    fn subscribe(
        &self,
        descriptor: &SensorDescriptor,
        interval_micros: u32,
        on_sample: SampleHandler,
    ) -> Result<(), RegistryError> {
        if !self
            .sensors
            .iter()
            .any(|s| s.matches_type(&descriptor.string_type))
        {
            return Err(RegistryError::UnknownSensor(descriptor.string_type.clone()));
        }

        let key = descriptor.string_type.to_ascii_lowercase();
        let mut subscriptions = self.subscriptions.write();
        if subscriptions.contains_key(&key) {
            return Err(RegistryError::AlreadySubscribed(descriptor.string_type.clone()));
        }
        subscriptions.insert(
            key,
            Subscription {
                interval_micros,
                handler: on_sample,
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, descriptor: &SensorDescriptor) {
        self.subscriptions
            .write()
            .remove(&descriptor.string_type.to_ascii_lowercase());
    }

    fn subscribe_location(&self, on_fix: LocationHandler) -> Result<(), RegistryError> {
        let mut location = self.location.write();
        if location.is_some() {
            return Err(RegistryError::AlreadySubscribed("location".to_string()));
        }
        *location = Some(on_fix);
        Ok(())
    }

    fn unsubscribe_location(&self) {
        self.location.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::simulated::reference_sensors;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_push_routes_to_subscriber() {
        let registry = PushRegistry::new(reference_sensors());
        let light = registry.find("android.sensor.light").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();

        registry
            .subscribe(
                &light,
                50_000,
                Arc::new(move |_| {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(registry.interval_of("android.sensor.light"), Some(50_000));

        assert!(registry.push_sample(SensorSample::new("android.sensor.light", 1, vec![3.0])));
        assert!(!registry.push_sample(SensorSample::new("android.sensor.gyroscope", 1, vec![0.0])));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        registry.unsubscribe(&light);
        assert!(!registry.push_sample(SensorSample::new("android.sensor.light", 2, vec![3.0])));
        assert!(registry.subscribed().is_empty());
    }

    #[test]
    fn test_location_push() {
        let registry = PushRegistry::new(Vec::new());
        assert!(!registry.push_fix(LocationSample::default()));

        registry.subscribe_location(Arc::new(|_| {})).unwrap();
        assert!(registry.is_location_subscribed());
        assert!(registry.push_fix(LocationSample::default()));

        registry.unsubscribe_location();
        assert!(!registry.is_location_subscribed());
    }
}
