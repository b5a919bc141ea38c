//! Source registry: the seam between the streaming session and the
//! device's sensor and location APIs.
//!
//! Implementations invoke the handlers from their own threads. The session
//! passes handlers that only enqueue onto its delivery worker, so handlers
//! never block the producer.

use std::sync::Arc;

use crate::error::RegistryError;
use crate::sensors::types::{LocationSample, SensorDescriptor, SensorSample};

/// Callback receiving sensor samples.
pub type SampleHandler = Arc<dyn Fn(SensorSample) + Send + Sync>;

/// Callback receiving location fixes.
pub type LocationHandler = Arc<dyn Fn(LocationSample) + Send + Sync>;

/// Subscribe/unsubscribe access to a device's sources.
pub trait SourceRegistry: Send + Sync {
    /// Start delivering samples of `descriptor` roughly every `interval_micros`.
    ///
    /// # Errors
    /// [`RegistryError::AlreadySubscribed`] when a subscription exists for the
    /// same type tag, [`RegistryError::UnknownSensor`] when the device lacks it.
    fn subscribe(
        &self,
        descriptor: &SensorDescriptor,
        interval_micros: u32,
        on_sample: SampleHandler,
    ) -> Result<(), RegistryError>;

    /// Stop delivery for `descriptor`. Unknown descriptors are ignored.
    fn unsubscribe(&self, descriptor: &SensorDescriptor);

    /// Start delivering location fixes.
    fn subscribe_location(&self, on_fix: LocationHandler) -> Result<(), RegistryError>;

    /// Stop location delivery. Safe to call when not subscribed.
    fn unsubscribe_location(&self);
}
