//! Lifecycle notifications from a streaming session.
//!
//! Observers are fixed when the session is built; there are no callback
//! slots to reassign between runs.

use crossbeam_channel::Sender;
use tracing::{error, info};

use crate::config::StreamingConfiguration;
use crate::error::TransportError;

/// Receives session lifecycle callbacks.
///
/// Callbacks run on whichever thread caused the transition: the caller of
/// `start`/`stop`, or the delivery worker after a transport failure. The
/// state change is complete before they run and no session lock is held,
/// so a callback may call back into the session.
pub trait StreamObserver: Send + Sync {
    fn on_started(&self, _info: &StreamingConfiguration) {}

    fn on_stopped(&self) {}

    /// Called once when a transport failure ends the session, before `on_stopped`.
    fn on_error(&self, _cause: &TransportError) {}
}

/// Lifecycle events as values, for observers that prefer a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started(StreamingConfiguration),
    Stopped,
    Error(String),
}

impl StreamObserver for Sender<LifecycleEvent> {
    fn on_started(&self, info: &StreamingConfiguration) {
        let _ = self.send(LifecycleEvent::Started(info.clone()));
    }

    fn on_stopped(&self) {
        let _ = self.send(LifecycleEvent::Stopped);
    }

    fn on_error(&self, cause: &TransportError) {
        let _ = self.send(LifecycleEvent::Error(cause.to_string()));
    }
}

/// Writes lifecycle transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl StreamObserver for LoggingObserver {
    fn on_started(&self, info: &StreamingConfiguration) {
        info!(
            target_host = %info.address,
            port = info.port,
            interval_us = info.sampling_interval_micros,
            sensors = info.sensors.len(),
            gps = info.gps_enabled,
            "streaming started"
        );
    }

    fn on_stopped(&self) {
        info!("streaming stopped");
    }

    fn on_error(&self, cause: &TransportError) {
        error!(error = %cause, "streaming failed");
    }
}
