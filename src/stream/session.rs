//! Streaming session: the IDLE/ACTIVE state machine.
//!
//! A session owns, per run, one [`UdpSink`], one delivery worker and the
//! subscriptions it made on the [`SourceRegistry`]. Control calls (`start`,
//! `stop`, `change_sensors`) may come from any thread; they serialize on the
//! session's control lock. Delivery runs on the worker and only contends
//! with control calls through the active-source snapshot.
//!
//! Each run gets an epoch number. A transport failure reported by the worker
//! of an earlier run is ignored, so a late failure can never stop a session
//! that was restarted in the meantime.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::StreamingConfiguration;
use crate::error::{StreamError, TransportError};
use crate::sensors::{
    PermissionOracle, SampleHandler, SensorDescriptor, SourceRegistry, StaticPermission,
};
use crate::stats::{create_shared_stats, SharedStats};
use crate::stream::observer::StreamObserver;
use crate::stream::transport::UdpSink;
use crate::stream::worker::{ActiveSources, DeliveryContext, DeliveryWorker};

/// Everything one ACTIVE run holds.
struct ActiveRun {
    config: StreamingConfiguration,
    context: Arc<DeliveryContext>,
    worker: DeliveryWorker,
    location: bool,
}

/// What status queries read. Kept apart from the control lock so observers
/// can query it from inside a callback.
#[derive(Debug, Clone)]
struct Status {
    config: StreamingConfiguration,
    target: SocketAddr,
    location: bool,
}

struct SessionInner {
    registry: Arc<dyn SourceRegistry>,
    permissions: Arc<dyn PermissionOracle>,
    observers: Vec<Arc<dyn StreamObserver>>,
    stats: SharedStats,
    state: Mutex<Option<ActiveRun>>,
    status: RwLock<Option<Status>>,
    epochs: AtomicU64,
}

/// Builder for [`StreamingSession`].
pub struct SessionBuilder {
    registry: Arc<dyn SourceRegistry>,
    permissions: Arc<dyn PermissionOracle>,
    observers: Vec<Arc<dyn StreamObserver>>,
    stats: Option<SharedStats>,
}

impl SessionBuilder {
    /// Location permission source. Defaults to always granted.
    pub fn permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Add a lifecycle observer. Observers are notified in the order added.
    pub fn observer(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Share counters with the caller. A fresh set is created otherwise.
    pub fn stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Create the session, idle until `start`.
    pub fn build(self) -> StreamingSession {
        StreamingSession {
            inner: Arc::new(SessionInner {
                registry: self.registry,
                permissions: self.permissions,
                observers: self.observers,
                stats: self.stats.unwrap_or_else(create_shared_stats),
                state: Mutex::new(None),
                status: RwLock::new(None),
                epochs: AtomicU64::new(0),
            }),
        }
    }
}

/// Streams samples from a [`SourceRegistry`] to one UDP destination.
///
/// Observers are notified after the control lock is released, so a
/// callback may call any method of the session, including `stop`.
pub struct StreamingSession {
    inner: Arc<SessionInner>,
}

impl StreamingSession {
    /// Create a builder over `registry`.
    pub fn builder(registry: Arc<dyn SourceRegistry>) -> SessionBuilder {
        SessionBuilder {
            registry,
            permissions: Arc::new(StaticPermission::granted()),
            observers: Vec::new(),
            stats: None,
        }
    }

    /// Start streaming with `config`. Does nothing if already active.
    ///
    /// # Errors
    /// - [`StreamError::InvalidConfiguration`] for a malformed destination or interval
    /// - [`StreamError::Transport`] when the destination cannot be resolved or bound
    /// - [`StreamError::Registry`] when a sensor cannot be subscribed
    /// - [`StreamError::Spawn`] when the delivery thread cannot be created
    ///
    /// On error the session stays idle and nothing is left subscribed.
    pub fn start(&self, config: StreamingConfiguration) -> Result<(), StreamError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.is_some() {
            debug!("start ignored, session already active");
            return Ok(());
        }

        config.validate()?;
        let sink = UdpSink::open(&config.address, config.port)?;
        let target = sink.target();

        let epoch = inner.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let context = Arc::new(DeliveryContext::new(epoch, sink, inner.stats.clone()));
        let weak: Weak<SessionInner> = Arc::downgrade(inner);
        let worker = DeliveryWorker::spawn(
            context.clone(),
            inner.stats.clone(),
            Box::new(move |cause| {
                if let Some(inner) = weak.upgrade() {
                    inner.fail(epoch, cause);
                }
            }),
        )
        .map_err(StreamError::Spawn)?;

        context.swap_active(ActiveSources::new(&config.sensors, false));
        if let Err(e) = inner.subscribe_all(
            &config.sensors,
            config.sampling_interval_micros,
            worker.sample_handler(),
        ) {
            context.swap_active(ActiveSources::empty());
            context.sink().close();
            drop(state);
            worker.shutdown();
            return Err(e);
        }

        let location = config.gps_enabled && inner.start_location(&context, &worker);

        inner.stats.record_session_started();
        *inner.status.write() = Some(Status {
            config: config.clone(),
            target,
            location,
        });
        info!(
            epoch,
            target = %target,
            sensors = config.sensors.len(),
            location,
            "session started"
        );
        *state = Some(ActiveRun {
            config: config.clone(),
            context,
            worker,
            location,
        });
        drop(state);

        for observer in &inner.observers {
            observer.on_started(&config);
        }
        Ok(())
    }

    /// Stop streaming. Does nothing if idle; safe to call repeatedly.
    pub fn stop(&self) {
        let worker = {
            let mut state = self.inner.state.lock();
            match state.take() {
                Some(run) => self.inner.teardown(run),
                None => return,
            }
        };
        self.inner.notify_stopped();
        // Joined outside the control lock: the worker may be waiting on it
        worker.shutdown();
    }

    /// Replace the streamed sensor set, keeping destination and interval.
    ///
    /// Added sensors are subscribed before removed ones are dropped. Once
    /// this returns, no sample of a removed sensor will be sent. Does nothing
    /// when idle.
    ///
    /// # Errors
    /// [`StreamError::Registry`] if an added sensor cannot be subscribed; the
    /// previous set then stays in effect.
    pub fn change_sensors(&self, sensors: Vec<SensorDescriptor>) -> Result<(), StreamError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let Some(run) = state.as_mut() else {
            debug!("change_sensors ignored, session idle");
            return Ok(());
        };

        let next = run.config.with_sensors(sensors);
        let current = &run.config.sensors;
        let added: Vec<SensorDescriptor> = next
            .sensors
            .iter()
            .filter(|s| !current.iter().any(|c| c.matches_type(&s.string_type)))
            .cloned()
            .collect();
        let removed: Vec<SensorDescriptor> = current
            .iter()
            .filter(|c| !next.sensors.iter().any(|s| s.matches_type(&c.string_type)))
            .cloned()
            .collect();

        if !added.is_empty() {
            let mut union = current.clone();
            union.extend(added.iter().cloned());
            run.context
                .swap_active(ActiveSources::new(&union, run.location));

            if let Err(e) = inner.subscribe_all(
                &added,
                next.sampling_interval_micros,
                run.worker.sample_handler(),
            ) {
                run.context
                    .swap_active(ActiveSources::new(current, run.location));
                return Err(e);
            }
        }

        // After this swap the worker no longer admits removed sensors
        run.context
            .swap_active(ActiveSources::new(&next.sensors, run.location));
        for sensor in &removed {
            inner.registry.unsubscribe(sensor);
        }

        debug!(
            added = added.len(),
            removed = removed.len(),
            total = next.sensors.len(),
            "sensor selection changed"
        );

        if let Some(status) = inner.status.write().as_mut() {
            status.config = next.clone();
        }
        run.config = next;
        Ok(())
    }

    /// Whether a run is in progress.
    pub fn is_active(&self) -> bool {
        self.inner.status.read().is_some()
    }

    /// Configuration of the running session, if any.
    pub fn current_info(&self) -> Option<StreamingConfiguration> {
        self.inner.status.read().as_ref().map(|s| s.config.clone())
    }

    /// Resolved destination of the running session.
    pub fn current_target(&self) -> Option<SocketAddr> {
        self.inner.status.read().as_ref().map(|s| s.target)
    }

    /// Whether location fixes are part of the running session.
    pub fn is_location_streaming(&self) -> bool {
        self.inner
            .status
            .read()
            .as_ref()
            .is_some_and(|s| s.location)
    }

    /// Counters shared with the delivery worker.
    pub fn stats(&self) -> &SharedStats {
        &self.inner.stats
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SessionInner {
    /// Subscribe every sensor in `sensors`, undoing the ones that succeeded on error.
    fn subscribe_all(
        &self,
        sensors: &[SensorDescriptor],
        interval_micros: u32,
        handler: SampleHandler,
    ) -> Result<(), StreamError> {
        for (i, sensor) in sensors.iter().enumerate() {
            if let Err(e) = self
                .registry
                .subscribe(sensor, interval_micros, handler.clone())
            {
                warn!(sensor = %sensor.string_type, error = %e, "subscribe failed");
                for done in &sensors[..i] {
                    self.registry.unsubscribe(done);
                }
                return Err(e.into());
            }
            debug!(sensor = %sensor.string_type, interval_us = interval_micros, "subscribed");
        }
        Ok(())
    }

    /// Subscribe location if permitted. Returns whether fixes will flow.
    fn start_location(&self, context: &DeliveryContext, worker: &DeliveryWorker) -> bool {
        if !self.permissions.is_location_permission_granted() {
            debug!("location permission not granted, streaming without GPS");
            return false;
        }

        context.swap_active(context.active().with_location(true));
        match self.registry.subscribe_location(worker.location_handler()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "location unavailable, streaming without GPS");
                context.swap_active(context.active().with_location(false));
                false
            }
        }
    }

    /// Release everything a run holds, except joining its worker.
    ///
    /// Runs under the control lock; observers are notified by the caller.
    fn teardown(&self, run: ActiveRun) -> DeliveryWorker {
        // Queued samples are dropped from here on, not sent
        run.context.swap_active(ActiveSources::empty());

        for sensor in &run.config.sensors {
            self.registry.unsubscribe(sensor);
        }
        if run.location {
            self.registry.unsubscribe_location();
        }
        run.context.sink().close();
        *self.status.write() = None;

        info!(epoch = run.context.epoch(), "session stopped");
        run.worker
    }

    fn notify_stopped(&self) {
        for observer in &self.observers {
            observer.on_stopped();
        }
    }

    /// Transport failure reported by the worker of run `epoch`.
    fn fail(&self, epoch: u64, cause: TransportError) {
        let worker = {
            let mut state = self.state.lock();
            let current = state.as_ref().map(|run| run.context.epoch());
            if current != Some(epoch) {
                debug!(epoch, ?current, "ignoring failure from a finished run");
                return;
            }
            let Some(run) = state.take() else { return };

            self.stats.record_transport_failure();
            self.teardown(run)
        };

        for observer in &self.observers {
            observer.on_error(&cause);
        }
        self.notify_stopped();
        worker.shutdown();
    }
}
