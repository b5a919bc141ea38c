//! Delivery worker: the single thread that serializes and sends every
//! sample of a session.
//!
//! Source callbacks only enqueue. The worker checks each event against the
//! current [`ActiveSources`] snapshot while holding its read lock, so a
//! writer swapping in a new snapshot waits for the event in flight and no
//! event of a removed source is sent after the swap returns.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::sensors::{LocationHandler, SampleHandler, SensorDescriptor, StreamEvent};
use crate::stats::SharedStats;
use crate::stream::serializer;
use crate::stream::transport::UdpSink;

/// Queue depth between source callbacks and the worker.
pub const DELIVERY_QUEUE_CAPACITY: usize = 10_000;

/// Sources whose events may be sent. Never mutated once built.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActiveSources {
    sensors: HashSet<String>,
    location: bool,
}

impl ActiveSources {
    pub fn new(sensors: &[SensorDescriptor], location: bool) -> Self {
        Self {
            sensors: sensors
                .iter()
                .map(|s| s.string_type.to_ascii_lowercase())
                .collect(),
            location,
        }
    }

    /// Admits nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn admits(&self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Sensor(sample) => self
                .sensors
                .contains(&sample.string_type.to_ascii_lowercase()),
            StreamEvent::Location(_) => self.location,
        }
    }

    pub fn with_location(&self, location: bool) -> Self {
        Self {
            sensors: self.sensors.clone(),
            location,
        }
    }
}

/// What the control side and the worker of one session share.
pub struct DeliveryContext {
    epoch: u64,
    active: RwLock<Arc<ActiveSources>>,
    sink: UdpSink,
    stats: SharedStats,
}

impl DeliveryContext {
    pub fn new(epoch: u64, sink: UdpSink, stats: SharedStats) -> Self {
        Self {
            epoch,
            active: RwLock::new(Arc::new(ActiveSources::empty())),
            sink,
            stats,
        }
    }

    /// Session run this context belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn sink(&self) -> &UdpSink {
        &self.sink
    }

    /// Current snapshot.
    pub fn active(&self) -> Arc<ActiveSources> {
        self.active.read().clone()
    }

    /// Replace the snapshot. Blocks until the event being delivered, if any, is done.
    pub fn swap_active(&self, next: ActiveSources) {
        *self.active.write() = Arc::new(next);
    }

    /// Serialize and send one event if its source is active.
    ///
    /// Only transport failures are returned; anything else drops the event.
    pub fn deliver(&self, event: &StreamEvent) -> Result<(), TransportError> {
        let active = self.active.read();
        if !active.admits(event) {
            self.stats.record_inactive_drop();
            trace!(epoch = self.epoch, "event from inactive source dropped");
            return Ok(());
        }

        let payload = match serializer::serialize(event) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.record_serialization_drop();
                warn!(error = %e, "dropping sample that failed to serialize");
                return Ok(());
            }
        };

        let sent = self.sink.send(payload.as_bytes())?;
        match event {
            StreamEvent::Sensor(_) => self.stats.record_sample_sent(sent),
            StreamEvent::Location(_) => self.stats.record_fix_sent(sent),
        }
        Ok(())
    }
}

/// Called once, on the worker thread, when a send fails.
pub type FailureHandler = Box<dyn FnOnce(TransportError) + Send>;

/// Handle to a running delivery thread.
pub struct DeliveryWorker {
    queue: Sender<StreamEvent>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    stats: SharedStats,
}

impl DeliveryWorker {
    /// Start the worker thread for `context`.
    pub fn spawn(
        context: Arc<DeliveryContext>,
        stats: SharedStats,
        on_failure: FailureHandler,
    ) -> std::io::Result<Self> {
        let (queue, events) = bounded::<StreamEvent>(DELIVERY_QUEUE_CAPACITY);
        let (stop, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(format!("stream-delivery-{}", context.epoch()))
            .spawn(move || run(context, events, stop_rx, on_failure))?;

        Ok(Self {
            queue,
            stop: Some(stop),
            handle: Some(handle),
            stats,
        })
    }

    /// Handler that funnels sensor samples onto this worker.
    pub fn sample_handler(&self) -> SampleHandler {
        let queue = self.queue.clone();
        let stats = self.stats.clone();
        Arc::new(move |sample| enqueue(&queue, &stats, StreamEvent::Sensor(sample)))
    }

    /// Handler that funnels location fixes onto this worker.
    pub fn location_handler(&self) -> LocationHandler {
        let queue = self.queue.clone();
        let stats = self.stats.clone();
        Arc::new(move |fix| enqueue(&queue, &stats, StreamEvent::Location(fix)))
    }

    /// Signal the thread to exit and wait for it, unless called from the worker itself.
    pub fn shutdown(mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        // Dropping the stop sender disconnects the worker's stop channel
        self.stop.take();
    }
}

fn enqueue(queue: &Sender<StreamEvent>, stats: &SharedStats, event: StreamEvent) {
    match queue.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            stats.record_queue_overflow();
            trace!("delivery queue full, event dropped");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

fn run(
    context: Arc<DeliveryContext>,
    events: Receiver<StreamEvent>,
    stop: Receiver<()>,
    on_failure: FailureHandler,
) {
    debug!(epoch = context.epoch(), "delivery worker started");

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(events) -> event => {
                let Ok(event) = event else { break };
                if let Err(e) = context.deliver(&event) {
                    warn!(epoch = context.epoch(), error = %e, "transport failure, ending session");
                    on_failure(e);
                    break;
                }
            }
        }
    }

    debug!(epoch = context.epoch(), "delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorSample;
    use crate::stats::create_shared_stats;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn context_with_receiver() -> (Arc<DeliveryContext>, UdpSocket, SharedStats) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();
        let stats = create_shared_stats();
        let sink = UdpSink::open("127.0.0.1", port).unwrap();
        (Arc::new(DeliveryContext::new(1, sink, stats.clone())), receiver, stats)
    }

    fn accel(ts: i64) -> StreamEvent {
        StreamEvent::Sensor(SensorSample::new("android.sensor.accelerometer", ts, vec![0.0, 0.0, 9.8]))
    }

    #[test]
    fn test_active_sources_admission() {
        let sources = ActiveSources {
            sensors: ["android.sensor.accelerometer".to_string()].into_iter().collect(),
            location: false,
        };
        assert!(sources.admits(&accel(1)));
        assert!(!sources.admits(&StreamEvent::Location(Default::default())));
        assert!(sources.with_location(true).admits(&StreamEvent::Location(Default::default())));
        assert!(!ActiveSources::empty().admits(&accel(1)));
    }

    #[test]
    fn test_deliver_filters_inactive() {
        let (context, receiver, stats) = context_with_receiver();
        context.deliver(&accel(1)).unwrap();
        assert_eq!(stats.snapshot().inactive_drops, 1);

        let mut buf = [0u8; 256];
        assert!(receiver.recv_from(&mut buf).is_err());
    }

    #[test]
    fn test_deliver_sends_active() {
        let (context, receiver, stats) = context_with_receiver();
        context.swap_active(ActiveSources {
            sensors: ["android.sensor.accelerometer".to_string()].into_iter().collect(),
            location: false,
        });
        context.deliver(&accel(7)).unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let record: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(record["timestamp"], 7);
        assert_eq!(stats.snapshot().samples_sent, 1);
    }

    #[test]
    fn test_deliver_reports_closed_sink() {
        let (context, _receiver, _stats) = context_with_receiver();
        context.swap_active(ActiveSources {
            sensors: ["android.sensor.accelerometer".to_string()].into_iter().collect(),
            location: false,
        });
        context.sink().close();
        assert!(matches!(context.deliver(&accel(1)), Err(TransportError::Closed)));
    }

    #[test]
    fn test_worker_invokes_failure_once() {
        let (context, _receiver, stats) = context_with_receiver();
        context.swap_active(ActiveSources {
            sensors: ["android.sensor.accelerometer".to_string()].into_iter().collect(),
            location: false,
        });
        context.sink().close();

        let (fail_tx, fail_rx) = crossbeam_channel::unbounded();
        let worker = DeliveryWorker::spawn(
            context,
            stats,
            Box::new(move |e| {
                let _ = fail_tx.send(e.to_string());
            }),
        )
        .unwrap();

        let handler = worker.sample_handler();
        for ts in 0..5 {
            if let StreamEvent::Sensor(s) = accel(ts) {
                handler(s);
            }
        }

        assert_eq!(
            fail_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "socket closed"
        );
        worker.shutdown();
        assert!(fail_rx.try_recv().is_err());
    }
}
