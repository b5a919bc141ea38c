//! Streaming engine: serializer, UDP transport, delivery worker and the
//! session state machine that drives them.

pub mod observer;
pub mod serializer;
pub mod session;
pub mod transport;
pub mod worker;

pub use observer::{LifecycleEvent, LoggingObserver, StreamObserver};
pub use serializer::{serialize, LOCATION_TYPE, MAX_DATAGRAM_SIZE};
pub use session::{SessionBuilder, StreamingSession};
pub use transport::UdpSink;
pub use worker::ActiveSources;
