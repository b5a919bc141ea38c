//! Sensor Streamer - stream device sensor and location samples over UDP.
//!
//! Every sensor reading and location fix becomes one self-describing JSON
//! record sent as a single datagram to a fixed destination. Nothing is read
//! back; a receiver only needs the `type` tag to interpret a record.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Sensor Streamer                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  enqueue  ┌──────────────┐   ┌─────────────┐   │
//! │  │   Source     │──────────▶│   Delivery   │──▶│ Serializer  │   │
//! │  │  Registry    │ (bounded) │    Worker    │   │   (JSON)    │   │
//! │  └──────────────┘           └──────────────┘   └─────────────┘   │
//! │         ▲                          │                  │          │
//! │         │ subscribe                │ active set       ▼          │
//! │  ┌──────────────┐                  │           ┌─────────────┐   │
//! │  │  Streaming   │──────────────────┘           │   UdpSink   │   │
//! │  │   Session    │──▶ observers                 │ (datagrams) │   │
//! │  └──────────────┘                              └─────────────┘   │
//! │         ▲                                                        │
//! │  ┌──────────────┐                                                │
//! │  │SettingsStore │                                                │
//! │  └──────────────┘                                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensor_streamer::{Settings, SimulatedDevice, StreamingSession};
//!
//! let device = Arc::new(SimulatedDevice::new());
//! let settings = Settings {
//!     selected_sensors: vec!["android.sensor.accelerometer".to_string()],
//!     ..Default::default()
//! };
//! let config = settings.resolve(device.as_ref()).expect("valid settings");
//!
//! let session = StreamingSession::builder(device).build();
//! session.start(config).expect("failed to start");
//! // ... samples now flow to 127.0.0.1:8080
//! session.stop();
//! ```

pub mod config;
pub mod error;
pub mod sensors;
pub mod stats;
pub mod stream;

// Re-export key types at crate root for convenience
pub use config::{Settings, SettingsStore, StreamingConfiguration};
pub use error::{ConfigError, RegistryError, SerializationError, StreamError, TransportError};
pub use sensors::{
    LocationSample, PermissionOracle, PushRegistry, SensorCatalog, SensorDescriptor,
    SensorSample, SimulatedDevice, SourceRegistry, StaticPermission, StreamEvent,
};
pub use stats::{SharedStats, StreamStats};
pub use stream::{LifecycleEvent, LoggingObserver, StreamObserver, StreamingSession};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
