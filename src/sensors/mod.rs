//! Device sensors: data model, catalog, and the source registry seam.
//!
//! The session only talks to the [`SourceRegistry`], [`SensorCatalog`] and
//! [`PermissionOracle`] traits. [`SimulatedDevice`] stands in for phone
//! hardware; [`PushRegistry`] lets an embedding application feed readings
//! from its own callbacks.

pub mod catalog;
pub mod push;
pub mod registry;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use catalog::{PermissionOracle, SensorCatalog, StaticPermission};
pub use push::PushRegistry;
pub use registry::{LocationHandler, SampleHandler, SourceRegistry};
pub use simulated::SimulatedDevice;
pub use types::{
    LocationCapabilities, LocationSample, ReportingMode, SensorDescriptor, SensorSample,
    StreamEvent,
};
