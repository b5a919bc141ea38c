//! Sensor and location data model.
//!
//! Descriptors are immutable and enumerated from the device; samples are
//! transient values created by the device callback and consumed by the
//! serializer immediately.

use serde::{Deserialize, Serialize};

/// How a sensor reports its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    /// Periodic readings at the requested interval
    Continuous,
    /// A reading whenever the value changes
    OnChange,
    /// A single reading, then the sensor disables itself
    OneShot,
    /// Device specific trigger (e.g. step detector)
    SpecialTrigger,
}

impl ReportingMode {
    /// One-shot sensors cannot be streamed and are never selectable.
    pub fn is_streamable(self) -> bool {
        self != Self::OneShot
    }
}

/// Identifies one hardware or software data source on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Stable type tag, e.g. `android.sensor.accelerometer`
    pub string_type: String,
    /// Human readable name
    pub name: String,
    /// Numeric platform type code
    pub type_code: i32,
    pub reporting_mode: ReportingMode,
    pub vendor: String,
    /// Power draw in mA
    pub power: f32,
    pub resolution: f32,
    pub maximum_range: f32,
    /// Minimum delay between readings in microseconds
    pub min_delay: i32,
    /// Maximum delay between readings in microseconds
    pub max_delay: i32,
    pub is_wake_up: bool,
}

impl SensorDescriptor {
    /// Case-insensitive match against a stored type tag.
    pub fn matches_type(&self, string_type: &str) -> bool {
        self.string_type.eq_ignore_ascii_case(string_type)
    }
}

/// One reading from a sensor source.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    /// Type tag of the producing sensor
    pub string_type: String,
    /// Monotonic timestamp in nanoseconds
    pub timestamp: i64,
    /// Readings; cardinality depends on the sensor type
    pub values: Vec<f32>,
}

impl SensorSample {
    pub fn new(string_type: impl Into<String>, timestamp: i64, values: Vec<f32>) -> Self {
        Self {
            string_type: string_type.into(),
            timestamp,
            values,
        }
    }
}

/// A location fix.
///
/// The optional fields are only filled when the device advertises the
/// matching [`LocationCapabilities`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationSample {
    pub longitude: f64,
    pub latitude: f64,
    /// Meters above WGS84 ellipsoid
    pub altitude: f64,
    /// Degrees east of true north
    pub bearing: f32,
    /// Horizontal accuracy radius in meters
    pub accuracy: f32,
    /// Meters per second
    pub speed: f32,
    /// UTC fix time in milliseconds since the epoch
    pub time: i64,
    pub speed_accuracy_meters_per_second: Option<f32>,
    pub bearing_accuracy_degrees: Option<f32>,
    pub elapsed_realtime_nanos: Option<i64>,
    pub vertical_accuracy_meters: Option<f32>,
    pub elapsed_realtime_age_millis: Option<i64>,
    pub elapsed_realtime_uncertainty_nanos: Option<f64>,
}

/// Which extended location fields a device can report.
///
/// Resolved once when the device is opened rather than checked per fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationCapabilities {
    /// Speed, bearing and vertical accuracy plus elapsed realtime
    pub extended_accuracy: bool,
    /// Uncertainty of the elapsed realtime clock
    pub realtime_uncertainty: bool,
    /// Age of the fix relative to the realtime clock
    pub realtime_age: bool,
}

impl LocationCapabilities {
    /// Every extended field available.
    pub fn all() -> Self {
        Self {
            extended_accuracy: true,
            realtime_uncertainty: true,
            realtime_age: true,
        }
    }

    /// Capabilities for a given platform API level.
    pub fn for_api_level(level: u32) -> Self {
        Self {
            extended_accuracy: level >= 26,
            realtime_uncertainty: level >= 29,
            realtime_age: level >= 33,
        }
    }

    /// Clear the fields of `sample` this device cannot report.
    pub fn apply(&self, sample: &mut LocationSample) {
        if !self.extended_accuracy {
            sample.speed_accuracy_meters_per_second = None;
            sample.bearing_accuracy_degrees = None;
            sample.elapsed_realtime_nanos = None;
            sample.vertical_accuracy_meters = None;
        }
        if !self.realtime_uncertainty {
            sample.elapsed_realtime_uncertainty_nanos = None;
        }
        if !self.realtime_age {
            sample.elapsed_realtime_age_millis = None;
        }
    }
}

/// Anything the delivery path can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Sensor(SensorSample),
    Location(LocationSample),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporting_mode_streamable() {
        assert!(!ReportingMode::OneShot.is_streamable());
        assert!(ReportingMode::OnChange.is_streamable());
    }

    #[test]
    fn test_capabilities_by_api_level() {
        let old = LocationCapabilities::for_api_level(21);
        assert!(!old.extended_accuracy && !old.realtime_uncertainty && !old.realtime_age);

        let q = LocationCapabilities::for_api_level(29);
        assert!(q.extended_accuracy && q.realtime_uncertainty);
        assert!(!q.realtime_age);

        assert_eq!(LocationCapabilities::for_api_level(34), LocationCapabilities::all());
    }

    #[test]
    fn test_capabilities_strip_unsupported_fields() {
        let mut fix = LocationSample {
            speed_accuracy_meters_per_second: Some(0.5),
            elapsed_realtime_nanos: Some(10),
            elapsed_realtime_age_millis: Some(3),
            elapsed_realtime_uncertainty_nanos: Some(1.0),
            ..Default::default()
        };
        LocationCapabilities::for_api_level(29).apply(&mut fix);
        assert_eq!(fix.speed_accuracy_meters_per_second, Some(0.5));
        assert_eq!(fix.elapsed_realtime_uncertainty_nanos, Some(1.0));
        assert_eq!(fix.elapsed_realtime_age_millis, None);
    }

    #[test]
    fn test_descriptor_type_match_ignores_case() {
        let descriptor = SensorDescriptor {
            string_type: "android.sensor.light".to_string(),
            name: "Light".to_string(),
            type_code: 5,
            reporting_mode: ReportingMode::OnChange,
            vendor: "Test".to_string(),
            power: 0.1,
            resolution: 1.0,
            maximum_range: 40000.0,
            min_delay: 0,
            max_delay: 200_000,
            is_wake_up: false,
        };
        assert!(descriptor.matches_type("ANDROID.SENSOR.LIGHT"));
        assert!(!descriptor.matches_type("android.sensor.proximity"));
    }
}
