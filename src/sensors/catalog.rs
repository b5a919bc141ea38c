//! Sensor catalog and location permission collaborators.

use crate::sensors::types::SensorDescriptor;

/// Enumerates the sensors a device offers.
pub trait SensorCatalog: Send + Sync {
    /// Every sensor on the device, including one-shot sources.
    fn all_sensors(&self) -> Vec<SensorDescriptor>;

    /// Sensors that can be selected for streaming (one-shot sources excluded).
    fn selectable_sensors(&self) -> Vec<SensorDescriptor> {
        self.all_sensors()
            .into_iter()
            .filter(|s| s.reporting_mode.is_streamable())
            .collect()
    }

    /// Look up a selectable sensor by its type tag (case-insensitive).
    fn find(&self, string_type: &str) -> Option<SensorDescriptor> {
        self.selectable_sensors()
            .into_iter()
            .find(|s| s.matches_type(string_type))
    }
}

/// Answers whether location updates may be requested right now.
pub trait PermissionOracle: Send + Sync {
    fn is_location_permission_granted(&self) -> bool;
}

/// A fixed permission answer, for hosts without a permission model and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPermission(pub bool);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(true)
    }

    pub fn denied() -> Self {
        Self(false)
    }
}

impl PermissionOracle for StaticPermission {
    fn is_location_permission_granted(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::types::ReportingMode;

    struct TwoSensors;

    fn descriptor(string_type: &str, mode: ReportingMode) -> SensorDescriptor {
        SensorDescriptor {
            string_type: string_type.to_string(),
            name: string_type.to_string(),
            type_code: 0,
            reporting_mode: mode,
            vendor: "Test".to_string(),
            power: 0.0,
            resolution: 0.0,
            maximum_range: 0.0,
            min_delay: 0,
            max_delay: 0,
            is_wake_up: false,
        }
    }

    impl SensorCatalog for TwoSensors {
        fn all_sensors(&self) -> Vec<SensorDescriptor> {
            vec![
                descriptor("android.sensor.accelerometer", ReportingMode::Continuous),
                descriptor("android.sensor.significant_motion", ReportingMode::OneShot),
            ]
        }
    }

    #[test]
    fn test_one_shot_sensors_not_selectable() {
        let selectable = TwoSensors.selectable_sensors();
        assert_eq!(selectable.len(), 1);
        assert_eq!(selectable[0].string_type, "android.sensor.accelerometer");
        assert!(TwoSensors.find("android.sensor.significant_motion").is_none());
        assert!(TwoSensors.find("Android.Sensor.Accelerometer").is_some());
    }

    #[test]
    fn test_static_permission() {
        assert!(StaticPermission::granted().is_location_permission_granted());
        assert!(!StaticPermission::denied().is_location_permission_granted());
    }
}
