//! Event serializer: one self-describing JSON record per datagram.
//!
//! Sensor samples:
//!
//! ```text
//! {"timestamp":123,"values":[1.0,2.0,3.0],"type":"android.sensor.accelerometer"}
//! ```
//!
//! Location fixes carry the reserved tag `android.gps` and emit the extended
//! accuracy fields only when the device reported them.

use serde::Serialize;

use crate::error::SerializationError;
use crate::sensors::types::{LocationSample, SensorSample, StreamEvent};

/// Discriminator for location records.
pub const LOCATION_TYPE: &str = "android.gps";

/// Largest UDP payload deliverable over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Serialize)]
struct SensorRecord<'a> {
    timestamp: i64,
    values: &'a [f32],
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    bearing: f32,
    accuracy: f32,
    speed: f32,
    time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed_accuracy_meters_per_second: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearing_accuracy_degrees: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_realtime_nanos: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vertical_accuracy_meters: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_realtime_age_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_realtime_uncertainty_nanos: Option<f64>,
}

/// Encode any delivered event.
pub fn serialize(event: &StreamEvent) -> Result<String, SerializationError> {
    match event {
        StreamEvent::Sensor(sample) => serialize_sensor(sample),
        StreamEvent::Location(fix) => serialize_location(fix),
    }
}

/// Encode a sensor sample.
///
/// Non-finite readings are rejected: JSON has no representation for them
/// and a receiver could not tell a `null` reading from a missing one.
pub fn serialize_sensor(sample: &SensorSample) -> Result<String, SerializationError> {
    if sample.values.iter().any(|v| !v.is_finite()) {
        return Err(SerializationError::NonFiniteValue {
            field: "values".to_string(),
        });
    }

    let record = SensorRecord {
        timestamp: sample.timestamp,
        values: &sample.values,
        kind: &sample.string_type,
    };
    checked_size(serde_json::to_string(&record)?)
}

/// Encode a location fix.
pub fn serialize_location(fix: &LocationSample) -> Result<String, SerializationError> {
    let finite = [
        ("longitude", fix.longitude.is_finite()),
        ("latitude", fix.latitude.is_finite()),
        ("altitude", fix.altitude.is_finite()),
        ("bearing", fix.bearing.is_finite()),
        ("accuracy", fix.accuracy.is_finite()),
        ("speed", fix.speed.is_finite()),
    ];
    if let Some((field, _)) = finite.iter().find(|(_, ok)| !ok) {
        return Err(SerializationError::NonFiniteValue {
            field: field.to_string(),
        });
    }

    let record = LocationRecord {
        kind: LOCATION_TYPE,
        longitude: fix.longitude,
        latitude: fix.latitude,
        altitude: fix.altitude,
        bearing: fix.bearing,
        accuracy: fix.accuracy,
        speed: fix.speed,
        time: fix.time,
        speed_accuracy_meters_per_second: fix.speed_accuracy_meters_per_second,
        bearing_accuracy_degrees: fix.bearing_accuracy_degrees,
        elapsed_realtime_nanos: fix.elapsed_realtime_nanos,
        vertical_accuracy_meters: fix.vertical_accuracy_meters,
        elapsed_realtime_age_millis: fix.elapsed_realtime_age_millis,
        elapsed_realtime_uncertainty_nanos: fix.elapsed_realtime_uncertainty_nanos,
    };
    checked_size(serde_json::to_string(&record)?)
}

fn checked_size(json: String) -> Result<String, SerializationError> {
    if json.len() > MAX_DATAGRAM_SIZE {
        return Err(SerializationError::TooLarge {
            size: json.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(json)
}
