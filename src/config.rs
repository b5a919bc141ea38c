//! Configuration for the sensor streamer.
//!
//! [`Settings`] is what gets persisted; [`StreamingConfiguration`] is the
//! validated, resolved snapshot a session runs with.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConfigError;
use crate::sensors::{SensorCatalog, SensorDescriptor};

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u32 = 8080;
/// Sampling interval in microseconds.
pub const DEFAULT_SAMPLING_RATE: u32 = 20_000;
pub const MAX_PORT: u32 = 65_534;
pub const MAX_SAMPLING_RATE: u32 = 200_000;

/// Prefix assumed for sensor names given without a namespace.
const SENSOR_TYPE_PREFIX: &str = "android.sensor.";

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ip_address: String,
    pub port_no: u32,
    /// Sampling interval in microseconds
    pub sampling_rate: u32,
    /// Selected sensor type tags, in selection order
    pub selected_sensors: Vec<String>,
    pub stream_on_boot: bool,
    pub gps_streaming: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ip_address: DEFAULT_IP.to_string(),
            port_no: DEFAULT_PORT,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            selected_sensors: Vec::new(),
            stream_on_boot: false,
            gps_streaming: false,
        }
    }
}

impl Settings {
    /// Check destination and sampling interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.ip_address)?;
        validate_port(self.port_no)?;
        validate_sampling_rate(self.sampling_rate)?;
        Ok(())
    }

    /// Resolve the stored selection against `catalog` into a session snapshot.
    ///
    /// Type tags the device does not offer are skipped.
    pub fn resolve(&self, catalog: &dyn SensorCatalog) -> Result<StreamingConfiguration, ConfigError> {
        let sensors: Vec<SensorDescriptor> = self
            .selected_sensors
            .iter()
            .filter_map(|t| {
                let found = catalog.find(t);
                if found.is_none() {
                    debug!(sensor = %t, "selected sensor not on this device, skipping");
                }
                found
            })
            .collect();

        StreamingConfiguration::new(
            &self.ip_address,
            self.port_no,
            self.sampling_rate,
            sensors,
            self.gps_streaming,
        )
    }
}

/// Immutable snapshot a session runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingConfiguration {
    pub address: String,
    pub port: u16,
    pub sampling_interval_micros: u32,
    /// Selected sensors; no two share a type tag
    pub sensors: Vec<SensorDescriptor>,
    pub gps_enabled: bool,
}

impl StreamingConfiguration {
    /// Validate and build a snapshot. Duplicate sensors keep their first position.
    pub fn new(
        address: &str,
        port: u32,
        sampling_interval_micros: u32,
        sensors: Vec<SensorDescriptor>,
        gps_enabled: bool,
    ) -> Result<Self, ConfigError> {
        validate_host(address)?;
        let port = validate_port(port)?;
        validate_sampling_rate(sampling_interval_micros)?;

        Ok(Self {
            address: address.to_string(),
            port,
            sampling_interval_micros,
            sensors: dedup_sensors(sensors),
            gps_enabled,
        })
    }

    /// Re-check a snapshot that may have been assembled by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.address)?;
        validate_port(u32::from(self.port))?;
        validate_sampling_rate(self.sampling_interval_micros)?;
        Ok(())
    }

    /// Same destination and interval with a different sensor set.
    pub fn with_sensors(&self, sensors: Vec<SensorDescriptor>) -> Self {
        Self {
            sensors: dedup_sensors(sensors),
            ..self.clone()
        }
    }

    pub fn sensor_types(&self) -> Vec<&str> {
        self.sensors.iter().map(|s| s.string_type.as_str()).collect()
    }
}

/// Drop later entries that repeat an earlier type tag.
pub fn dedup_sensors(sensors: Vec<SensorDescriptor>) -> Vec<SensorDescriptor> {
    let mut unique: Vec<SensorDescriptor> = Vec::with_capacity(sensors.len());
    for sensor in sensors {
        if !unique.iter().any(|u| u.matches_type(&sensor.string_type)) {
            unique.push(sensor);
        }
    }
    unique
}

/// Parse a comma-separated sensor list.
///
/// Bare names get the `android.sensor.` prefix, so `accelerometer` and
/// `android.sensor.accelerometer` name the same sensor.
pub fn parse_sensor_list(s: &str) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let full = if name.contains('.') {
            name.to_string()
        } else {
            format!("{SENSOR_TYPE_PREFIX}{}", name.to_lowercase())
        };
        if !types.iter().any(|t| t.eq_ignore_ascii_case(&full)) {
            types.push(full);
        }
    }
    types
}

/// An IP literal or a syntactically valid DNS name.
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidHost(host.to_string());

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if host.is_empty() || host.len() > 253 {
        return Err(invalid());
    }

    let labels: Vec<&str> = host.trim_end_matches('.').split('.').collect();
    // Looks like a dotted IPv4 address but did not parse as one
    if labels.iter().all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        return Err(invalid());
    }
    let label_ok = |l: &&str| {
        !l.is_empty()
            && l.len() <= 63
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if labels.iter().all(label_ok) {
        Ok(())
    } else {
        Err(invalid())
    }
}

pub fn validate_port(port: u32) -> Result<u16, ConfigError> {
    if port > MAX_PORT {
        return Err(ConfigError::InvalidPort(port));
    }
    u16::try_from(port).map_err(|_| ConfigError::InvalidPort(port))
}

pub fn validate_sampling_rate(micros: u32) -> Result<(), ConfigError> {
    if micros > MAX_SAMPLING_RATE {
        return Err(ConfigError::InvalidSamplingInterval(micros));
    }
    Ok(())
}

/// Async, file-backed settings store.
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the platform configuration directory.
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-streamer")
            .join("settings.json")
    }

    /// Directory for runtime data such as stats.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-streamer")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields defaults.
    pub async fn load(&self) -> Result<Settings, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Validate and persist settings.
    pub async fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let _guard = self.write_lock.lock().await;
        self.write(settings).await
    }

    /// Read-modify-write. The closure's result is validated before it is saved.
    pub async fn update<F>(&self, edit: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await?;
        edit(&mut settings);
        settings.validate()?;
        self.write(&settings).await?;
        Ok(settings)
    }

    async fn write(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        // Write-then-rename so a polling reader never sees a partial file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, "settings saved");
        Ok(())
    }
}
