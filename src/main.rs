//! Sensor Streamer CLI
//!
//! Streams sensor and location samples from the simulated device to a UDP
//! receiver, and manages the persisted settings.

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use sensor_streamer::{
    config::{parse_sensor_list, Settings, SettingsStore},
    sensors::{
        LocationCapabilities, PermissionOracle, SensorCatalog, SimulatedDevice, StaticPermission,
    },
    stats::{create_shared_stats_with_persistence, StreamStats},
    stream::{LifecycleEvent, LoggingObserver, StreamingSession},
    VERSION,
};

#[derive(Parser)]
#[command(name = "sensor-streamer")]
#[command(version = VERSION)]
#[command(about = "Stream sensor and location samples as UDP datagrams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start streaming with the persisted settings
    Start {
        /// Destination host (IP address or DNS name)
        #[arg(long)]
        address: Option<String>,

        /// Destination port
        #[arg(long)]
        port: Option<u32>,

        /// Sampling interval in microseconds
        #[arg(long)]
        interval: Option<u32>,

        /// Sensors to stream, comma separated (e.g. accelerometer,gyroscope)
        #[arg(long)]
        sensors: Option<String>,

        /// Stream GPS fixes
        #[arg(long)]
        gps: bool,

        /// Behave as if location permission was not granted
        #[arg(long)]
        deny_location: bool,

        /// Platform API level of the simulated device (gates location fields)
        #[arg(long, default_value = "33")]
        api_level: u32,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Start streaming if streaming on boot is enabled
    Boot,

    /// List sensors available for streaming
    Sensors,

    /// Persist the sensor selection (picked up live by a running stream)
    Select {
        /// Comma separated sensor names
        sensors: String,
    },

    /// Change persisted settings
    Set {
        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        port: Option<u32>,

        /// Sampling interval in microseconds
        #[arg(long)]
        interval: Option<u32>,

        #[arg(long)]
        gps: Option<bool>,

        /// Start streaming on boot
        #[arg(long)]
        boot: Option<bool>,
    },

    /// Show settings and cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// Print datagrams received on a local port
    Listen {
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Exit after this many datagrams
        #[arg(long)]
        count: Option<usize>,
    },
}

/// One-off overrides given to `start`.
#[derive(Default)]
struct StartOptions {
    address: Option<String>,
    port: Option<u32>,
    interval: Option<u32>,
    sensors: Option<String>,
    gps: bool,
    deny_location: bool,
    api_level: Option<u32>,
    duration: Option<u64>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            address,
            port,
            interval,
            sensors,
            gps,
            deny_location,
            api_level,
            duration,
        } => {
            cmd_start(StartOptions {
                address,
                port,
                interval,
                sensors,
                gps,
                deny_location,
                api_level: Some(api_level),
                duration,
            });
        }
        Commands::Boot => {
            cmd_boot();
        }
        Commands::Sensors => {
            cmd_sensors();
        }
        Commands::Select { sensors } => {
            cmd_select(&sensors);
        }
        Commands::Set {
            address,
            port,
            interval,
            gps,
            boot,
        } => {
            cmd_set(address, port, interval, gps, boot);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Listen { port, count } => {
            cmd_listen(port, count);
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sensor_streamer=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Runtime for settings file I/O.
fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: could not create runtime: {e}");
            std::process::exit(1);
        }
    }
}

fn load_settings(rt: &tokio::runtime::Runtime, store: &SettingsStore) -> Settings {
    rt.block_on(store.load()).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load settings, using defaults: {e}");
        Settings::default()
    })
}

fn cmd_start(options: StartOptions) {
    println!("Sensor Streamer v{VERSION}");
    println!();

    let rt = runtime();
    let store = SettingsStore::open_default();
    let persisted = load_settings(&rt, &store);

    let mut settings = persisted.clone();
    if let Some(address) = options.address {
        settings.ip_address = address;
    }
    if let Some(port) = options.port {
        settings.port_no = port;
    }
    if let Some(interval) = options.interval {
        settings.sampling_rate = interval;
    }
    if let Some(ref sensors) = options.sensors {
        settings.selected_sensors = parse_sensor_list(sensors);
    }
    if options.gps {
        settings.gps_streaming = true;
    }

    let capabilities = options
        .api_level
        .map(LocationCapabilities::for_api_level)
        .unwrap_or_else(LocationCapabilities::all);
    let device = Arc::new(SimulatedDevice::with_capabilities(capabilities));

    let config = match settings.resolve(device.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("Starting stream...");
    println!("  Destination: {}:{}", config.address, config.port);
    println!("  Sampling interval: {}us", config.sampling_interval_micros);
    if config.sensors.is_empty() {
        println!("  Sensors: none selected");
    } else {
        println!("  Sensors: {}", config.sensor_types().join(", "));
    }
    println!(
        "  GPS: {}",
        if config.gps_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let stats =
        create_shared_stats_with_persistence(SettingsStore::data_dir().join("stats.json"));
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let session = StreamingSession::builder(device.clone())
        .permissions(Arc::new(StaticPermission(!options.deny_location)))
        .observer(Arc::new(LoggingObserver))
        .observer(Arc::new(events_tx))
        .stats(stats.clone())
        .build();

    if let Err(e) = session.start(config) {
        eprintln!("Error starting stream: {e}");
        std::process::exit(1);
    }
    println!(
        "  Location Permission: {}",
        permission_label(&StaticPermission(!options.deny_location))
    );
    if let Some(target) = session.current_target() {
        println!("  Resolved destination: {target}");
    }
    if settings.gps_streaming && !session.is_location_streaming() {
        eprintln!("Warning: location unavailable, streaming without GPS");
    } else if session.is_location_streaming() {
        let caps = device.capabilities();
        println!(
            "  Location fields: extended accuracy {}, realtime uncertainty {}, realtime age {}",
            caps.extended_accuracy, caps.realtime_uncertainty, caps.realtime_age
        );
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let started = Instant::now();
    let limit = options.duration.map(Duration::from_secs);
    let mut last_settings_check = Instant::now();
    let mut last_seen = persisted;

    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        match events_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(LifecycleEvent::Error(cause)) => {
                eprintln!("Streaming stopped: {cause}");
                break;
            }
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        // Pick up `sensor-streamer select` from another process
        if last_settings_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(current) = rt.block_on(store.load()) {
                if current.selected_sensors != last_seen.selected_sensors {
                    let sensors = current
                        .selected_sensors
                        .iter()
                        .filter_map(|t| device.find(t))
                        .collect::<Vec<_>>();
                    match session.change_sensors(sensors) {
                        Ok(()) => {
                            let types = session
                                .current_info()
                                .map(|c| c.sensor_types().join(", "))
                                .unwrap_or_default();
                            println!("Sensor selection changed: [{types}]");
                        }
                        Err(e) => eprintln!("Error changing sensors: {e}"),
                    }
                }
                if current.ip_address != last_seen.ip_address || current.port_no != last_seen.port_no
                {
                    println!(
                        "Destination changed to {}:{}; restart to apply",
                        current.ip_address, current.port_no
                    );
                }
                last_seen = current;
            }
            last_settings_check = Instant::now();
        }
    }

    println!();
    println!("Stopping stream...");
    session.stop();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

fn cmd_boot() {
    let rt = runtime();
    let store = SettingsStore::open_default();
    let settings = load_settings(&rt, &store);

    if !settings.stream_on_boot {
        println!("Streaming on boot is disabled. Enable with 'sensor-streamer set --boot true'.");
        return;
    }
    drop(rt);
    cmd_start(StartOptions::default());
}

fn cmd_sensors() {
    let rt = runtime();
    let settings = load_settings(&rt, &SettingsStore::open_default());
    let device = SimulatedDevice::new();

    println!("Available Sensors");
    println!("=================");
    println!();
    for sensor in device.selectable_sensors() {
        let selected = settings
            .selected_sensors
            .iter()
            .any(|t| sensor.matches_type(t));
        println!(
            "{} {:<36} {:<32} {:?}",
            if selected { "*" } else { " " },
            sensor.string_type,
            sensor.name,
            sensor.reporting_mode
        );
    }
    println!();
    println!("* = selected");
}

fn cmd_select(csv: &str) {
    let device = SimulatedDevice::new();
    let mut types = Vec::new();
    for requested in parse_sensor_list(csv) {
        match device.find(&requested) {
            Some(sensor) => types.push(sensor.string_type),
            None => eprintln!("Warning: '{requested}' is not available, skipping"),
        }
    }

    let rt = runtime();
    let store = SettingsStore::open_default();
    match rt.block_on(store.update(|s| s.selected_sensors = types.clone())) {
        Ok(_) if types.is_empty() => println!("Sensor selection cleared."),
        Ok(_) => println!("Selected: {}", types.join(", ")),
        Err(e) => {
            eprintln!("Error saving settings: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_set(
    address: Option<String>,
    port: Option<u32>,
    interval: Option<u32>,
    gps: Option<bool>,
    boot: Option<bool>,
) {
    let rt = runtime();
    let store = SettingsStore::open_default();
    let result = rt.block_on(store.update(|s| {
        if let Some(address) = address {
            s.ip_address = address;
        }
        if let Some(port) = port {
            s.port_no = port;
        }
        if let Some(interval) = interval {
            s.sampling_rate = interval;
        }
        if let Some(gps) = gps {
            s.gps_streaming = gps;
        }
        if let Some(boot) = boot {
            s.stream_on_boot = boot;
        }
    }));

    match result {
        Ok(settings) => {
            println!("Settings saved.");
            println!(
                "  Destination: {}:{}  interval: {}us  gps: {}  boot: {}",
                settings.ip_address,
                settings.port_no,
                settings.sampling_rate,
                settings.gps_streaming,
                settings.stream_on_boot
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let rt = runtime();
    let settings = load_settings(&rt, &SettingsStore::open_default());

    println!("Sensor Streamer Status");
    println!("======================");
    println!();
    println!(
        "Location Permission: {} by default (`start --deny-location` withholds it)",
        permission_label(&StaticPermission::granted())
    );
    println!();

    println!("Settings:");
    println!("  Destination: {}:{}", settings.ip_address, settings.port_no);
    println!("  Sampling interval: {}us", settings.sampling_rate);
    if settings.selected_sensors.is_empty() {
        println!("  Sensors: none selected");
    } else {
        println!("  Sensors: {}", settings.selected_sensors.join(", "));
    }
    println!("  GPS streaming: {}", settings.gps_streaming);
    println!("  Stream on boot: {}", settings.stream_on_boot);
    println!();

    let stats_path = SettingsStore::data_dir().join("stats.json");
    if stats_path.exists() {
        let s = StreamStats::with_persistence(stats_path).snapshot();
        println!("Cumulative Statistics:");
        println!("  Sensor records sent: {}", s.samples_sent);
        println!("  Location records sent: {}", s.fixes_sent);
        println!("  Bytes sent: {}", s.bytes_sent);
        println!("  Sessions started: {}", s.sessions_started);
        println!("  Transport failures: {}", s.transport_failures);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let rt = runtime();
    let store = SettingsStore::open_default();
    let settings = load_settings(&rt, &store);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", store.path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&settings).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_listen(port: u16, count: Option<usize>) {
    let socket = match UdpSocket::bind(("0.0.0.0", port)) {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Error: could not bind port {port}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = socket.set_read_timeout(Some(Duration::from_millis(200))) {
        eprintln!("Warning: could not set read timeout: {e}");
    }

    println!("Listening on 0.0.0.0:{port} (Ctrl+C to stop)");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut buf = vec![0u8; 65_536];
    let mut received = 0usize;
    while running.load(Ordering::SeqCst) && count.map_or(true, |n| received < n) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                received += 1;
                println!("[{from}] {}", String::from_utf8_lossy(&buf[..n]));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                eprintln!("Receive failed: {e}");
                break;
            }
        }
    }

    println!();
    println!("Received {received} datagram(s)");
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }
}

fn permission_label(oracle: &dyn PermissionOracle) -> &'static str {
    if oracle.is_location_permission_granted() {
        "granted"
    } else {
        "denied"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_label_follows_oracle() {
        assert_eq!(permission_label(&StaticPermission::granted()), "granted");
        assert_eq!(permission_label(&StaticPermission(false)), "denied");
    }
}
