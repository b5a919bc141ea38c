//! Demonstration of the sensor streaming engine.
//!
//! This example shows how to:
//! 1. Resolve settings against a device catalog
//! 2. Start a streaming session with lifecycle observers
//! 3. Receive the datagrams on a local UDP socket
//! 4. Change the sensor selection while streaming
//!
//! Run with: cargo run --example stream_demo

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sensor_streamer::{
    LifecycleEvent, LoggingObserver, SensorCatalog, Settings, SimulatedDevice, StreamingSession,
};

fn main() {
    println!("Sensor Streamer - Stream Demo");
    println!("=============================");
    println!();

    // Receiver standing in for the desktop side
    let receiver = match UdpSocket::bind("127.0.0.1:0") {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Could not bind receiver: {e}");
            return;
        }
    };
    let port = match receiver.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            eprintln!("Could not read receiver address: {e}");
            return;
        }
    };
    let _ = receiver.set_read_timeout(Some(Duration::from_millis(200)));

    let device = Arc::new(SimulatedDevice::new());
    println!("Selectable sensors:");
    for sensor in device.selectable_sensors() {
        println!("  {} ({})", sensor.string_type, sensor.name);
    }
    println!();

    let settings = Settings {
        port_no: u32::from(port),
        sampling_rate: 100_000,
        selected_sensors: vec![
            "android.sensor.accelerometer".to_string(),
            "android.sensor.light".to_string(),
        ],
        gps_streaming: true,
        ..Default::default()
    };
    let config = match settings.resolve(device.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid settings: {e}");
            return;
        }
    };

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let session = StreamingSession::builder(device.clone())
        .observer(Arc::new(LoggingObserver))
        .observer(Arc::new(events_tx))
        .build();

    if let Err(e) = session.start(config) {
        eprintln!("Error starting session: {e}");
        return;
    }
    if let Ok(LifecycleEvent::Started(info)) = events_rx.try_recv() {
        println!("Streaming {} to 127.0.0.1:{}", info.sensor_types().join(", "), info.port);
    }
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }

    let started = Instant::now();
    let mut switched = false;
    let mut buf = [0u8; 2048];

    while running.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(6) {
        if !switched && started.elapsed() >= Duration::from_secs(3) {
            let gyro: Vec<_> = device.find("android.sensor.gyroscope").into_iter().collect();
            match session.change_sensors(gyro) {
                Ok(()) => println!("--- switched selection to gyroscope ---"),
                Err(e) => eprintln!("Could not change sensors: {e}"),
            }
            switched = true;
        }

        if let Ok((n, _)) = receiver.recv_from(&mut buf) {
            println!("{}", String::from_utf8_lossy(&buf[..n]));
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }

    session.stop();
    println!();
    println!("{}", session.stats().summary());
}
