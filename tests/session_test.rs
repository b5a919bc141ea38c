//! Integration tests for the streaming session against a loopback receiver

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sensor_streamer::{
    LifecycleEvent, PushRegistry, SensorCatalog, SensorSample, SimulatedDevice, StaticPermission,
    StreamingConfiguration, StreamingSession,
};

fn receiver() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set timeout");
    let port = socket.local_addr().expect("local addr").port();
    (socket, port)
}

fn recv_json(socket: &UdpSocket) -> Option<serde_json::Value> {
    let mut buf = [0u8; 4096];
    let (n, _) = socket.recv_from(&mut buf).ok()?;
    serde_json::from_slice(&buf[..n]).ok()
}

fn config_for(
    catalog: &dyn SensorCatalog,
    port: u16,
    types: &[&str],
    gps: bool,
) -> StreamingConfiguration {
    let sensors = types.iter().filter_map(|t| catalog.find(t)).collect();
    StreamingConfiguration::new("127.0.0.1", u32::from(port), 20_000, sensors, gps)
        .expect("valid configuration")
}

#[test]
fn test_one_sample_one_datagram() {
    let registry = Arc::new(PushRegistry::new(sensor_streamer::sensors::simulated::reference_sensors()));
    let session = StreamingSession::builder(registry.clone()).build();
    let (rx, port) = receiver();

    session
        .start(config_for(registry.as_ref(), port, &["android.sensor.accelerometer"], false))
        .expect("start");

    assert!(registry.push_sample(SensorSample::new(
        "android.sensor.accelerometer",
        123,
        vec![1.0, 2.0, 3.0],
    )));

    let record = recv_json(&rx).expect("one datagram");
    assert_eq!(record["type"], "android.sensor.accelerometer");
    assert_eq!(record["timestamp"], 123);
    let values: Vec<f64> = record["values"]
        .as_array()
        .expect("values array")
        .iter()
        .filter_map(|v| v.as_f64())
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);

    // Exactly one
    rx.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    assert!(recv_json(&rx).is_none());

    session.stop();
}

#[test]
fn test_location_fix_shape() {
    let registry = Arc::new(PushRegistry::new(Vec::new()));
    let session = StreamingSession::builder(registry.clone())
        .permissions(Arc::new(StaticPermission::granted()))
        .build();
    let (rx, port) = receiver();

    session
        .start(config_for(registry.as_ref(), port, &[], true))
        .expect("start");
    assert!(session.is_location_streaming());

    assert!(registry.push_fix(sensor_streamer::LocationSample {
        longitude: 73.05,
        latitude: 33.68,
        altitude: 540.0,
        time: 1_700_000_000_000,
        ..Default::default()
    }));

    let record = recv_json(&rx).expect("fix datagram");
    assert_eq!(record["type"], "android.gps");
    assert_eq!(record["latitude"], 33.68);
    assert_eq!(record["time"], 1_700_000_000_000_i64);
    assert!(record.get("verticalAccuracyMeters").is_none());

    session.stop();
}

#[test]
fn test_start_stop_leaves_nothing_behind() {
    let device = Arc::new(SimulatedDevice::new());
    let session = StreamingSession::builder(device.clone()).build();
    let (_rx, port) = receiver();

    for _ in 0..3 {
        session
            .start(config_for(
                device.as_ref(),
                port,
                &["android.sensor.accelerometer", "android.sensor.gyroscope"],
                true,
            ))
            .expect("start");
        assert_eq!(device.active_subscriptions().len(), 2);
        assert!(device.is_location_active());

        session.stop();
        assert!(device.active_subscriptions().is_empty());
        assert!(!device.is_location_active());
        assert!(!session.is_active());
    }
}

#[test]
fn test_simulated_device_streams_to_receiver() {
    let device = Arc::new(SimulatedDevice::new());
    let session = StreamingSession::builder(device.clone()).build();
    let (rx, port) = receiver();

    session
        .start(config_for(device.as_ref(), port, &["android.sensor.gyroscope"], false))
        .expect("start");

    let record = recv_json(&rx).expect("datagram from simulated gyroscope");
    assert_eq!(record["type"], "android.sensor.gyroscope");
    assert_eq!(record["values"].as_array().map(Vec::len), Some(3));

    session.stop();
    assert!(session.stats().snapshot().samples_sent >= 1);
}

#[test]
fn test_send_failure_auto_stops() {
    let registry = Arc::new(PushRegistry::new(sensor_streamer::sensors::simulated::reference_sensors()));
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let session = StreamingSession::builder(registry.clone())
        .observer(Arc::new(events_tx))
        .build();

    // Broadcast without SO_BROADCAST is refused by the OS on send
    let config = StreamingConfiguration::new(
        "255.255.255.255",
        9999,
        20_000,
        registry.find("android.sensor.light").into_iter().collect(),
        false,
    )
    .expect("valid configuration");
    session.start(config).expect("start");
    assert!(matches!(events_rx.recv().unwrap(), LifecycleEvent::Started(_)));

    for ts in 0..5 {
        registry.push_sample(SensorSample::new("android.sensor.light", ts, vec![10.0]));
    }

    let event = events_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("error event");
    assert!(matches!(event, LifecycleEvent::Error(_)));
    assert_eq!(
        events_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        LifecycleEvent::Stopped
    );
    assert!(events_rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert!(!session.is_active());
    assert!(registry.subscribed().is_empty());
    assert_eq!(session.stats().snapshot().transport_failures, 1);
}

#[test]
fn test_change_sensors_under_concurrent_delivery() {
    let registry = Arc::new(PushRegistry::new(sensor_streamer::sensors::simulated::reference_sensors()));
    let session = StreamingSession::builder(registry.clone()).build();
    let (rx, port) = receiver();
    rx.set_read_timeout(Some(Duration::from_millis(300))).unwrap();

    let accel = "android.sensor.accelerometer";
    let gyro = "android.sensor.gyroscope";
    session
        .start(config_for(registry.as_ref(), port, &[accel, gyro], false))
        .expect("start");

    let running = Arc::new(AtomicBool::new(true));
    let clock = Arc::new(AtomicI64::new(0));
    let producer = {
        let registry = registry.clone();
        let running = running.clone();
        let clock = clock.clone();
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let ts = clock.fetch_add(1, Ordering::SeqCst);
                registry.push_sample(SensorSample::new(accel, ts, vec![0.0, 0.0, 9.8]));
                registry.push_sample(SensorSample::new(gyro, ts, vec![0.1, 0.2, 0.3]));
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    // Toggle accelerometer in and out while samples flow
    let only_gyro: Vec<_> = registry.find(gyro).into_iter().collect();
    let both: Vec<_> = [accel, gyro].iter().filter_map(|t| registry.find(t)).collect();
    for _ in 0..20 {
        session.change_sensors(only_gyro.clone()).expect("change");
        session.change_sensors(both.clone()).expect("change");
    }

    // Every accelerometer sample stamped after this point was pushed after removal
    session.change_sensors(only_gyro).expect("change");
    let removed_at = clock.load(Ordering::SeqCst);
    assert_eq!(registry.subscribed(), vec![gyro]);

    let mut late_gyro = 0;
    let watch_until = Instant::now() + Duration::from_millis(500);
    while Instant::now() < watch_until {
        if let Some(record) = recv_json(&rx) {
            let ts = record["timestamp"].as_i64().unwrap_or(-1);
            if record["type"] == accel {
                assert!(ts < removed_at, "removed sensor delivered at ts {ts}");
            } else if ts > removed_at {
                late_gyro += 1;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    producer.join().expect("producer thread");
    session.stop();

    assert!(late_gyro > 0, "kept sensor stopped streaming");
}
