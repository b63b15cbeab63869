//! Control-loss detection through the privilege monitor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camdev::fake::{FakeCameraConfig, FakeDevice};
use camdev::{ControlLost, ControlMonitor, Device, MonitorConfig};

fn config() -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_millis(10),
        max_failures: 3,
        ..MonitorConfig::default()
    }
}

fn device() -> Arc<FakeDevice> {
    Arc::new(FakeDevice::new(FakeCameraConfig::default()).expect("create fake device"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn revoked_privilege_fires_control_lost_once() {
    let device = device();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    device.control_lost().connect(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut events = device.control_lost().subscribe();

    let monitor = ControlMonitor::spawn(Arc::clone(&device), config());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    device.camera().revoke_control();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("control lost in time")
        .expect("event");
    assert_eq!(event, ControlLost);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(monitor.is_finished());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(device.control_lost().emitted(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_device_counts_as_lost() {
    let device = device();
    let mut events = device.control_lost().subscribe();
    let _monitor = ControlMonitor::spawn(Arc::clone(&device), config());

    device.camera().set_io_failure(true);
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("control lost in time")
        .expect("event");
    assert_eq!(device.control_lost().emitted(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_monitor_stays_quiet() {
    let device = device();
    let monitor = ControlMonitor::spawn(Arc::clone(&device), config());
    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.stop().await;

    device.camera().revoke_control();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.control_lost().emitted(), 0);
}

#[tokio::test]
async fn works_with_trait_objects() {
    let device: Arc<dyn Device> = device();
    let monitor = ControlMonitor::spawn(Arc::clone(&device), config());
    assert!(!monitor.is_finished());
    monitor.stop().await;
}
