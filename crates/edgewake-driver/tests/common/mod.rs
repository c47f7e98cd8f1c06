//! Shared fixtures for the driver integration tests.

#![allow(dead_code)]

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use edgewake_core::{DeviceNode, PinSpec};
use edgewake_driver::{ButtonDevice, EdgeEvent, EventHandler, HandlerError};
use edgewake_hardware::mock::{MockPlatform, MockPlatformHandle};
use tokio::sync::mpsc;

/// Pin used by the standard test button.
pub const TEST_PIN: PinSpec = PinSpec {
    controller: 0,
    pin: 17,
    flags: 0,
};

pub const TEST_LABEL: &str = "power-btn";
pub const TEST_DEBOUNCE_MS: u32 = 50;

/// How long a test waits for the worker before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Standard button node: gpio0:17, 50ms debounce, wake allowed.
pub fn button_node() -> DeviceNode {
    DeviceNode::new("button@0")
        .with_string("label", TEST_LABEL)
        .with_u32_array("gpios", vec![TEST_PIN.controller, TEST_PIN.pin, TEST_PIN.flags])
        .with_u32("debounce-interval", TEST_DEBOUNCE_MS)
        .with_flag("wakeup-source", true)
}

/// Forwards every event, and fails or panics once when told to.
pub struct RecordingHandler {
    tx: mpsc::UnboundedSender<EdgeEvent>,
    fail_next: AtomicBool,
    panic_next: AtomicBool,
}

impl RecordingHandler {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

impl EventHandler for RecordingHandler {
    async fn handle(&self, event: EdgeEvent) -> Result<(), HandlerError> {
        let _ = self.tx.send(event);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("recording handler told to panic");
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("recording handler told to fail".into());
        }
        Ok(())
    }
}

pub type TestDevice = ButtonDevice<MockPlatform, RecordingHandler>;

pub type Events = mpsc::UnboundedReceiver<EdgeEvent>;

/// Fresh, unattached device on a fresh mock platform.
pub fn new_device() -> (TestDevice, MockPlatformHandle, Events) {
    let (platform, handle) = MockPlatform::new();
    let (device, rx) = device_on(platform);
    (device, handle, rx)
}

/// Unattached device sharing an existing platform with other devices.
pub fn device_on(platform: MockPlatform) -> (TestDevice, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = RecordingHandler {
        tx,
        fail_next: AtomicBool::new(false),
        panic_next: AtomicBool::new(false),
    };
    (ButtonDevice::new(platform, handler), rx)
}

/// Standard node with its `gpios` cells replaced.
pub fn node_on(pin: PinSpec) -> DeviceNode {
    button_node().with_u32_array("gpios", vec![pin.controller, pin.pin, pin.flags])
}

/// Device attached with [`button_node`].
pub async fn attached_device() -> (TestDevice, MockPlatformHandle, Events) {
    let (device, handle, rx) = new_device();
    device
        .attach(&button_node())
        .await
        .expect("attach with the standard node should succeed");
    (device, handle, rx)
}

/// Wait for the next handler run.
pub async fn next_event(rx: &mut Events) -> EdgeEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for the worker")
        .expect("event channel closed")
}

/// Let every ready task run, then assert that no further event arrived.
pub async fn assert_no_event(rx: &mut Events) {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(rx.try_recv().is_err(), "unexpected extra handler run");
}
