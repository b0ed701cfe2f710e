//! Scripted in-memory device SDK used by the unit tests.

use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::watch;

use crate::{
    error::{Result, RingError},
    sdk::{RingSdk, SdkConnectionState, SdkDevice, SdkHealthSnapshot},
    types::HealthMetric,
};

pub(crate) fn sample_device(address: &str, name: &str, rssi: i16) -> SdkDevice {
    SdkDevice {
        address: address.to_string(),
        name: Some(name.to_string()),
        rssi: Some(rssi),
    }
}

#[derive(Default)]
struct Script {
    connect_after: Option<Duration>,
    connect_error: Option<String>,
    disconnect_error: Option<String>,
    scan_error: Option<String>,
    stop_scan_fails: bool,
    scan_batches: Vec<(Duration, Vec<SdkDevice>)>,
}

pub(crate) struct FakeRingSdk {
    connection: Arc<watch::Sender<SdkConnectionState>>,
    devices: Arc<watch::Sender<Vec<SdkDevice>>>,
    health: watch::Sender<SdkHealthSnapshot>,
    script: Script,
    calls: Mutex<Vec<String>>,
}

impl FakeRingSdk {
    /// An SDK that finds nothing and never completes a connection
    pub(crate) fn new() -> Self {
        Self {
            connection: Arc::new(watch::Sender::new(SdkConnectionState::Disconnected)),
            devices: Arc::new(watch::Sender::new(Vec::new())),
            health: watch::Sender::new(SdkHealthSnapshot::default()),
            script: Script::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn connects_after(mut self, delay: Duration) -> Self {
        self.script.connect_after = Some(delay);
        self
    }

    pub(crate) fn fails_connect(mut self, message: &str) -> Self {
        self.script.connect_error = Some(message.to_string());
        self
    }

    pub(crate) fn fails_disconnect(mut self, message: &str) -> Self {
        self.script.disconnect_error = Some(message.to_string());
        self
    }

    pub(crate) fn fails_scan(mut self, message: &str) -> Self {
        self.script.scan_error = Some(message.to_string());
        self
    }

    pub(crate) fn fails_stop_scan(mut self) -> Self {
        self.script.stop_scan_fails = true;
        self
    }

    /// Replace the SDK result list `delay` after each scan starts
    ///
    /// Call repeatedly to script several batches within one scan window.
    pub(crate) fn reports_devices_after(mut self, delay: Duration, devices: Vec<SdkDevice>) -> Self {
        self.script.scan_batches.push((delay, devices));
        self
    }

    pub(crate) fn set_health(&self, snapshot: SdkHealthSnapshot) {
        self.health.send_replace(snapshot);
    }

    /// Simulate the ring going out of range
    pub(crate) fn drop_link(&self) {
        self.connection.send_replace(SdkConnectionState::Disconnected);
    }

    /// Report a link to `address` without going through `connect`
    pub(crate) fn report_connected(&self, address: &str) {
        self.connection
            .send_replace(SdkConnectionState::Connected(sample_device(address, "R02", -58)));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RingSdk for FakeRingSdk {
    fn connection_state(&self) -> watch::Receiver<SdkConnectionState> {
        self.connection.subscribe()
    }

    fn scan_results(&self) -> watch::Receiver<Vec<SdkDevice>> {
        self.devices.subscribe()
    }

    fn health_snapshot(&self) -> watch::Receiver<SdkHealthSnapshot> {
        self.health.subscribe()
    }

    async fn start_scan(&self) -> Result<()> {
        self.record("start_scan".to_string());
        if let Some(message) = &self.script.scan_error {
            return Err(RingError::ScanFailed(message.clone()));
        }

        self.devices.send_replace(Vec::new());
        for (delay, devices) in self.script.scan_batches.clone() {
            let sender = self.devices.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sender.send_replace(devices);
            });
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record("stop_scan".to_string());
        if self.script.stop_scan_fails {
            return Err(RingError::Other("scanner busy".to_string()));
        }
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        self.record(format!("connect:{address}"));
        if let Some(message) = &self.script.connect_error {
            return Err(RingError::ConnectionFailed(message.clone()));
        }

        self.connection.send_replace(SdkConnectionState::Connecting);
        if let Some(delay) = self.script.connect_after {
            let sender = self.connection.clone();
            let suffix: String = address.chars().filter(char::is_ascii_hexdigit).skip(8).collect();
            let device = sample_device(address, &format!("R02_{suffix}"), -58);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sender.send_replace(SdkConnectionState::Connected(device));
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect".to_string());
        self.connection.send_replace(SdkConnectionState::Disconnected);
        match &self.script.disconnect_error {
            Some(message) => Err(RingError::Other(message.clone())),
            None => Ok(()),
        }
    }

    async fn start_measurement(&self, metric: HealthMetric) -> Result<()> {
        self.record(format!("start_measurement:{metric:?}"));
        Ok(())
    }

    async fn stop_measurement(&self, metric: HealthMetric) -> Result<()> {
        self.record(format!("stop_measurement:{metric:?}"));
        Ok(())
    }

    async fn request_sleep_history(&self) -> Result<()> {
        self.record("request_sleep_history".to_string());
        Ok(())
    }
}
