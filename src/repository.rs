use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, RingError},
    sdk::{RingSdk, SdkConnectionState, SdkDevice, SdkHealthSnapshot},
    types::{
        BloodPressure, ConnectionStatus, HealthMetric, MacAddress, Ring, RingConfig,
        RingHealthData, ScanStatus, SleepSummary, UNKNOWN_RING_NAME,
    },
};

/// Domain-level view of the ring and its radio
///
/// This is the seam the use cases depend on; [`SdkRingRepository`] is the
/// implementation backed by a device SDK.
#[async_trait]
pub trait RingRepository: Send + Sync {
    /// Scan for `duration_secs` seconds and return every ring seen
    async fn start_scan(&self, duration_secs: u64) -> Result<Vec<Ring>>;

    /// Stop a running scan and reset the scan state to idle
    async fn stop_scan(&self);

    /// Connect to the ring at `mac_address`
    async fn connect(&self, mac_address: &str, name: Option<&str>) -> Result<Ring>;

    /// Disconnect the current ring
    async fn disconnect(&self) -> Result<()>;

    /// Last reported battery percentage
    fn get_battery(&self) -> Result<u8>;

    /// Check if a ring is connected
    fn is_connected(&self) -> bool;

    /// The connected ring, if any
    fn connected_ring(&self) -> Option<Ring>;

    /// Latest health snapshot
    fn health_data(&self) -> RingHealthData;

    /// Start an on-demand measurement on the connected ring
    async fn start_measurement(&self, metric: HealthMetric) -> Result<()>;

    /// Stop an on-demand measurement on the connected ring
    async fn stop_measurement(&self, metric: HealthMetric) -> Result<()>;

    /// Ask the connected ring for its stored sleep history
    async fn request_sleep_history(&self) -> Result<()>;

    /// Observe the connection state
    fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus>;

    /// Observe the scan state
    fn subscribe_scan(&self) -> watch::Receiver<ScanStatus>;

    /// Observe the rings seen so far by the current or last scan
    ///
    /// Updates while a scan is running without moving the scan state.
    fn subscribe_discovered(&self) -> watch::Receiver<Vec<Ring>>;

    /// Observe the health snapshot
    fn subscribe_health(&self) -> watch::Receiver<RingHealthData>;
}

/// Ring repository backed by a [`RingSdk`]
///
/// Owns the domain state containers and keeps them in step with the
/// SDK through background observers that live as long as the repository.
///
/// # Connection attempts
///
/// Only one [`connect`](RingRepository::connect) may be in flight per
/// repository. A second call made while an attempt is pending fails
/// immediately with [`RingError::ConnectionInProgress`]; the first attempt
/// is left untouched.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ringlink::{BleRingSdk, RingConfig, RingRepository, SdkRingRepository};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RingConfig::default();
///     let sdk = Arc::new(BleRingSdk::new(&config).await?);
///     let repository = SdkRingRepository::new(sdk, config);
///
///     let rings = repository.start_scan(5).await?;
///     if let Some(ring) = rings.first() {
///         repository.connect(&ring.mac_address, Some(&ring.name)).await?;
///         println!("Battery: {}%", repository.get_battery().unwrap_or(0));
///     }
///     Ok(())
/// }
/// ```
pub struct SdkRingRepository<S: RingSdk> {
    sdk: Arc<S>,
    config: RingConfig,
    connection: Arc<watch::Sender<ConnectionStatus>>,
    scan: Arc<watch::Sender<ScanStatus>>,
    discovered: Arc<watch::Sender<Vec<Ring>>>,
    health: Arc<watch::Sender<RingHealthData>>,
    connect_guard: Mutex<()>,
    observers: Vec<JoinHandle<()>>,
}

impl<S: RingSdk> SdkRingRepository<S> {
    /// Create a repository and start observing the SDK
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime, since the SDK observers
    /// are spawned as tasks.
    pub fn new(sdk: Arc<S>, config: RingConfig) -> Self {
        let connection = Arc::new(watch::Sender::new(ConnectionStatus::Disconnected));
        let scan = Arc::new(watch::Sender::new(ScanStatus::Idle));
        let discovered = Arc::new(watch::Sender::new(Vec::new()));
        let health = Arc::new(watch::Sender::new(RingHealthData::default()));

        let observers = vec![
            tokio::spawn(observe_connection(
                sdk.connection_state(),
                connection.clone(),
            )),
            tokio::spawn(observe_scan_results(
                sdk.scan_results(),
                scan.clone(),
                discovered.clone(),
            )),
            tokio::spawn(observe_health(sdk.health_snapshot(), health.clone())),
        ];

        Self {
            sdk,
            config,
            connection,
            scan,
            discovered,
            health,
            connect_guard: Mutex::new(()),
            observers,
        }
    }

    /// Repository configuration
    #[must_use]
    pub const fn config(&self) -> &RingConfig {
        &self.config
    }

    async fn run_scan(&self, duration_secs: u64) -> Result<Vec<Ring>> {
        self.sdk.start_scan().await?;

        sleep(Duration::from_secs(duration_secs)).await;

        let rings = {
            let results = self.sdk.scan_results();
            let devices = results.borrow();
            devices.iter().map(map_device).collect::<Vec<_>>()
        };

        // stop_scan() already stopped the SDK and reset the state
        if self.is_scanning() {
            if let Err(e) = self.sdk.stop_scan().await {
                warn!("Failed to stop scan after {}s window: {}", duration_secs, e);
            }
        }

        Ok(rings)
    }

    fn is_scanning(&self) -> bool {
        matches!(*self.scan.borrow(), ScanStatus::Scanning)
    }

    /// Publish the connected ring, unless the SDK dropped the link after
    /// confirming it
    ///
    /// The check runs under the connection state's write lock, so a
    /// `Disconnected` observed later still replaces the published ring.
    fn publish_connected(&self, ring: &Ring, mac: &MacAddress) -> bool {
        self.connection.send_if_modified(|status| {
            let linked = matches!(
                &*self.sdk.connection_state().borrow(),
                SdkConnectionState::Connected(d) if same_address(&d.address, mac)
            );
            if linked {
                *status = ConnectionStatus::Connected(ring.clone());
            }
            linked
        })
    }

    async fn await_connected(&self, mac: &MacAddress) -> Result<SdkDevice> {
        let mut state = self.sdk.connection_state();
        self.sdk.connect(&mac.to_string()).await?;

        let confirmed = {
            let confirmed = state
                .wait_for(|s| {
                    matches!(s, SdkConnectionState::Connected(d) if same_address(&d.address, mac))
                })
                .await
                .map_err(|_| {
                    RingError::ConnectionFailed("Device SDK stopped reporting state".to_string())
                })?;
            confirmed.clone()
        };

        match confirmed {
            SdkConnectionState::Connected(device) => Ok(device),
            other => Err(RingError::ConnectionFailed(format!(
                "Unexpected SDK state {other:?}"
            ))),
        }
    }

    fn require_connection(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RingError::NotConnected)
        }
    }
}

#[async_trait]
impl<S: RingSdk> RingRepository for SdkRingRepository<S> {
    async fn start_scan(&self, duration_secs: u64) -> Result<Vec<Ring>> {
        info!("Scanning for rings ({}s)", duration_secs);
        self.discovered.send_replace(Vec::new());
        self.scan.send_replace(ScanStatus::Scanning);

        let result = self.run_scan(duration_secs).await;
        let terminal = match &result {
            Ok(rings) => ScanStatus::DevicesFound(rings.clone()),
            Err(e) => ScanStatus::Error(e.to_string()),
        };

        // Exactly one terminal state per scan, and none once stop_scan() ran
        let published = self.scan.send_if_modified(|status| {
            if matches!(status, ScanStatus::Scanning) {
                *status = terminal;
                true
            } else {
                false
            }
        });

        match &result {
            Ok(rings) if published => {
                info!("Scan completed. Found {} ring(s)", rings.len());
                self.discovered
                    .send_if_modified(|current| replace_if_changed(current, rings.clone()));
            }
            Ok(_) => debug!("Scan was stopped before its window closed"),
            Err(e) => error!("Scan failed: {}", e),
        }
        result
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.sdk.stop_scan().await {
            warn!("Device SDK failed to stop scan: {}", e);
        }
        self.scan.send_replace(ScanStatus::Idle);
        debug!("Scan state reset to idle");
    }

    async fn connect(&self, mac_address: &str, name: Option<&str>) -> Result<Ring> {
        let Ok(_attempt) = self.connect_guard.try_lock() else {
            warn!("Rejecting connect to {}: attempt already in progress", mac_address);
            return Err(RingError::ConnectionInProgress);
        };

        let mac: MacAddress = mac_address.parse()?;
        let pending = Ring::pending(&mac, name);
        let timeout_ms = self.config.connect_timeout_ms;

        info!("Connecting to {} ({})", pending.name, pending.mac_address);
        self.connection.send_replace(ConnectionStatus::Connecting);

        match timeout(Duration::from_millis(timeout_ms), self.await_connected(&mac)).await {
            Ok(Ok(device)) => {
                let ring = confirm_ring(pending, &device, name.is_some());
                if !self.publish_connected(&ring, &mac) {
                    warn!("Link to {} dropped right after it was confirmed", mac);
                    return Err(RingError::ConnectionFailed(
                        "Link dropped before the connection was published".to_string(),
                    ));
                }
                info!("Connected to {} ({})", ring.name, ring.mac_address);
                Ok(ring)
            }
            Ok(Err(e)) => {
                error!("Connection to {} failed: {}", mac, e);
                self.connection
                    .send_replace(ConnectionStatus::Error(e.to_string()));
                Err(e)
            }
            Err(_) => {
                warn!("Connection to {} timed out after {}ms", mac, timeout_ms);
                self.connection.send_replace(ConnectionStatus::Timeout);
                Err(RingError::Timeout { timeout_ms })
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting ring");
        let result = self.sdk.disconnect().await;

        self.connection
            .send_replace(ConnectionStatus::Disconnected);

        if let Err(e) = &result {
            error!("Device SDK failed to disconnect: {}", e);
        }
        result
    }

    fn get_battery(&self) -> Result<u8> {
        // A genuine 0% reading is indistinguishable from "never reported"
        match self.health.borrow().battery {
            Some(level) if level > 0 => Ok(level),
            _ => Err(RingError::DataUnavailable("Battery level")),
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.borrow().is_connected()
    }

    fn connected_ring(&self) -> Option<Ring> {
        self.connection.borrow().ring().cloned()
    }

    fn health_data(&self) -> RingHealthData {
        self.health.borrow().clone()
    }

    async fn start_measurement(&self, metric: HealthMetric) -> Result<()> {
        self.require_connection()?;
        info!("Starting {} measurement", metric);
        self.sdk.start_measurement(metric).await
    }

    async fn stop_measurement(&self, metric: HealthMetric) -> Result<()> {
        self.require_connection()?;
        info!("Stopping {} measurement", metric);
        self.sdk.stop_measurement(metric).await
    }

    async fn request_sleep_history(&self) -> Result<()> {
        self.require_connection()?;
        info!("Requesting sleep history");
        self.sdk.request_sleep_history().await
    }

    fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    fn subscribe_scan(&self) -> watch::Receiver<ScanStatus> {
        self.scan.subscribe()
    }

    fn subscribe_discovered(&self) -> watch::Receiver<Vec<Ring>> {
        self.discovered.subscribe()
    }

    fn subscribe_health(&self) -> watch::Receiver<RingHealthData> {
        self.health.subscribe()
    }
}

impl<S: RingSdk> Drop for SdkRingRepository<S> {
    fn drop(&mut self) {
        for observer in &self.observers {
            observer.abort();
        }
    }
}

async fn observe_connection(
    mut source: watch::Receiver<SdkConnectionState>,
    target: Arc<watch::Sender<ConnectionStatus>>,
) {
    loop {
        let state = source.borrow_and_update().clone();
        target.send_if_modified(|current| match &state {
            // Keep the record built by connect(), which may carry a user-supplied name
            SdkConnectionState::Connected(device)
                if current.ring().is_some_and(|r| same_ring(r, &device.address)) =>
            {
                false
            }
            _ => replace_if_changed(current, map_connection_state(&state)),
        });

        if source.changed().await.is_err() {
            debug!("Connection state source closed");
            break;
        }
    }
}

async fn observe_scan_results(
    mut source: watch::Receiver<Vec<SdkDevice>>,
    scan: Arc<watch::Sender<ScanStatus>>,
    target: Arc<watch::Sender<Vec<Ring>>>,
) {
    while source.changed().await.is_ok() {
        let rings: Vec<Ring> = source.borrow_and_update().iter().map(map_device).collect();
        let scanning = matches!(*scan.borrow(), ScanStatus::Scanning);
        if rings.is_empty() || !scanning {
            continue;
        }

        target.send_if_modified(|current| replace_if_changed(current, rings));
    }
    debug!("Scan result source closed");
}

async fn observe_health(
    mut source: watch::Receiver<SdkHealthSnapshot>,
    target: Arc<watch::Sender<RingHealthData>>,
) {
    loop {
        let snapshot = map_health(&source.borrow_and_update());
        target.send_if_modified(|current| replace_if_changed(current, snapshot));

        if source.changed().await.is_err() {
            debug!("Health snapshot source closed");
            break;
        }
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

fn canonical_address(address: &str) -> String {
    address
        .parse::<MacAddress>()
        .map_or_else(|_| address.to_string(), |mac| mac.to_string())
}

fn same_address(address: &str, mac: &MacAddress) -> bool {
    address.parse::<MacAddress>().is_ok_and(|parsed| parsed == *mac)
}

fn same_ring(ring: &Ring, address: &str) -> bool {
    ring.same_device(&canonical_address(address))
}

fn map_device(device: &SdkDevice) -> Ring {
    Ring::new(
        canonical_address(&device.address),
        device
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_RING_NAME.to_string()),
        device.rssi.unwrap_or(0),
    )
}

fn map_connection_state(state: &SdkConnectionState) -> ConnectionStatus {
    match state {
        SdkConnectionState::Disconnected => ConnectionStatus::Disconnected,
        SdkConnectionState::Connecting => ConnectionStatus::Connecting,
        SdkConnectionState::Connected(device) => {
            ConnectionStatus::Connected(map_device(device).connected())
        }
    }
}

fn map_health(snapshot: &SdkHealthSnapshot) -> RingHealthData {
    let (systolic, diastolic) = snapshot.blood_pressure.unwrap_or_default();
    let [deep_minutes, light_minutes, rem_minutes, awake_minutes] =
        snapshot.sleep_minutes.unwrap_or_default();

    RingHealthData {
        battery: snapshot.battery,
        heart_rate: snapshot.heart_rate.unwrap_or(0),
        spo2: snapshot.spo2.unwrap_or(0),
        blood_pressure: BloodPressure {
            systolic,
            diastolic,
        },
        stress: snapshot.stress.unwrap_or(0),
        steps: snapshot.steps.unwrap_or(0),
        distance_meters: snapshot.distance_meters.unwrap_or(0),
        calories: snapshot.calories.unwrap_or(0),
        sleep: SleepSummary {
            deep_minutes,
            light_minutes,
            rem_minutes,
            awake_minutes,
        },
        last_updated: snapshot.updated_at,
    }
}

/// Turn the pending record into its connected variant, filling in what the
/// SDK learned about the device
fn confirm_ring(pending: Ring, device: &SdkDevice, keep_name: bool) -> Ring {
    let name = match (&device.name, keep_name) {
        (Some(reported), false) => reported.clone(),
        _ => pending.name.clone(),
    };

    Ring {
        name,
        rssi: device.rssi.unwrap_or(pending.rssi),
        ..pending
    }
    .connected()
}
