use async_trait::async_trait;
use btleplug::{
    api::{
        BDAddr, Central, CentralEvent, CharPropFlags, Characteristic, Manager as _,
        Peripheral as _, ScanFilter,
    },
    platform::{Adapter, Manager, Peripheral},
};
use futures::stream::{Stream, StreamExt};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::SystemTime,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, RingError},
    sdk::{RingSdk, SdkConnectionState, SdkDevice, SdkHealthSnapshot},
    types::{HealthMetric, MacAddress, RingConfig},
};

/// Battery Level characteristic (Battery Service, 0x2A19)
pub const BATTERY_LEVEL_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement characteristic (Heart Rate Service, 0x2A37)
pub const HEART_RATE_MEASUREMENT_CHAR_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

struct SharedState {
    connection: watch::Sender<SdkConnectionState>,
    devices: watch::Sender<Vec<SdkDevice>>,
    health: watch::Sender<SdkHealthSnapshot>,
    scanning: AtomicBool,
}

impl SharedState {
    fn new() -> Self {
        Self {
            connection: watch::Sender::new(SdkConnectionState::Disconnected),
            devices: watch::Sender::new(Vec::new()),
            health: watch::Sender::new(SdkHealthSnapshot::default()),
            scanning: AtomicBool::new(false),
        }
    }
}

/// [`RingSdk`] backed by `btleplug`
///
/// Only standard GATT profiles are spoken: battery level and heart rate
/// come from the Battery and Heart Rate services. Metrics that need a
/// vendor protocol report [`RingError::Unsupported`].
pub struct BleRingSdk {
    central: Adapter,
    state: Arc<SharedState>,
    peripheral: Mutex<Option<Peripheral>>,
    event_task: JoinHandle<()>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleRingSdk {
    /// Open the first Bluetooth adapter and start listening for its events
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Ble`] if the Bluetooth adapter cannot be initialized,
    /// or [`RingError::Other`] if the host has no adapter.
    pub async fn new(config: &RingConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RingError::Other("No Bluetooth adapter available".to_string()))?;

        let events = central.events().await?;
        let state = Arc::new(SharedState::new());
        let event_task = tokio::spawn(handle_central_events(
            central.clone(),
            events,
            state.clone(),
            config.name_filter.clone(),
        ));

        info!("BLE backend ready");

        Ok(Self {
            central,
            state,
            peripheral: Mutex::new(None),
            event_task,
            notification_task: Mutex::new(None),
        })
    }

    async fn find_peripheral(&self, address: BDAddr) -> Result<Peripheral> {
        self.central
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == address)
            .ok_or_else(|| RingError::ConnectionFailed(format!("Device {address} not found")))
    }

    async fn establish(&self, peripheral: &Peripheral, mac: &MacAddress) -> Result<SdkDevice> {
        peripheral
            .connect()
            .await
            .map_err(|e| RingError::ConnectionFailed(e.to_string()))?;
        peripheral.discover_services().await?;

        let properties = peripheral.properties().await?.unwrap_or_default();
        let device = SdkDevice {
            address: mac.to_string(),
            name: properties.local_name,
            rssi: properties.rssi,
        };

        self.start_notifications(peripheral).await?;
        Ok(device)
    }

    async fn start_notifications(&self, peripheral: &Peripheral) -> Result<()> {
        if let Some(battery) = find_characteristic(peripheral, BATTERY_LEVEL_CHAR_UUID) {
            let value = peripheral.read(&battery).await?;
            if let Some(&level) = value.first() {
                debug!("Battery level: {}%", level);
                record_battery(&self.state, level);
            }
            if battery.properties.contains(CharPropFlags::NOTIFY) {
                peripheral.subscribe(&battery).await?;
            }
        }

        let stream = peripheral.notifications().await?;
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(data) = stream.next().await {
                if data.uuid == BATTERY_LEVEL_CHAR_UUID {
                    if let Some(&level) = data.value.first() {
                        record_battery(&state, level);
                    }
                } else if data.uuid == HEART_RATE_MEASUREMENT_CHAR_UUID {
                    if let Some(bpm) = parse_heart_rate_measurement(&data.value) {
                        state.health.send_modify(|snapshot| {
                            snapshot.heart_rate = Some(bpm);
                            snapshot.updated_at = Some(SystemTime::now());
                        });
                    }
                }
            }
            debug!("Notification stream ended");
        });

        if let Some(previous) = self.notification_task.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn connected_peripheral(&self) -> Result<Peripheral> {
        self.peripheral
            .lock()
            .await
            .clone()
            .ok_or(RingError::NotConnected)
    }
}

#[async_trait]
impl RingSdk for BleRingSdk {
    fn connection_state(&self) -> watch::Receiver<SdkConnectionState> {
        self.state.connection.subscribe()
    }

    fn scan_results(&self) -> watch::Receiver<Vec<SdkDevice>> {
        self.state.devices.subscribe()
    }

    fn health_snapshot(&self) -> watch::Receiver<SdkHealthSnapshot> {
        self.state.health.subscribe()
    }

    async fn start_scan(&self) -> Result<()> {
        info!("Starting BLE scan");
        self.state.devices.send_replace(Vec::new());
        self.state.scanning.store(true, Ordering::Relaxed);

        if let Err(e) = self.central.start_scan(ScanFilter::default()).await {
            self.state.scanning.store(false, Ordering::Relaxed);
            return Err(RingError::ScanFailed(e.to_string()));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.state.scanning.store(false, Ordering::Relaxed);
        self.central.stop_scan().await?;
        debug!("BLE scan stopped");
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let mac: MacAddress = address.parse()?;
        let peripheral = self.find_peripheral(BDAddr::from(mac.bytes())).await?;

        info!("Connecting to {}", mac);
        self.state.connection.send_replace(SdkConnectionState::Connecting);

        match self.establish(&peripheral, &mac).await {
            Ok(device) => {
                *self.peripheral.lock().await = Some(peripheral);
                self.state
                    .connection
                    .send_replace(SdkConnectionState::Connected(device));
                info!("Connected to {}", mac);
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", mac, e);
                let _ = peripheral.disconnect().await;
                self.state
                    .connection
                    .send_replace(SdkConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self.notification_task.lock().await.take() {
            task.abort();
        }

        let peripheral = self.peripheral.lock().await.take();
        let result = match peripheral {
            Some(p) => p.disconnect().await.map_err(RingError::from),
            None => Ok(()),
        };

        self.state
            .connection
            .send_replace(SdkConnectionState::Disconnected);
        result
    }

    async fn start_measurement(&self, metric: HealthMetric) -> Result<()> {
        let peripheral = self.connected_peripheral().await?;
        let characteristic = measurement_characteristic(&peripheral, metric)?;
        peripheral.subscribe(&characteristic).await?;
        info!("{} measurement started", metric);
        Ok(())
    }

    async fn stop_measurement(&self, metric: HealthMetric) -> Result<()> {
        let peripheral = self.connected_peripheral().await?;
        let characteristic = measurement_characteristic(&peripheral, metric)?;
        peripheral.unsubscribe(&characteristic).await?;
        info!("{} measurement stopped", metric);
        Ok(())
    }

    async fn request_sleep_history(&self) -> Result<()> {
        Err(RingError::Unsupported(
            "Sleep history requires the vendor protocol".to_string(),
        ))
    }
}

impl Drop for BleRingSdk {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

async fn handle_central_events(
    central: Adapter,
    mut events: CentralEvents,
    state: Arc<SharedState>,
    name_filter: Option<String>,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if !state.scanning.load(Ordering::Relaxed) {
                    continue;
                }
                let Ok(peripheral) = central.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                if !matches_name_filter(properties.local_name.as_deref(), name_filter.as_deref()) {
                    continue;
                }

                let device = SdkDevice {
                    address: properties.address.to_string(),
                    name: properties.local_name,
                    rssi: properties.rssi,
                };
                state.devices.send_modify(|devices| upsert_device(devices, device));
            }
            CentralEvent::DeviceDisconnected(id) => {
                let Ok(peripheral) = central.peripheral(&id).await else {
                    continue;
                };
                let address = peripheral.address().to_string();
                let dropped = state.connection.send_if_modified(|current| match current {
                    SdkConnectionState::Connected(device)
                        if device.address.eq_ignore_ascii_case(&address) =>
                    {
                        *current = SdkConnectionState::Disconnected;
                        true
                    }
                    _ => false,
                });
                if dropped {
                    warn!("Ring {} dropped the connection", address);
                }
            }
            _ => {}
        }
    }
}

fn record_battery(state: &SharedState, level: u8) {
    state.health.send_modify(|snapshot| {
        snapshot.battery = Some(level);
        snapshot.updated_at = Some(SystemTime::now());
    });
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral.characteristics().into_iter().find(|c| c.uuid == uuid)
}

fn measurement_characteristic(peripheral: &Peripheral, metric: HealthMetric) -> Result<Characteristic> {
    match metric {
        HealthMetric::HeartRate => find_characteristic(peripheral, HEART_RATE_MEASUREMENT_CHAR_UUID)
            .ok_or_else(|| RingError::Unsupported("Ring has no Heart Rate service".to_string())),
        other => Err(RingError::Unsupported(format!(
            "{other} measurement requires the vendor protocol"
        ))),
    }
}

fn matches_name_filter(name: Option<&str>, filter: Option<&str>) -> bool {
    match (name, filter) {
        (_, None) => true,
        (Some(name), Some(filter)) => name.to_lowercase().contains(&filter.to_lowercase()),
        (None, Some(_)) => false,
    }
}

fn upsert_device(devices: &mut Vec<SdkDevice>, device: SdkDevice) {
    if let Some(existing) = devices
        .iter_mut()
        .find(|d| d.address.eq_ignore_ascii_case(&device.address))
    {
        *existing = device;
    } else {
        devices.push(device);
    }
}

/// Decode the heart rate value of a Heart Rate Measurement notification
///
/// Bit 0 of the flags byte selects a `u16` little-endian value over a `u8`.
#[must_use]
pub fn parse_heart_rate_measurement(value: &[u8]) -> Option<u16> {
    let (&flags, rest) = value.split_first()?;
    if flags & 0x01 == 0 {
        rest.first().map(|&bpm| u16::from(bpm))
    } else {
        match rest {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}
