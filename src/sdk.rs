//! Contract between the ring core and the device SDK that owns the radio.
//!
//! Implementations hold the observable state in `watch` channels and keep
//! it current on their own; the core only subscribes and issues triggers.

use async_trait::async_trait;
use std::time::SystemTime;
use tokio::sync::watch;

use crate::{error::Result, types::HealthMetric};

/// A device as reported by the SDK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkDevice {
    /// Hardware address as the SDK formats it
    pub address: String,
    /// Advertised local name
    pub name: Option<String>,
    /// Last RSSI reading
    pub rssi: Option<i16>,
}

/// SDK-level connection state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SdkConnectionState {
    /// Idle
    #[default]
    Disconnected,
    /// Link being established
    Connecting,
    /// Link up
    Connected(SdkDevice),
}

/// Rolling health snapshot maintained by the SDK
///
/// Fields stay `None` until the ring reports them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdkHealthSnapshot {
    /// Battery percentage
    pub battery: Option<u8>,
    /// Heart rate (bpm)
    pub heart_rate: Option<u16>,
    /// SpO2 (%)
    pub spo2: Option<u8>,
    /// Systolic and diastolic pressure
    pub blood_pressure: Option<(u16, u16)>,
    /// Stress score
    pub stress: Option<u8>,
    /// Steps today
    pub steps: Option<u32>,
    /// Distance today in meters
    pub distance_meters: Option<u32>,
    /// Calories today
    pub calories: Option<u32>,
    /// Deep, light, REM and awake minutes
    pub sleep_minutes: Option<[u32; 4]>,
    /// Time of the last report
    pub updated_at: Option<SystemTime>,
}

/// Device SDK consumed by the ring repository
#[async_trait]
pub trait RingSdk: Send + Sync + 'static {
    /// Observable connection state
    fn connection_state(&self) -> watch::Receiver<SdkConnectionState>;

    /// Observable list of devices discovered by the current scan
    fn scan_results(&self) -> watch::Receiver<Vec<SdkDevice>>;

    /// Observable rolling health snapshot
    fn health_snapshot(&self) -> watch::Receiver<SdkHealthSnapshot>;

    /// Begin scanning; results accumulate in [`RingSdk::scan_results`]
    async fn start_scan(&self) -> Result<()>;

    /// Stop scanning
    async fn stop_scan(&self) -> Result<()>;

    /// Begin connecting to `address`; completion is reported through
    /// [`RingSdk::connection_state`]
    async fn connect(&self, address: &str) -> Result<()>;

    /// Drop the current connection
    async fn disconnect(&self) -> Result<()>;

    /// Start an on-demand measurement
    async fn start_measurement(&self, metric: HealthMetric) -> Result<()>;

    /// Stop an on-demand measurement
    async fn stop_measurement(&self, metric: HealthMetric) -> Result<()>;

    /// Ask the ring to upload its stored sleep history
    async fn request_sleep_history(&self) -> Result<()>;
}
