//! Narrow entry points the view model calls into.
//!
//! Apart from MAC address validation in [`ConnectRingUseCase`] these are
//! direct delegations to the [`RingRepository`].

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::{
    error::Result,
    repository::RingRepository,
    types::{HealthMetric, MacAddress, Ring, RingHealthData},
};

/// Scan for nearby rings
#[derive(Clone)]
pub struct ScanRingsUseCase {
    repository: Arc<dyn RingRepository>,
}

impl ScanRingsUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Scan for `duration_secs` seconds
    ///
    /// # Errors
    ///
    /// Returns the repository's scan error.
    pub async fn execute(&self, duration_secs: u64) -> Result<Vec<Ring>> {
        self.repository.start_scan(duration_secs).await
    }
}

/// Stop a running scan
#[derive(Clone)]
pub struct StopScanUseCase {
    repository: Arc<dyn RingRepository>,
}

impl StopScanUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Stop scanning
    pub async fn execute(&self) {
        self.repository.stop_scan().await;
    }
}

/// Connect to a ring after validating its MAC address
#[derive(Clone)]
pub struct ConnectRingUseCase {
    repository: Arc<dyn RingRepository>,
}

impl ConnectRingUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Connect to `mac_address`
    ///
    /// The address is passed on in canonical upper-case, colon-separated form.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::InvalidMacAddress`](crate::RingError::InvalidMacAddress)
    /// without touching the repository when the address is malformed, otherwise
    /// the repository's connection error.
    pub async fn execute(&self, mac_address: &str, name: Option<&str>) -> Result<Ring> {
        let mac: MacAddress = mac_address.trim().parse().inspect_err(|e| {
            warn!("Rejected connect request: {}", e);
        })?;
        self.repository.connect(&mac.to_string(), name).await
    }
}

/// Disconnect the current ring
#[derive(Clone)]
pub struct DisconnectRingUseCase {
    repository: Arc<dyn RingRepository>,
}

impl DisconnectRingUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Disconnect
    ///
    /// # Errors
    ///
    /// Returns the SDK's disconnect error; local state is cleared either way.
    pub async fn execute(&self) -> Result<()> {
        self.repository.disconnect().await
    }
}

/// Read ring data
#[derive(Clone)]
pub struct GetRingDataUseCase {
    repository: Arc<dyn RingRepository>,
}

impl GetRingDataUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Latest health snapshot
    #[must_use]
    pub fn health_data(&self) -> RingHealthData {
        self.repository.health_data()
    }

    /// Battery percentage
    ///
    /// # Errors
    ///
    /// Returns [`RingError::DataUnavailable`](crate::RingError::DataUnavailable)
    /// when no positive reading is known.
    pub fn battery(&self) -> Result<u8> {
        self.repository.get_battery()
    }

    /// The connected ring, if any
    #[must_use]
    pub fn connected_ring(&self) -> Option<Ring> {
        self.repository.connected_ring()
    }

    /// Observe the health snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RingHealthData> {
        self.repository.subscribe_health()
    }
}

/// Trigger on-demand measurements on the connected ring
#[derive(Clone)]
pub struct MeasureHealthUseCase {
    repository: Arc<dyn RingRepository>,
}

impl MeasureHealthUseCase {
    /// Create the use case
    #[must_use]
    pub fn new(repository: Arc<dyn RingRepository>) -> Self {
        Self { repository }
    }

    /// Start measuring `metric`
    ///
    /// # Errors
    ///
    /// Returns [`RingError::NotConnected`](crate::RingError::NotConnected) without
    /// a connected ring, or the SDK's error.
    pub async fn start(&self, metric: HealthMetric) -> Result<()> {
        self.repository.start_measurement(metric).await
    }

    /// Stop measuring `metric`
    ///
    /// # Errors
    ///
    /// Same as [`MeasureHealthUseCase::start`].
    pub async fn stop(&self, metric: HealthMetric) -> Result<()> {
        self.repository.stop_measurement(metric).await
    }

    /// Request the stored sleep history
    ///
    /// # Errors
    ///
    /// Same as [`MeasureHealthUseCase::start`].
    pub async fn sync_sleep(&self) -> Result<()> {
        self.repository.request_sleep_history().await
    }
}
