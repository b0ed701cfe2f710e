#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Ringlink
//!
//! Connection, scan and health-data core for Bluetooth Low Energy fitness rings.
//!
//! The crate sits between a device SDK that owns the radio and a presentation
//! layer that renders state. It does not define a wire protocol: it observes
//! the state an SDK exposes, maps it to domain types and enforces the
//! connection lifecycle rules.
//!
//! ## Layers
//!
//! - [`RingSdk`]: the device SDK contract. [`BleRingSdk`] implements it on top
//!   of `btleplug` using the standard Battery and Heart Rate GATT services.
//! - [`SdkRingRepository`]: maps SDK state into [`ConnectionStatus`],
//!   [`ScanStatus`] and [`RingHealthData`], bounds connection attempts with a
//!   timeout and allows one attempt at a time.
//! - [`use_cases`]: thin delegations; connecting validates the MAC address.
//! - [`RingViewModel`]: merges everything into one [`RingUiState`] snapshot.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ringlink::{
//!     BleRingSdk, PermissionState, RingConfig, RingRepository, RingViewModel,
//!     SdkRingRepository,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RingConfig::default();
//!     let sdk = Arc::new(BleRingSdk::new(&config).await?);
//!     let repository: Arc<dyn RingRepository> =
//!         Arc::new(SdkRingRepository::new(sdk, config.clone()));
//!
//!     let view_model = RingViewModel::new(repository, &config);
//!     view_model.update_permissions(PermissionState::all_granted());
//!
//!     view_model.start_scan(Some(5)).await;
//!     if let Some(ring) = view_model.state().discovered_rings.first() {
//!         view_model.connect(&ring.mac_address, Some(&ring.name)).await;
//!     }
//!
//!     println!("{}", view_model.state().connection_status);
//!     Ok(())
//! }
//! ```

pub mod api;
/// `btleplug` implementation of the device SDK
pub mod ble;
/// Error types and handling
pub mod error;
/// Ring repository: SDK state to domain state
pub mod repository;
pub mod sdk;
/// Type definitions and data structures
pub mod types;
pub mod use_cases;
/// UI state projection
pub mod view_model;

#[cfg(test)]
mod testing;

// Re-export the main types for convenient usage
pub use ble::BleRingSdk;
pub use error::{Result, RingError};
pub use repository::{RingRepository, SdkRingRepository};
pub use sdk::{RingSdk, SdkConnectionState, SdkDevice, SdkHealthSnapshot};
pub use types::{
    BloodPressure, ConnectionStatus, HealthMetric, MacAddress, Ring, RingConfig, RingHealthData,
    ScanStatus, SignalQuality, SleepSummary,
};
pub use view_model::{PermissionState, RingUiState, RingUseCases, RingViewModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
