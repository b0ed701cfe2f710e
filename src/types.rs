use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::SystemTime};

use crate::error::{Result, RingError};

/// Name used for rings that did not advertise one
pub const UNKNOWN_RING_NAME: &str = "Unknown Ring";

/// Validated six-byte BLE hardware address
///
/// Parsing accepts six groups of two hex digits separated uniformly by
/// `:` or `-`, in any letter case. Display is always upper-case and
/// colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create an address from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes
    #[must_use]
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Check whether `value` is a well-formed MAC address
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }
}

impl FromStr for MacAddress {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            RingError::InvalidMacAddress(format!(
                "{s}. Expected format: XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX"
            ))
        };

        let separator = if s.contains(':') {
            ':'
        } else if s.contains('-') {
            '-'
        } else {
            return Err(invalid());
        };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Signal quality tier derived from RSSI
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalQuality {
    /// Below -70 dBm
    Weak,
    /// -70 dBm up to -61 dBm
    Fair,
    /// -60 dBm up to -51 dBm
    Good,
    /// -50 dBm and stronger
    Excellent,
}

impl SignalQuality {
    /// Bucket an RSSI reading in dBm
    #[must_use]
    pub const fn from_rssi(rssi: i16) -> Self {
        if rssi >= -50 {
            Self::Excellent
        } else if rssi >= -60 {
            Self::Good
        } else if rssi >= -70 {
            Self::Fair
        } else {
            Self::Weak
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Fair => write!(f, "Fair"),
            Self::Weak => write!(f, "Weak"),
        }
    }
}

/// A fitness ring, identified by its MAC address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring {
    /// Device MAC address
    pub mac_address: String,
    /// Advertised or user-entered name
    pub name: String,
    /// Signal strength (RSSI, dBm)
    pub rssi: i16,
    /// Whether this record describes a live connection
    pub is_connected: bool,
}

impl Ring {
    /// Create a disconnected ring record
    #[must_use]
    pub const fn new(mac_address: String, name: String, rssi: i16) -> Self {
        Self {
            mac_address,
            name,
            rssi,
            is_connected: false,
        }
    }

    /// Record for a ring that is about to be connected
    #[must_use]
    pub fn pending(mac_address: &MacAddress, name: Option<&str>) -> Self {
        Self::new(
            mac_address.to_string(),
            name.unwrap_or(UNKNOWN_RING_NAME).to_string(),
            0,
        )
    }

    /// The connected variant of this ring
    #[must_use]
    pub fn connected(self) -> Self {
        Self {
            is_connected: true,
            ..self
        }
    }

    /// Signal quality tier for the last known RSSI
    #[must_use]
    pub const fn signal_quality(&self) -> SignalQuality {
        SignalQuality::from_rssi(self.rssi)
    }

    /// Check whether `mac_address` refers to this ring, ignoring case
    #[must_use]
    pub fn same_device(&self, mac_address: &str) -> bool {
        self.mac_address.eq_ignore_ascii_case(mac_address)
    }
}

/// Connection state owned by the ring repository
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No ring connected
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Connected to the given ring
    Connected(Ring),
    /// Last attempt failed
    Error(String),
    /// Last attempt did not complete in time
    Timeout,
}

impl ConnectionStatus {
    /// The connected ring, if any
    #[must_use]
    pub const fn ring(&self) -> Option<&Ring> {
        match self {
            Self::Connected(ring) => Some(ring),
            _ => None,
        }
    }

    /// Check if a ring is connected
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected(ring) => write!(f, "Connected to {}", ring.name),
            Self::Error(message) => write!(f, "Error: {message}"),
            Self::Timeout => write!(f, "Timed out"),
        }
    }
}

/// Scan state owned by the ring repository
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanStatus {
    /// No scan running
    #[default]
    Idle,
    /// Scan in progress
    Scanning,
    /// Scan produced results
    DevicesFound(Vec<Ring>),
    /// Scan failed
    Error(String),
}

impl ScanStatus {
    /// Rings reported by the scan, empty unless `DevicesFound`
    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        match self {
            Self::DevicesFound(rings) => rings,
            _ => &[],
        }
    }
}

/// Blood pressure reading in mmHg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BloodPressure {
    /// Systolic pressure
    pub systolic: u16,
    /// Diastolic pressure
    pub diastolic: u16,
}

/// Last night's sleep breakdown in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SleepSummary {
    /// Deep sleep
    pub deep_minutes: u32,
    /// Light sleep
    pub light_minutes: u32,
    /// REM sleep
    pub rem_minutes: u32,
    /// Awake time inside the sleep window
    pub awake_minutes: u32,
}

impl SleepSummary {
    /// Total time asleep, excluding awake minutes
    #[must_use]
    pub const fn total_sleep_minutes(&self) -> u32 {
        self.deep_minutes + self.light_minutes + self.rem_minutes
    }
}

/// Latest known health metrics reported by the ring
///
/// Missing values are sentinels: `None` for battery, zero for everything
/// else. Each update replaces the whole snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RingHealthData {
    /// Battery percentage
    pub battery: Option<u8>,
    /// Heart rate (bpm)
    pub heart_rate: u16,
    /// Blood oxygen saturation (%)
    pub spo2: u8,
    /// Blood pressure
    pub blood_pressure: BloodPressure,
    /// Stress score
    pub stress: u8,
    /// Step count for today
    pub steps: u32,
    /// Distance for today in meters
    pub distance_meters: u32,
    /// Calories burned today (kcal)
    pub calories: u32,
    /// Sleep breakdown
    pub sleep: SleepSummary,
    /// When the snapshot was last updated
    pub last_updated: Option<SystemTime>,
}

/// Metrics with an explicit start/stop measurement trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthMetric {
    /// Heart rate
    HeartRate,
    /// Blood pressure
    BloodPressure,
    /// Blood oxygen saturation
    SpO2,
    /// Stress
    Stress,
}

impl fmt::Display for HealthMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartRate => write!(f, "Heart rate"),
            Self::BloodPressure => write!(f, "Blood pressure"),
            Self::SpO2 => write!(f, "SpO2"),
            Self::Stress => write!(f, "Stress"),
        }
    }
}

/// Repository and backend configuration
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Overall connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Scan duration used when the caller does not pick one
    pub default_scan_secs: u64,
    /// Keep only advertisements whose name contains this, ignoring case
    pub name_filter: Option<String>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 15_000,
            default_scan_secs: 10,
            name_filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_parsing() {
        let test_cases = vec![
            ("12:34:56:78:9A:BC", [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]),
            ("aa-bb-cc-dd-ee-ff", [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            ("Aa:bB:00:11:22:33", [0xAA, 0xBB, 0x00, 0x11, 0x22, 0x33]),
        ];

        for (mac_str, expected_bytes) in test_cases {
            let mac: MacAddress = mac_str
                .parse()
                .unwrap_or_else(|e| panic!("parsing failed for {mac_str}: {e}"));
            assert_eq!(mac.bytes(), expected_bytes);
        }

        let invalid_macs = vec![
            "12:34:56:78:9A",       // Too short
            "12:34:56:78:9A:BC:DE", // Too long
            "12:34:56:78:9A:XY",    // Invalid hex
            "12:34-56:78:9A:BC",    // Mixed separators
            "12.34.56.78.9A.BC",    // Unsupported separator
            "123456789ABC",         // No separator
            "",                     // Empty string
            "12:34:56:78:9A:BC::",  // Extra separator
            "1:234:56:78:9A:BC",    // Misplaced digit
            "+1:23:45:67:89:AB",    // Sign accepted by from_str_radix
        ];

        for invalid_mac in invalid_macs {
            assert!(
                !MacAddress::is_valid(invalid_mac),
                "MAC address parsing should have failed for: {invalid_mac}"
            );
        }
    }

    #[test]
    fn test_mac_address_display_is_canonical() {
        let mac: MacAddress = "aa-bb-cc-dd-ee-0f".parse().unwrap();
        assert_eq!(mac.to_string(), "AA:BB:CC:DD:EE:0F");
    }

    #[test]
    fn test_signal_quality_tiers() {
        assert_eq!(SignalQuality::from_rssi(-40), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-50), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-51), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-60), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-65), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-71), SignalQuality::Weak);
        assert!(SignalQuality::Excellent > SignalQuality::Weak);
    }

    #[test]
    fn test_ring_connected_variant() {
        let ring = Ring::new("AA:BB:CC:DD:EE:FF".to_string(), "R02".to_string(), -55);
        let connected = ring.clone().connected();

        assert!(!ring.is_connected);
        assert!(connected.is_connected);
        assert_eq!(connected.mac_address, ring.mac_address);
        assert_eq!(connected.signal_quality(), SignalQuality::Good);
        assert!(connected.same_device("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_pending_ring_defaults_name() {
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let ring = Ring::pending(&mac, None);
        assert_eq!(ring.name, UNKNOWN_RING_NAME);
        assert!(!ring.is_connected);
    }

    #[test]
    fn test_status_defaults() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ScanStatus::default(), ScanStatus::Idle);
        assert!(ScanStatus::Scanning.rings().is_empty());

        let health = RingHealthData::default();
        assert!(health.battery.is_none());
        assert_eq!(health.steps, 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = RingConfig::default();
        assert_eq!(config.connect_timeout_ms, 15_000);
        assert_eq!(config.default_scan_secs, 10);
        assert!(config.name_filter.is_none());
    }
}
