use thiserror::Error;

/// Errors that can occur when working with a fitness ring
#[derive(Error, Debug)]
pub enum RingError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// MAC address did not match `XX:XX:XX:XX:XX:XX` or `XX-XX-XX-XX-XX-XX`
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),

    /// Scanning failed
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Another connection attempt is still in flight
    #[error("A connection attempt is already in progress")]
    ConnectionInProgress,

    /// Connection attempt timed out
    #[error("Connection timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Operation requires a connected ring
    #[error("No ring connected")]
    NotConnected,

    /// Requested data has not been reported by the ring
    #[error("{0} not available")]
    DataUnavailable(&'static str),

    /// Operation is not supported by the device backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Required runtime permissions are missing
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend returned an unsuccessful response envelope
    #[error("API error: {0}")]
    Api(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for ring operations
pub type Result<T> = std::result::Result<T, RingError>;

impl RingError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::NotConnected | Self::Timeout { .. }
        )
    }

    /// Check if retrying the same call later may succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionInProgress
                | Self::DataUnavailable(_)
                | Self::ScanFailed(_)
        )
    }
}
