//! Unified error types for the beaconwatch core library.
//!
//! [`BeaconError`] covers every failure mode the agent and the control
//! surface report. Each module keeps its own narrower error type
//! (`ConfigError`, `BluetoothError`, `DeliveryError`, `LinkError`) and
//! converts into this one at the boundary.
//!
//! None of these errors stop the scan loop. A failed scan is logged and
//! skipped, a failed delivery is queued, a lost link is retried.

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beaconwatch operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// A scan failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    // =========================================================================
    // DELIVERY ERRORS
    // =========================================================================
    /// The backend could not be reached.
    #[error("Delivery failed: {0}")]
    TransportFailure(String),

    /// The backend answered with a non-success status.
    #[error("Backend rejected event with status {status}")]
    BackendRejected {
        /// HTTP status returned.
        status: u16,
    },

    /// The network link is down.
    #[error("Network link down: {0}")]
    LinkDown(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERIPHERAL & I/O ERRORS
    // =========================================================================
    /// The status LED could not be driven.
    #[error("Peripheral error: {0}")]
    Peripheral(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beaconwatch operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if the next loop iteration may succeed without intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BluetoothScanFailed(_)
                | Self::TransportFailure(_)
                | Self::BackendRejected { .. }
                | Self::LinkDown(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ConfigNotFound(_) => 404,

            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            Self::Peripheral(_) | Self::IoError(_) => 500,

            Self::TransportFailure(_) | Self::BackendRejected { .. } => 502,

            Self::BluetoothAdapterNotFound
            | Self::BluetoothAdapterPoweredOff
            | Self::BluetoothScanFailed(_)
            | Self::LinkDown(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::TransportFailure(_) => "TRANSPORT_FAILURE",
            Self::BackendRejected { .. } => "BACKEND_REJECTED",
            Self::LinkDown(_) => "LINK_DOWN",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::Peripheral(_) => "PERIPHERAL_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::bluetooth::BluetoothError> for BeaconError {
    fn from(err: crate::bluetooth::BluetoothError) -> Self {
        use crate::bluetooth::BluetoothError;
        match err {
            BluetoothError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            BluetoothError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            BluetoothError::ScanTimeout { duration_secs } => {
                Self::BluetoothScanFailed(format!("Scan timed out after {duration_secs} seconds"))
            }
            BluetoothError::SessionInitFailed { message }
            | BluetoothError::DiscoveryFailed { message }
            | BluetoothError::Internal { message } => Self::BluetoothScanFailed(message),
        }
    }
}

impl From<crate::delivery::DeliveryError> for BeaconError {
    fn from(err: crate::delivery::DeliveryError) -> Self {
        use crate::delivery::DeliveryError;
        match err {
            DeliveryError::Rejected { status, .. } => Self::BackendRejected { status },
            DeliveryError::InvalidEndpoint { url, message } => {
                Self::ConfigValidationError(format!("invalid endpoint {url}: {message}"))
            }
            DeliveryError::Transport(e) => Self::TransportFailure(e.to_string()),
        }
    }
}

impl From<crate::connectivity::LinkError> for BeaconError {
    fn from(err: crate::connectivity::LinkError) -> Self {
        Self::LinkDown(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::BluetoothError;
    use crate::config::ConfigError;
    use crate::connectivity::LinkError;
    use crate::delivery::{DeliveryError, TransportError};
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_recoverable_errors() {
        assert!(BeaconError::BluetoothScanFailed("timeout".into()).is_recoverable());
        assert!(BeaconError::TransportFailure("timeout".into()).is_recoverable());
        assert!(!BeaconError::BluetoothAdapterNotFound.is_recoverable());
        assert!(!BeaconError::ConfigValidationError("bad".into()).is_recoverable());
        assert!(!BeaconError::Peripheral("gpio".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            BeaconError::ConfigNotFound(PathBuf::new()).http_status_code(),
            404
        );
        assert_eq!(
            BeaconError::ConfigParseError("error".into()).http_status_code(),
            422
        );
        assert_eq!(BeaconError::Peripheral("gpio".into()).http_status_code(), 500);
        assert_eq!(
            BeaconError::BackendRejected { status: 500 }.http_status_code(),
            502
        );
        assert_eq!(
            BeaconError::BluetoothAdapterNotFound.http_status_code(),
            503
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BeaconError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            BeaconError::BackendRejected { status: 404 }.error_code(),
            "BACKEND_REJECTED"
        );
        assert_eq!(
            BeaconError::ConfigNotFound(PathBuf::new()).error_code(),
            "CONFIG_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_module_errors() {
        let err: BeaconError = BluetoothError::ScanTimeout { duration_secs: 5 }.into();
        assert!(matches!(err, BeaconError::BluetoothScanFailed(ref m) if m.contains("5 seconds")));

        let err: BeaconError = DeliveryError::Rejected {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(matches!(err, BeaconError::BackendRejected { status: 503 }));

        let err: BeaconError = DeliveryError::Transport(TransportError::Timeout).into();
        assert!(matches!(err, BeaconError::TransportFailure(_)));

        let err: BeaconError = LinkError::ReconnectFailed("nmcli".into()).into();
        assert!(matches!(err, BeaconError::LinkDown(ref m) if m.contains("nmcli")));

        let err: BeaconError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "queue.capacity".into(),
                message: "must be greater than zero".into(),
            },
            ConfigError::ValidationError {
                field: "network.interface".into(),
                message: "must not be empty".into(),
            },
        ])
        .into();
        assert!(matches!(err, BeaconError::ConfigValidationError(ref m) if m.contains("; ")));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: BeaconError = io_err.into();
        assert!(matches!(err, BeaconError::IoError(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconError>();
        assert_sync::<BeaconError>();
    }
}
