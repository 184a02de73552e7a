//! Application configuration management.
//!
//! Every setting has a built-in default, so the scanner runs without any
//! file. Values are layered with the `config` crate:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. Optional TOML file (`/etc/beaconwatch/config.toml` on Linux)
//! 3. Environment variables, e.g. `BEACONWATCH__QUEUE__CAPACITY=100`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::connectivity::ReconnectPolicy;
use crate::device::DEFAULT_DEVICE_ID_PREFIX;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "BEACONWATCH";

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid MAC address regex")
});

/// Whether `value` is a colon-separated 48-bit hardware address.
#[must_use]
pub fn is_valid_mac_address(value: &str) -> bool {
    MAC_ADDRESS.is_match(value)
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found at: {0}")]
    NotFound(String),

    /// A source could not be read or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network link settings.
    pub network: NetworkConfig,
    /// Backend endpoints.
    pub backend: BackendConfig,
    /// Scan and presence timing.
    pub presence: PresenceConfig,
    /// Link monitoring.
    pub connectivity: ConnectivityConfig,
    /// Retry queue.
    pub queue: QueueConfig,
    /// Local control surface.
    pub control: ControlConfig,
}

/// Network link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface whose state is monitored and whose MAC names this device.
    pub interface: String,

    /// Wi-Fi network to (re)join, if the scanner manages association.
    pub ssid: Option<String>,

    /// Wi-Fi passphrase. Never written back out.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Prefix of the device id sent with every event.
    pub device_id_prefix: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            ssid: None,
            password: None,
            device_id_prefix: DEFAULT_DEVICE_ID_PREFIX.to_string(),
        }
    }
}

/// Backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every path is appended to.
    pub base_url: String,
    /// Path receiving arrivals.
    pub arrival_path: String,
    /// Path receiving departures.
    pub departure_path: String,
    /// Liveness probe path.
    pub ping_path: String,
    /// Hard deadline for each request.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://172.20.10.5:4000".to_string(),
            arrival_path: "/beacon/arrival".to_string(),
            departure_path: "/beacon/departure".to_string(),
            ping_path: "/ping".to_string(),
            request_timeout_secs: 5,
        }
    }
}

impl BackendConfig {
    /// Request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Scan and presence timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Time without sighting after which a beacon departs.
    pub beacon_timeout_secs: u64,
    /// Length of one scan.
    pub scan_duration_secs: u64,
    /// Pause between loop iterations.
    pub loop_pause_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            beacon_timeout_secs: 10,
            scan_duration_secs: 5,
            loop_pause_ms: 1_000,
        }
    }
}

impl PresenceConfig {
    /// Departure timeout.
    #[must_use]
    pub const fn beacon_timeout(&self) -> Duration {
        Duration::from_secs(self.beacon_timeout_secs)
    }

    /// Scan length.
    #[must_use]
    pub const fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    /// Pause between iterations.
    #[must_use]
    pub const fn loop_pause(&self) -> Duration {
        Duration::from_millis(self.loop_pause_ms)
    }
}

/// Link monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Interval between link checks.
    pub poll_interval_secs: u64,
    /// Status checks per reconnection cycle.
    pub reconnect_attempts: u32,
    /// Pause between reconnection status checks.
    pub reconnect_backoff_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            reconnect_attempts: 20,
            reconnect_backoff_ms: 500,
        }
    }
}

impl ConnectivityConfig {
    /// Interval between link checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reconnection budget.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            backoff: Duration::from_millis(self.reconnect_backoff_ms),
        }
    }
}

/// Retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of buffered events.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: crate::queue::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Local control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Listen address of the HTTP control surface.
    pub bind_address: String,
    /// GPIO pin the LED is wired to, reported by the status probe.
    pub led_pin: u8,
    /// sysfs `brightness` file driving the LED, if any.
    pub led_brightness_path: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            led_pin: 18,
            led_brightness_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from defaults, a TOML file and the environment.
    ///
    /// With `path` set, the file must exist. Without it, the platform default
    /// location is used if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing (explicit path only), cannot
    /// be parsed, or the result fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_layers(path, None)
    }

    /// Layers defaults, the file and the environment. `env` replaces the
    /// process environment when given.
    fn load_layers(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.network.interface.trim().is_empty() {
            invalid("network.interface", "must not be empty");
        }

        match Url::parse(&self.backend.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) => invalid("backend.base_url", "scheme must be http or https"),
            Err(_) => invalid("backend.base_url", "must be an absolute URL"),
        }
        for (field, path) in [
            ("backend.arrival_path", &self.backend.arrival_path),
            ("backend.departure_path", &self.backend.departure_path),
            ("backend.ping_path", &self.backend.ping_path),
        ] {
            if !path.starts_with('/') {
                invalid(field, "must start with '/'");
            }
        }

        for (field, value) in [
            ("backend.request_timeout_secs", self.backend.request_timeout_secs),
            ("presence.beacon_timeout_secs", self.presence.beacon_timeout_secs),
            ("presence.scan_duration_secs", self.presence.scan_duration_secs),
            ("connectivity.poll_interval_secs", self.connectivity.poll_interval_secs),
            ("connectivity.reconnect_attempts", u64::from(self.connectivity.reconnect_attempts)),
        ] {
            if value == 0 {
                invalid(field, "must be greater than zero");
            }
        }
        if self.queue.capacity == 0 {
            invalid("queue.capacity", "must be greater than zero");
        }

        if self.control.bind_address.parse::<SocketAddr>().is_err() {
            invalid("control.bind_address", "must be an IP:port socket address");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Platform location of the configuration file.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/beaconwatch/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beaconwatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.presence.beacon_timeout(), Duration::from_secs(10));
        assert_eq!(config.presence.scan_duration(), Duration::from_secs(5));
        assert_eq!(config.connectivity.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.connectivity.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(config.queue.capacity, 50);
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = Config::default();
        config.queue.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "queue.capacity"));
    }

    #[test]
    fn test_multiple_validation_errors() {
        let mut config = Config::default();
        config.backend.base_url = "ftp://example.com".to_string();
        config.backend.arrival_path = "beacon/arrival".to_string();
        config.presence.scan_duration_secs = 0;
        config.control.bind_address = "nowhere".to_string();

        match config.validate().unwrap_err() {
            ConfigError::MultipleValidationErrors(errors) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("b8:27:eb:00:11:22"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_mac_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_mac_address("GG:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_password_is_not_serialized() {
        let mut config = Config::default();
        config.network.password = Some("hunter2".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
base_url = "http://10.0.0.2:4000"

[queue]
capacity = 8

[network]
ssid = "lab"
password = "secret"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.2:4000");
        assert_eq!(config.backend.arrival_path, "/beacon/arrival");
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.network.password.as_deref(), Some("secret"));
        assert_eq!(config.presence.beacon_timeout_secs, 10);
    }

    #[test]
    fn test_environment_overrides_file_and_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\ncapacity = 8\n\n[network]\ndevice_id_prefix = \"LAB_\"").unwrap();

        let env = config::Map::from([
            ("BEACONWATCH__QUEUE__CAPACITY".to_string(), "7".to_string()),
            (
                "BEACONWATCH__NETWORK__DEVICE_ID_PREFIX".to_string(),
                "ESP32_".to_string(),
            ),
        ]);
        let config = Config::load_layers(Some(file.path()), Some(env)).unwrap();

        assert_eq!(config.queue.capacity, 7);
        assert_eq!(config.network.device_id_prefix, "ESP32_");
        assert_eq!(config.presence.beacon_timeout_secs, 10);
    }

    #[test]
    fn test_environment_ignores_unprefixed_variables() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\ncapacity = 8").unwrap();
        let env = config::Map::from([("QUEUE__CAPACITY".to_string(), "3".to_string())]);
        let config = Config::load_layers(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.queue.capacity, 8);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\ncapacity = 0").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/beaconwatch.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
