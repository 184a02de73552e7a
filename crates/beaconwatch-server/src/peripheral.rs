//! Status LED.
//!
//! Driven through a sysfs `brightness` file when one is configured (a GPIO
//! LED exposed by the `gpio-leds` driver). Without one, the state is only
//! tracked so the control surface still reports it.

use std::path::PathBuf;

use beaconwatch_core::BeaconError;
use tracing::{debug, info};

/// LED on a fixed pin.
#[derive(Debug)]
pub struct LedController {
    pin: u8,
    brightness: Option<PathBuf>,
    on: bool,
}

impl LedController {
    /// Creates a controller for `pin`, initially off.
    #[must_use]
    pub const fn new(pin: u8, brightness: Option<PathBuf>) -> Self {
        Self {
            pin,
            brightness,
            on: false,
        }
    }

    /// Pin the LED is wired to.
    #[must_use]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// Whether the LED was last switched on.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.on
    }

    /// `"on"` or `"off"`.
    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        if self.on {
            "on"
        } else {
            "off"
        }
    }

    /// Switches the LED.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Peripheral`] if the brightness file cannot be written.
    pub async fn set(&mut self, on: bool) -> Result<(), BeaconError> {
        if let Some(path) = &self.brightness {
            tokio::fs::write(path, if on { "1" } else { "0" })
                .await
                .map_err(|e| BeaconError::Peripheral(format!("{}: {e}", path.display())))?;
        } else {
            debug!(pin = self.pin, on, "No LED device configured, tracking state only");
        }
        self.on = on;
        info!(pin = self.pin, state = self.state_name(), "LED switched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_brightness_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        let mut led = LedController::new(18, Some(path.clone()));

        led.set(true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
        assert_eq!(led.state_name(), "on");

        led.set(false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
        assert!(!led.is_on());
    }

    #[tokio::test]
    async fn test_without_device_tracks_state() {
        let mut led = LedController::new(18, None);
        led.set(true).await.unwrap();
        assert!(led.is_on());
        assert_eq!(led.pin(), 18);
    }

    #[tokio::test]
    async fn test_unwritable_device_keeps_state() {
        let mut led = LedController::new(18, Some(PathBuf::from("/nonexistent/led/brightness")));
        let err = led.set(true).await.unwrap_err();
        assert!(matches!(err, BeaconError::Peripheral(_)));
        assert!(!led.is_on());
    }
}
