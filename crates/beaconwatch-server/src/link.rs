//! Wi-Fi link backed by sysfs and NetworkManager.
//!
//! Link state is read from `/sys/class/net/<iface>/operstate`. Reconnection
//! asks `nmcli` to join the configured network; the monitor then polls the
//! operstate until the link comes up or its budget runs out.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use beaconwatch_core::config::NetworkConfig;
use beaconwatch_core::{Link, LinkError};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Deadline for one `nmcli` invocation.
const NMCLI_TIMEOUT: Duration = Duration::from_secs(15);

/// Network interface managed through sysfs and `nmcli`.
#[derive(Debug, Clone)]
pub struct SysfsLink {
    interface: String,
    operstate: PathBuf,
    ssid: Option<String>,
    password: Option<String>,
}

impl SysfsLink {
    /// Creates a link for the interface named in `network`.
    #[must_use]
    pub fn new(network: &NetworkConfig) -> Self {
        Self::with_sysfs_root("/sys/class/net", network)
    }

    /// Same as [`new`](Self::new) with a different sysfs root.
    #[must_use]
    pub fn with_sysfs_root(root: impl Into<PathBuf>, network: &NetworkConfig) -> Self {
        let operstate = root.into().join(&network.interface).join("operstate");
        Self {
            interface: network.interface.clone(),
            operstate,
            ssid: network.ssid.clone(),
            password: network.password.clone(),
        }
    }

    fn nmcli_args(&self, ssid: &str) -> Vec<String> {
        let mut args = vec![
            "device".to_string(),
            "wifi".to_string(),
            "connect".to_string(),
            ssid.to_string(),
        ];
        if let Some(password) = &self.password {
            args.push("password".to_string());
            args.push(password.clone());
        }
        args.push("ifname".to_string());
        args.push(self.interface.clone());
        args
    }
}

#[async_trait]
impl Link for SysfsLink {
    async fn is_up(&self) -> bool {
        match tokio::fs::read_to_string(&self.operstate).await {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                debug!(path = %self.operstate.display(), error = %e, "Cannot read operstate");
                false
            }
        }
    }

    async fn reconnect(&self) -> Result<(), LinkError> {
        let Some(ssid) = self.ssid.as_deref() else {
            debug!(interface = %self.interface, "No SSID configured, waiting for link");
            return Ok(());
        };

        info!(interface = %self.interface, ssid, "Requesting Wi-Fi association");
        let child = Command::new("nmcli")
            .args(self.nmcli_args(ssid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(NMCLI_TIMEOUT, child)
            .await
            .map_err(|_| LinkError::ReconnectFailed("nmcli timed out".to_string()))?
            .map_err(|e| LinkError::ReconnectFailed(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, stderr = %stderr, "nmcli reported failure");
            Err(LinkError::ReconnectFailed(stderr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(ssid: Option<&str>, password: Option<&str>) -> NetworkConfig {
        NetworkConfig {
            interface: "wlan0".to_string(),
            ssid: ssid.map(str::to_string),
            password: password.map(str::to_string),
            ..NetworkConfig::default()
        }
    }

    #[tokio::test]
    async fn test_is_up_reads_operstate() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("wlan0")).unwrap();
        let link = SysfsLink::with_sysfs_root(root.path(), &network(None, None));

        std::fs::write(root.path().join("wlan0/operstate"), "up\n").unwrap();
        assert!(link.is_up().await);

        std::fs::write(root.path().join("wlan0/operstate"), "down\n").unwrap();
        assert!(!link.is_up().await);
    }

    #[tokio::test]
    async fn test_missing_interface_is_down() {
        let root = tempfile::tempdir().unwrap();
        let link = SysfsLink::with_sysfs_root(root.path(), &network(None, None));
        assert!(!link.is_up().await);
    }

    #[tokio::test]
    async fn test_reconnect_without_ssid_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let link = SysfsLink::with_sysfs_root(root.path(), &network(None, None));
        assert_eq!(link.reconnect().await, Ok(()));
    }

    #[test]
    fn test_nmcli_arguments() {
        let link = SysfsLink::new(&network(Some("lab"), Some("secret")));
        assert_eq!(
            link.nmcli_args("lab"),
            ["device", "wifi", "connect", "lab", "password", "secret", "ifname", "wlan0"]
        );

        let open = SysfsLink::new(&network(Some("guest"), None));
        assert_eq!(
            open.nmcli_args("guest"),
            ["device", "wifi", "connect", "guest", "ifname", "wlan0"]
        );
    }
}
