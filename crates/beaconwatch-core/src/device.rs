//! Identifier of this scanner, derived from a network interface's MAC address.

use std::path::Path;

use tracing::warn;

use crate::config::is_valid_mac_address;

/// Default prefix of the device id.
pub const DEFAULT_DEVICE_ID_PREFIX: &str = "PI_";

/// Builds `<prefix><MAC without separators, uppercase>`.
///
/// Returns `None` if `mac` is not a colon-separated hardware address.
#[must_use]
pub fn device_id_from_mac(prefix: &str, mac: &str) -> Option<String> {
    let mac = mac.trim();
    if !is_valid_mac_address(mac) {
        return None;
    }
    Some(format!("{prefix}{}", mac.replace(':', "").to_ascii_uppercase()))
}

/// Reads the hardware address of `interface` from sysfs and derives the
/// device id. Falls back to `<prefix>UNKNOWN` when the address is unavailable.
#[must_use]
pub fn device_id_for_interface(prefix: &str, interface: &str) -> String {
    let path = Path::new("/sys/class/net").join(interface).join("address");
    let derived = std::fs::read_to_string(&path)
        .ok()
        .and_then(|mac| device_id_from_mac(prefix, &mac));

    derived.unwrap_or_else(|| {
        warn!(interface, path = %path.display(), "Could not read interface MAC address");
        format!("{prefix}UNKNOWN")
    })
}
