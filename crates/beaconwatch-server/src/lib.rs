//! # beaconwatch-server
//!
//! Runtime for the beaconwatch beacon scanner: the concrete collaborators
//! (HTTP transport, Wi-Fi link, status LED) and the local control API.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod link;
pub mod logging;
pub mod peripheral;
pub mod state;
pub mod transport;
