//! # beaconwatch-server
//!
//! BLE beacon scanner daemon.
//!
//! This binary:
//! - Scans for beacons and reports arrivals and departures to the backend
//! - Queues events while the network link is down and replays them in order
//! - Serves a small local control API (status, LED, queue reset)
//!
//! ## Running
//!
//! ```bash
//! # Development, without a Bluetooth adapter
//! cargo run --package beaconwatch-server --no-default-features --features mock-bluetooth
//!
//! # Production (on Raspberry Pi)
//! BEACONWATCH_ENV=production ./beaconwatch-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use beaconwatch_core::{
    device_id_for_interface, Agent, AgentSettings, BeaconError, Clock, Config, ConnectivityMonitor,
    DeliveryClient, Endpoints, EventQueue, MonotonicClock,
};
use beaconwatch_server::api;
use beaconwatch_server::link::SysfsLink;
use beaconwatch_server::logging;
use beaconwatch_server::peripheral::LedController;
use beaconwatch_server::state::AppState;
use beaconwatch_server::transport::HttpTransport;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Overrides the configuration file location.
const CONFIG_ENV: &str = "BEACONWATCH_CONFIG";

/// Pending operator commands before senders wait.
const COMMAND_BUFFER: usize = 8;

/// How long the LED stays lit during the startup self-test.
const LED_SELF_TEST: Duration = Duration::from_secs(1);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting beaconwatch-server");

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())
        .map_err(BeaconError::from)
        .context("Failed to load configuration")?;

    let mut led = LedController::new(
        config.control.led_pin,
        config.control.led_brightness_path.clone(),
    );
    led_self_test(&mut led).await;

    let clock = MonotonicClock::new();
    let transport = HttpTransport::new(config.backend.request_timeout())?;
    let endpoints = Endpoints::from_config(&config.backend).map_err(BeaconError::from)?;
    let device_id = device_id_for_interface(
        &config.network.device_id_prefix,
        &config.network.interface,
    );
    info!(device_id = %device_id, backend = %config.backend.base_url, "Backend configured");

    let monitor = ConnectivityMonitor::new(
        SysfsLink::new(&config.network),
        config.connectivity.poll_interval(),
        config.connectivity.reconnect_policy(),
        clock.now_ms(),
    );
    let mut agent = Agent::new(
        open_scanner().await?,
        DeliveryClient::new(transport, endpoints, device_id),
        monitor,
        EventQueue::new(config.queue.capacity),
        clock,
        AgentSettings::from_config(&config),
    );

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(agent.status());
    let state = AppState::shared(led, commands_tx, status_rx);

    let listener = TcpListener::bind(&config.control.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.control.bind_address))?;
    info!(addr = %listener.local_addr()?, "Control API listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api::create_router(state)).await {
            error!(error = %e, "Control API stopped");
        }
    });

    agent.start().await;
    agent
        .run(
            commands_rx,
            status_tx,
            config.presence.loop_pause(),
            shutdown_signal(),
        )
        .await;

    server.abort();
    info!("beaconwatch-server stopped");
    Ok(())
}

/// Blinks the LED once so a technician can see the board booted.
async fn led_self_test(led: &mut LedController) {
    if let Err(e) = led.set(true).await {
        warn!(error = %e, "LED self-test failed");
        return;
    }
    tokio::time::sleep(LED_SELF_TEST).await;
    if let Err(e) = led.set(false).await {
        warn!(error = %e, "LED self-test failed");
    }
}

#[cfg(feature = "bluetooth")]
async fn open_scanner() -> anyhow::Result<beaconwatch_core::BluerScanner> {
    beaconwatch_core::BluerScanner::new()
        .await
        .map_err(BeaconError::from)
        .context("Failed to open Bluetooth adapter")
}

#[cfg(not(feature = "bluetooth"))]
async fn open_scanner() -> anyhow::Result<beaconwatch_core::MockScanner> {
    warn!("Built without Bluetooth support, every scan will be empty");
    Ok(beaconwatch_core::MockScanner::new())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown requested");
}
