//! Application state shared across handlers.
//!
//! Handlers never touch the control loop's data directly. They read the
//! last published [`AgentStatus`] and send [`ControlCommand`]s, which the
//! loop applies at the start of its next iteration.

use std::sync::Arc;

use beaconwatch_core::{AgentStatus, ControlCommand};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};

use crate::peripheral::LedController;

/// Handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// State owned by the control surface.
#[derive(Debug)]
pub struct AppState {
    /// Status LED.
    pub led: LedController,
    /// Channel into the control loop.
    pub commands: mpsc::Sender<ControlCommand>,
    /// Latest status published by the control loop.
    pub status: watch::Receiver<AgentStatus>,
    /// Wall-clock start time, for display only.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wraps the control-surface state for sharing.
    #[must_use]
    pub fn shared(
        led: LedController,
        commands: mpsc::Sender<ControlCommand>,
        status: watch::Receiver<AgentStatus>,
    ) -> SharedState {
        Arc::new(RwLock::new(Self {
            led,
            commands,
            status,
            started_at: Utc::now(),
        }))
    }
}
