//! Link health monitoring.
//!
//! The monitor checks the link at a fixed interval, not on every call. It
//! reports edges only: a [`LinkTransition::Connected`] is returned exactly
//! once per disconnected-to-connected transition, which is the caller's cue
//! to drain the event queue.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::BeaconError;

/// Default interval between link checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of status checks after a reconnect request.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 20;

/// Default pause between reconnect status checks.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Failures of the underlying link collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The reconnect action could not be started or reported failure.
    #[error("reconnect command failed: {0}")]
    ReconnectFailed(String),

    /// Link status could not be read.
    #[error("link status unavailable: {0}")]
    StatusUnavailable(String),
}

/// Network link collaborator.
#[async_trait]
pub trait Link: Send + Sync {
    /// Whether the link currently reports connected.
    async fn is_up(&self) -> bool;

    /// Asks the link to (re)associate. Completion is observed via [`is_up`](Self::is_up).
    async fn reconnect(&self) -> Result<(), LinkError>;
}

/// Process-wide link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    connected: bool,
    last_check_ms: u64,
}

impl ConnectivityState {
    /// Connected as of `now_ms`.
    #[must_use]
    pub const fn connected(now_ms: u64) -> Self {
        Self {
            connected: true,
            last_check_ms: now_ms,
        }
    }

    /// Disconnected as of `now_ms`.
    #[must_use]
    pub const fn disconnected(now_ms: u64) -> Self {
        Self {
            connected: false,
            last_check_ms: now_ms,
        }
    }

    /// Whether the link is considered up.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Uptime of the last check, in milliseconds.
    #[must_use]
    pub const fn last_check_ms(&self) -> u64 {
        self.last_check_ms
    }
}

/// Bounded reconnection budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Status checks after the reconnect request.
    pub max_attempts: u32,
    /// Pause between checks.
    pub backoff: Duration,
}

impl ReconnectPolicy {
    /// Longest time one reconnection cycle may block.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.backoff * self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

/// Edge reported by a link check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    /// No state change (or no check was due).
    Unchanged,
    /// Disconnected to connected; the queue should be drained.
    Connected,
    /// Connected to disconnected.
    Disconnected,
}

/// Periodic link checker.
#[derive(Debug)]
pub struct ConnectivityMonitor<L> {
    link: L,
    state: ConnectivityState,
    poll_interval_ms: u64,
    policy: ReconnectPolicy,
}

impl<L: Link> ConnectivityMonitor<L> {
    /// Creates a monitor that starts disconnected at `now_ms`.
    pub fn new(link: L, poll_interval: Duration, policy: ReconnectPolicy, now_ms: u64) -> Self {
        Self {
            link,
            state: ConnectivityState::disconnected(now_ms),
            poll_interval_ms: u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
            policy,
        }
    }

    /// Current link state.
    #[must_use]
    pub const fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// The underlying link.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Initial bring-up: one bounded connection sequence.
    ///
    /// Returns [`LinkTransition::Unchanged`] when the budget is exhausted; the
    /// caller carries on in disconnected mode.
    pub async fn bring_up(&mut self, now_ms: u64) -> LinkTransition {
        self.state.last_check_ms = now_ms;
        if self.link.is_up().await {
            self.state.connected = true;
            info!("Link up");
            return LinkTransition::Connected;
        }
        self.reconnect().await
    }

    /// Checks the link if the poll interval has elapsed since the last check.
    pub async fn poll(&mut self, now_ms: u64) -> LinkTransition {
        if now_ms.saturating_sub(self.state.last_check_ms) <= self.poll_interval_ms {
            return LinkTransition::Unchanged;
        }
        self.check(now_ms).await
    }

    /// Checks the link immediately.
    pub async fn check(&mut self, now_ms: u64) -> LinkTransition {
        self.state.last_check_ms = now_ms;
        let up = self.link.is_up().await;

        match (up, self.state.connected) {
            (true, true) => {
                debug!("Link still up");
                LinkTransition::Unchanged
            }
            (true, false) => {
                self.state.connected = true;
                info!("Link restored");
                LinkTransition::Connected
            }
            (false, true) => {
                self.state.connected = false;
                warn!("Link lost, events will be queued");
                LinkTransition::Disconnected
            }
            (false, false) => self.reconnect().await,
        }
    }

    async fn reconnect(&mut self) -> LinkTransition {
        info!(
            attempts = self.policy.max_attempts,
            budget_ms = u64::try_from(self.policy.budget().as_millis()).unwrap_or(u64::MAX),
            "Attempting to reconnect link"
        );

        if let Err(e) = self.link.reconnect().await {
            let err = BeaconError::from(e);
            warn!(code = err.error_code(), error = %err, "Reconnect request failed");
        }

        for attempt in 1..=self.policy.max_attempts {
            if self.link.is_up().await {
                self.state.connected = true;
                info!(attempt, "Link connected");
                return LinkTransition::Connected;
            }
            tokio::time::sleep(self.policy.backoff).await;
        }

        warn!("Link still down, continuing in disconnected mode");
        LinkTransition::Unchanged
    }
}
