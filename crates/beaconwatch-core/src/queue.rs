//! Bounded FIFO of undelivered events.
//!
//! When full, the oldest entry is dropped to make room: fresh presence
//! information is worth more than a complete history. Draining stops at the
//! first failed delivery so order is preserved for the next attempt.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::identity::BeaconIdentity;
use crate::presence::BeaconState;

/// Default maximum number of queued events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Kind of presence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A beacon became present.
    Arrival,
    /// A beacon timed out.
    Departure,
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "arrival",
            Self::Departure => "departure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event raised by the presence table, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingEvent {
    /// Arrival or departure.
    pub kind: EventKind,
    /// Identity of the beacon.
    pub beacon_id: BeaconIdentity,
    /// Beacon state when the event was raised.
    pub beacon: BeaconState,
    /// Uptime when the event was raised, in milliseconds.
    pub timestamp_ms: u64,
}

impl PendingEvent {
    /// Creates an event snapshotting `beacon`.
    pub fn new(kind: EventKind, beacon_id: BeaconIdentity, beacon: BeaconState, timestamp_ms: u64) -> Self {
        Self {
            kind,
            beacon_id,
            beacon,
            timestamp_ms,
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events delivered and removed.
    pub delivered: usize,
    /// Events still queued.
    pub remaining: usize,
}

/// Bounded FIFO of events waiting for delivery.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<PendingEvent>,
    capacity: usize,
}

impl EventQueue {
    /// Creates an empty queue holding at most `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `event`, evicting the oldest entry first when full.
    ///
    /// Returns the evicted event, if any.
    pub fn enqueue(&mut self, event: PendingEvent) -> Option<PendingEvent> {
        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front()
        } else {
            None
        };

        if let Some(dropped) = &evicted {
            warn!(
                kind = %dropped.kind,
                beacon_id = %dropped.beacon_id,
                capacity = self.capacity,
                "Event queue full, dropped oldest event"
            );
        }

        debug!(kind = %event.kind, beacon_id = %event.beacon_id, "Queued event");
        self.events.push_back(event);
        info!(queue_size = self.events.len(), "Event queued for later delivery");
        evicted
    }

    /// Offers queued events to `send` front to back.
    ///
    /// Each event `send` accepts is removed. The first rejection stops the
    /// pass and leaves that event and everything behind it in place.
    pub async fn drain<F, Fut>(&mut self, mut send: F) -> DrainReport
    where
        F: FnMut(PendingEvent) -> Fut,
        Fut: Future<Output = bool>,
    {
        if self.events.is_empty() {
            return DrainReport::default();
        }

        info!(queue_size = self.events.len(), "Draining queued events");

        let mut delivered = 0;
        while let Some(front) = self.events.front() {
            if !send(front.clone()).await {
                break;
            }
            self.events.pop_front();
            delivered += 1;
        }

        let report = DrainReport {
            delivered,
            remaining: self.events.len(),
        };
        info!(
            delivered = report.delivered,
            remaining = report.remaining,
            "Queue drain finished"
        );
        report
    }

    /// Number of queued events.
    #[must_use]
    pub fn size(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of queued events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.events.iter()
    }

    /// Drops every queued event, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        info!(dropped, "Event queue cleared");
        dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
