//! The control loop.
//!
//! [`Agent`] owns every piece of mutable state (presence table, event queue,
//! link state) and its collaborators. Nothing here is shared: the loop is the
//! only writer, and the control surface talks to it through
//! [`ControlCommand`]s and a published [`AgentStatus`].
//!
//! One iteration, in order:
//!
//! 1. apply pending control commands
//! 2. advance the connectivity monitor, draining the queue on reconnection
//! 3. sweep the presence table and report departures
//! 4. run one bounded scan and report arrivals
//! 5. summarize and yield

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::bluetooth::Scanner;
use crate::clock::{format_uptime, Clock};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, Link, LinkTransition};
use crate::delivery::{DeliveryClient, Disposition, Transport};
use crate::error::BeaconError;
use crate::identity::resolve;
use crate::presence::{BeaconState, Observation, ObservationResult, PresenceTable};
use crate::queue::{DrainReport, EventKind, EventQueue, PendingEvent};
use crate::types::{AgentStatus, ScanSummary};

/// Timing of the scan half of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Time without sighting after which a beacon departs.
    pub beacon_timeout: Duration,
    /// Length of one scan.
    pub scan_duration: Duration,
}

impl AgentSettings {
    /// Settings described by `config`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            beacon_timeout: config.presence.beacon_timeout(),
            scan_duration: config.presence.scan_duration(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Operator requests serviced at the top of each iteration.
#[derive(Debug)]
pub enum ControlCommand {
    /// Drop every queued event; replies with how many were dropped.
    ClearQueue {
        /// Receives the number of dropped events.
        reply: oneshot::Sender<usize>,
    },
}

/// Control-loop context.
pub struct Agent<S, T, L, C> {
    scanner: S,
    delivery: DeliveryClient<T>,
    monitor: ConnectivityMonitor<L>,
    presence: PresenceTable,
    queue: EventQueue,
    clock: C,
    settings: AgentSettings,
}

impl<S, T, L, C> Agent<S, T, L, C>
where
    S: Scanner,
    T: Transport,
    L: Link,
    C: Clock,
{
    /// Assembles an agent with an empty presence table.
    pub fn new(
        scanner: S,
        delivery: DeliveryClient<T>,
        monitor: ConnectivityMonitor<L>,
        queue: EventQueue,
        clock: C,
        settings: AgentSettings,
    ) -> Self {
        Self {
            scanner,
            delivery,
            monitor,
            presence: PresenceTable::new(),
            queue,
            clock,
            settings,
        }
    }

    /// Initial bring-up: one bounded connection sequence, then a drain if
    /// the link came up.
    pub async fn start(&mut self) -> LinkTransition {
        info!(
            device_id = %self.delivery.device_id(),
            timeout_ms = duration_ms(self.settings.beacon_timeout),
            scan_ms = duration_ms(self.settings.scan_duration),
            queue_capacity = self.queue.capacity(),
            "Starting beacon scanner"
        );

        let transition = self.monitor.bring_up(self.clock.now_ms()).await;
        if transition == LinkTransition::Connected {
            if self.delivery.ping(self.monitor.state()).await {
                info!("Backend reachable");
            } else {
                warn!("Backend did not answer ping, events will be retried");
            }
            self.drain().await;
        }
        transition
    }

    /// Applies one operator command.
    pub fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::ClearQueue { reply } => {
                let dropped = self.queue.clear();
                if reply.send(dropped).is_err() {
                    debug!("Clear-queue requester went away");
                }
            }
        }
    }

    /// Runs steps 2 to 5 of one iteration.
    pub async fn tick(&mut self) -> ScanSummary {
        if self.monitor.poll(self.clock.now_ms()).await == LinkTransition::Connected {
            self.drain().await;
        }

        let departures = self.sweep().await;

        let records = match self.scanner.scan(self.settings.scan_duration).await {
            Ok(records) => records,
            Err(e) => {
                let err = BeaconError::from(e);
                warn!(
                    code = err.error_code(),
                    recoverable = err.is_recoverable(),
                    error = %err,
                    "Scan failed, continuing"
                );
                Vec::new()
            }
        };

        let seen_at = self.clock.now_ms();
        let mut arrivals = 0;
        for record in &records {
            let identity = resolve(&record.address, record.manufacturer_payload.as_deref());
            let observation = Observation::from_record(record);

            match self.presence.observe(&identity, observation, seen_at) {
                ObservationResult::Arrived => {
                    arrivals += 1;
                    let Some(state) = self.presence.get(&identity).cloned() else {
                        continue;
                    };
                    log_event(EventKind::Arrival, identity.as_str(), &state);
                    let event = PendingEvent::new(EventKind::Arrival, identity, state, seen_at);
                    self.dispatch(event).await;
                }
                ObservationResult::Updated => {
                    debug!(beacon_id = %identity, rssi = record.rssi, "Beacon still present");
                }
            }
        }

        let summary = ScanSummary {
            finished_at: format_uptime(self.clock.now_ms()),
            devices_found: records.len(),
            arrivals,
            departures,
            known_beacons: self.presence.len(),
            present_beacons: self.presence.present_count(),
            connected: self.monitor.state().is_connected(),
            queue_size: self.queue.size(),
        };
        info!(
            finished_at = %summary.finished_at,
            devices_found = summary.devices_found,
            arrivals = summary.arrivals,
            departures = summary.departures,
            known_beacons = summary.known_beacons,
            present_beacons = summary.present_beacons,
            connected = summary.connected,
            queue_size = summary.queue_size,
            "Scan complete"
        );
        summary
    }

    /// Runs iterations until `shutdown` resolves.
    ///
    /// Shutdown is observed between iterations only; a scan or send in
    /// progress always completes.
    pub async fn run<F>(
        &mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        status: watch::Sender<AgentStatus>,
        loop_pause: Duration,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        status.send_replace(self.status());

        loop {
            while let Ok(command) = commands.try_recv() {
                self.handle_command(command);
            }

            self.tick().await;
            status.send_replace(self.status());

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(loop_pause) => {}
            }
        }

        info!(queue_size = self.queue.size(), "Control loop stopped");
    }

    /// Snapshot for the status probe.
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            connected: self.monitor.state().is_connected(),
            queue_size: self.queue.size(),
            queue_capacity: self.queue.capacity(),
            known_beacons: self.presence.len(),
            present_beacons: self.presence.present_count(),
            uptime_ms: self.clock.now_ms(),
        }
    }

    /// The presence table.
    pub const fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    /// The retry queue.
    pub const fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// The delivery client.
    pub const fn delivery(&self) -> &DeliveryClient<T> {
        &self.delivery
    }

    /// The connectivity monitor.
    pub const fn monitor(&self) -> &ConnectivityMonitor<L> {
        &self.monitor
    }

    /// The scanner.
    pub const fn scanner(&self) -> &S {
        &self.scanner
    }

    async fn drain(&mut self) -> DrainReport {
        self.delivery.drain(&mut self.queue).await
    }

    async fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        let timeout_ms = duration_ms(self.settings.beacon_timeout);
        let departed = self.presence.sweep(now, timeout_ms);
        let count = departed.len();

        for beacon in departed {
            log_event(EventKind::Departure, beacon.identity.as_str(), &beacon.state);
            let event = PendingEvent::new(EventKind::Departure, beacon.identity, beacon.state, now);
            self.dispatch(event).await;
        }
        count
    }

    async fn dispatch(&mut self, event: PendingEvent) {
        let disposition = self
            .delivery
            .send_or_queue(event, &mut self.queue, self.monitor.state())
            .await;
        if let Disposition::Queued { evicted } = disposition {
            debug!(evicted, queue_size = self.queue.size(), "Event deferred");
        }
    }
}

fn log_event(kind: EventKind, beacon_id: &str, state: &BeaconState) {
    let profile = state.profile.as_ref();
    info!(
        kind = %kind,
        beacon_id,
        name = %state.name,
        service_id = %state.service_id,
        rssi = state.rssi,
        proximity_uuid = ?profile.map(|p| p.proximity_uuid),
        major = ?profile.map(|p| p.major),
        minor = ?profile.map(|p| p.minor),
        measured_power = ?profile.map(|p| p.measured_power),
        "Beacon {}",
        kind
    );
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::bluetooth::{BluetoothError, MockScanner};
    use crate::clock::ManualClock;
    use crate::connectivity::tests::{fast_policy, ScriptedLink};
    use crate::delivery::tests::{endpoints, RecordingTransport};
    use crate::identity::tests::{profile_payload, TEST_UUID};
    use crate::types::AdvertisementRecord;
    use uuid::Uuid;

    type TestAgent = Agent<MockScanner, RecordingTransport, ScriptedLink, ManualClock>;

    fn agent(
        scanner: MockScanner,
        transport: RecordingTransport,
        link: &[bool],
        poll_interval: Duration,
        clock: &ManualClock,
    ) -> TestAgent {
        Agent::new(
            scanner,
            DeliveryClient::new(transport, endpoints(), "PI_TEST"),
            ConnectivityMonitor::new(ScriptedLink::new(link), poll_interval, fast_policy(3), 0),
            EventQueue::new(50),
            clock.clone(),
            AgentSettings {
                beacon_timeout: Duration::from_secs(10),
                scan_duration: Duration::from_secs(5),
            },
        )
    }

    fn record(address: &str) -> AdvertisementRecord {
        AdvertisementRecord::new(address, -58).with_name(format!("tag {address}"))
    }

    fn departures_posted(transport: &RecordingTransport) -> usize {
        transport
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.path() == "/beacon/departure")
            .count()
    }

    #[tokio::test]
    async fn test_offline_events_queue_then_drain_on_reconnect() {
        let clock = ManualClock::starting_at(0);
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![
            record("AA:00:00:00:00:01"),
            record("AA:00:00:00:00:02"),
            record("AA:00:00:00:00:03"),
        ]);
        let mut agent = agent(
            scanner,
            RecordingTransport::ok(),
            &[false],
            Duration::from_secs(1),
            &clock,
        );

        assert_eq!(agent.start().await, LinkTransition::Unchanged);
        let summary = agent.tick().await;

        assert_eq!(summary.arrivals, 3);
        assert_eq!(summary.queue_size, 3);
        assert!(!summary.connected);
        assert_eq!(agent.delivery().transport().attempts(), 0);

        agent.monitor().link().set(&[true]);
        clock.advance(1_001);
        let summary = agent.tick().await;

        assert!(summary.connected);
        assert_eq!(summary.queue_size, 0);
        assert_eq!(
            agent.delivery().transport().posted_beacons(),
            ["AA:00:00:00:00:01", "AA:00:00:00:00:02", "AA:00:00:00:00:03"]
        );
    }

    #[tokio::test]
    async fn test_arrival_update_and_departure() {
        let clock = ManualClock::starting_at(0);
        let uuid = Uuid::parse_str(TEST_UUID).unwrap();
        let beacon = record("AA:BB:CC:DD:EE:FF")
            .with_manufacturer_payload(profile_payload(uuid, 1, 2, -59));
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![beacon.clone()]);
        scanner.push_batch(vec![beacon]);
        let mut agent = agent(
            scanner,
            RecordingTransport::ok(),
            &[true],
            Duration::from_secs(30),
            &clock,
        );
        agent.start().await;

        let summary = agent.tick().await;
        assert_eq!(summary.arrivals, 1);
        assert_eq!(summary.present_beacons, 1);

        let identity = format!("AA:BB:CC:DD:EE:FF_{TEST_UUID}");
        assert_eq!(agent.delivery().transport().posted_beacons(), [identity.clone()]);
        let state = agent.presence().get(&identity.as_str().into()).unwrap();
        assert_eq!(state.profile.unwrap().major, 1);

        clock.set(3_000);
        let summary = agent.tick().await;
        assert_eq!(summary.arrivals, 0);
        assert_eq!(agent.delivery().transport().attempts(), 1);

        clock.set(14_000);
        let summary = agent.tick().await;
        assert_eq!(summary.departures, 1);
        assert_eq!(summary.present_beacons, 0);
        assert_eq!(summary.known_beacons, 1);
        assert_eq!(departures_posted(agent.delivery().transport()), 1);

        clock.set(20_000);
        let summary = agent.tick().await;
        assert_eq!(summary.departures, 0);
        assert_eq!(departures_posted(agent.delivery().transport()), 1);
    }

    #[tokio::test]
    async fn test_failed_live_send_is_queued() {
        let clock = ManualClock::starting_at(0);
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![record("AA:00:00:00:00:01")]);
        let mut agent = agent(
            scanner,
            RecordingTransport::failing_on(&[1]),
            &[true],
            Duration::from_secs(30),
            &clock,
        );
        agent.start().await;

        let summary = agent.tick().await;
        assert!(summary.connected);
        assert_eq!(summary.queue_size, 1);
    }

    #[tokio::test]
    async fn test_scan_failure_does_not_stop_loop() {
        let clock = ManualClock::starting_at(0);
        let mut scanner = MockScanner::new();
        scanner.push_failure(BluetoothError::DiscoveryFailed {
            message: "busy".to_string(),
        });
        scanner.push_batch(vec![record("AA:00:00:00:00:01")]);
        let mut agent = agent(
            scanner,
            RecordingTransport::ok(),
            &[true],
            Duration::from_secs(30),
            &clock,
        );
        agent.start().await;

        let summary = agent.tick().await;
        assert_eq!(summary.devices_found, 0);

        let summary = agent.tick().await;
        assert_eq!(summary.devices_found, 1);
        assert_eq!(agent.scanner().scans(), 2);
    }

    #[tokio::test]
    async fn test_clear_queue_command() {
        let clock = ManualClock::starting_at(0);
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![record("AA:00:00:00:00:01"), record("AA:00:00:00:00:02")]);
        let mut agent = agent(
            scanner,
            RecordingTransport::ok(),
            &[false],
            Duration::from_secs(30),
            &clock,
        );
        agent.start().await;
        agent.tick().await;
        assert_eq!(agent.queue().size(), 2);

        let (reply, dropped) = oneshot::channel();
        agent.handle_command(ControlCommand::ClearQueue { reply });
        assert_eq!(dropped.await.unwrap(), 2);
        assert!(agent.queue().is_empty());
    }

    #[tokio::test]
    async fn test_run_services_commands_and_publishes_status() {
        let clock = ManualClock::starting_at(0);
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![record("AA:00:00:00:00:01")]);
        let mut agent = agent(
            scanner,
            RecordingTransport::ok(),
            &[true],
            Duration::from_secs(30),
            &clock,
        );
        agent.start().await;

        let (commands_tx, commands_rx) = mpsc::channel(4);
        let (status_tx, status_rx) = watch::channel(AgentStatus::default());
        let (reply, dropped) = oneshot::channel();
        commands_tx
            .send(ControlCommand::ClearQueue { reply })
            .await
            .unwrap();

        agent
            .run(commands_rx, status_tx, Duration::ZERO, async {})
            .await;

        assert_eq!(dropped.await.unwrap(), 0);
        let status = status_rx.borrow().clone();
        assert!(status.connected);
        assert_eq!(status.known_beacons, 1);
        assert_eq!(status.queue_capacity, 50);
        assert_eq!(agent.monitor().link().reconnects.load(Ordering::SeqCst), 0);
    }
}
