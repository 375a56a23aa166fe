//! ManageClientsUseCase: client registry and connection state management.
//!
//! The `ClientRegistry` is the master's in-memory database of every KVM client
//! it has seen.  Each entry tracks:
//!
//! - The client's UUID, display name, and current `ConnectionState`.
//! - When the state last changed (drives the handshake and absence timeouts).
//! - Liveness probe bookkeeping and the telemetry derived from it (latency,
//!   events per second).
//!
//! # Connection lifecycle (for beginners)
//!
//! Clients progress through these states:
//!
//! ```text
//! Connecting  ──►  Connected  ──►  Pairing  ──►  Active
//!     │                              │              │
//!     └──────────────────────► Disconnected ◄───────┘
//! ```
//!
//! The legal edges live in [`kvm_core::ConnectionState::apply`]; the registry
//! refuses anything else with [`RegistryError::InvalidTransition`] and leaves
//! the record untouched.
//!
//! # Ordering
//!
//! Records are kept in a `BTreeMap` so [`ClientRegistry::snapshot`] is always
//! in ascending client-ID order.  The UI polls this list; a stable order keeps
//! its diffs small.
//!
//! `display_name` comes from the client's Hello and is never trusted for
//! anything except display.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use kvm_core::{
    ClientId, ConnectionEvent, ConnectionState, EventRateWindow, LatencyTracker, ProbeTracker,
    TransitionError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Length of one events-per-second counting window.
pub const DEFAULT_TELEMETRY_WINDOW: Duration = Duration::from_secs(1);

/// Error type for registry operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// The operation referenced a client the registry does not know.
    #[error("client not found: {0}")]
    NotFound(ClientId),

    /// The requested transition is not an edge of the lifecycle.
    #[error("client {client_id}: {source}")]
    InvalidTransition {
        client_id: ClientId,
        #[source]
        source: TransitionError,
    },
}

/// Point-in-time copy of one client, as handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub connection_state: ConnectionState,
    /// When `connection_state` last changed.
    pub last_changed_at: Instant,
    pub last_ping_sent_at: Option<Instant>,
    pub last_pong_received_at: Option<Instant>,
    /// Rolling mean of recent round trips, in milliseconds.
    pub latency_ms: f32,
    /// Most recent successful round trip.
    pub last_rtt: Option<Duration>,
    /// Events routed to this client in the last completed window.
    pub events_per_second: u32,
    /// Consecutive liveness probes that went unanswered.
    pub missed_probes: u32,
}

/// Deadlines applied by [`ClientRegistry::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepTimeouts {
    /// Maximum time in `Connecting` or `Connected`.
    pub handshake: Duration,
    /// Maximum time in `Pairing`.  Equal to the PIN expiry, so a session
    /// and its client always lapse together.
    pub pairing: Duration,
    /// Time a `Disconnected` client is kept before removal.
    pub absence: Duration,
}

/// Result of one [`ClientRegistry::sweep`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Clients whose handshake or pairing ran out of time.
    pub timed_out: Vec<ClientId>,
    /// Disconnected clients removed after the absence timeout.
    pub removed: Vec<ClientId>,
}

#[derive(Debug, Clone)]
struct ClientEntry {
    id: ClientId,
    name: String,
    state: ConnectionState,
    last_changed_at: Instant,
    last_ping_sent_at: Option<Instant>,
    last_pong_received_at: Option<Instant>,
    latency: LatencyTracker,
    events: EventRateWindow,
    probes: ProbeTracker,
}

impl ClientEntry {
    fn new(id: ClientId, name: String, state: ConnectionState, window: Duration, now: Instant) -> Self {
        Self {
            id,
            name,
            state,
            last_changed_at: now,
            last_ping_sent_at: None,
            last_pong_received_at: None,
            latency: LatencyTracker::new(),
            events: EventRateWindow::new(window, now),
            probes: ProbeTracker::new(),
        }
    }

    fn record(&self, now: Instant) -> ClientRecord {
        ClientRecord {
            id: self.id,
            name: self.name.clone(),
            connection_state: self.state,
            last_changed_at: self.last_changed_at,
            last_ping_sent_at: self.last_ping_sent_at,
            last_pong_received_at: self.last_pong_received_at,
            latency_ms: self.latency.rolling_ms(),
            last_rtt: self.latency.last(),
            events_per_second: self.events.rate(now),
            missed_probes: self.probes.consecutive_misses(),
        }
    }

    /// Applies `event`, committing the new state, timestamp and the probe and
    /// telemetry resets together.
    fn apply(&mut self, event: ConnectionEvent, now: Instant) -> Result<ConnectionState, TransitionError> {
        let from = self.state;
        let to = from.apply(event)?;

        self.state = to;
        // A PIN retry stays in Pairing and must not extend its deadline.
        if to != from {
            self.last_changed_at = now;
        }
        match to {
            ConnectionState::Active if from != ConnectionState::Active => {
                self.probes.reset();
                self.events.reset(now);
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                self.probes.reset();
            }
            _ => {}
        }

        debug!(client_id = %self.id, %from, %to, ?event, "client transition");
        Ok(to)
    }
}

/// In-memory registry of all known clients.
///
/// The registry is stored behind its own `RwLock` in `AppState`, separate
/// from the layout and network configuration, so high-frequency probe
/// updates never wait on a layout edit.
///
/// All mutations of one record happen inside a single `&mut self` call, so a
/// reader holding the lock always sees whole records.
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, ClientEntry>,
    telemetry_window: Duration,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::with_telemetry_window(DEFAULT_TELEMETRY_WINDOW)
    }

    /// Creates a registry whose events-per-second figure is counted over `window`.
    pub fn with_telemetry_window(window: Duration) -> Self {
        Self {
            clients: BTreeMap::new(),
            telemetry_window: window,
        }
    }

    /// Registers a client that completed a handshake, or refreshes one that
    /// reconnects.
    ///
    /// A new identity is created in `Connecting`.  A known identity gets its
    /// display name updated and re-enters `Connecting`; no duplicate is ever
    /// created.
    pub fn upsert(&mut self, id: ClientId, name: impl Into<String>) -> ClientRecord {
        let now = Instant::now();
        let name = name.into();

        match self.clients.get_mut(&id) {
            Some(entry) => {
                entry.name = name;
                if entry.state != ConnectionState::Connecting {
                    // Reconnect is an edge from every state.
                    let _ = entry.apply(ConnectionEvent::Reconnect, now);
                }
                entry.record(now)
            }
            None => {
                info!(client_id = %id, name = ?name, "new client");
                let entry = ClientEntry::new(id, name, ConnectionState::Connecting, self.telemetry_window, now);
                let record = entry.record(now);
                self.clients.insert(id, entry);
                record
            }
        }
    }

    /// Adds a `Disconnected` placeholder for a client known from configuration,
    /// so its layout entry can be kept before it first connects.
    ///
    /// Returns `false` if the client is already registered.
    pub fn register_known(&mut self, id: ClientId, name: impl Into<String>) -> bool {
        if self.clients.contains_key(&id) {
            return false;
        }
        let entry = ClientEntry::new(
            id,
            name.into(),
            ConnectionState::Disconnected,
            self.telemetry_window,
            Instant::now(),
        );
        self.clients.insert(id, entry);
        true
    }

    /// Applies a lifecycle event to one client.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the client is unknown.
    /// - [`RegistryError::InvalidTransition`] if the event has no edge out of
    ///   the current state; the record is left unchanged.
    pub fn transition(&mut self, id: ClientId, event: ConnectionEvent) -> Result<ConnectionState, RegistryError> {
        self.transition_at(id, event, Instant::now())
    }

    fn transition_at(
        &mut self,
        id: ClientId,
        event: ConnectionEvent,
        now: Instant,
    ) -> Result<ConnectionState, RegistryError> {
        let entry = self.clients.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        entry.apply(event, now).map_err(|source| {
            warn!(client_id = %id, %source, "rejected transition");
            RegistryError::InvalidTransition { client_id: id, source }
        })
    }

    /// Merges telemetry into a client's record.
    ///
    /// `latency_sample` is a completed probe round trip; `event_count` is the
    /// number of input events routed to the client at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the client is unknown.
    pub fn record_telemetry(
        &mut self,
        id: ClientId,
        latency_sample: Option<Duration>,
        event_count: u32,
        now: Instant,
    ) -> Result<(), RegistryError> {
        let entry = self.clients.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        if let Some(rtt) = latency_sample {
            entry.latency.record(rtt);
        }
        if event_count > 0 {
            entry.events.record(event_count, now);
        }
        Ok(())
    }

    /// Marks a fresh probe as sent to every `Active` client that has none
    /// outstanding.
    ///
    /// Returns `(client, sequence number)` pairs for the transport to send.
    pub fn start_probes(&mut self, now: Instant) -> Vec<(ClientId, u64)> {
        self.clients
            .values_mut()
            .filter(|e| e.state == ConnectionState::Active)
            .filter_map(|e| {
                let seq = e.probes.start(now)?;
                e.last_ping_sent_at = Some(now);
                Some((e.id, seq))
            })
            .collect()
    }

    /// Counts unanswered probes older than `timeout` as misses and disconnects
    /// every `Active` client that reaches `miss_threshold` consecutive misses.
    ///
    /// Returns the clients that were disconnected.
    pub fn expire_probes(&mut self, now: Instant, timeout: Duration, miss_threshold: u32) -> Vec<ClientId> {
        let threshold = miss_threshold.max(1);
        let mut disconnected = Vec::new();

        for entry in self.clients.values_mut() {
            if entry.state != ConnectionState::Active || !entry.probes.expire(now, timeout) {
                continue;
            }
            let misses = entry.probes.consecutive_misses();
            debug!(client_id = %entry.id, misses, "liveness probe missed");
            if misses >= threshold && entry.apply(ConnectionEvent::ProbesMissed, now).is_ok() {
                warn!(client_id = %entry.id, misses, "client unresponsive, disconnecting");
                disconnected.push(entry.id);
            }
        }
        disconnected
    }

    /// Matches a probe reply.  A matching reply resets the miss counter and
    /// feeds the round-trip time into the rolling latency.
    ///
    /// Returns the round-trip time, or `None` for a stale or unexpected reply.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the client is unknown.
    pub fn record_probe_reply(&mut self, id: ClientId, seq: u64, now: Instant) -> Result<Option<Duration>, RegistryError> {
        let entry = self.clients.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        let rtt = entry.probes.complete(seq, now);
        if let Some(rtt) = rtt {
            entry.last_pong_received_at = Some(now);
            entry.latency.record(rtt);
        }
        Ok(rtt)
    }

    /// Applies the handshake and absence timeouts.
    ///
    /// - `Connecting` records older than `timeouts.handshake` time out.
    /// - `Pairing` records older than `timeouts.pairing` fail pairing.
    /// - `Disconnected` records older than `timeouts.absence` are removed,
    ///   unless `retain` returns `true` for them.
    pub fn sweep<F>(&mut self, now: Instant, timeouts: SweepTimeouts, retain: F) -> SweepOutcome
    where
        F: Fn(&ClientId) -> bool,
    {
        let mut outcome = SweepOutcome::default();

        for entry in self.clients.values_mut() {
            let deadline = match entry.state {
                ConnectionState::Pairing => timeouts.pairing,
                _ => timeouts.handshake,
            };
            let age = now.saturating_duration_since(entry.last_changed_at);
            if !entry.state.is_handshaking() || age < deadline {
                continue;
            }
            // `Connected` has no timeout edge; `apply` rejects it below.
            let event = match entry.state {
                ConnectionState::Pairing => ConnectionEvent::PairingFailed,
                _ => ConnectionEvent::HandshakeTimedOut,
            };
            if entry.apply(event, now).is_ok() {
                warn!(client_id = %entry.id, ?event, "handshake timed out");
                outcome.timed_out.push(entry.id);
            }
        }

        self.clients.retain(|id, entry| {
            let expired = entry.state == ConnectionState::Disconnected
                && now.saturating_duration_since(entry.last_changed_at) >= timeouts.absence
                && !retain(id);
            if expired {
                info!(client_id = %id, "removing absent client");
                outcome.removed.push(*id);
            }
            !expired
        });

        outcome
    }

    /// Returns a snapshot of all clients in ascending ID order.
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        let now = Instant::now();
        self.clients.values().map(|e| e.record(now)).collect()
    }

    /// Returns the record for a specific client.
    pub fn get(&self, id: ClientId) -> Option<ClientRecord> {
        self.clients.get(&id).map(|e| e.record(Instant::now()))
    }

    /// Events routed to a client in the window that completed most recently
    /// before `now`.
    pub fn events_per_second_at(&self, id: ClientId, now: Instant) -> Option<u32> {
        self.clients.get(&id).map(|e| e.events.rate(now))
    }

    /// Returns just the connection state for a client.
    pub fn state_of(&self, id: ClientId) -> Option<ConnectionState> {
        self.clients.get(&id).map(|e| e.state)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn is_active(&self, id: ClientId) -> bool {
        self.state_of(id) == Some(ConnectionState::Active)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Removes a client from the registry, whatever its state.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the client is unknown.
    pub fn forget(&mut self, id: ClientId) -> Result<ClientRecord, RegistryError> {
        let entry = self.clients.remove(&id).ok_or(RegistryError::NotFound(id))?;
        info!(client_id = %id, state = %entry.state, "client forgotten");
        Ok(entry.record(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const HANDSHAKE: Duration = Duration::from_secs(10);
    const PAIRING: Duration = Duration::from_secs(60);
    const ABSENCE: Duration = Duration::from_secs(300);
    const TIMEOUTS: SweepTimeouts = SweepTimeouts {
        handshake: HANDSHAKE,
        pairing: PAIRING,
        absence: ABSENCE,
    };

    fn keep_none(_: &ClientId) -> bool {
        false
    }

    fn activate(registry: &mut ClientRegistry, name: &str) -> ClientId {
        let id = Uuid::new_v4();
        registry.upsert(id, name);
        registry.transition(id, ConnectionEvent::HelloAccepted).unwrap();
        registry.transition(id, ConnectionEvent::PairingNotRequired).unwrap();
        id
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ClientRegistry::new();
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_upsert_creates_connecting_record() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        let record = registry.upsert(id, "jerry-laptop");
        assert_eq!(record.connection_state, ConnectionState::Connecting);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_twice_with_same_identity_keeps_one_record() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.upsert(id, "dev-linux");
        registry.upsert(id, "dev-linux");
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.state_of(id), Some(ConnectionState::Connecting));
    }

    #[test]
    fn test_upsert_known_active_client_updates_name_and_reenters_connecting() {
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "dev-linux");

        let record = registry.upsert(id, "dev-linux-renamed");

        assert_eq!(record.name, "dev-linux-renamed");
        assert_eq!(record.connection_state, ConnectionState::Connecting);
    }

    #[test]
    fn test_transition_follows_handshake_edges() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.upsert(id, "jerry-laptop");

        assert_eq!(
            registry.transition(id, ConnectionEvent::HelloAccepted),
            Ok(ConnectionState::Connected)
        );
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].connection_state, ConnectionState::Connected);
    }

    #[test]
    fn test_transition_rejects_illegal_edge_and_keeps_state() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.upsert(id, "test");
        let before = registry.get(id).unwrap();

        let result = registry.transition(id, ConnectionEvent::PinVerified);

        assert!(matches!(result, Err(RegistryError::InvalidTransition { .. })));
        assert_eq!(registry.get(id).unwrap().last_changed_at, before.last_changed_at);
        assert_eq!(registry.state_of(id), Some(ConnectionState::Connecting));
    }

    #[test]
    fn test_transition_unknown_client_is_not_found() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.transition(id, ConnectionEvent::HelloAccepted),
            Err(RegistryError::NotFound(id))
        );
    }

    #[test]
    fn test_transition_updates_last_changed_at() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        let created = registry.upsert(id, "test").last_changed_at;
        registry.transition(id, ConnectionEvent::HelloAccepted).unwrap();
        assert!(registry.get(id).unwrap().last_changed_at >= created);
    }

    #[test]
    fn test_snapshot_is_sorted_by_identity() {
        let mut registry = ClientRegistry::new();
        for i in 0..8 {
            registry.upsert(Uuid::new_v4(), format!("client-{i}"));
        }
        let ids: Vec<ClientId> = registry.snapshot().iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_forget_removes_client_from_any_state() {
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "test");
        assert!(registry.forget(id).is_ok());
        assert!(registry.get(id).is_none());
        assert_eq!(registry.forget(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_register_known_adds_disconnected_placeholder_once() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        assert!(registry.register_known(id, "office-mac"));
        assert!(!registry.register_known(id, "office-mac"));
        assert_eq!(registry.state_of(id), Some(ConnectionState::Disconnected));
    }

    // ── Telemetry ─────────────────────────────────────────────────────────────

    #[test]
    fn test_record_telemetry_publishes_events_per_completed_window() {
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "test");
        let t0 = registry.get(id).unwrap().last_changed_at;

        registry.record_telemetry(id, None, 30, t0 + Duration::from_millis(100)).unwrap();
        registry.record_telemetry(id, None, 12, t0 + Duration::from_millis(900)).unwrap();
        registry.record_telemetry(id, None, 5, t0 + Duration::from_millis(1_100)).unwrap();

        assert_eq!(registry.events_per_second_at(id, t0 + Duration::from_millis(1_500)), Some(42));
        assert_eq!(registry.events_per_second_at(id, t0 + Duration::from_millis(2_100)), Some(5));
    }

    #[test]
    fn test_record_telemetry_latency_sample_updates_rolling_latency() {
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "test");
        let now = Instant::now();
        registry.record_telemetry(id, Some(Duration::from_millis(3)), 0, now).unwrap();
        assert!((registry.get(id).unwrap().latency_ms - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_record_telemetry_unknown_client_is_not_found() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.record_telemetry(id, None, 1, Instant::now()),
            Err(RegistryError::NotFound(id))
        );
    }

    // ── Liveness ──────────────────────────────────────────────────────────────

    #[test]
    fn test_start_probes_only_targets_active_clients() {
        let mut registry = ClientRegistry::new();
        let active = activate(&mut registry, "active");
        registry.upsert(Uuid::new_v4(), "connecting");

        let probes = registry.start_probes(Instant::now());

        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].0, active);
    }

    #[test]
    fn test_missed_probes_reaching_threshold_disconnect_client() {
        let timeout = Duration::from_millis(500);
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "test");
        let mut now = Instant::now();

        for round in 1..=3 {
            registry.start_probes(now);
            now += timeout;
            let dropped = registry.expire_probes(now, timeout, 3);
            if round < 3 {
                assert!(dropped.is_empty(), "round {round} must not disconnect");
                assert_eq!(registry.state_of(id), Some(ConnectionState::Active));
            } else {
                assert_eq!(dropped, vec![id]);
            }
        }
        assert_eq!(registry.state_of(id), Some(ConnectionState::Disconnected));
    }

    #[test]
    fn test_probe_reply_after_misses_resets_counter_and_keeps_active() {
        let timeout = Duration::from_millis(500);
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "test");
        let mut now = Instant::now();

        for _ in 0..2 {
            registry.start_probes(now);
            now += timeout;
            registry.expire_probes(now, timeout, 3);
        }
        assert_eq!(registry.get(id).unwrap().missed_probes, 2);

        let (_, seq) = registry.start_probes(now)[0];
        let rtt = registry
            .record_probe_reply(id, seq, now + Duration::from_millis(4))
            .unwrap();

        assert_eq!(rtt, Some(Duration::from_millis(4)));
        let record = registry.get(id).unwrap();
        assert_eq!(record.missed_probes, 0);
        assert_eq!(record.connection_state, ConnectionState::Active);
        assert!(record.last_pong_received_at.is_some());
    }

    // ── Sweep ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_sweep_times_out_stale_connecting_client() {
        let mut registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.upsert(id, "slow");

        let outcome = registry.sweep(Instant::now() + HANDSHAKE, TIMEOUTS, keep_none);

        assert_eq!(outcome.timed_out, vec![id]);
        assert_eq!(registry.state_of(id), Some(ConnectionState::Disconnected));
    }

    fn pairing_client(registry: &mut ClientRegistry) -> (ClientId, Instant) {
        let id = Uuid::new_v4();
        registry.upsert(id, "pairing");
        registry.transition(id, ConnectionEvent::HelloAccepted).unwrap();
        registry.transition(id, ConnectionEvent::PairingRequired).unwrap();
        (id, registry.get(id).unwrap().last_changed_at)
    }

    #[test]
    fn test_sweep_gives_pairing_client_the_pairing_deadline() {
        let mut registry = ClientRegistry::new();
        let (id, entered) = pairing_client(&mut registry);

        let early = registry.sweep(entered + HANDSHAKE + Duration::from_secs(1), TIMEOUTS, keep_none);
        assert!(early.timed_out.is_empty());
        assert_eq!(registry.state_of(id), Some(ConnectionState::Pairing));

        let late = registry.sweep(entered + PAIRING, TIMEOUTS, keep_none);
        assert_eq!(late.timed_out, vec![id]);
        assert_eq!(registry.state_of(id), Some(ConnectionState::Disconnected));
    }

    #[test]
    fn test_pin_retry_does_not_extend_pairing_deadline() {
        let mut registry = ClientRegistry::new();
        let (id, entered) = pairing_client(&mut registry);

        registry.transition(id, ConnectionEvent::PinMismatch).unwrap();

        assert_eq!(registry.get(id).unwrap().last_changed_at, entered);
    }

    #[test]
    fn test_sweep_leaves_active_clients_alone() {
        let mut registry = ClientRegistry::new();
        let id = activate(&mut registry, "steady");
        let outcome = registry.sweep(Instant::now() + HANDSHAKE, TIMEOUTS, keep_none);
        assert!(outcome.timed_out.is_empty());
        assert!(registry.is_active(id));
    }

    #[test]
    fn test_sweep_removes_long_absent_client_unless_retained() {
        let mut registry = ClientRegistry::new();
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        registry.register_known(gone, "gone");
        registry.register_known(kept, "kept");

        let later = Instant::now() + ABSENCE + Duration::from_secs(1);
        let outcome = registry.sweep(later, TIMEOUTS, |id| *id == kept);

        assert_eq!(outcome.removed, vec![gone]);
        assert!(registry.contains(kept));
        assert!(!registry.contains(gone));
    }
}
