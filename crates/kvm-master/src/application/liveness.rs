//! Liveness probing and lifecycle timeouts.
//!
//! # Protocol (for beginners)
//!
//! 1. Every `probe_interval` the master sends a probe with a sequence number
//!    to every `Active` client that has no probe outstanding.
//! 2. The client answers with the same sequence number.  The round trip is
//!    the client's latency sample.
//! 3. A probe unanswered after `probe_timeout` counts as one miss.  After
//!    `miss_threshold` consecutive misses the client goes `Disconnected`.
//!    Any answered probe resets the count to zero.
//!
//! The sending itself is behind the [`ProbeTransport`] trait so the round
//! logic is unit-testable without sockets.
//!
//! The same module runs the periodic [`run_sweep`]: handshakes that stall
//! past `handshake_timeout` are abandoned, pairings left unanswered past
//! `pairing_timeout` fail, and clients absent for longer than
//! `absence_timeout` are removed together with their layout entries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use kvm_core::ClientId;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::application::manage_clients::{ClientRegistry, RegistryError, SweepOutcome, SweepTimeouts};
use crate::application::update_layout::LayoutEngine;

/// Timing parameters for probing and lifecycle timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Interval between probe rounds.
    pub probe_interval: Duration,
    /// Time after which an unanswered probe counts as missed.
    pub probe_timeout: Duration,
    /// Consecutive misses that disconnect a client.
    pub miss_threshold: u32,
    /// Maximum time a client may spend in `Connecting` or `Connected`.
    pub handshake_timeout: Duration,
    /// Maximum time a client may spend in `Pairing`.  Set from the PIN
    /// expiry so both lapse at once.
    pub pairing_timeout: Duration,
    /// Time a `Disconnected` client is kept before it is removed.
    pub absence_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(3),
            miss_threshold: 3,
            handshake_timeout: Duration::from_secs(10),
            pairing_timeout: Duration::from_secs(60),
            absence_timeout: Duration::from_secs(300),
        }
    }
}

impl LivenessConfig {
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_miss_threshold(mut self, threshold: u32) -> Self {
        self.miss_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_pairing_timeout(mut self, timeout: Duration) -> Self {
        self.pairing_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_absence_timeout(mut self, timeout: Duration) -> Self {
        self.absence_timeout = timeout;
        self
    }

    pub fn sweep_timeouts(&self) -> SweepTimeouts {
        SweepTimeouts {
            handshake: self.handshake_timeout,
            pairing: self.pairing_timeout,
            absence: self.absence_timeout,
        }
    }
}

/// Sends liveness probes to clients.
///
/// The infrastructure implementation forwards to the client's control
/// channel; tests use the generated mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Sends probe `seq` to `client_id`.
    async fn send_probe(&self, client_id: ClientId, seq: u64) -> Result<(), String>;
}

/// What one probe round did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeRoundReport {
    /// Probes handed to the transport.
    pub sent: Vec<(ClientId, u64)>,
    /// Clients whose probe the transport could not send.  The probe stays
    /// outstanding and will count as a miss if nothing answers it.
    pub send_failures: Vec<ClientId>,
    /// Clients disconnected for reaching the miss threshold.
    pub disconnected: Vec<ClientId>,
}

/// Runs one probe round at `now`.
///
/// Misses are counted and new probes registered under a single write guard.
/// The guard is released before the transport is awaited, so a slow send
/// never blocks registry readers.
pub async fn run_probe_round(
    registry: &RwLock<ClientRegistry>,
    transport: &dyn ProbeTransport,
    config: &LivenessConfig,
    now: Instant,
) -> ProbeRoundReport {
    let (disconnected, probes) = {
        let mut reg = registry.write().await;
        let disconnected = reg.expire_probes(now, config.probe_timeout, config.miss_threshold);
        let probes = reg.start_probes(now);
        (disconnected, probes)
    };

    let mut report = ProbeRoundReport {
        disconnected,
        ..ProbeRoundReport::default()
    };
    for (client_id, seq) in probes {
        match transport.send_probe(client_id, seq).await {
            Ok(()) => report.sent.push((client_id, seq)),
            Err(e) => {
                warn!(%client_id, seq, error = %e, "failed to send liveness probe");
                report.send_failures.push(client_id);
            }
        }
    }
    report
}

/// Records a probe reply received at `now`.
///
/// Returns the round-trip time, or `None` for a late or unknown sequence number.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if the client is no longer registered.
pub async fn handle_probe_reply(
    registry: &RwLock<ClientRegistry>,
    client_id: ClientId,
    seq: u64,
    now: Instant,
) -> Result<Option<Duration>, RegistryError> {
    let rtt = registry.write().await.record_probe_reply(client_id, seq, now)?;
    match rtt {
        Some(rtt) => debug!(%client_id, seq, rtt_us = rtt.as_micros() as u64, "probe answered"),
        None => debug!(%client_id, seq, "ignoring stale probe reply"),
    }
    Ok(rtt)
}

/// Applies the handshake and absence timeouts at `now`.
///
/// Clients for which `retain` returns `true` survive the absence timeout.
/// Layout entries of removed clients are pruned while the registry guard is
/// still held, so no reader observes a layout referencing a removed client.
pub async fn run_sweep<F>(
    registry: &RwLock<ClientRegistry>,
    layout: &RwLock<LayoutEngine>,
    config: &LivenessConfig,
    now: Instant,
    retain: F,
) -> SweepOutcome
where
    F: Fn(&ClientId) -> bool,
{
    // Lock order: registry, then layout.
    let mut reg = registry.write().await;
    let outcome = reg.sweep(now, config.sweep_timeouts(), retain);
    if !outcome.removed.is_empty() {
        let mut engine = layout.write().await;
        engine.prune(&reg);
        info!(removed = outcome.removed.len(), "absent clients removed");
    }
    outcome
}
