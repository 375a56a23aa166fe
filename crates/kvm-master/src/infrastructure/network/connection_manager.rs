//! ConnectionManager: drives the handshake and pairing of clients on the
//! control channel.
//!
//! The transport layer parses wire messages and calls into this manager; the
//! manager decides what each message means for the client's lifecycle and
//! raises the matching [`ConnectionEvent`]s on the shared [`ClientRegistry`].
//!
//! # Admission flow (for beginners)
//!
//! 1. The client sends a **Hello** with its UUID, protocol version and
//!    display name.  A malformed Hello is rejected (`HelloRejected`).
//! 2. A valid Hello is accepted (`HelloAccepted`).  Clients that paired
//!    before are activated immediately (`PairingNotRequired`).
//! 3. New clients enter **Pairing**: the master generates a 6-digit PIN and
//!    shows it to the operator (via [`ManagerEvent::PairingRequested`]).  The
//!    client submits `hash_pin(pin, session_id)`.
//! 4. A wrong PIN keeps the client in `Pairing`.  Running out of attempts
//!    fails the pairing and locks the peer's IP address out for a while.
//! 5. The right PIN activates the client and marks it trusted.
//!
//! Registry transitions for one Hello are applied under a single write
//! guard, so no reader ever sees a client parked in `Connected`.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvm_core::{ClientId, ConnectionEvent, ConnectionState};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::manage_clients::{ClientRegistry, RegistryError};

/// Control-channel protocol version this master speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Longest display name a client may announce, in characters.
pub const MAX_CLIENT_NAME_LEN: usize = 64;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error type for the Hello step.
#[derive(Debug, Error, PartialEq)]
pub enum HandshakeError {
    #[error("unsupported protocol version {got} (expected {expected})")]
    UnsupportedVersion { got: u16, expected: u16 },

    #[error("invalid client name: {0}")]
    InvalidName(&'static str),

    #[error("address {addr} is locked out for {seconds_remaining}s")]
    LockedOut { addr: IpAddr, seconds_remaining: u64 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Error type specific to pairing.
#[derive(Debug, Error, PartialEq)]
pub enum PairingError {
    #[error("pairing session not found or expired")]
    SessionNotFound,

    #[error("incorrect PIN; {attempts_remaining} attempt(s) remaining")]
    WrongPin { attempts_remaining: u32 },

    #[error("client is locked out for {seconds_remaining}s due to too many failed attempts")]
    LockedOut { seconds_remaining: u64 },

    #[error("pairing session expired")]
    Expired,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Limits applied to PIN pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPolicy {
    /// Wrong PINs allowed per session.
    pub max_pin_attempts: u32,
    /// Lifetime of a pairing session.
    pub pin_expiry: Duration,
    /// How long an address is refused after exhausting a session.
    pub lockout: Duration,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            max_pin_attempts: 3,
            pin_expiry: Duration::from_secs(60),
            lockout: Duration::from_secs(60),
        }
    }
}

/// The first message a client sends on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub client_id: ClientId,
    pub protocol_version: u16,
    pub client_name: String,
}

/// What the transport should tell the client after a Hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The client is trusted and now `Active`.
    Activated,
    /// The client must answer the PIN challenge for `session_id`.
    PairingRequired { session_id: Uuid },
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    ClientActivated { client_id: ClientId },
    ClientRejected { client_id: ClientId, reason: String },
    /// Display `pin` to the operator.
    PairingRequested {
        client_id: ClientId,
        session_id: Uuid,
        pin: String,
    },
    PairingCompleted { client_id: ClientId },
    PairingFailed { client_id: ClientId, reason: String },
    ClientDisconnected { client_id: ClientId },
}

#[derive(Debug)]
struct PairingSession {
    client_id: ClientId,
    pin_hash: String,
    created_at: Instant,
    attempts: u32,
}

/// Per-IP lockout state.
#[derive(Debug)]
struct LockoutEntry {
    locked_until: Instant,
}

/// Outcome of checking a submitted PIN against its session.
enum PinCheck {
    Verified(ClientId),
    Mismatch(ClientId, u32),
    Exhausted(ClientId),
    Expired(ClientId),
}

/// Handshake and pairing driver.
///
/// Lives behind a `tokio::sync::Mutex` in `AppState`; it takes the registry
/// lock itself for each transition.
pub struct ConnectionManager {
    registry: Arc<RwLock<ClientRegistry>>,
    policy: PairingPolicy,
    pairing_sessions: HashMap<Uuid, PairingSession>,
    lockouts: HashMap<IpAddr, LockoutEntry>,
    trusted: HashSet<ClientId>,
    event_tx: mpsc::Sender<ManagerEvent>,
}

impl ConnectionManager {
    /// Creates a new connection manager and returns it together with the event receiver.
    pub fn new(
        registry: Arc<RwLock<ClientRegistry>>,
        policy: PairingPolicy,
    ) -> (Self, mpsc::Receiver<ManagerEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mgr = Self {
            registry,
            policy,
            pairing_sessions: HashMap::new(),
            lockouts: HashMap::new(),
            trusted: HashSet::new(),
            event_tx: tx,
        };
        (mgr, rx)
    }

    /// Marks a client as already paired, e.g. from the configuration file.
    pub fn trust(&mut self, client_id: ClientId) {
        self.trusted.insert(client_id);
    }

    pub fn is_trusted(&self, client_id: ClientId) -> bool {
        self.trusted.contains(&client_id)
    }

    /// Trusted clients in ascending ID order.
    pub fn trusted_clients(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.trusted.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Number of pairing sessions awaiting a PIN.
    pub fn pending_sessions(&self) -> usize {
        self.pairing_sessions.len()
    }

    /// Processes a Hello received from `peer`.
    ///
    /// The client is registered (or re-enters `Connecting` if known), then
    /// either rejected, activated, or moved to `Pairing`.  For a new pairing
    /// session the PIN is only published through
    /// [`ManagerEvent::PairingRequested`], never returned to the transport.
    ///
    /// # Errors
    ///
    /// - [`HandshakeError::LockedOut`] if `peer` is locked out; nothing is registered.
    /// - [`HandshakeError::UnsupportedVersion`] / [`HandshakeError::InvalidName`]
    ///   for a malformed Hello; the client ends `Disconnected`.
    pub async fn handle_hello(&mut self, hello: Hello, peer: IpAddr) -> Result<HandshakeOutcome, HandshakeError> {
        let now = Instant::now();
        if let Some(seconds_remaining) = self.lockout_remaining(peer, now) {
            warn!(%peer, client_id = %hello.client_id, "hello from locked-out address");
            return Err(HandshakeError::LockedOut {
                addr: peer,
                seconds_remaining,
            });
        }

        let client_id = hello.client_id;
        let validation = validate_hello(&hello);
        let trusted = self.trusted.contains(&client_id);

        // Any new Hello, accepted or not, abandons an earlier session.
        self.pairing_sessions.retain(|_, s| s.client_id != client_id);

        {
            let mut registry = self.registry.write().await;
            registry.upsert(client_id, display_name(&hello.client_name));

            if let Err(e) = validation {
                warn!(%client_id, name = ?hello.client_name, error = %e, "rejecting hello");
                registry.transition(client_id, ConnectionEvent::HelloRejected)?;
                drop(registry);
                self.emit(ManagerEvent::ClientRejected {
                    client_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }

            registry.transition(client_id, ConnectionEvent::HelloAccepted)?;
            let next = if trusted {
                ConnectionEvent::PairingNotRequired
            } else {
                ConnectionEvent::PairingRequired
            };
            registry.transition(client_id, next)?;
        }

        if trusted {
            info!(%client_id, name = ?hello.client_name, "trusted client activated");
            self.emit(ManagerEvent::ClientActivated { client_id });
            return Ok(HandshakeOutcome::Activated);
        }

        let pin = generate_pin();
        let session_id = Uuid::new_v4();
        self.pairing_sessions.insert(
            session_id,
            PairingSession {
                client_id,
                pin_hash: hash_pin(&pin, &session_id),
                created_at: now,
                attempts: 0,
            },
        );
        info!(%client_id, %session_id, name = ?hello.client_name, "pairing required");
        self.emit(ManagerEvent::PairingRequested {
            client_id,
            session_id,
            pin,
        });
        Ok(HandshakeOutcome::PairingRequired { session_id })
    }

    /// Verifies a PIN response and completes pairing on success.
    ///
    /// # Errors
    ///
    /// - [`PairingError::LockedOut`] if `peer` is locked out.
    /// - [`PairingError::SessionNotFound`] for an unknown session.
    /// - [`PairingError::Expired`] if the session outlived the PIN expiry
    ///   (the client's pairing fails) or the client already left `Pairing`.
    /// - [`PairingError::WrongPin`] for a mismatch.  With attempts remaining
    ///   the client stays in `Pairing`; with none, pairing fails and `peer`
    ///   is locked out.
    pub async fn submit_pin(&mut self, session_id: Uuid, submitted_pin_hash: &str, peer: IpAddr) -> Result<ClientId, PairingError> {
        let now = Instant::now();
        if let Some(seconds_remaining) = self.lockout_remaining(peer, now) {
            return Err(PairingError::LockedOut { seconds_remaining });
        }

        let client_id = self
            .pairing_sessions
            .get(&session_id)
            .map(|s| s.client_id)
            .ok_or(PairingError::SessionNotFound)?;

        // The sweep may already have failed this pairing.
        if self.registry.read().await.state_of(client_id) != Some(ConnectionState::Pairing) {
            self.pairing_sessions.remove(&session_id);
            debug!(%client_id, %session_id, "PIN for a pairing that already ended");
            return Err(PairingError::Expired);
        }

        let check = {
            let session = self
                .pairing_sessions
                .get_mut(&session_id)
                .ok_or(PairingError::SessionNotFound)?;

            if now.saturating_duration_since(session.created_at) > self.policy.pin_expiry {
                PinCheck::Expired(session.client_id)
            } else if hashes_match(&session.pin_hash, submitted_pin_hash) {
                PinCheck::Verified(session.client_id)
            } else {
                session.attempts += 1;
                match self.policy.max_pin_attempts.saturating_sub(session.attempts) {
                    0 => PinCheck::Exhausted(session.client_id),
                    remaining => PinCheck::Mismatch(session.client_id, remaining),
                }
            }
        };

        match check {
            PinCheck::Verified(client_id) => {
                self.pairing_sessions.remove(&session_id);
                self.registry
                    .write()
                    .await
                    .transition(client_id, ConnectionEvent::PinVerified)?;
                self.trusted.insert(client_id);
                info!(%client_id, "pairing completed");
                self.emit(ManagerEvent::PairingCompleted { client_id });
                Ok(client_id)
            }
            PinCheck::Mismatch(client_id, attempts_remaining) => {
                self.registry
                    .write()
                    .await
                    .transition(client_id, ConnectionEvent::PinMismatch)?;
                warn!(%client_id, %peer, attempts_remaining, "incorrect PIN");
                Err(PairingError::WrongPin { attempts_remaining })
            }
            PinCheck::Exhausted(client_id) => {
                self.pairing_sessions.remove(&session_id);
                self.lockouts.insert(
                    peer,
                    LockoutEntry {
                        locked_until: now + self.policy.lockout,
                    },
                );
                warn!(%client_id, %peer, "PIN attempts exhausted, address locked out");
                self.fail_pairing(client_id, "too many incorrect PINs").await?;
                Err(PairingError::WrongPin { attempts_remaining: 0 })
            }
            PinCheck::Expired(client_id) => {
                self.pairing_sessions.remove(&session_id);
                self.fail_pairing(client_id, "pairing session expired").await?;
                Err(PairingError::Expired)
            }
        }
    }

    /// Handles the control channel of `client_id` closing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the client is unknown.
    pub async fn handle_disconnect(&mut self, client_id: ClientId) -> Result<(), RegistryError> {
        self.pairing_sessions.retain(|_, s| s.client_id != client_id);

        let mut registry = self.registry.write().await;
        let event = match registry.state_of(client_id) {
            None => return Err(RegistryError::NotFound(client_id)),
            Some(ConnectionState::Active | ConnectionState::Pairing) => ConnectionEvent::PeerClosed,
            Some(ConnectionState::Connecting) => ConnectionEvent::HandshakeTimedOut,
            Some(ConnectionState::Connected | ConnectionState::Disconnected) => {
                debug!(%client_id, "disconnect in a state without a closing edge, ignored");
                return Ok(());
            }
        };
        registry.transition(client_id, event)?;
        drop(registry);

        info!(%client_id, "client disconnected");
        self.emit(ManagerEvent::ClientDisconnected { client_id });
        Ok(())
    }

    /// Drops pairing sessions and trust for a forgotten client.
    ///
    /// Returns `true` if the client was trusted.
    pub fn forget(&mut self, client_id: ClientId) -> bool {
        self.pairing_sessions.retain(|_, s| s.client_id != client_id);
        self.trusted.remove(&client_id)
    }

    /// Drops the pairing sessions of `client_id`, keeping its trust.
    ///
    /// Returns the number of sessions dropped.
    pub fn abandon_pairing(&mut self, client_id: ClientId) -> usize {
        let before = self.pairing_sessions.len();
        self.pairing_sessions.retain(|_, s| s.client_id != client_id);
        before - self.pairing_sessions.len()
    }

    /// Removes expired pairing sessions and lapsed lockouts.
    ///
    /// The registry side of an abandoned pairing is handled by the liveness
    /// sweep's handshake timeout.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expiry = self.policy.pin_expiry;
        let before = self.pairing_sessions.len();
        self.pairing_sessions
            .retain(|_, s| now.saturating_duration_since(s.created_at) <= expiry);
        self.lockouts.retain(|_, l| now < l.locked_until);
        before - self.pairing_sessions.len()
    }

    async fn fail_pairing(&mut self, client_id: ClientId, reason: &str) -> Result<(), PairingError> {
        self.registry
            .write()
            .await
            .transition(client_id, ConnectionEvent::PairingFailed)?;
        self.emit(ManagerEvent::PairingFailed {
            client_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn lockout_remaining(&self, addr: IpAddr, now: Instant) -> Option<u64> {
        self.lockouts
            .get(&addr)
            .filter(|entry| now < entry.locked_until)
            .map(|entry| (entry.locked_until - now).as_secs())
    }

    fn emit(&self, event: ManagerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "manager event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("manager event receiver dropped");
            }
        }
    }
}

/// Checks a Hello's protocol version and display name.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_hello(hello: &Hello) -> Result<(), HandshakeError> {
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(HandshakeError::UnsupportedVersion {
            got: hello.protocol_version,
            expected: PROTOCOL_VERSION,
        });
    }
    let name = hello.client_name.trim();
    if name.is_empty() {
        return Err(HandshakeError::InvalidName("empty"));
    }
    if name.chars().count() > MAX_CLIENT_NAME_LEN {
        return Err(HandshakeError::InvalidName("longer than 64 characters"));
    }
    if name.chars().any(char::is_control) {
        return Err(HandshakeError::InvalidName("contains control characters"));
    }
    Ok(())
}

/// Name stored in the registry: control characters stripped, length capped.
fn display_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_CLIENT_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Generates a random 6-digit numeric PIN.
fn generate_pin() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Hashes a PIN salted with its session ID, as the client must submit it.
pub fn hash_pin(pin: &str, session_id: &Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(pin.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares two PIN hashes without an early exit on the first difference.
fn hashes_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
