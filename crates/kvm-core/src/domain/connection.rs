//! Client connection lifecycle.
//!
//! Every client known to the master sits in exactly one [`ConnectionState`].
//! Wire-level happenings (a Hello arriving, a PIN being checked, a probe going
//! unanswered) are expressed as [`ConnectionEvent`]s and fed through
//! [`ConnectionState::apply`], which is the single place the legal edges are
//! written down.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!                 ┌──────── PinMismatch ────────┐
//!                 ▼                             │
//! Connecting ──► Connected ──► Pairing ─────────┘
//!     │              │            │  └── PinVerified ──► Active
//!     │              └── PairingNotRequired ───────────► Active
//!     │                           │                        │
//!     └──────────────► Disconnected ◄──────────────────────┘
//! ```
//!
//! A second Hello from an identity that is already known re-enters
//! `Connecting` from any state via [`ConnectionEvent::Reconnect`]; that is the
//! only way out of `Disconnected`.  Removing a client ("forget") is not a
//! transition at all: the registry simply drops the record.

use std::fmt;

use thiserror::Error;

/// Current state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected.  The record is kept so the UI can still show the client.
    Disconnected,
    /// TCP accepted, waiting for (or validating) the Hello.
    Connecting,
    /// Hello accepted and identity bound; pairing decision pending.
    Connected,
    /// PIN exchange in progress.
    Pairing,
    /// Trusted and live: eligible for input routing and probed for liveness.
    Active,
}

impl ConnectionState {
    /// All states, in lifecycle order.
    pub const ALL: [ConnectionState; 5] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Pairing,
        ConnectionState::Active,
    ];

    /// Returns the state reached by applying `event`, or an error when the
    /// edge does not exist.  The receiver is never modified.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Invalid`] for any `(state, event)` pair that
    /// is not an edge of the lifecycle.
    pub fn apply(self, event: ConnectionEvent) -> Result<ConnectionState, TransitionError> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let next = match (self, event) {
            (_, E::Reconnect) => S::Connecting,

            (S::Connecting, E::HelloAccepted) => S::Connected,
            (S::Connecting, E::HelloRejected | E::HandshakeTimedOut) => S::Disconnected,

            (S::Connected, E::PairingRequired) => S::Pairing,
            (S::Connected, E::PairingNotRequired) => S::Active,

            (S::Pairing, E::PinVerified) => S::Active,
            (S::Pairing, E::PinMismatch) => S::Pairing,
            (S::Pairing, E::PairingFailed | E::PeerClosed) => S::Disconnected,

            (S::Active, E::ProbesMissed | E::PeerClosed) => S::Disconnected,

            (from, event) => return Err(TransitionError::Invalid { from, event }),
        };
        Ok(next)
    }

    /// Returns `true` for the states in which a handshake is still in flight
    /// and therefore bounded by the handshake timeout.
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Pairing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Pairing => "pairing",
            ConnectionState::Active => "active",
        };
        f.write_str(s)
    }
}

/// Something that happened to a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// A Hello arrived from an identity the registry already knows.
    Reconnect,
    /// The Hello was well-formed and the identity is now bound.
    HelloAccepted,
    /// The Hello was malformed (bad version, bad name).
    HelloRejected,
    /// No acceptable Hello arrived within the handshake timeout.
    HandshakeTimedOut,
    /// The client is not trusted yet; a PIN prompt was shown.
    PairingRequired,
    /// The client is already trusted; skip the PIN exchange.
    PairingNotRequired,
    /// The submitted PIN matched.
    PinVerified,
    /// The submitted PIN did not match; retries remain.
    PinMismatch,
    /// PIN retries exhausted, session expired, or pairing timed out.
    PairingFailed,
    /// The configured number of consecutive liveness probes went unanswered.
    ProbesMissed,
    /// The peer closed or reset the control connection.
    PeerClosed,
}

impl ConnectionEvent {
    /// All events.
    pub const ALL: [ConnectionEvent; 11] = [
        ConnectionEvent::Reconnect,
        ConnectionEvent::HelloAccepted,
        ConnectionEvent::HelloRejected,
        ConnectionEvent::HandshakeTimedOut,
        ConnectionEvent::PairingRequired,
        ConnectionEvent::PairingNotRequired,
        ConnectionEvent::PinVerified,
        ConnectionEvent::PinMismatch,
        ConnectionEvent::PairingFailed,
        ConnectionEvent::ProbesMissed,
        ConnectionEvent::PeerClosed,
    ];
}

/// Error returned when an event has no edge out of the current state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: {event:?} is not allowed while {from}")]
    Invalid {
        from: ConnectionState,
        event: ConnectionEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_hello_accepted_moves_connecting_to_connected() {
        assert_eq!(
            ConnectionState::Connecting.apply(ConnectionEvent::HelloAccepted),
            Ok(ConnectionState::Connected)
        );
    }

    #[test]
    fn test_apply_pairing_not_required_activates_connected_client() {
        assert_eq!(
            ConnectionState::Connected.apply(ConnectionEvent::PairingNotRequired),
            Ok(ConnectionState::Active)
        );
    }

    #[test]
    fn test_apply_pin_mismatch_keeps_client_pairing() {
        assert_eq!(
            ConnectionState::Pairing.apply(ConnectionEvent::PinMismatch),
            Ok(ConnectionState::Pairing)
        );
    }

    #[test]
    fn test_apply_rejects_skipping_straight_to_active() {
        let result = ConnectionState::Connecting.apply(ConnectionEvent::PinVerified);
        assert_eq!(
            result,
            Err(TransitionError::Invalid {
                from: ConnectionState::Connecting,
                event: ConnectionEvent::PinVerified,
            })
        );
    }

    #[test]
    fn test_apply_reconnect_is_the_only_way_out_of_disconnected() {
        for event in ConnectionEvent::ALL {
            let result = ConnectionState::Disconnected.apply(event);
            if event == ConnectionEvent::Reconnect {
                assert_eq!(result, Ok(ConnectionState::Connecting));
            } else {
                assert!(result.is_err(), "{event:?} must not leave Disconnected");
            }
        }
    }

    #[test]
    fn test_is_handshaking_excludes_active_and_disconnected() {
        assert!(ConnectionState::Connecting.is_handshaking());
        assert!(ConnectionState::Pairing.is_handshaking());
        assert!(!ConnectionState::Active.is_handshaking());
        assert!(!ConnectionState::Disconnected.is_handshaking());
    }

    #[test]
    fn test_transition_error_message_names_state_and_event() {
        let err = ConnectionState::Active
            .apply(ConnectionEvent::HelloAccepted)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition: HelloAccepted is not allowed while active"
        );
    }
}
