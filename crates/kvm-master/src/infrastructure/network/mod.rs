//! Network infrastructure for the master application.
//!
//! # Sub-modules
//!
//! - **`connection_manager`** – Drives the handshake and pairing state machine
//!   for clients on the control channel.  Handles Hello validation, PIN
//!   generation, hash verification, lockout on repeated failures, and the
//!   trusted-client set.
//!
//! - **`probe_transport`** – Queues liveness probes for the control-channel
//!   writer so probe rounds never wait on a socket.

pub mod connection_manager;
pub mod probe_transport;
