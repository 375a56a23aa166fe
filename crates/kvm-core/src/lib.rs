//! # kvm-core
//!
//! Domain library for the KVM-Over-IP master control core.
//!
//! It has zero dependencies on OS APIs, UI frameworks, async runtimes, or
//! network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! KVM-Over-IP is a software KVM switch: it lets you control multiple computers
//! (called "clients") using a single keyboard and mouse connected to one computer
//! (called the "master").  The clients' screens are arranged around the master's
//! screen as one virtual desktop; wherever the cursor is, that machine gets the
//! input.
//!
//! This crate defines:
//!
//! - **`domain::layout`** – The `VirtualLayout`: a 2-D map of where each client
//!   screen lives relative to the master, the rules a layout must satisfy, and
//!   the "which client is under the cursor" lookup.
//!
//! - **`domain::connection`** – The client lifecycle (`Connecting` →
//!   `Connected` → `Pairing` → `Active`, and back to `Disconnected`) as a
//!   closed enum with one transition function.
//!
//! - **`domain::telemetry`** – Rolling latency, fixed-window event rates, and
//!   the missed-probe counter behind liveness detection.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `kvm_core::VirtualLayout` instead of `kvm_core::domain::layout::VirtualLayout`.
pub use domain::connection::{ConnectionEvent, ConnectionState, TransitionError};
pub use domain::layout::{ClientId, LayoutEntry, LayoutError, ScreenId, ScreenRegion, VirtualLayout};
pub use domain::telemetry::{EventRateWindow, LatencyTracker, ProbeTracker};
