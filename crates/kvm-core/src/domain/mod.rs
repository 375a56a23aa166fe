//! Domain entities for the KVM-Over-IP master control core.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core business rules of the application.
//! - Has **no** imports from OS APIs, network libraries, database drivers, or UI
//!   frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Code in outer layers (infrastructure, application, UI) depends on the domain,
//! but the domain never depends on them.  Time is passed in as `Instant`
//! values rather than read from the clock, so every rule here is reproducible
//! in a unit test.

/// Client lifecycle states and the legal transitions between them.
pub mod connection;

/// Virtual screen layout: validation, atomic replacement, cursor resolution.
///
/// See [`layout::VirtualLayout`] for the main type.
pub mod layout;

/// Latency, event-rate and liveness-probe bookkeeping.
pub mod telemetry;
