//! Application layer use cases for the master application.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (OS/network/storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "admit this
//!   client" or "send input to whichever screen the cursor is on").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the infrastructure can be swapped without changing this code.
//! - **Contain no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`manage_clients`** – Maintains the in-memory registry of all known
//!   clients, their connection states and their health telemetry.
//!
//! - **`update_layout`** – Validates and applies layout changes (screen
//!   positions) coming from the drag-and-drop UI editor.
//!
//! - **`route_input`** – Decides whether input stays local or goes to a
//!   client.  This runs on every mouse movement while sharing is on.
//!
//! - **`liveness`** – Probe rounds that detect dead clients, plus the
//!   handshake and absence timeouts.
//!
//! - **`network_settings`** – Port and bind-address settings, split into
//!   the active generation and the one staged for the next restart.

pub mod liveness;
pub mod manage_clients;
pub mod network_settings;
pub mod route_input;
pub mod update_layout;
