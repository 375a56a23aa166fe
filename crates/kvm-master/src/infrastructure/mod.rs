//! Infrastructure layer for the master application.
//!
//! Contains the adapters at the edge of the system: the control-channel
//! handshake driver, the probe queue, file-system storage, and the UI
//! command bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and `kvm_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod network;
pub mod storage;
pub mod ui_bridge;
