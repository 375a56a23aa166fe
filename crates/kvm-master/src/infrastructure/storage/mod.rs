//! Storage infrastructure: configuration file persistence.
//!
//! This module provides a thin adapter between the application and the
//! file system.  The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from the platform-appropriate
//!   directory, or from a path given on the command line.
//! - Writing staged network settings back to disk.
//! - Providing sensible defaults when the file does not exist yet (first run).

pub mod config;
