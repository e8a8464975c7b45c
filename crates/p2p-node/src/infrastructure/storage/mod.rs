//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from an explicit path
//! or the platform config directory, fills in defaults for anything missing,
//! validates it, and converts it into the parameter structs the pairing
//! orchestrator and the echo engine take.

pub mod config;
