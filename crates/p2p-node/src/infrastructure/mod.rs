/// UDP echo engine (server and client loops).
pub mod echo;

/// In-process radio, link, and IP simulation.
pub mod sim;

/// Serializable status snapshots and the command result envelope.
pub mod status;

/// TOML configuration persistence.
pub mod storage;
