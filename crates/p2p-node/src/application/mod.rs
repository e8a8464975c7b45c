/// User commands (pair / stop / status / leave).
pub mod commands;

/// Radio notification handling: session updates, gate signals, events.
pub mod dispatcher;

/// User-facing event sinks.
pub mod events;

/// Latching one-shot signals with timed waits.
pub mod gates;

/// The node facade.
pub mod node;

/// The pairing sequence.
pub mod orchestrator;

/// Traits for the radio, link, network, and echo subsystems.
pub mod ports;
