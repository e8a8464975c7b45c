//! p2p-node library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does p2p-node do? (for beginners)
//!
//! Two devices pair over Wi-Fi Direct without an access point and then
//! measure the link with a UDP echo test:
//!
//! 1. Both users press "pair" at roughly the same time.  Each node runs a
//!    discovery window and collects the peers it hears.
//! 2. Each node picks a peer (a configured MAC address, or the strongest
//!    signal) and asks the radio to connect.  The radios negotiate who
//!    becomes the *group owner*; the higher "GO intent" wins.
//! 3. The group owner gives itself a static address, starts handing out
//!    addresses, and starts an echo server.  The client obtains an address
//!    and starts sending stamped datagrams to the group owner.
//! 4. The client reports round-trip time and packet loss.
//!
//! The radio is reached through the `RadioManager` port.  This crate ships an
//! in-process simulation of it (`infrastructure::sim`) that the binary and
//! the end-to-end tests use.

/// Application layer: ports, the pairing orchestrator, and the node facade.
pub mod application;

/// Infrastructure layer: echo sockets, simulation, config, status DTOs.
pub mod infrastructure;
