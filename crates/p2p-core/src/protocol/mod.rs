//! Wire format of the UDP echo datagrams.

pub mod echo;

pub use echo::{EchoHeader, ProtocolError, HEADER_PREFIX, MIN_PACKET_SIZE};
