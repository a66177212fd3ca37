//! Network transport module
//!
//! This module owns the UDP sockets: multicast for discovery, unicast for
//! the data stream.

mod transport;

pub use self::transport::{Transport, TransportConfig};
