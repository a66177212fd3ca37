//! Core types and traits for the RDP probe host
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    ChannelId,
    EventType,
    HostConfig,
    HostIdentity,
    MetaType,
    Reading,
};

use std::net::Ipv4Addr;

/// RDP protocol revision carried in every SYN
pub const RDP_VERSION: &str = "RDP_1.0";

/// Default server port (matches the standard Roastmaster probe definition)
pub const DEFAULT_PORT: u16 = 5050;

/// Well-known multicast group used for discovery
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// Maximum datagram size in bytes
pub const MAX_PACKET_SIZE: usize = 1024;

/// Number of logical channels supported by the protocol
pub const MAX_CHANNELS: u8 = 16;
