//! RDP protocol implementation
//!
//! This module defines the wire messages, the pure packet codec, the channel
//! table and the session state machine.

pub mod channel;
pub mod codec;
pub mod message;
pub mod state;

pub use self::channel::{Channel, ChannelRegistry};
pub use self::message::Packet;
pub use self::state::{AckOutcome, Phase, Session, SessionConfig};
