use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::core::{ChannelId, EventType, MetaType};

fn default_version() -> String {
    crate::core::RDP_VERSION.to_string()
}

/// RDP datagram variants
///
/// Each variant is a complete wire message; the `type` tag selects the field
/// set, and decoding rejects anything that does not match one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Packet {
    /// Discovery broadcast announcing this host to any listening server
    Syn {
        /// Sender's serial number
        serial: String,
        /// Protocol revision; older peers omit it
        #[serde(default = "default_version")]
        version: String,
    },

    /// Server's handshake reply; its source address becomes the send target
    Ack {
        /// Serial number of the host being acknowledged
        serial: String,
    },

    /// One channel sample
    Data {
        /// Sender's serial number
        serial: String,
        /// Logical channel carrying this sample
        channel: ChannelId,
        /// Event class of the channel
        #[serde(rename = "eventType")]
        event_type: EventType,
        /// Rendering tag for the receiver
        #[serde(rename = "metaType")]
        meta_type: MetaType,
        /// Measured value
        value: f64,
        /// Per-channel sequence number for this connection
        epoch: u32,
        /// Time the value was read
        #[serde(serialize_with = "crate::core::serde::serialize_time")]
        #[serde(deserialize_with = "crate::core::serde::deserialize_time")]
        ts: SystemTime,
    },
}

impl Packet {
    /// Returns the serial number carried by any packet variant
    pub fn serial(&self) -> &str {
        match self {
            Packet::Syn { serial, .. } => serial,
            Packet::Ack { serial } => serial,
            Packet::Data { serial, .. } => serial,
        }
    }
}
