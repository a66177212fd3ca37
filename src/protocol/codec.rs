//! Pure packet encode/decode against the JSON wire format
//!
//! No shared state lives here; every function maps bytes to packets or back.
//! Decode failures are ordinary [`Error::Protocol`] values the caller logs
//! and discards, since datagrams arrive from an untrusted network.

use std::time::SystemTime;

use crate::core::{ChannelId, Error, EventType, HostIdentity, MetaType, Result};

use super::message::Packet;

/// Builds and serializes a SYN datagram for this host
pub fn encode_syn(identity: &HostIdentity) -> Result<Vec<u8>> {
    encode(&Packet::Syn {
        serial: identity.serial.clone(),
        version: identity.version.clone(),
    })
}

/// Builds and serializes a DATA datagram for one channel sample
pub fn encode_data(
    identity: &HostIdentity,
    channel: ChannelId,
    event_type: EventType,
    meta_type: MetaType,
    value: f64,
    epoch: u32,
    ts: SystemTime,
) -> Result<Vec<u8>> {
    encode(&Packet::Data {
        serial: identity.serial.clone(),
        channel,
        event_type,
        meta_type,
        value,
        epoch,
        ts,
    })
}

/// Serializes any packet to wire bytes
pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    serde_json::to_vec(packet)
        .map_err(|e| Error::protocol(format!("failed to serialize packet: {}", e)))
}

/// Decodes a single datagram
///
/// Validates that the payload is well-formed JSON with a recognized type tag
/// and a non-empty serial field.
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    let packet: Packet = serde_json::from_slice(bytes)
        .map_err(|e| Error::protocol(format!("failed to parse datagram: {}", e)))?;

    if packet.serial().is_empty() {
        return Err(Error::protocol("datagram carries an empty serial"));
    }

    Ok(packet)
}
