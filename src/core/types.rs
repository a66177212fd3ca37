use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Immutable identity of this probe host, created once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Serial number, unique per physical unit; must match the server's probe definition
    pub serial: String,
    /// RDP protocol revision
    pub version: String,
}

impl HostIdentity {
    /// Creates an identity for the current protocol revision
    pub fn new(serial: impl Into<String>) -> Self {
        HostIdentity {
            serial: serial.into(),
            version: super::RDP_VERSION.to_string(),
        }
    }
}

/// Logical channel number, valid range 1 through 16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelId(u8);

impl ChannelId {
    /// Creates a channel id, rejecting numbers outside 1..=16
    pub fn new(id: u8) -> Result<Self> {
        if (1..=super::MAX_CHANNELS).contains(&id) {
            Ok(ChannelId(id))
        } else {
            Err(Error::channel(format!(
                "channel {} out of range 1-{}",
                id,
                super::MAX_CHANNELS
            )))
        }
    }

    /// Returns the raw channel number
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Returns the zero-based table index for this channel
    pub(crate) fn index(&self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        ChannelId::new(id)
    }
}

impl From<ChannelId> for u8 {
    fn from(id: ChannelId) -> u8 {
        id.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol event classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum EventType {
    /// Discovery broadcast
    Syn = 1,
    /// Server handshake reply
    Ack = 2,
    /// Temperature-class channel sample
    Temperature = 3,
}

impl From<EventType> for u16 {
    fn from(event: EventType) -> u16 {
        event as u16
    }
}

impl TryFrom<u16> for EventType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(EventType::Syn),
            2 => Ok(EventType::Ack),
            3 => Ok(EventType::Temperature),
            other => Err(Error::protocol(format!("unknown event type {}", other))),
        }
    }
}

/// Channel rendering tags telling the receiver how to classify a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum MetaType {
    /// Bean temperature
    BeanTemp = 3000,
    /// Environmental temperature
    EnvTemp = 3001,
    /// Maximum environmental temperature
    MaxEnvTemp = 3002,
    /// Heat box temperature
    HeatBox = 3003,
    /// Exhaust temperature
    Exhaust = 3004,
    /// Ambient temperature
    Ambient = 3005,
    /// Bean cooling temperature
    Cooling = 3006,
}

impl From<MetaType> for u16 {
    fn from(meta: MetaType) -> u16 {
        meta as u16
    }
}

impl TryFrom<u16> for MetaType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            3000 => Ok(MetaType::BeanTemp),
            3001 => Ok(MetaType::EnvTemp),
            3002 => Ok(MetaType::MaxEnvTemp),
            3003 => Ok(MetaType::HeatBox),
            3004 => Ok(MetaType::Exhaust),
            3005 => Ok(MetaType::Ambient),
            3006 => Ok(MetaType::Cooling),
            other => Err(Error::protocol(format!("unknown meta type {}", other))),
        }
    }
}

/// One sensor poll result, consumed once by the dispatch queue
#[derive(Debug, Clone)]
pub struct Reading {
    /// Channel the producing sensor is bound to
    pub channel: ChannelId,
    /// Measured value
    pub value: f64,
    /// Time the value was read
    pub ts: SystemTime,
}

/// Configuration for the probe host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Serial number announced in every datagram
    pub serial: String,
    /// UDP port the server listens on
    pub server_port: u16,
    /// Multicast group used for discovery
    pub multicast_group: Ipv4Addr,
    /// Interval between SYN broadcasts while searching
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub syn_interval: Duration,
    /// Idle window after which a silent connection is torn down
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub idle_timeout: Duration,
    /// Default poll cadence for sensor bindings
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
    /// Capacity of the reading hand-off queue
    pub dispatch_capacity: usize,
    /// Where to persist the last sent datagram for external viewers, if anywhere
    pub snapshot_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            serial: "424242".to_string(),
            server_port: super::DEFAULT_PORT,
            multicast_group: super::DEFAULT_MULTICAST_GROUP,
            syn_interval: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            dispatch_capacity: 64,
            snapshot_path: None,
        }
    }
}

impl HostConfig {
    /// Loads configuration from a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("failed to read config file: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::config(format!("failed to parse config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_range() {
        assert!(ChannelId::new(0).is_err());
        assert!(ChannelId::new(17).is_err());

        let ch = ChannelId::new(16).unwrap();
        assert_eq!(ch.get(), 16);
        assert_eq!(ch.index(), 15);
    }

    #[test]
    fn test_channel_id_serde() {
        let ch: ChannelId = serde_json::from_str("7").unwrap();
        assert_eq!(ch.get(), 7);
        assert_eq!(serde_json::to_string(&ch).unwrap(), "7");

        assert!(serde_json::from_str::<ChannelId>("0").is_err());
        assert!(serde_json::from_str::<ChannelId>("42").is_err());
    }

    #[test]
    fn test_event_type_values() {
        assert_eq!(u16::from(EventType::Syn), 1);
        assert_eq!(u16::from(EventType::Ack), 2);
        assert_eq!(u16::from(EventType::Temperature), 3);
        assert!(EventType::try_from(9).is_err());
    }

    #[test]
    fn test_meta_type_roundtrip() {
        for meta in [
            MetaType::BeanTemp,
            MetaType::EnvTemp,
            MetaType::MaxEnvTemp,
            MetaType::HeatBox,
            MetaType::Exhaust,
            MetaType::Ambient,
            MetaType::Cooling,
        ] {
            let raw = u16::from(meta);
            assert_eq!(MetaType::try_from(raw).unwrap(), meta);
        }
        assert!(MetaType::try_from(2999).is_err());
    }

    #[test]
    fn test_host_identity() {
        let identity = HostIdentity::new("ABC123");
        assert_eq!(identity.serial, "ABC123");
        assert_eq!(identity.version, crate::core::RDP_VERSION);
    }

    #[test]
    fn test_config_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.server_port, 5050);
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 0, 0, 1));
        assert_eq!(config.syn_interval, Duration::from_secs(2));
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_config_partial_json() {
        let config: HostConfig =
            serde_json::from_str(r#"{"serial":"ABC123","syn_interval":1.0}"#).unwrap();
        assert_eq!(config.serial, "ABC123");
        assert_eq!(config.syn_interval, Duration::from_secs(1));
        assert_eq!(config.server_port, 5050);
    }
}
