use serde::{Deserialize, Serialize, Serializer, Deserializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
///
/// Negative, non-finite and overflowing values are deserialization errors,
/// never panics; these fields arrive in untrusted datagrams.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| serde::de::Error::custom(format!("invalid seconds value {}: {}", secs, e)))
}

/// Serializes SystemTime as duration since UNIX_EPOCH
pub fn serialize_time<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let duration = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes SystemTime from duration since UNIX_EPOCH
pub fn deserialize_time<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {}: {}", secs, e)))?;
    UNIX_EPOCH
        .checked_add(duration)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp {} out of range", secs)))
}
