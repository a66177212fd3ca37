//! Local snapshot of the last sent datagram
//!
//! An external dashboard can poll one JSON file instead of sniffing the
//! network. The writer observes the engine's sent-packet stream; it is never
//! a dependency of the engine's correctness, and a failed write only logs.

use std::path::PathBuf;

use chrono::Local;
use tokio::sync::watch;
use tracing::warn;

use crate::core::{Error, Result};
use crate::protocol::message::Packet;

/// Persists the most recently sent datagram to a JSON file
pub struct SnapshotWriter {
    path: PathBuf,
    packets: watch::Receiver<Option<Packet>>,
}

impl SnapshotWriter {
    /// Creates a writer targeting `path`
    pub fn new(path: PathBuf, packets: watch::Receiver<Option<Packet>>) -> Self {
        SnapshotWriter { path, packets }
    }

    /// Runs until the engine's packet stream closes
    pub async fn run(mut self) {
        while self.packets.changed().await.is_ok() {
            let packet = self.packets.borrow_and_update().clone();
            if let Some(packet) = packet {
                if let Err(e) = self.write(&packet) {
                    warn!(path = %self.path.display(), "snapshot write failed: {}", e);
                }
            }
        }
    }

    fn write(&self, packet: &Packet) -> Result<()> {
        let mut value = serde_json::to_value(packet)
            .map_err(|e| Error::protocol(format!("failed to serialize snapshot: {}", e)))?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "localTimestamp".to_string(),
                serde_json::Value::String(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            );
        }
        let json = serde_json::to_vec(&value)
            .map_err(|e| Error::protocol(format!("failed to serialize snapshot: {}", e)))?;

        // Write a temp file then rename so readers never see a partial file
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
