use crate::core::{ChannelId, Error, EventType, MetaType, Result, MAX_CHANNELS};

/// One logical data stream: wire tags plus the epoch counter for the
/// current connection
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel number
    pub id: ChannelId,
    /// Event class stamped on every DATA packet for this channel
    pub event_type: EventType,
    /// Rendering tag stamped on every DATA packet for this channel
    pub meta_type: MetaType,
    epoch: u32,
}

impl Channel {
    fn new(id: ChannelId, event_type: EventType, meta_type: MetaType) -> Self {
        Channel {
            id,
            event_type,
            meta_type,
            epoch: 0,
        }
    }

    /// Returns the epoch the next DATA packet will carry
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Returns the epoch for the next DATA packet and advances the counter,
    /// wrapping at the modulus
    pub fn next_epoch(&mut self) -> u32 {
        let epoch = self.epoch;
        self.epoch = self.epoch.wrapping_add(1);
        epoch
    }

    fn reset(&mut self) {
        self.epoch = 0;
    }
}

/// Static table mapping channel numbers to their metadata tags, each with an
/// independent epoch counter
///
/// The registry is owned by the session; sensors never touch it directly.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: [Option<Channel>; MAX_CHANNELS as usize],
}

impl ChannelRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        ChannelRegistry::default()
    }

    /// Registers a channel with its metadata tags
    pub fn register(
        &mut self,
        id: ChannelId,
        event_type: EventType,
        meta_type: MetaType,
    ) -> Result<()> {
        let slot = &mut self.channels[id.index()];
        if slot.is_some() {
            return Err(Error::channel(format!("channel {} already registered", id)));
        }
        *slot = Some(Channel::new(id, event_type, meta_type));
        Ok(())
    }

    /// Looks up a registered channel
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels[id.index()].as_ref()
    }

    /// Looks up a registered channel for epoch advancement
    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels[id.index()].as_mut()
    }

    /// Resets every epoch counter to zero, as required on a fresh handshake
    pub fn reset_epochs(&mut self) {
        for channel in self.channels.iter_mut().flatten() {
            channel.reset();
        }
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.iter().flatten().count()
    }

    /// Whether no channels are registered
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(|c| c.is_none())
    }
}
