//! Sensor access and polling
//!
//! The engine never talks to sensor hardware directly; it consumes an
//! abstract read capability bound to a channel and a poll cadence.

mod scheduler;
pub mod sim;

pub use self::scheduler::SensorScheduler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ChannelId, Result};

/// Abstract read capability for one physical measurement
///
/// `read` is synchronous and may block briefly on bus I/O; each binding
/// runs on its own timer, so a slow bus never stalls other channels.
pub trait SensorRead: Send + Sync {
    /// Reads the current value
    fn read(&self) -> Result<f64>;
}

/// Pairs a read capability with a target channel and a poll interval
///
/// Created at configuration time, immutable for the process lifetime.
#[derive(Clone)]
pub struct SensorBinding {
    /// Channel the readings are transmitted on
    pub channel: ChannelId,
    /// Poll cadence, independent per binding
    pub interval: Duration,
    /// The sensor itself
    pub source: Arc<dyn SensorRead>,
}

impl SensorBinding {
    /// Creates a binding
    pub fn new(channel: ChannelId, interval: Duration, source: Arc<dyn SensorRead>) -> Self {
        SensorBinding {
            channel,
            interval,
            source,
        }
    }
}

impl fmt::Debug for SensorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorBinding")
            .field("channel", &self.channel)
            .field("interval", &self.interval)
            .finish()
    }
}
