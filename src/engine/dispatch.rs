use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::core::Reading;

/// Producer side of the reading hand-off, cloned into every sensor timer
///
/// All readings funnel through this one queue into the engine loop, which
/// keeps epoch increments and packet sends serialized no matter how many
/// timers fire concurrently. While the session is not connected, readings
/// are dropped here instead of queued so nothing stale piles up for the
/// next connection.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Reading>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl DispatchHandle {
    /// Offers a reading for transmission
    ///
    /// Returns whether the reading was accepted. Drops it when the session
    /// is not connected or the queue is saturated; never blocks a timer.
    pub fn offer(&self, reading: Reading) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(channel = %reading.channel, "dropping reading while not connected");
            return false;
        }
        match self.tx.try_send(reading) {
            Ok(()) => true,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("dropping reading: {}", err);
                false
            }
        }
    }

    /// Opens or closes the gate that admits readings into the queue
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Number of readings dropped since startup
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of readings currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side of the reading hand-off, owned by the engine loop
pub struct DispatchQueue {
    rx: mpsc::Receiver<Reading>,
    handle: DispatchHandle,
}

impl DispatchQueue {
    /// Creates a queue with the given capacity; the gate starts closed
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = DispatchHandle {
            tx,
            connected: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        DispatchQueue { rx, handle }
    }

    /// Returns a producer handle for sensor timers
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Receives the next reading, in hand-off order
    pub async fn recv(&mut self) -> Option<Reading> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    use crate::core::ChannelId;

    fn reading(channel: u8, value: f64) -> Reading {
        Reading {
            channel: ChannelId::new(channel).unwrap(),
            value,
            ts: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_gate_closed_drops_without_queuing() {
        let queue = DispatchQueue::new(8);
        let handle = queue.handle();

        for i in 0..5 {
            assert!(!handle.offer(reading(1, i as f64)));
        }
        assert_eq!(handle.dropped(), 5);
        assert_eq!(handle.queued(), 0);
    }

    #[tokio::test]
    async fn test_gate_open_delivers_in_order() {
        let mut queue = DispatchQueue::new(8);
        let handle = queue.handle();
        handle.set_connected(true);

        assert!(handle.offer(reading(1, 1.0)));
        assert!(handle.offer(reading(2, 2.0)));
        assert!(handle.offer(reading(1, 3.0)));

        let values: Vec<f64> = [
            queue.recv().await.unwrap(),
            queue.recv().await.unwrap(),
            queue.recv().await.unwrap(),
        ]
        .iter()
        .map(|r| r.value)
        .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(handle.dropped(), 0);
    }

    #[tokio::test]
    async fn test_saturated_queue_drops() {
        let queue = DispatchQueue::new(2);
        let handle = queue.handle();
        handle.set_connected(true);

        assert!(handle.offer(reading(1, 1.0)));
        assert!(handle.offer(reading(1, 2.0)));
        assert!(!handle.offer(reading(1, 3.0)));
        assert_eq!(handle.dropped(), 1);
        assert_eq!(handle.queued(), 2);
    }

    #[tokio::test]
    async fn test_closing_gate_stops_admission() {
        let mut queue = DispatchQueue::new(8);
        let handle = queue.handle();

        handle.set_connected(true);
        assert!(handle.offer(reading(1, 1.0)));

        handle.set_connected(false);
        assert!(!handle.offer(reading(1, 2.0)));

        // The reading admitted before the gate closed is still delivered
        assert_eq!(queue.recv().await.unwrap().value, 1.0);
        assert_eq!(handle.queued(), 0);
    }
}
