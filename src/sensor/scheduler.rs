use std::time::SystemTime;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use crate::core::Reading;
use crate::engine::DispatchHandle;

use super::SensorBinding;

/// Runs one independent polling timer per sensor binding
///
/// Each timer invokes its binding's read capability and hands successful
/// readings to the dispatch queue. A read failure logs and skips that cycle;
/// the timer keeps running and other bindings are unaffected.
pub struct SensorScheduler {
    bindings: Vec<SensorBinding>,
    tasks: Vec<JoinHandle<()>>,
}

impl SensorScheduler {
    /// Creates a scheduler for the given bindings; nothing runs until
    /// [`start`](SensorScheduler::start)
    pub fn new(bindings: Vec<SensorBinding>) -> Self {
        SensorScheduler {
            bindings,
            tasks: Vec::new(),
        }
    }

    /// Spawns the polling timers
    pub fn start(&mut self, dispatch: DispatchHandle) {
        for binding in &self.bindings {
            let binding = binding.clone();
            let dispatch = dispatch.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = interval(binding.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match binding.source.read() {
                        Ok(value) => {
                            dispatch.offer(Reading {
                                channel: binding.channel,
                                value,
                                ts: SystemTime::now(),
                            });
                        }
                        Err(e) => {
                            warn!(channel = %binding.channel, "sensor read failed: {}", e);
                        }
                    }
                }
            }));
        }
    }

    /// Cancels every polling timer
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SensorScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::core::ChannelId;
    use crate::engine::DispatchQueue;
    use crate::sensor::sim::{FaultyProbe, FixedProbe};

    fn binding(channel: u8, interval_ms: u64, source: Arc<dyn crate::sensor::SensorRead>) -> SensorBinding {
        SensorBinding::new(
            ChannelId::new(channel).unwrap(),
            Duration::from_millis(interval_ms),
            source,
        )
    }

    #[tokio::test]
    async fn test_readings_reach_the_queue() {
        let mut queue = DispatchQueue::new(16);
        let handle = queue.handle();
        handle.set_connected(true);

        let mut scheduler =
            SensorScheduler::new(vec![binding(1, 10, Arc::new(FixedProbe(21.5)))]);
        scheduler.start(handle);

        let reading = timeout(Duration::from_secs(1), queue.recv())
            .await
            .expect("no reading arrived")
            .unwrap();
        assert_eq!(reading.channel.get(), 1);
        assert_eq!(reading.value, 21.5);

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_faulty_binding_does_not_stall_others() {
        let mut queue = DispatchQueue::new(16);
        let handle = queue.handle();
        handle.set_connected(true);

        let mut scheduler = SensorScheduler::new(vec![
            binding(1, 10, Arc::new(FaultyProbe)),
            binding(2, 10, Arc::new(FixedProbe(42.0))),
        ]);
        scheduler.start(handle);

        // The healthy binding keeps producing despite the faulty one
        let mut healthy = 0;
        for _ in 0..3 {
            let reading = timeout(Duration::from_secs(1), queue.recv())
                .await
                .expect("no reading arrived")
                .unwrap();
            assert_eq!(reading.channel.get(), 2);
            assert_eq!(reading.value, 42.0);
            healthy += 1;
        }
        assert_eq!(healthy, 3);

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_intervals_are_independent() {
        let mut queue = DispatchQueue::new(64);
        let handle = queue.handle();
        handle.set_connected(true);

        let mut scheduler = SensorScheduler::new(vec![
            binding(1, 10, Arc::new(FixedProbe(1.0))),
            binding(2, 100, Arc::new(FixedProbe(2.0))),
        ]);
        scheduler.start(handle);

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.shutdown();

        let mut fast = 0;
        let mut slow = 0;
        while let Ok(Some(reading)) = timeout(Duration::from_millis(50), queue.recv()).await {
            match reading.channel.get() {
                1 => fast += 1,
                2 => slow += 1,
                other => panic!("unexpected channel {}", other),
            }
        }
        assert!(fast > slow, "fast binding produced {} <= slow {}", fast, slow);
    }

    #[tokio::test]
    async fn test_disconnected_readings_are_dropped_not_buffered() {
        let queue = DispatchQueue::new(16);
        let handle = queue.handle();
        // Gate stays closed: the session is not connected

        let mut scheduler =
            SensorScheduler::new(vec![binding(1, 10, Arc::new(FixedProbe(21.5)))]);
        scheduler.start(handle.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown();

        assert!(handle.dropped() > 0);
        assert_eq!(handle.queued(), 0);
    }
}
