//! Engine wiring
//!
//! This module ties the sensor scheduler, dispatch queue, session state
//! machine and transport together into one run loop. The loop is the single
//! owner of session state: every epoch increment and every send happens
//! inside it, no matter how many sensor timers are firing.

pub mod dispatch;

pub use self::dispatch::{DispatchHandle, DispatchQueue};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{HostConfig, HostIdentity, Reading, Result};
use crate::network::{Transport, TransportConfig};
use crate::protocol::channel::ChannelRegistry;
use crate::protocol::codec;
use crate::protocol::message::Packet;
use crate::protocol::state::{AckOutcome, Session, SessionConfig};
use crate::sensor::{SensorBinding, SensorScheduler};

/// Cadence of the liveness/discovery tick
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// What woke the engine loop
enum Wake {
    Tick,
    Reading(Option<Reading>),
    Incoming(Result<(Vec<u8>, SocketAddr)>),
    Shutdown(bool),
}

/// Cloneable handle for observing and stopping a running engine
#[derive(Clone)]
pub struct EngineHandle {
    shutdown: Arc<watch::Sender<bool>>,
    packets: watch::Receiver<Option<Packet>>,
    dispatch: DispatchHandle,
}

impl EngineHandle {
    /// Requests engine shutdown; safe to call from any state
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Returns a stream of sent datagrams (last-value semantics) for
    /// external observers such as the snapshot writer
    pub fn packets(&self) -> watch::Receiver<Option<Packet>> {
        self.packets.clone()
    }

    /// The most recently sent datagram, if any
    pub fn last_packet(&self) -> Option<Packet> {
        self.packets.borrow().clone()
    }

    /// Access to dispatch-queue counters
    pub fn dispatch(&self) -> &DispatchHandle {
        &self.dispatch
    }
}

/// The probe host engine
pub struct ProbeEngine {
    session: Session,
    transport: Transport,
    queue: DispatchQueue,
    dispatch: DispatchHandle,
    scheduler: SensorScheduler,
    packets_tx: watch::Sender<Option<Packet>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ProbeEngine {
    /// Creates an engine and its control handle
    ///
    /// Socket creation failure is the one startup error surfaced here;
    /// everything after `run` begins is non-fatal by design.
    pub fn new(
        config: &HostConfig,
        registry: ChannelRegistry,
        bindings: Vec<SensorBinding>,
    ) -> Result<(Self, EngineHandle)> {
        let transport = Transport::new(TransportConfig {
            multicast_group: config.multicast_group,
            port: config.server_port,
            multicast_ttl: 1,
        })?;

        let session = Session::new(
            HostIdentity::new(&config.serial),
            registry,
            SessionConfig {
                syn_interval: config.syn_interval,
                idle_timeout: config.idle_timeout,
                ..Default::default()
            },
        );

        let queue = DispatchQueue::new(config.dispatch_capacity);
        let dispatch = queue.handle();
        let scheduler = SensorScheduler::new(bindings);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (packets_tx, packets_rx) = watch::channel(None);

        let handle = EngineHandle {
            shutdown: Arc::new(shutdown_tx),
            packets: packets_rx,
            dispatch: dispatch.clone(),
        };

        Ok((
            ProbeEngine {
                session,
                transport,
                queue,
                dispatch,
                scheduler,
                packets_tx,
                shutdown_rx,
            },
            handle,
        ))
    }

    /// Local address of the discovery socket
    pub fn multicast_addr(&self) -> Result<SocketAddr> {
        self.transport.multicast_addr()
    }

    /// Runs the engine until shutdown is requested
    pub async fn run(mut self) -> Result<()> {
        info!(serial = %self.session.identity().serial, "probe host engine started");
        self.scheduler.start(self.dispatch.clone());

        let mut ticker = tokio::time::interval(TICK_INTERVAL);

        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                reading = self.queue.recv() => Wake::Reading(reading),
                incoming = self.transport.recv() => Wake::Incoming(incoming),
                changed = self.shutdown_rx.changed() => Wake::Shutdown(changed.is_err()),
            };

            match wake {
                Wake::Tick => {
                    if let Some(packet) = self.session.tick() {
                        self.send_discovery(packet).await;
                    }
                }
                Wake::Reading(Some(reading)) => self.forward(reading).await,
                Wake::Reading(None) => {}
                Wake::Incoming(Ok((bytes, from))) => self.handle_datagram(&bytes, from),
                Wake::Incoming(Err(e)) => warn!("receive failed: {}", e),
                Wake::Shutdown(sender_gone) => {
                    if sender_gone || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            self.dispatch.set_connected(self.session.is_connected());
        }

        self.scheduler.shutdown();
        info!("probe host engine stopped");
        Ok(())
    }

    async fn send_discovery(&mut self, packet: Packet) {
        match codec::encode(&packet) {
            Ok(bytes) => match self.transport.send_multicast(&bytes).await {
                Ok(()) => {
                    self.packets_tx.send_replace(Some(packet));
                }
                Err(e) => warn!("SYN broadcast failed: {}", e),
            },
            Err(e) => warn!("failed to encode SYN: {}", e),
        }
    }

    async fn forward(&mut self, reading: Reading) {
        let (packet, server) = match self.session.submit(reading) {
            Ok(Some(send)) => send,
            // Not connected: the reading is dropped by design
            Ok(None) => return,
            Err(e) => {
                warn!("dropping reading: {}", e);
                return;
            }
        };

        match codec::encode(&packet) {
            Ok(bytes) => match self.transport.send_unicast(server, &bytes).await {
                Ok(()) => {
                    self.session.record_send();
                    self.packets_tx.send_replace(Some(packet));
                }
                Err(e) => {
                    warn!("DATA send failed: {}", e);
                    self.session.record_send_failure();
                }
            },
            Err(e) => warn!("failed to encode DATA: {}", e),
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        match codec::decode(bytes) {
            Ok(Packet::Ack { serial }) => match self.session.handle_ack(&serial, from) {
                AckOutcome::Connected { reconnect } => {
                    info!(server = %from, reconnect, "handshake complete");
                }
                AckOutcome::Refreshed => {}
                AckOutcome::Ignored => {}
            },
            // Our own multicast SYNs loop back to the discovery socket
            Ok(Packet::Syn { .. }) => debug!(%from, "ignoring SYN"),
            Ok(Packet::Data { .. }) => debug!(%from, "ignoring DATA"),
            Err(e) => debug!(%from, "discarding malformed datagram: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    use crate::core::{ChannelId, EventType, MetaType};
    use crate::sensor::sim::FixedProbe;

    fn test_config() -> HostConfig {
        HostConfig {
            serial: "ABC123".to_string(),
            // Port 0 keeps the discovery socket off the real deployment port;
            // multicast broadcasts then fail harmlessly, which the engine
            // treats as a transient error
            server_port: 0,
            syn_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn test_registry() -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        registry
            .register(
                ChannelId::new(1).unwrap(),
                EventType::Temperature,
                MetaType::BeanTemp,
            )
            .unwrap();
        registry
    }

    fn test_bindings(value: f64) -> Vec<SensorBinding> {
        vec![SensorBinding::new(
            ChannelId::new(1).unwrap(),
            Duration::from_millis(20),
            Arc::new(FixedProbe(value)),
        )]
    }

    async fn recv_json(socket: &UdpSocket) -> serde_json::Value {
        let mut buf = [0u8; 1024];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no datagram arrived")
            .unwrap();
        serde_json::from_slice(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_ack_connects_and_data_streams_with_increasing_epochs() {
        let (engine, handle) =
            ProbeEngine::new(&test_config(), test_registry(), test_bindings(21.5)).unwrap();
        let engine_port = engine.multicast_addr().unwrap().port();

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let engine_task = tokio::spawn(engine.run());

        // The server acknowledges the host; its source address becomes the
        // unicast send target
        server
            .send_to(
                br#"{"type":"ack","serial":"ABC123"}"#,
                ("127.0.0.1", engine_port),
            )
            .await
            .unwrap();

        for expected_epoch in 0..3u32 {
            let value = recv_json(&server).await;
            assert_eq!(value["type"], "data");
            assert_eq!(value["serial"], "ABC123");
            assert_eq!(value["channel"], 1);
            assert_eq!(value["eventType"], 3);
            assert_eq!(value["metaType"], 3000);
            assert_eq!(value["value"], 21.5);
            assert_eq!(value["epoch"], expected_epoch);
        }

        match handle.last_packet() {
            Some(Packet::Data { .. }) => {}
            other => panic!("expected last packet to be DATA, got {:?}", other),
        }

        handle.shutdown();
        timeout(Duration::from_secs(2), engine_task)
            .await
            .expect("engine did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_ack_for_wrong_serial_is_ignored() {
        let (engine, handle) =
            ProbeEngine::new(&test_config(), test_registry(), test_bindings(1.0)).unwrap();
        let engine_port = engine.multicast_addr().unwrap().port();

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let engine_task = tokio::spawn(engine.run());

        server
            .send_to(
                br#"{"type":"ack","serial":"SOMEONE_ELSE"}"#,
                ("127.0.0.1", engine_port),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Still searching: no DATA was ever produced
        assert!(!matches!(handle.last_packet(), Some(Packet::Data { .. })));
        assert!(handle.dispatch().dropped() > 0);

        handle.shutdown();
        timeout(Duration::from_secs(2), engine_task)
            .await
            .expect("engine did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_discarded() {
        let (engine, handle) =
            ProbeEngine::new(&test_config(), test_registry(), test_bindings(21.5)).unwrap();
        let engine_port = engine.multicast_addr().unwrap().port();

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let engine_task = tokio::spawn(engine.run());

        // Garbage first; the engine must survive it and still handshake
        server
            .send_to(b"\xff\xfenot json", ("127.0.0.1", engine_port))
            .await
            .unwrap();
        server
            .send_to(br#"{"type":"bogus"}"#, ("127.0.0.1", engine_port))
            .await
            .unwrap();
        server
            .send_to(
                br#"{"type":"ack","serial":"ABC123"}"#,
                ("127.0.0.1", engine_port),
            )
            .await
            .unwrap();

        let value = recv_json(&server).await;
        assert_eq!(value["type"], "data");
        assert_eq!(value["epoch"], 0);

        handle.shutdown();
        timeout(Duration::from_secs(2), engine_task)
            .await
            .expect("engine did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_readings_are_dropped_while_searching() {
        let (engine, handle) =
            ProbeEngine::new(&test_config(), test_registry(), test_bindings(1.0)).unwrap();
        let engine_task = tokio::spawn(engine.run());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(handle.dispatch().dropped() > 0);
        assert_eq!(handle.dispatch().queued(), 0);

        handle.shutdown();
        timeout(Duration::from_secs(2), engine_task)
            .await
            .expect("engine did not stop")
            .unwrap()
            .unwrap();
    }
}
