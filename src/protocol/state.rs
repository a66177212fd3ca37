use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{Error, HostIdentity, Reading, Result};

use super::channel::ChannelRegistry;
use super::message::Packet;

/// Connection phase of the session engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No server known; SYN broadcasts are due
    Discovering,
    /// SYN sent, awaiting the server's ACK
    Handshaking,
    /// Streaming DATA to a known server
    Connected,
    /// Connection torn down; re-enters discovery on the next tick
    Disconnected,
}

/// Session state machine configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base interval between SYN broadcasts
    pub syn_interval: Duration,
    /// Ceiling for the SYN retry backoff
    pub syn_interval_max: Duration,
    /// Idle window after which a silent connection is torn down
    pub idle_timeout: Duration,
    /// Consecutive unicast send failures tolerated before disconnecting
    pub send_failure_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            syn_interval: Duration::from_secs(2),
            syn_interval_max: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10),
            send_failure_limit: 3,
        }
    }
}

/// Result of handling an incoming ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// A connection was established; `reconnect` marks an idle connection
    /// being replaced by a new server
    Connected { reconnect: bool },
    /// Duplicate ACK from the current server; activity refreshed, nothing else
    Refreshed,
    /// ACK was for another host or lost the first-connected-wins tie-break
    Ignored,
}

/// The session state machine: single authority over who the server is and
/// whether the host is connected
///
/// All mutation goes through [`tick`](Session::tick),
/// [`handle_ack`](Session::handle_ack) and [`submit`](Session::submit); the
/// engine loop is the only caller, which keeps epoch updates serialized.
pub struct Session {
    identity: HostIdentity,
    registry: ChannelRegistry,
    config: SessionConfig,
    phase: Phase,
    server: Option<SocketAddr>,
    last_activity: Instant,
    last_syn: Option<Instant>,
    syn_attempts: u32,
    send_failures: u32,
}

impl Session {
    /// Creates a session in the discovering phase
    pub fn new(identity: HostIdentity, registry: ChannelRegistry, config: SessionConfig) -> Self {
        Session {
            identity,
            registry,
            config,
            phase: Phase::Discovering,
            server: None,
            last_activity: Instant::now(),
            last_syn: None,
            syn_attempts: 0,
            send_failures: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current server address, present only while connected
    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    /// Whether DATA submissions will currently be sent
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// This host's identity
    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// Read access to the channel table
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Periodic liveness check
    ///
    /// While searching, returns a SYN packet when one is due (retry is
    /// unbounded; the delay doubles per unanswered attempt up to the
    /// configured ceiling). While connected, tears the connection down once
    /// the idle window expires. A torn-down session re-enters discovery on
    /// the following tick.
    pub fn tick(&mut self) -> Option<Packet> {
        match self.phase {
            Phase::Discovering | Phase::Handshaking => {
                if !self.syn_due() {
                    return None;
                }
                self.last_syn = Some(Instant::now());
                self.syn_attempts = self.syn_attempts.saturating_add(1);
                self.phase = Phase::Handshaking;
                debug!(attempts = self.syn_attempts, "broadcasting SYN");
                Some(Packet::Syn {
                    serial: self.identity.serial.clone(),
                    version: self.identity.version.clone(),
                })
            }
            Phase::Connected => {
                if self.last_activity.elapsed() > self.config.idle_timeout {
                    self.disconnect("idle window expired");
                }
                None
            }
            Phase::Disconnected => {
                self.phase = Phase::Discovering;
                self.last_syn = None;
                self.syn_attempts = 0;
                None
            }
        }
    }

    /// Handles an ACK addressed to `serial` arriving from `from`
    ///
    /// A matching ACK while searching establishes the connection and resets
    /// every channel epoch. While connected, an ACK from the current server
    /// is an idempotent activity refresh; one from a different server wins
    /// only if the current connection has gone idle past its window.
    pub fn handle_ack(&mut self, serial: &str, from: SocketAddr) -> AckOutcome {
        if serial != self.identity.serial {
            debug!(%from, serial, "ignoring ACK for another host");
            return AckOutcome::Ignored;
        }

        match self.phase {
            Phase::Discovering | Phase::Handshaking | Phase::Disconnected => {
                self.establish(from);
                info!(server = %from, "connected");
                AckOutcome::Connected { reconnect: false }
            }
            Phase::Connected => {
                if self.server == Some(from) {
                    self.last_activity = Instant::now();
                    debug!(server = %from, "duplicate ACK refreshed activity");
                    AckOutcome::Refreshed
                } else if self.last_activity.elapsed() > self.config.idle_timeout {
                    self.establish(from);
                    info!(server = %from, "idle connection replaced");
                    AckOutcome::Connected { reconnect: true }
                } else {
                    debug!(%from, "ignoring rival ACK while connected");
                    AckOutcome::Ignored
                }
            }
        }
    }

    /// Attaches the channel epoch to a reading and builds its DATA packet
    ///
    /// Returns the packet and the unicast destination, or `None` when not
    /// connected (the reading is dropped, never queued). A reading for an
    /// unregistered channel is an error.
    pub fn submit(&mut self, reading: Reading) -> Result<Option<(Packet, SocketAddr)>> {
        if self.phase != Phase::Connected {
            return Ok(None);
        }
        let server = self
            .server
            .ok_or_else(|| Error::invalid_state("connected without a server address"))?;

        let (epoch, event_type, meta_type) = {
            let channel = self.registry.get_mut(reading.channel).ok_or_else(|| {
                Error::channel(format!("channel {} is not registered", reading.channel))
            })?;
            (channel.next_epoch(), channel.event_type, channel.meta_type)
        };

        let packet = Packet::Data {
            serial: self.identity.serial.clone(),
            channel: reading.channel,
            event_type,
            meta_type,
            value: reading.value,
            epoch,
            ts: reading.ts,
        };
        Ok(Some((packet, server)))
    }

    /// Records a successful unicast send
    pub fn record_send(&mut self) {
        self.last_activity = Instant::now();
        self.send_failures = 0;
    }

    /// Records a failed unicast send
    ///
    /// Failures do not refresh activity, so they count toward the idle
    /// window; crossing the consecutive-failure limit disconnects at once.
    pub fn record_send_failure(&mut self) {
        self.send_failures = self.send_failures.saturating_add(1);
        warn!(failures = self.send_failures, "unicast send failed");
        if self.send_failures >= self.config.send_failure_limit {
            self.disconnect("destination unreachable");
        }
    }

    fn establish(&mut self, server: SocketAddr) {
        self.registry.reset_epochs();
        self.server = Some(server);
        self.phase = Phase::Connected;
        self.last_activity = Instant::now();
        self.last_syn = None;
        self.syn_attempts = 0;
        self.send_failures = 0;
    }

    fn disconnect(&mut self, reason: &str) {
        info!(reason, "disconnected");
        self.server = None;
        self.phase = Phase::Disconnected;
    }

    fn syn_due(&self) -> bool {
        match self.last_syn {
            None => true,
            Some(at) => at.elapsed() >= self.syn_delay(),
        }
    }

    fn syn_delay(&self) -> Duration {
        let doublings = self.syn_attempts.saturating_sub(1).min(4);
        let delay = self.config.syn_interval * (1u32 << doublings);
        delay.min(self.config.syn_interval_max)
    }
}
