use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::warn;

use crate::core::{Error, Result, MAX_PACKET_SIZE};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Multicast group joined for discovery
    pub multicast_group: Ipv4Addr,
    /// Port the server listens on; the multicast socket binds here too
    pub port: u16,
    /// Multicast TTL; 1 keeps discovery on the local network
    pub multicast_ttl: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            multicast_group: crate::core::DEFAULT_MULTICAST_GROUP,
            port: crate::core::DEFAULT_PORT,
            multicast_ttl: 1,
        }
    }
}

/// Owns the two UDP sockets of the engine
///
/// The multicast socket joins the discovery group and carries SYN sends and
/// ACK receives; the unicast socket carries DATA sends once a server is
/// known and picks up late or duplicate ACKs. All sends are best-effort: a
/// failure is reported to the caller as a signal and never raises further.
pub struct Transport {
    multicast: UdpSocket,
    unicast: UdpSocket,
    group: SocketAddr,
}

impl Transport {
    /// Creates both sockets; must be called from within a tokio runtime
    pub fn new(config: TransportConfig) -> Result<Self> {
        let multicast = Self::multicast_socket(&config)?;
        let unicast = Self::unicast_socket()?;
        let group = SocketAddr::V4(SocketAddrV4::new(config.multicast_group, config.port));
        Ok(Transport {
            multicast,
            unicast,
            group,
        })
    }

    fn multicast_socket(config: &TransportConfig) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::network(format!("failed to create multicast socket: {}", e)))?;

        // SO_REUSEADDR lets the host restart without waiting out the old bind
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::network(format!("failed to set SO_REUSEADDR: {}", e)))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::network(format!("failed to bind {}: {}", bind_addr, e)))?;

        // Group membership can fail on hosts without a multicast route;
        // ACKs addressed directly to this socket still arrive, so keep going
        if let Err(e) = socket.join_multicast_v4(&config.multicast_group, &Ipv4Addr::UNSPECIFIED) {
            warn!(group = %config.multicast_group, "failed to join multicast group: {}", e);
        }
        socket
            .set_multicast_ttl_v4(config.multicast_ttl)
            .map_err(|e| Error::network(format!("failed to set multicast TTL: {}", e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| Error::network(format!("failed to set nonblocking: {}", e)))?;

        UdpSocket::from_std(socket.into())
            .map_err(|e| Error::network(format!("failed to register multicast socket: {}", e)))
    }

    fn unicast_socket() -> Result<UdpSocket> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| Error::network(format!("failed to bind unicast socket: {}", e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::network(format!("failed to set nonblocking: {}", e)))?;
        UdpSocket::from_std(socket)
            .map_err(|e| Error::network(format!("failed to register unicast socket: {}", e)))
    }

    /// Sends a datagram to the discovery group
    pub async fn send_multicast(&self, bytes: &[u8]) -> Result<()> {
        self.multicast
            .send_to(bytes, self.group)
            .await
            .map_err(|e| Error::network(format!("multicast send failed: {}", e)))?;
        Ok(())
    }

    /// Sends a datagram to a specific peer
    pub async fn send_unicast(&self, addr: SocketAddr, bytes: &[u8]) -> Result<()> {
        self.unicast
            .send_to(bytes, addr)
            .await
            .map_err(|e| Error::network(format!("unicast send to {} failed: {}", addr, e)))?;
        Ok(())
    }

    /// Receives the next datagram from either socket
    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut multicast_buf = [0u8; MAX_PACKET_SIZE];
        let mut unicast_buf = [0u8; MAX_PACKET_SIZE];

        tokio::select! {
            result = self.multicast.recv_from(&mut multicast_buf) => {
                let (len, addr) = result
                    .map_err(|e| Error::network(format!("multicast receive failed: {}", e)))?;
                Ok((multicast_buf[..len].to_vec(), addr))
            }
            result = self.unicast.recv_from(&mut unicast_buf) => {
                let (len, addr) = result
                    .map_err(|e| Error::network(format!("unicast receive failed: {}", e)))?;
                Ok((unicast_buf[..len].to_vec(), addr))
            }
        }
    }

    /// Local address of the multicast socket
    pub fn multicast_addr(&self) -> Result<SocketAddr> {
        self.multicast
            .local_addr()
            .map_err(|e| Error::network(format!("failed to get local address: {}", e)))
    }

    /// Local address of the unicast socket
    pub fn unicast_addr(&self) -> Result<SocketAddr> {
        self.unicast
            .local_addr()
            .map_err(|e| Error::network(format!("failed to get local address: {}", e)))
    }
}
