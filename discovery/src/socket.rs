//! Multicast socket setup.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::{DiscoveryError, Result};
use crate::ssdp::{SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Multicast group as an address.
pub fn multicast_group() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(multicast_ip(), SSDP_PORT))
}

fn multicast_ip() -> Ipv4Addr {
    SSDP_MULTICAST_ADDR
        .parse()
        .unwrap_or(Ipv4Addr::new(239, 255, 255, 250))
}

/// Bind the discovery socket on `port` with address/port reuse and join the
/// SSDP group.
///
/// Reuse lets this socket coexist with other SSDP listeners on the host (media
/// servers, other control points). When `port` cannot be bound even with reuse
/// the socket falls back to an ephemeral port: search responses still arrive,
/// only unsolicited NOTIFYs are missed.
pub fn bind_multicast(port: u16) -> Result<tokio::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create UDP socket: {}", e)))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set SO_REUSEADDR: {}", e)))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!("Failed to set SO_REUSEPORT: {}", e);
    }

    let wanted = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    if let Err(e) = socket.bind(&wanted.into()) {
        warn!(port, "Failed to bind SSDP port ({}), using an ephemeral port", e);
        let any = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        socket
            .bind(&any.into())
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;
    }

    if let Err(e) = socket.join_multicast_v4(&multicast_ip(), &Ipv4Addr::UNSPECIFIED) {
        warn!("Failed to join {}: {}", SSDP_MULTICAST_ADDR, e);
    }
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set multicast loop: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set non-blocking: {}", e)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = tokio::net::UdpSocket::from_std(std_socket)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to register UDP socket: {}", e)))?;

    debug!(local = ?socket.local_addr().ok(), "SSDP socket ready");
    Ok(socket)
}
