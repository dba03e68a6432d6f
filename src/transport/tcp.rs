//! Outbound TCP dialing

use super::{SocketProtector, TransportConfig, TransportError};
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

/// Resolve to the first address found, giving up after `limit`
pub async fn resolve<A>(addr: A, limit: Duration) -> Result<SocketAddr, TransportError>
where
    A: tokio::net::ToSocketAddrs + std::fmt::Debug,
{
    let label = format!("{:?}", addr);
    tokio::time::timeout(limit, tokio::net::lookup_host(addr))
        .await
        .map_err(|_| TransportError::Timeout)??
        .next()
        .ok_or_else(|| TransportError::ConnectionFailed(format!("No address for {}", label)))
}

fn configure(addr: SocketAddr, config: &TransportConfig) -> Result<Socket, TransportError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if config.keepalive_interval > 0 {
        let keepalive =
            TcpKeepalive::new().with_time(Duration::from_secs(config.keepalive_interval));
        socket.set_tcp_keepalive(&keepalive)?;
    }
    socket.set_nodelay(true)?;

    Ok(socket)
}

/// Connect to `addr` with keep-alive, bounded by the connect timeout.
///
/// The socket is offered to `protector` before connecting; a protection
/// failure is logged and the dial proceeds.
pub async fn dial(
    addr: SocketAddr,
    config: &TransportConfig,
    protector: Arc<dyn SocketProtector>,
) -> Result<TcpStream, TransportError> {
    let socket = configure(addr, config)?;

    // Protection talks to a local service over blocking IO
    let socket = tokio::task::spawn_blocking(move || {
        if let Err(e) = protector.protect(&socket) {
            warn!("Failed to protect socket for {}: {}", addr, e);
        }
        socket
    })
    .await
    .map_err(|e| TransportError::Task(e.to_string()))?;

    socket.set_nonblocking(true)?;
    let socket = TcpSocket::from_std_stream(socket.into());

    let stream = tokio::time::timeout(config.connect_timeout(), socket.connect(addr))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;

    debug!("Connected to {}", addr);
    Ok(stream)
}
