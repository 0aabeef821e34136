//! Pluggable datagram endpoint.
//!
//! The connection machinery is written against [`PacketEndpoint`] so the
//! same code drives plain UDP and secured transports such as DTLS; only the
//! endpoint implementation changes.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// A connectionless datagram endpoint.
///
/// Implementations must support concurrent `recv_from` and `send_to` calls;
/// the [`Reader`](crate::connection::Reader) and
/// [`Writer`](crate::connection::Writer) serialize each direction with its
/// own mutex.
#[async_trait]
pub trait PacketEndpoint: Send + Sync {
    /// Receives one datagram, returning its length and the peer address.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Sends one datagram to `peer`, returning the number of bytes sent.
    async fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;

    /// The local address the endpoint is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl PacketEndpoint for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, peer).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}
