//! UDP streaming: wire format, bounded pipeline stages, server, client.
//!
//! | Module   | Purpose                                              |
//! |----------|------------------------------------------------------|
//! | `packet` | Datagram header codec and fragmentation              |
//! | `queue`  | Bounded drop-oldest FIFO shared by all stages        |
//! | `stats`  | Lock-free counters with cloneable snapshots          |
//! | `server` | Handshake listener + capture→encode→send pipeline    |
//! | `client` | Handshake sender + receive→reassemble→decode pipeline|

pub mod client;
pub mod packet;
pub mod queue;
pub mod server;
pub mod stats;

pub use client::{ClientConfig, FrameSink, StreamClient};
pub use packet::{PacketHeader, HEADER_LEN, MAX_DATAGRAM, MAX_PAYLOAD};
pub use server::{ServerConfig, StreamServer};
pub use stats::{ClientStatsSnapshot, ServerStatsSnapshot};

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};

/// One-byte payload standing in for "this frame changed nothing".
pub const NO_CHANGE_SENTINEL: u8 = 0x00;

/// Socket receive timeout used by every blocking read, so shutdown is
/// never more than a second away.
pub(crate) const RECV_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Send/receive kernel buffer size (1 MB) for both endpoints.
pub(crate) const SOCKET_BUFFER_BYTES: usize = 1024 * 1024;

/// Bind a UDP socket with `SO_REUSEADDR` and the requested kernel
/// buffer sizes, ready for `tokio::net::UdpSocket::from_std`.
pub(crate) fn bind_udp(
    addr: SocketAddr,
    send_buffer: Option<usize>,
    recv_buffer: Option<usize>,
) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Some(bytes) = send_buffer {
        socket.set_send_buffer_size(bytes)?;
    }
    if let Some(bytes) = recv_buffer {
        socket.set_recv_buffer_size(bytes)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
