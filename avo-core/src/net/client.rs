//! Client side of the stream: handshake, reassembly, bounded decode.
//!
//! ```text
//! UDP ─► receive loop ─► reassembly map ─► decode queue ─► decoder pool ─► callback
//!        (1 s timeout)   ((frame_id,w,h),   (bounded 50,    (M workers,
//!                         5 s eviction)      burst drop)     sentinel/full/RLE)
//! ```
//!
//! The decoder pool may reconstruct frames out of `frame_id` order when
//! it has more than one worker; consumers must tolerate that or the
//! operator sets [`ClientConfig::decoder_workers`] to 1. Decode errors
//! never terminate the stream — the picture degrades until the next
//! usable frame.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{apply_changes, rle};
use crate::error::AvoError;
use crate::frame::frame_len;
use crate::net::packet::{self, PacketHeader, MAX_DATAGRAM};
use crate::net::queue::FrameQueue;
use crate::net::stats::{ClientStats, ClientStatsSnapshot};
use crate::net::{bind_udp, NO_CHANGE_SENTINEL, RECV_TIMEOUT, SOCKET_BUFFER_BYTES};

// ── Constants ────────────────────────────────────────────────────

/// Registration payload; the server accepts any non-empty datagram,
/// but this is the canonical form.
const HANDSHAKE_CONNECT: &[u8] = b"CONNECT";

/// Expected handshake reply.
const HANDSHAKE_ACK: &[u8] = b"ACK";

/// How long `connect` waits for the reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Decode queue bound and its burst-drop watermark.
const DECODE_CAPACITY: usize = 50;
const DECODE_DRAIN_TO: usize = 40;

// ── ClientConfig ─────────────────────────────────────────────────

/// Tuning knobs for [`StreamClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Decoder pool size. Values above 1 allow frames to reach the
    /// consumer out of arrival order.
    pub decoder_workers: usize,
    /// Partial frames idle longer than this are evicted.
    pub reassembly_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            decoder_workers: 4,
            reassembly_timeout: Duration::from_secs(5),
        }
    }
}

// ── Frame sink ───────────────────────────────────────────────────

/// Consumer callback: `(frame, width, height, is_full_frame)`.
///
/// Invoked with no internal locks held, once per reconstructed frame.
pub type FrameSink = Arc<dyn Fn(&[u8], u32, u32, bool) + Send + Sync>;

// ── Internals ────────────────────────────────────────────────────

/// A complete encoded payload waiting for a decoder worker.
struct EncodedUpdate {
    payload: Vec<u8>,
    width: u32,
    height: u32,
}

/// Per-frame chunk accumulator.
struct ReassemblyEntry {
    chunks: Vec<Option<Vec<u8>>>,
    received: u32,
    last_update: Instant,
}

impl ReassemblyEntry {
    fn new(total_chunks: u32) -> Self {
        Self {
            chunks: (0..total_chunks).map(|_| None).collect(),
            received: 0,
            last_update: Instant::now(),
        }
    }
}

/// The reconstructed frame the deltas are applied to.
#[derive(Default)]
struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Black-initialize on first use or on a resolution change.
    fn ensure(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.data = vec![0u8; frame_len(width, height)];
        }
    }
}

struct ClientShared {
    socket: UdpSocket,
    decode_queue: FrameQueue<EncodedUpdate>,
    reassembly: Mutex<HashMap<(u32, u32, u32), ReassemblyEntry>>,
    canvas: Mutex<Canvas>,
    stats: ClientStats,
    shutdown: CancellationToken,
    reassembly_timeout: Duration,
}

// ── StreamClient ─────────────────────────────────────────────────

/// UDP stream client owning the receive-and-decode pipeline.
pub struct StreamClient {
    shared: Arc<ClientShared>,
    config: ClientConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamClient {
    /// Resolve `host`, perform the `CONNECT`/`ACK` handshake and
    /// return a connected client.
    ///
    /// Fails if the host does not resolve, the reply does not arrive
    /// within one second, or the reply is not exactly `ACK`.
    pub async fn connect(host: &str, port: u16, config: ClientConfig) -> Result<Self, AvoError> {
        let server_addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| AvoError::HandshakeFailed(format!("cannot resolve {host}")))?;

        let bind: SocketAddr = if server_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::from_std(bind_udp(bind, None, Some(SOCKET_BUFFER_BYTES))?)?;

        socket.send_to(HANDSHAKE_CONNECT, server_addr).await?;

        let mut reply = [0u8; 16];
        let (len, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, socket.recv_from(&mut reply))
            .await
            .map_err(|_| AvoError::Timeout(HANDSHAKE_TIMEOUT))??;

        if &reply[..len] != HANDSHAKE_ACK {
            return Err(AvoError::HandshakeFailed(format!(
                "unexpected reply of {len} bytes"
            )));
        }

        info!(%server_addr, "connected");
        Ok(Self {
            shared: Arc::new(ClientShared {
                socket,
                decode_queue: FrameQueue::new(DECODE_CAPACITY, DECODE_DRAIN_TO),
                reassembly: Mutex::new(HashMap::new()),
                canvas: Mutex::new(Canvas::default()),
                stats: ClientStats::default(),
                shutdown: CancellationToken::new(),
                reassembly_timeout: config.reassembly_timeout,
            }),
            config,
            tasks: Vec::new(),
        })
    }

    /// Spawn the receive loop and the decoder pool.
    ///
    /// `sink` is invoked for every reconstructed frame. Calling this
    /// twice is a no-op.
    pub fn start_receiver(&mut self, sink: FrameSink) {
        if !self.tasks.is_empty() {
            warn!("receiver already started");
            return;
        }
        self.tasks
            .push(tokio::spawn(receive_loop(Arc::clone(&self.shared))));
        for _ in 0..self.config.decoder_workers.max(1) {
            self.tasks.push(tokio::spawn(decoder_loop(
                Arc::clone(&self.shared),
                Arc::clone(&sink),
            )));
        }
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> ClientStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop the pipeline: signal every task and join them.
    pub async fn disconnect(mut self) {
        self.shared.shutdown.cancel();
        self.shared.decode_queue.close();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("disconnected");
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        self.shared.decode_queue.close();
    }
}

// ── Pipeline tasks ───────────────────────────────────────────────

/// Receive loop: parse datagrams, reassemble fragmented frames, feed
/// the decode queue, sweep stale reassembly entries.
async fn receive_loop(shared: Arc<ClientShared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            r = tokio::time::timeout(RECV_TIMEOUT, shared.socket.recv_from(&mut buf)) => r,
        };

        match received {
            Err(_) => {} // receive timeout
            Ok(Err(e)) => {
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    warn!("receive error: {e}");
                }
            }
            Ok(Ok((len, _))) => match packet::parse_packet(&buf[..len]) {
                Ok((header, payload)) => {
                    shared.stats.inc_packets_received();
                    shared.stats.add_bytes_received(len as u64);
                    accept_chunk(&shared, header, payload);
                }
                Err(e) => trace!("dropping datagram: {e}"),
            },
        }

        sweep_stale(&shared);
    }
    debug!("receive loop stopped");
}

/// Route one parsed chunk: single-packet frames go straight to the
/// decode queue, fragments accumulate until complete.
fn accept_chunk(shared: &ClientShared, header: PacketHeader, payload: &[u8]) {
    if header.total_packets <= 1 {
        enqueue_update(shared, payload.to_vec(), header.width, header.height);
        return;
    }

    let key = (header.frame_id, header.width, header.height);
    let complete = {
        let mut map = shared.reassembly.lock().unwrap();
        let entry = map
            .entry(key)
            .or_insert_with(|| ReassemblyEntry::new(header.total_packets));

        // A frame whose chunk count changed mid-flight is garbage;
        // start over with the new geometry.
        if entry.chunks.len() != header.total_packets as usize {
            *entry = ReassemblyEntry::new(header.total_packets);
        }
        entry.last_update = Instant::now();

        let index = header.packet_id as usize;
        if index < entry.chunks.len() && entry.chunks[index].is_none() {
            entry.chunks[index] = Some(payload.to_vec());
            entry.received += 1;
        }

        if entry.received == header.total_packets {
            map.remove(&key)
        } else {
            None
        }
    };

    if let Some(entry) = complete {
        let total: usize = entry
            .chunks
            .iter()
            .map(|c| c.as_ref().map_or(0, Vec::len))
            .sum();
        let mut data = Vec::with_capacity(total);
        for chunk in entry.chunks.into_iter().flatten() {
            data.extend_from_slice(&chunk);
        }
        enqueue_update(shared, data, header.width, header.height);
    }
}

fn enqueue_update(shared: &ClientShared, payload: Vec<u8>, width: u32, height: u32) {
    let dropped = shared.decode_queue.push(EncodedUpdate {
        payload,
        width,
        height,
    });
    if dropped > 0 {
        shared.stats.add_frames_dropped(dropped as u64);
        trace!(dropped, "decode queue overflow");
    }
}

/// Evict reassembly entries that have not seen a chunk for too long.
fn sweep_stale(shared: &ClientShared) {
    let mut map = shared.reassembly.lock().unwrap();
    let timeout = shared.reassembly_timeout;
    let before = map.len();
    map.retain(|_, entry| entry.last_update.elapsed() <= timeout);
    for _ in map.len()..before {
        shared.stats.inc_reassembly_expired();
    }
}

/// Decoder worker: sentinel payloads count as delivered; a payload of
/// exactly `3*w*h` bytes replaces the canvas; anything else is RLE
/// applied to it. The finished frame is cloned out and published with
/// no locks held.
async fn decoder_loop(shared: Arc<ClientShared>, sink: FrameSink) {
    while let Some(update) = shared.decode_queue.pop().await {
        let EncodedUpdate {
            payload,
            width,
            height,
        } = update;

        if payload.len() == 1 && payload[0] == NO_CHANGE_SENTINEL {
            shared.stats.inc_frames_decoded();
            continue;
        }

        let is_full_frame = payload.len() == frame_len(width, height);
        let frame = {
            let mut canvas = shared.canvas.lock().unwrap();
            canvas.ensure(width, height);
            if is_full_frame {
                canvas.data = payload;
            } else {
                let changes = rle::decompress(&payload);
                canvas.data = apply_changes(&canvas.data, &changes, width, height);
            }
            canvas.data.clone()
        };

        shared.stats.inc_frames_decoded();
        sink(&frame, width, height, is_full_frame);
    }
    debug!("decoder worker stopped");
}

// ── Tests ────────────────────────────────────────────────────────
