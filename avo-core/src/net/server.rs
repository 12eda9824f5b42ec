//! Server side of the stream: handshake listener and the
//! capture→encode→send pipeline.
//!
//! ```text
//! submit() ─► ingest buffer ─► buffer worker ─► encoder pool ─► send
//!             (bounded 15,     (drops frames    (N workers,     queue ─► sender ─► UDP
//!              drop oldest)     older 500 ms)    diff + RLE)    (bounded 10)
//! ```
//!
//! The listener answers every non-empty datagram with `ACK` and
//! remembers the sender as the sole receiver — the most recent sender
//! wins. Frames popped off the send queue are fragmented per
//! [`packet`](crate::net::packet) and addressed to that receiver; with
//! no receiver registered they are silently discarded.
//!
//! Encoder outputs are not ordered with respect to submission when the
//! pool has more than one worker: tasks complete independently, so
//! `frame_id` on the wire may run out of capture order. Operators that
//! need strict ordering set [`ServerConfig::encoder_workers`] to 1.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{compare_frames, rle};
use crate::error::AvoError;
use crate::frame::{frame_len, RgbFrame};
use crate::net::packet;
use crate::net::queue::FrameQueue;
use crate::net::stats::{ServerStats, ServerStatsSnapshot};
use crate::net::{bind_udp, NO_CHANGE_SENTINEL, RECV_TIMEOUT, SOCKET_BUFFER_BYTES};

// ── Constants ────────────────────────────────────────────────────

/// Handshake reply sent to every registering datagram.
const HANDSHAKE_ACK: &[u8] = b"ACK";

/// Pause between fragments of one frame, easing kernel-buffer overrun.
const INTER_CHUNK_DELAY: Duration = Duration::from_micros(100);

/// Ingest buffer bound and its drop watermark (one frame per overflow).
const INGEST_CAPACITY: usize = 15;
const INGEST_DRAIN_TO: usize = 14;

/// Send queue bound and its burst-drop watermark.
const SEND_CAPACITY: usize = 10;
const SEND_DRAIN_TO: usize = 7;

// ── ServerConfig ─────────────────────────────────────────────────

/// Tuning knobs for [`StreamServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Encoder pool size. Values above 1 allow frames to reach the
    /// wire out of capture order.
    pub encoder_workers: usize,
    /// Frames older than this when leaving the ingest buffer are
    /// dropped instead of encoded.
    pub stale_after: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            encoder_workers: 2,
            stale_after: Duration::from_millis(500),
        }
    }
}

// ── Internals ────────────────────────────────────────────────────

/// An encoded frame waiting for the sender.
struct FramePacket {
    payload: Vec<u8>,
    width: u32,
    height: u32,
}

struct ServerShared {
    socket: UdpSocket,
    /// The sole registered receiver; most recent sender wins.
    client: Mutex<Option<SocketAddr>>,
    has_client: AtomicBool,
    ingest: FrameQueue<RgbFrame>,
    send_queue: FrameQueue<FramePacket>,
    /// Per-resolution previous source frame, the diff baseline.
    baselines: Mutex<HashMap<(u32, u32), Vec<u8>>>,
    next_frame_id: AtomicU32,
    stats: ServerStats,
    shutdown: CancellationToken,
    stale_after: Duration,
}

// ── StreamServer ─────────────────────────────────────────────────

/// UDP stream server owning the full encode-and-send pipeline.
///
/// All mutable state — baselines, handshake registration, the frame-id
/// counter — is owned by the instance, so independent servers can
/// coexist in one process.
pub struct StreamServer {
    shared: Arc<ServerShared>,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamServer {
    /// Bind `addr` and spawn the pipeline tasks.
    ///
    /// The socket gets `SO_REUSEADDR` and a 1 MB send buffer. Returns
    /// an error only if the bind fails.
    pub async fn start(addr: SocketAddr, config: ServerConfig) -> Result<Self, AvoError> {
        let std_socket = bind_udp(addr, Some(SOCKET_BUFFER_BYTES), None)?;
        let socket = UdpSocket::from_std(std_socket)?;
        let local = socket.local_addr()?;

        let shared = Arc::new(ServerShared {
            socket,
            client: Mutex::new(None),
            has_client: AtomicBool::new(false),
            ingest: FrameQueue::new(INGEST_CAPACITY, INGEST_DRAIN_TO),
            send_queue: FrameQueue::new(SEND_CAPACITY, SEND_DRAIN_TO),
            baselines: Mutex::new(HashMap::new()),
            next_frame_id: AtomicU32::new(0),
            stats: ServerStats::default(),
            shutdown: CancellationToken::new(),
            stale_after: config.stale_after,
        });

        let workers = config.encoder_workers.max(1);
        let (encode_tx, encode_rx) = mpsc::channel::<RgbFrame>(workers * 2);
        let encode_rx = Arc::new(tokio::sync::Mutex::new(encode_rx));

        let mut tasks = Vec::with_capacity(workers + 3);
        tasks.push(tokio::spawn(listener_loop(Arc::clone(&shared))));
        tasks.push(tokio::spawn(buffer_loop(Arc::clone(&shared), encode_tx)));
        for _ in 0..workers {
            tasks.push(tokio::spawn(encoder_loop(
                Arc::clone(&shared),
                Arc::clone(&encode_rx),
            )));
        }
        tasks.push(tokio::spawn(sender_loop(Arc::clone(&shared))));

        info!(%local, workers, "stream server started");
        Ok(Self { shared, tasks })
    }

    /// Accept a captured frame into the ingest buffer.
    ///
    /// The frame is timestamped here; returns immediately. A full
    /// buffer drops its oldest frame and counts it.
    pub fn submit(&self, mut frame: RgbFrame) -> Result<(), AvoError> {
        if !frame.is_well_formed() {
            warn!(
                width = frame.width,
                height = frame.height,
                len = frame.data.len(),
                "rejecting malformed frame"
            );
            return Err(AvoError::FrameSizeMismatch {
                expected: frame.byte_len(),
                actual: frame.data.len(),
            });
        }
        frame.captured_at = Instant::now();
        let dropped = self.shared.ingest.push(frame);
        if dropped > 0 {
            self.shared.stats.add_buffer_dropped(dropped as u64);
        }
        Ok(())
    }

    /// Whether a receiver has registered via the handshake.
    pub fn has_client(&self) -> bool {
        self.shared.has_client.load(Ordering::Acquire)
    }

    /// The address the server is bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, AvoError> {
        Ok(self.shared.socket.local_addr()?)
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> ServerStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop the pipeline: signal every task, join them, drop cached
    /// state and the client registration.
    pub async fn stop(mut self) {
        self.shared.shutdown.cancel();
        self.shared.ingest.close();
        self.shared.send_queue.close();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.shared.baselines.lock().unwrap().clear();
        *self.shared.client.lock().unwrap() = None;
        self.shared.has_client.store(false, Ordering::Release);
        info!("stream server stopped");
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        // Wake everything so an un-stopped server does not leak tasks.
        self.shared.shutdown.cancel();
        self.shared.ingest.close();
        self.shared.send_queue.close();
    }
}

// ── Pipeline tasks ───────────────────────────────────────────────

/// Handshake listener: any non-empty datagram registers its sender and
/// is answered with `ACK`. Timeouts are routine, not errors.
async fn listener_loop(shared: Arc<ServerShared>) {
    let mut buf = [0u8; 1024];
    loop {
        let received = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            r = tokio::time::timeout(RECV_TIMEOUT, shared.socket.recv_from(&mut buf)) => r,
        };

        match received {
            Err(_) => continue, // receive timeout
            Ok(Err(e)) => {
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    warn!("listener receive error: {e}");
                }
            }
            Ok(Ok((0, _))) => {} // empty datagram: not a registration
            Ok(Ok((len, from))) => {
                let newcomer = {
                    let mut client = shared.client.lock().unwrap();
                    let changed = *client != Some(from);
                    *client = Some(from);
                    changed
                };
                shared.has_client.store(true, Ordering::Release);
                if newcomer {
                    info!(%from, bytes = len, "client registered");
                }
                if let Err(e) = shared.socket.send_to(HANDSHAKE_ACK, from).await {
                    warn!("failed to ack {from}: {e}");
                }
            }
        }
    }
    debug!("listener stopped");
}

/// Buffer worker: pulls from the ingest buffer, discards frames that
/// went stale while queued, hands the rest to the encoder pool.
async fn buffer_loop(shared: Arc<ServerShared>, encode_tx: mpsc::Sender<RgbFrame>) {
    while let Some(frame) = shared.ingest.pop().await {
        if frame.captured_at.elapsed() > shared.stale_after {
            shared.stats.add_buffer_dropped(1);
            trace!("dropping stale ingest frame");
            continue;
        }
        if encode_tx.send(frame).await.is_err() {
            break; // pool gone, shutting down
        }
    }
    debug!("buffer worker stopped");
}

/// Encoder worker: diffs the frame against the per-resolution baseline
/// and queues the RLE payload (or the no-change sentinel) for sending.
async fn encoder_loop(
    shared: Arc<ServerShared>,
    encode_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RgbFrame>>>,
) {
    loop {
        let frame = {
            let mut rx = encode_rx.lock().await;
            tokio::select! {
                _ = shared.shutdown.cancelled() => None,
                frame = rx.recv() => frame,
            }
        };
        let Some(frame) = frame else { break };

        let started = Instant::now();
        let key = (frame.width, frame.height);

        // Swap the baseline in one critical section so concurrent
        // encodes chain their baselines consistently; the diff itself
        // runs outside the lock.
        let prev = {
            let mut baselines = shared.baselines.lock().unwrap();
            baselines
                .insert(key, frame.data.clone())
                .unwrap_or_else(|| vec![0u8; frame_len(frame.width, frame.height)])
        };

        let changes = compare_frames(&prev, &frame.data, frame.width, frame.height);
        let payload = if changes.is_empty() {
            vec![NO_CHANGE_SENTINEL]
        } else {
            rle::compress(&changes)
        };

        shared
            .stats
            .add_encoding_time_ms(started.elapsed().as_millis() as u64);
        shared.stats.inc_frames_processed();

        let dropped = shared.send_queue.push(FramePacket {
            payload,
            width: frame.width,
            height: frame.height,
        });
        if dropped > 0 {
            shared.stats.add_buffer_dropped(dropped as u64);
            trace!(dropped, "send queue overflow");
        }
    }
    debug!("encoder worker stopped");
}

/// Sender: assigns the frame id, fragments, and writes datagrams to
/// the registered receiver. Without a receiver the packet is dropped.
async fn sender_loop(shared: Arc<ServerShared>) {
    while let Some(packet) = shared.send_queue.pop().await {
        if !shared.has_client.load(Ordering::Acquire) {
            continue;
        }
        let target = *shared.client.lock().unwrap();
        let Some(target) = target else { continue };

        let frame_id = shared.next_frame_id.fetch_add(1, Ordering::Relaxed);
        let chunks = packet::fragment(&packet.payload);
        let total = chunks.len() as u32;
        let started = Instant::now();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let datagram = packet::create_packet(
                chunk,
                frame_id,
                index as u32,
                total,
                packet.width,
                packet.height,
            );
            match shared.socket.send_to(&datagram, target).await {
                Ok(sent) => {
                    shared.stats.add_bytes_sent(sent as u64);
                    shared.stats.inc_packets_sent();
                }
                Err(e) => {
                    warn!("send to {target} failed: {e}");
                    break;
                }
            }
            if total > 1 {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
        }

        shared
            .stats
            .add_network_time_ms(started.elapsed().as_millis() as u64);
    }
    debug!("sender stopped");
}

// ── Tests ────────────────────────────────────────────────────────
