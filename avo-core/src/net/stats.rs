//! Pipeline statistics: lock-free monotonic counters.
//!
//! The worker tasks bump atomics; observers take a consistent-enough
//! snapshot without stalling the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

// ── Server side ──────────────────────────────────────────────────

/// Counters maintained by the server pipeline.
#[derive(Debug, Default)]
pub struct ServerStats {
    frames_processed: AtomicU64,
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    encoding_time_ms: AtomicU64,
    network_time_ms: AtomicU64,
    buffer_dropped: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    /// Frames that left the encoder pool.
    pub frames_processed: u64,
    /// Datagram bytes handed to the socket.
    pub bytes_sent: u64,
    /// Datagrams handed to the socket.
    pub packets_sent: u64,
    /// Cumulative wall-clock time spent encoding.
    pub encoding_time_ms: u64,
    /// Cumulative wall-clock time spent sending.
    pub network_time_ms: u64,
    /// Frames or packets discarded by any bounded stage.
    pub buffer_dropped: u64,
}

impl ServerStats {
    pub fn inc_frames_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_packets_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_encoding_time_ms(&self, ms: u64) {
        self.encoding_time_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn add_network_time_ms(&self, ms: u64) {
        self.network_time_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn add_buffer_dropped(&self, count: u64) {
        self.buffer_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            encoding_time_ms: self.encoding_time_ms.load(Ordering::Relaxed),
            network_time_ms: self.network_time_ms.load(Ordering::Relaxed),
            buffer_dropped: self.buffer_dropped.load(Ordering::Relaxed),
        }
    }
}

// ── Client side ──────────────────────────────────────────────────

/// Counters maintained by the client pipeline.
#[derive(Debug, Default)]
pub struct ClientStats {
    frames_decoded: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_dropped: AtomicU64,
    reassembly_expired: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStatsSnapshot {
    /// Payloads processed by the decoder pool (sentinels included).
    pub frames_decoded: u64,
    /// Datagrams accepted by the receive loop.
    pub packets_received: u64,
    /// Bytes accepted by the receive loop.
    pub bytes_received: u64,
    /// Payloads discarded by the bounded decode queue.
    pub frames_dropped: u64,
    /// Partial frames evicted from the reassembly map.
    pub reassembly_expired: u64,
}

impl ClientStats {
    pub fn inc_frames_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_packets_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_reassembly_expired(&self) {
        self.reassembly_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            reassembly_expired: self.reassembly_expired.load(Ordering::Relaxed),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_snapshot_reflects_counters() {
        let stats = ServerStats::default();
        stats.inc_frames_processed();
        stats.inc_frames_processed();
        stats.add_bytes_sent(1024);
        stats.add_buffer_dropped(3);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.bytes_sent, 1024);
        assert_eq!(snap.buffer_dropped, 3);
        assert_eq!(snap.packets_sent, 0);
    }

    #[test]
    fn client_snapshot_reflects_counters() {
        let stats = ClientStats::default();
        stats.inc_frames_decoded();
        stats.add_bytes_received(500);
        stats.inc_reassembly_expired();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_decoded, 1);
        assert_eq!(snap.bytes_received, 500);
        assert_eq!(snap.reassembly_expired, 1);
    }
}
