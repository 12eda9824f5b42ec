//! Bounded drop-oldest FIFO connecting pipeline stages.
//!
//! Every inter-stage queue in the system is bounded and favors fresh
//! data: on overflow, the oldest entries are discarded down to a
//! configured watermark before the new entry is enqueued. The caller
//! learns how many entries were dropped so it can feed the stats
//! counters; overflow is never an error.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

/// How long a blocked consumer waits before re-checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A bounded FIFO with drop-oldest overflow.
pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    drain_to: usize,
    closed: AtomicBool,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// When a push finds the queue full, the oldest items are dropped
    /// until `drain_to` remain, then the new item is appended. With
    /// `drain_to == capacity - 1` exactly one item is dropped per
    /// overflowing push; a lower watermark gives burst drops.
    pub fn new(capacity: usize, drain_to: usize) -> Self {
        assert!(capacity > 0 && drain_to < capacity);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            drain_to,
            closed: AtomicBool::new(false),
        }
    }

    /// Append an item, returning how many old items were dropped.
    pub fn push(&self, item: T) -> usize {
        let mut dropped = 0;
        {
            let mut items = self.items.lock().unwrap();
            if items.len() >= self.capacity {
                while items.len() > self.drain_to {
                    items.pop_front();
                    dropped += 1;
                }
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        dropped
    }

    /// Remove the oldest item, waiting until one is available.
    ///
    /// Returns `None` once the queue has been closed and drained. The
    /// wait wakes periodically so a closed queue is noticed within
    /// [`POLL_INTERVAL`] even if the notification was missed.
    pub async fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.items.lock().unwrap().pop_front() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Remove the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue: consumers drain what is left, then see `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order() {
        let q = FrameQueue::new(4, 3);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn overflow_drops_single_oldest() {
        // Ingest-buffer policy: capacity 15, drop exactly one.
        let q = FrameQueue::new(15, 14);
        for i in 0..15 {
            assert_eq!(q.push(i), 0);
        }
        assert_eq!(q.push(15), 1);
        assert_eq!(q.len(), 15);
        assert_eq!(q.try_pop(), Some(1)); // 0 was dropped
    }

    #[test]
    fn overflow_drops_burst_to_watermark() {
        // Send-queue policy: capacity 10, drain to 7, then enqueue.
        let q = FrameQueue::new(10, 7);
        for i in 0..10 {
            q.push(i);
        }
        assert_eq!(q.push(10), 3);
        assert_eq!(q.len(), 8);
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn decode_queue_policy() {
        // Capacity 50, drain to 40, then enqueue → 41 items.
        let q = FrameQueue::new(50, 40);
        for i in 0..50 {
            q.push(i);
        }
        assert_eq!(q.push(50), 10);
        assert_eq!(q.len(), 41);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q = Arc::new(FrameQueue::new(4, 3));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(99);
        let got = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(99));
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let q: Arc<FrameQueue<u32>> = Arc::new(FrameQueue::new(4, 3));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        let got = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn closed_queue_drains_before_none() {
        let q: FrameQueue<u32> = FrameQueue::new(4, 3);
        q.push(1);
        q.close();
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, None);
    }
}
