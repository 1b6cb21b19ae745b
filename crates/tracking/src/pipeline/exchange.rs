//! Single-slot, last-write-wins frame hand-off between the capture thread and
//! the inference thread.
//!
//! The producer swaps a new `Arc<Frame>` into the slot; the consumer copies
//! the current frame into a buffer taken from a small pool and owns that copy
//! until it hands the buffer back with [`FrameSource::release`]. Neither side
//! takes a lock on the hot path.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, bounded};
use video_ingest::{Frame, FrameSink};

/// Buffers kept around for reuse by later acquisitions.
pub const DEFAULT_POOL_CAPACITY: usize = 2;

/// Consumer side of the hand-off.
pub trait FrameSource {
    /// Owned copy of the most recent frame, or `None` when nothing has been
    /// published yet. Never blocks.
    fn acquire_latest(&self) -> Option<Frame>;
    /// Hand an acquired frame back. Consumes the frame, so it cannot be
    /// released twice.
    fn release(&self, frame: Frame);
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn acquire_latest(&self) -> Option<Frame> {
        (**self).acquire_latest()
    }

    fn release(&self, frame: Frame) {
        (**self).release(frame)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for &T {
    fn acquire_latest(&self) -> Option<Frame> {
        (**self).acquire_latest()
    }

    fn release(&self, frame: Frame) {
        (**self).release(frame)
    }
}

pub struct FrameExchange {
    slot: ArcSwapOption<Frame>,
    pool_tx: Sender<Vec<u8>>,
    pool_rx: Receiver<Vec<u8>>,
    published: AtomicU64,
    outstanding: AtomicUsize,
}

impl Default for FrameExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExchange {
    pub fn new() -> Self {
        Self::with_pool_capacity(DEFAULT_POOL_CAPACITY)
    }

    pub fn with_pool_capacity(capacity: usize) -> Self {
        let (pool_tx, pool_rx) = bounded(capacity.max(1));
        Self {
            slot: ArcSwapOption::empty(),
            pool_tx,
            pool_rx,
            published: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Replace whatever the slot holds with `frame`. Stamps the publish
    /// sequence, starting at 1.
    pub fn publish(&self, mut frame: Frame) {
        frame.sequence = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        self.slot.store(Some(Arc::new(frame)));
    }

    /// Frames published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Acquired frames not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl FrameSink for FrameExchange {
    fn publish(&self, frame: Frame) {
        FrameExchange::publish(self, frame)
    }
}

impl FrameSource for FrameExchange {
    fn acquire_latest(&self) -> Option<Frame> {
        let latest = self.slot.load_full()?;
        let mut data = self.pool_rx.try_recv().unwrap_or_default();
        data.clear();
        data.extend_from_slice(&latest.data);
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Some(Frame {
            data,
            width: latest.width,
            height: latest.height,
            channels: latest.channels,
            format: latest.format,
            sequence: latest.sequence,
            timestamp_ms: latest.timestamp_ms,
        })
    }

    fn release(&self, frame: Frame) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        // A full pool simply drops the buffer.
        let _ = self.pool_tx.try_send(frame.data);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use video_ingest::FrameFormat;

    use super::*;

    fn frame(fill: u8) -> Frame {
        Frame::new(vec![fill; 4 * 2 * 3], 4, 2, FrameFormat::Bgr8)
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let exchange = FrameExchange::new();
        assert!(exchange.acquire_latest().is_none());
        assert_eq!(exchange.outstanding(), 0);
    }

    #[test]
    fn last_write_wins_and_repeats_are_visible() {
        let exchange = FrameExchange::new();
        exchange.publish(frame(1));
        exchange.publish(frame(2));
        exchange.publish(frame(3));

        let first = exchange.acquire_latest().unwrap();
        assert_eq!(first.data[0], 3);
        assert_eq!(first.sequence, 3);
        exchange.release(first);

        let again = exchange.acquire_latest().unwrap();
        assert_eq!(again.sequence, 3);
        exchange.release(again);
        assert_eq!(exchange.published(), 3);
    }

    #[test]
    fn acquired_copy_is_decoupled_from_later_publishes() {
        let exchange = FrameExchange::new();
        exchange.publish(frame(7));
        let held = exchange.acquire_latest().unwrap();
        exchange.publish(frame(9));
        assert!(held.data.iter().all(|&b| b == 7));
        assert_eq!(held.width, 4);
        assert_eq!(held.channels, 3);
        exchange.release(held);
        assert_eq!(exchange.acquire_latest().unwrap().data[0], 9);
    }

    #[test]
    fn release_returns_buffer_to_pool() {
        let exchange = FrameExchange::with_pool_capacity(1);
        exchange.publish(frame(5));
        let held = exchange.acquire_latest().unwrap();
        assert_eq!(exchange.outstanding(), 1);
        let ptr = held.data.as_ptr();
        exchange.release(held);
        assert_eq!(exchange.outstanding(), 0);

        let reused = exchange.acquire_latest().unwrap();
        assert_eq!(reused.data.as_ptr(), ptr);
        exchange.release(reused);
    }

    #[test]
    fn concurrent_reads_never_see_torn_frames() {
        let exchange = Arc::new(FrameExchange::new());
        let producer = {
            let exchange = exchange.clone();
            thread::spawn(move || {
                for fill in 0..=200u8 {
                    exchange.publish(frame(fill));
                }
            })
        };

        let mut observed = 0;
        while observed < 200 {
            if let Some(f) = exchange.acquire_latest() {
                let first = f.data[0];
                assert!(f.data.iter().all(|&b| b == first));
                observed += 1;
                exchange.release(f);
            }
        }
        producer.join().unwrap();
        assert_eq!(exchange.outstanding(), 0);
    }
}
