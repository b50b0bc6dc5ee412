//! Keep-latest frame handoff between a live source and its pipeline worker.
//!
//! The slot holds at most one unconsumed frame. Offering a frame while the slot
//! is full evicts the stale one, so the producer never blocks and the worker
//! always sees the newest frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::frame::Frame;

/// Counters shared by both ends of a slot.
#[derive(Debug, Default)]
pub struct SlotStats {
    offered: AtomicU64,
    dropped: AtomicU64,
}

impl SlotStats {
    pub fn offered(&self) -> u64 {
        self.offered.load(Ordering::Relaxed)
    }

    /// Frames evicted before the worker consumed them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a connected single-capacity slot.
pub fn frame_slot() -> (SlotSender, SlotReceiver) {
    let (tx, rx) = bounded(1);
    let stats = Arc::new(SlotStats::default());
    let closed = Arc::new(AtomicBool::new(false));
    (
        SlotSender {
            tx,
            evict: rx.clone(),
            stats: stats.clone(),
            closed: closed.clone(),
        },
        SlotReceiver { rx, stats, closed },
    )
}

/// Producer end. Cloneable; the slot disconnects when every sender is dropped.
#[derive(Clone)]
pub struct SlotSender {
    tx: Sender<Frame>,
    evict: Receiver<Frame>,
    stats: Arc<SlotStats>,
    closed: Arc<AtomicBool>,
}

impl SlotSender {
    /// Place `frame` in the slot, discarding any frame still waiting there.
    ///
    /// Returns false once the receiving worker has gone away.
    pub fn offer(&self, frame: Frame) -> bool {
        if self.is_closed() {
            return false;
        }
        self.stats.offered.fetch_add(1, Ordering::Relaxed);
        let mut pending = frame;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if let Ok(stale) = self.evict.try_recv() {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        log::trace!("FrameSlot: evicted frame #{}", stale.sequence);
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Arc<SlotStats> {
        self.stats.clone()
    }
}

/// Consumer end, owned by the pipeline worker.
pub struct SlotReceiver {
    rx: Receiver<Frame>,
    stats: Arc<SlotStats>,
    closed: Arc<AtomicBool>,
}

impl SlotReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn stats(&self) -> Arc<SlotStats> {
        self.stats.clone()
    }
}

impl Drop for SlotReceiver {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame::filled(2, 2, [0, 0, 0, 255])
            .unwrap()
            .with_position(sequence, sequence * 33)
    }

    #[test]
    fn newest_frame_wins() {
        let (tx, rx) = frame_slot();
        for seq in 1..=5 {
            assert!(tx.offer(frame(seq)));
        }
        assert_eq!(rx.try_recv().map(|f| f.sequence), Some(5));
        assert!(rx.try_recv().is_none());
        assert_eq!(rx.stats().offered(), 5);
        assert_eq!(rx.stats().dropped(), 4);
    }

    #[test]
    fn offer_after_receiver_drop_is_refused() {
        let (tx, rx) = frame_slot();
        drop(rx);
        assert!(!tx.offer(frame(1)));
        assert_eq!(tx.stats().offered(), 0);
    }

    #[test]
    fn receiver_sees_disconnect_when_senders_drop() {
        let (tx, rx) = frame_slot();
        tx.offer(frame(1));
        drop(tx);
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_ok());
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
