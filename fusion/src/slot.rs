//! Latest-wins hand-off between a frame producer and the pipeline.
//!
//! The slot holds at most one undelivered frame. A producer that outpaces the
//! pipeline overwrites the waiting frame; the overwritten frame is dropped and
//! counted.

use parking_lot::{Condvar, Mutex};
use scan3d_core::GeometryFrame;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct SlotState {
    frame: Option<GeometryFrame>,
    closed: bool,
    dropped: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// Cloneable handle to a single-frame buffer.
#[derive(Clone, Default)]
pub struct FrameSlot {
    shared: Arc<Shared>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing any undelivered one.
    ///
    /// Returns the displaced frame. Once the slot is closed nothing is stored
    /// and `frame` itself comes back.
    pub fn offer(&self, frame: GeometryFrame) -> Option<GeometryFrame> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Some(frame);
        }
        let displaced = state.frame.replace(frame);
        if let Some(old) = &displaced {
            state.dropped += 1;
            tracing::debug!(frame = old.index(), "undelivered frame replaced by a newer one");
        }
        drop(state);
        self.shared.ready.notify_one();
        displaced
    }

    /// Take the waiting frame without blocking.
    pub fn take(&self) -> Option<GeometryFrame> {
        self.shared.state.lock().frame.take()
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Returns early with `None` when the slot is closed and empty.
    pub fn take_timeout(&self, timeout: Duration) -> Option<GeometryFrame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            if self
                .shared
                .ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.frame.take();
            }
        }
    }

    /// Refuse further offers and wake every waiter. A frame already waiting
    /// can still be taken.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// A frame is waiting to be taken.
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().frame.is_some()
    }

    /// Closed with nothing left to deliver.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.closed && state.frame.is_none()
    }

    /// Frames overwritten before delivery.
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use scan3d_core::PointCloud;
    use std::thread;

    fn frame(index: u64) -> GeometryFrame {
        GeometryFrame::new(index, PointCloud::new(vec![Point3::origin()]))
    }

    #[test]
    fn test_latest_wins() {
        let slot = FrameSlot::new();
        assert!(slot.offer(frame(1)).is_none());
        assert_eq!(slot.offer(frame(2)).map(|f| f.index()), Some(1));
        assert_eq!(slot.offer(frame(3)).map(|f| f.index()), Some(2));
        assert_eq!(slot.dropped(), 2);

        assert_eq!(slot.take().map(|f| f.index()), Some(3));
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_close_rejects_offers_but_drains() {
        let slot = FrameSlot::new();
        slot.offer(frame(1));
        slot.close();
        assert!(slot.is_closed());
        assert!(!slot.is_finished());
        assert_eq!(slot.offer(frame(2)).map(|f| f.index()), Some(2));

        assert_eq!(
            slot.take_timeout(Duration::from_millis(10)).map(|f| f.index()),
            Some(1)
        );
        assert!(slot.is_finished());
        assert!(slot.take_timeout(Duration::from_secs(5)).is_none());
        assert_eq!(slot.dropped(), 0);
    }

    #[test]
    fn test_take_timeout_expires() {
        let slot = FrameSlot::new();
        let start = Instant::now();
        assert!(slot.take_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_waiter_woken_by_producer() {
        let slot = FrameSlot::new();
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.offer(frame(9));
        });
        let got = slot.take_timeout(Duration::from_secs(10));
        handle.join().unwrap();
        assert_eq!(got.map(|f| f.index()), Some(9));
    }

    #[test]
    fn test_close_wakes_waiter() {
        let slot = FrameSlot::new();
        let closer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        let start = Instant::now();
        assert!(slot.take_timeout(Duration::from_secs(10)).is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }
}
