use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::stream::FrameStream;

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shut(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-memory connected pair of frame streams.
///
/// Frames written on one end are read, in order, on the other. Closing an
/// end wakes its own blocked reader immediately; the other end keeps
/// draining what was already queued and then sees
/// [`FrameError::ConnectionClosed`].
pub struct LoopbackStream {
    inbox: Arc<Queue>,
    outbox: Arc<Queue>,
    closed: AtomicBool,
}

impl LoopbackStream {
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Queue::default());
        let b = Arc::new(Queue::default());
        (
            Self {
                inbox: Arc::clone(&a),
                outbox: Arc::clone(&b),
                closed: AtomicBool::new(false),
            },
            Self {
                inbox: b,
                outbox: a,
                closed: AtomicBool::new(false),
            },
        )
    }

    /// Frames queued for this end and not yet read.
    pub fn pending(&self) -> usize {
        self.inbox.lock().frames.len()
    }
}

impl FrameStream for LoopbackStream {
    fn read(&self) -> Result<Frame> {
        let mut state = self.inbox.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(FrameError::Closed);
            }
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if state.closed {
                self.closed.store(true, Ordering::Release);
                return Err(FrameError::ConnectionClosed);
            }
            state = self
                .inbox
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FrameError::Closed);
        }

        let mut state = self.outbox.lock();
        if state.closed {
            return Err(FrameError::ConnectionClosed);
        }
        state.frames.push_back(frame.clone());
        drop(state);
        self.outbox.ready.notify_one();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inbox.shut();
        self.outbox.shut();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for LoopbackStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn frames_arrive_in_write_order() {
        let (left, right) = LoopbackStream::pair();
        for payload in ["a", "b", "c"] {
            left.write(&Frame::new(payload)).unwrap();
        }
        assert_eq!(right.pending(), 3);

        let got: Vec<_> = (0..3).map(|_| right.read().unwrap()).collect();
        assert_eq!(got, vec![Frame::new("a"), Frame::new("b"), Frame::new("c")]);
    }

    #[test]
    fn close_wakes_own_reader() {
        let (left, _right) = LoopbackStream::pair();
        let left = Arc::new(left);
        let reader = {
            let left = Arc::clone(&left);
            std::thread::spawn(move || left.read())
        };

        std::thread::sleep(Duration::from_millis(20));
        left.close().unwrap();
        assert!(matches!(reader.join().unwrap(), Err(FrameError::Closed)));
    }

    #[test]
    fn peer_close_drains_then_reports_eof() {
        let (left, right) = LoopbackStream::pair();
        left.write(&Frame::new("queued")).unwrap();
        left.close().unwrap();

        assert_eq!(right.read().unwrap(), Frame::new("queued"));
        assert!(matches!(right.read(), Err(FrameError::ConnectionClosed)));
        assert!(right.is_closed());
    }

    #[test]
    fn write_after_close_is_rejected() {
        let (left, right) = LoopbackStream::pair();
        left.close().unwrap();
        assert!(matches!(left.write(&Frame::new("x")), Err(FrameError::Closed)));
        assert!(matches!(
            right.write(&Frame::new("y")),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn dropping_an_end_hangs_up() {
        let (left, right) = LoopbackStream::pair();
        drop(left);
        assert!(matches!(right.read(), Err(FrameError::ConnectionClosed)));
    }
}
