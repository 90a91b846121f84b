//! Bounded hand-off buffer between an acquisition thread and `capture` callers.
//!
//! `CaptureBuffer` is a fixed-capacity FIFO channel with blocking push/pop and
//! an explicit close. It replaces manual head/tail arithmetic over a slot array
//! with a `VecDeque` guarded by one mutex and two condition variables
//! ("has room" and "has data").
//!
//! # Protocol
//!
//! ```text
//!   producer thread                       consumer (capture)
//!   ───────────────                       ──────────────────
//!   acquire frame (no lock held)
//!   push(frame) ──blocks while full──►    pop() ──blocks while empty──►
//!            ◄── has_room.notify ───────────────── has_data.notify ──►
//!
//!   finish()  : no more frames; consumers drain then get EndOfStream
//!   close()   : shutdown; every waiter wakes, further calls get StreamClosed
//! ```
//!
//! Frames are delivered in production order with no drops and no overwrite:
//! a full buffer blocks the producer (backpressure). The lock is held only
//! while slots are manipulated, never across the producer's acquisition call.

use crate::error::{HalError, HalResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Observable state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPhase {
    /// Open, no frames queued
    Empty,
    /// Open, some but not all slots filled
    Filling,
    /// Open, every slot filled
    Full,
    /// Producer finished; remaining frames can still be drained
    Draining,
    /// Shut down; terminal
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Open,
    Finished,
    Closed,
}

struct Slots<T> {
    queue: VecDeque<T>,
    status: Status,
}

/// Bounded, thread-safe FIFO with blocking push/pop and explicit shutdown.
pub struct CaptureBuffer<T> {
    slots: Mutex<Slots<T>>,
    has_room: Condvar,
    has_data: Condvar,
    capacity: usize,
}

impl<T> CaptureBuffer<T> {
    /// Create a buffer holding at most `capacity` frames.
    ///
    /// # Errors
    /// Returns [`HalError::Configuration`] for a zero capacity.
    pub fn new(capacity: usize) -> HalResult<Self> {
        if capacity == 0 {
            return Err(HalError::Configuration(
                "capture buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            slots: Mutex::new(Slots {
                queue: VecDeque::with_capacity(capacity),
                status: Status::Open,
            }),
            has_room: Condvar::new(),
            has_data: Condvar::new(),
            capacity,
        })
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.slots.lock().queue.len()
    }

    /// True when no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.slots.lock().status == Status::Closed
    }

    /// Current phase of the buffer state machine.
    pub fn phase(&self) -> BufferPhase {
        let slots = self.slots.lock();
        match slots.status {
            Status::Closed => BufferPhase::Stopped,
            Status::Finished => BufferPhase::Draining,
            Status::Open if slots.queue.is_empty() => BufferPhase::Empty,
            Status::Open if slots.queue.len() >= self.capacity => BufferPhase::Full,
            Status::Open => BufferPhase::Filling,
        }
    }

    /// Append a frame, blocking while the buffer is full.
    ///
    /// # Errors
    /// Returns [`HalError::StreamClosed`] without writing if the buffer was
    /// closed or finished, including while this call was waiting for room.
    pub fn push(&self, frame: T) -> HalResult<()> {
        let mut slots = self.slots.lock();
        self.has_room.wait_while(&mut slots, |s| {
            s.status == Status::Open && s.queue.len() >= self.capacity
        });
        if slots.status != Status::Open {
            return Err(HalError::StreamClosed);
        }
        slots.queue.push_back(frame);
        drop(slots);
        self.has_data.notify_one();
        Ok(())
    }

    /// Remove the oldest frame, blocking while the buffer is empty.
    ///
    /// # Errors
    /// - [`HalError::StreamClosed`] once the buffer is closed, without blocking
    /// - [`HalError::EndOfStream`] after a finished buffer has been drained
    pub fn pop(&self) -> HalResult<T> {
        let mut slots = self.slots.lock();
        self.has_data
            .wait_while(&mut slots, |s| s.status == Status::Open && s.queue.is_empty());
        self.take(&mut slots)?.ok_or(HalError::EndOfStream)
    }

    /// Non-blocking pop. `Ok(None)` means the buffer is open but empty.
    ///
    /// # Errors
    /// Same terminal errors as [`pop`](Self::pop).
    pub fn try_pop(&self) -> HalResult<Option<T>> {
        let mut slots = self.slots.lock();
        match self.take(&mut slots)? {
            Some(frame) => Ok(Some(frame)),
            None if slots.status == Status::Finished => Err(HalError::EndOfStream),
            None => Ok(None),
        }
    }

    /// Pop with a deadline. `Ok(None)` means the timeout elapsed.
    ///
    /// # Errors
    /// Same terminal errors as [`pop`](Self::pop).
    pub fn pop_timeout(&self, timeout: Duration) -> HalResult<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        while slots.status == Status::Open && slots.queue.is_empty() {
            if self.has_data.wait_until(&mut slots, deadline).timed_out() {
                break;
            }
        }
        match self.take(&mut slots)? {
            Some(frame) => Ok(Some(frame)),
            None if slots.status == Status::Finished => Err(HalError::EndOfStream),
            None => Ok(None),
        }
    }

    /// Mark the end of a finite stream. Queued frames remain poppable.
    pub fn finish(&self) {
        let mut slots = self.slots.lock();
        if slots.status == Status::Open {
            slots.status = Status::Finished;
        }
        drop(slots);
        self.has_data.notify_all();
        self.has_room.notify_all();
    }

    /// Shut the buffer down, discarding queued frames and waking every waiter.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        slots.status = Status::Closed;
        slots.queue.clear();
        drop(slots);
        self.has_data.notify_all();
        self.has_room.notify_all();
    }

    fn take(&self, slots: &mut Slots<T>) -> HalResult<Option<T>> {
        if slots.status == Status::Closed {
            return Err(HalError::StreamClosed);
        }
        let frame = slots.queue.pop_front();
        if frame.is_some() {
            self.has_room.notify_one();
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            CaptureBuffer::<u32>::new(0),
            Err(HalError::Configuration(_))
        ));
    }

    #[test]
    fn phases_follow_fill_level() {
        let buf = CaptureBuffer::new(2).unwrap();
        assert_eq!(buf.phase(), BufferPhase::Empty);
        buf.push(1).unwrap();
        assert_eq!(buf.phase(), BufferPhase::Filling);
        buf.push(2).unwrap();
        assert_eq!(buf.phase(), BufferPhase::Full);
        buf.finish();
        assert_eq!(buf.phase(), BufferPhase::Draining);
        buf.close();
        assert_eq!(buf.phase(), BufferPhase::Stopped);
    }

    #[test]
    fn fifo_order_single_thread() {
        let buf = CaptureBuffer::new(4).unwrap();
        for i in 0..4 {
            buf.push(i).unwrap();
        }
        let out: Vec<_> = (0..4).map(|_| buf.pop().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn finish_drains_then_end_of_stream() {
        let buf = CaptureBuffer::new(3).unwrap();
        buf.push("a").unwrap();
        buf.push("b").unwrap();
        buf.finish();
        assert_eq!(buf.pop().unwrap(), "a");
        assert_eq!(buf.try_pop().unwrap(), Some("b"));
        assert!(matches!(buf.pop(), Err(HalError::EndOfStream)));
        assert!(matches!(buf.try_pop(), Err(HalError::EndOfStream)));
        assert!(matches!(buf.push("c"), Err(HalError::StreamClosed)));
    }

    #[test]
    fn closed_buffer_fails_immediately() {
        let buf = CaptureBuffer::new(3).unwrap();
        buf.push(7).unwrap();
        buf.close();
        assert!(matches!(buf.pop(), Err(HalError::StreamClosed)));
        assert!(matches!(buf.try_pop(), Err(HalError::StreamClosed)));
        assert!(matches!(buf.push(8), Err(HalError::StreamClosed)));
        assert!(buf.is_empty());
    }

    #[test]
    fn try_pop_on_empty_open_buffer() {
        let buf = CaptureBuffer::<u8>::new(1).unwrap();
        assert_eq!(buf.try_pop().unwrap(), None);
    }

    #[test]
    fn pop_timeout_expires() {
        let buf = CaptureBuffer::<u8>::new(1).unwrap();
        let start = Instant::now();
        assert_eq!(buf.pop_timeout(Duration::from_millis(30)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let buf = Arc::new(CaptureBuffer::<u32>::new(1).unwrap());
        let consumer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || buf.pop())
        };
        thread::sleep(Duration::from_millis(20));
        buf.close();
        assert!(matches!(consumer.join().unwrap(), Err(HalError::StreamClosed)));
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let buf = Arc::new(CaptureBuffer::new(1).unwrap());
        buf.push(0u32).unwrap();
        let producer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || buf.push(1))
        };
        thread::sleep(Duration::from_millis(20));
        buf.close();
        assert!(matches!(producer.join().unwrap(), Err(HalError::StreamClosed)));
    }

    #[test]
    fn blocked_producer_resumes_after_pop() {
        let buf = Arc::new(CaptureBuffer::new(1).unwrap());
        buf.push(0u32).unwrap();
        let producer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || buf.push(1))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pop().unwrap(), 0);
        producer.join().unwrap().unwrap();
        assert_eq!(buf.pop().unwrap(), 1);
    }
}
