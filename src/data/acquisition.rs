//! Background acquisition threads feeding a [`CaptureBuffer`].
//!
//! Streaming drivers wrap their data source in a [`FrameSource`] and hand it
//! to [`CaptureThread::spawn`]. The thread acquires frames at hardware pace,
//! pushes them into the buffer and blocks when the buffer is full. Clients
//! call [`CaptureThread::capture`] at their own pace.
//!
//! Shutdown raises the thread's [`StopSignal`] and closes the buffer, which
//! wakes a producer blocked on a full buffer or sleeping in a [`Pacer`] and
//! any blocked consumer at once, then joins the thread. Dropping a
//! `CaptureThread` does the same, so a driver holding one never outlives its
//! producer.

use super::capture_buffer::CaptureBuffer;
use crate::error::{HalError, HalResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest period a paced source may be configured with.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Period of a source running at `rate` Hz.
///
/// # Errors
/// [`HalError::Configuration`] when `rate` is not a positive finite number
/// or is so low that one period exceeds [`MAX_PERIOD`].
pub fn period_for_rate(what: &str, rate: f64) -> HalResult<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(HalError::Configuration(format!(
            "{what} must be positive, got {rate}"
        )));
    }
    match Duration::try_from_secs_f64(1.0 / rate) {
        Ok(period) if period <= MAX_PERIOD => Ok(period),
        _ => Err(HalError::Configuration(format!(
            "{what} of {rate} is too low; the slowest allowed is one frame per {}s",
            MAX_PERIOD.as_secs()
        ))),
    }
}

/// Raised once when a capture thread is asked to stop.
///
/// Sources that wait between frames wait on this instead of sleeping, so a
/// stop request never has to sit out a long frame period.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// A signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    pub fn trigger(&self) {
        let (stopped, wake) = &*self.inner;
        *stopped.lock() = true;
        wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until `deadline` or until the signal is raised.
    ///
    /// Returns true if the signal was raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (stopped, wake) = &*self.inner;
        let mut guard = stopped.lock();
        while !*guard {
            if wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        *guard
    }
}

/// Fixed-rate schedule for a source emitting one frame per period.
///
/// The first frame is due immediately. A late frame pushes the schedule back
/// rather than triggering a burst of catch-up frames.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    /// Schedule for `rate` Hz; `what` names the setting in errors.
    ///
    /// # Errors
    /// Same as [`period_for_rate`].
    pub fn from_rate(what: &str, rate: f64) -> HalResult<Self> {
        Ok(Self {
            period: period_for_rate(what, rate)?,
            next_due: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next slot. Returns false if `stop` was raised first.
    pub fn wait(&mut self, stop: &StopSignal) -> bool {
        let now = Instant::now();
        if let Some(due) = self.next_due.filter(|&due| due > now) {
            if stop.wait_until(due) {
                return false;
            }
        }
        let start = self.next_due.map_or(now, |due| due.max(now));
        self.next_due = start.checked_add(self.period);
        !stop.is_triggered()
    }
}

/// A source of frames read by an acquisition thread.
pub trait FrameSource: Send + 'static {
    /// Frame type handed to consumers.
    type Frame: Send + 'static;

    /// Acquire the next frame. `Ok(None)` means the source is exhausted.
    ///
    /// Called without any buffer lock held; may block on I/O. Sources that
    /// wait between frames must wait on `stop` and return promptly once it
    /// is raised; whatever they return then is discarded.
    fn next_frame(&mut self, stop: &StopSignal) -> HalResult<Option<Self::Frame>>;

    /// Restart from the first frame. Only called in loop mode.
    fn rewind(&mut self) -> HalResult<()> {
        Err(HalError::Configuration(
            "source does not support looping".to_string(),
        ))
    }
}

/// Options for [`CaptureThread::spawn`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Thread name, used in logs
    pub name: String,
    /// Buffer capacity in frames
    pub buffer_size: usize,
    /// Restart the source when it is exhausted
    pub looping: bool,
}

impl CaptureOptions {
    /// Options with the given thread name, a 35-frame buffer and looping off.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer_size: 35,
            looping: false,
        }
    }

    /// Set the buffer capacity.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Enable or disable loop playback.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// A running producer thread plus the buffer it fills.
pub struct CaptureThread<T: Send + 'static> {
    name: String,
    buffer: Arc<CaptureBuffer<T>>,
    stop: StopSignal,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> CaptureThread<T> {
    /// Start acquiring from `source` on a dedicated thread.
    ///
    /// # Errors
    /// Returns [`HalError::Configuration`] for a zero buffer size and
    /// [`HalError::Io`] if the OS refuses to spawn the thread.
    pub fn spawn<S>(source: S, options: CaptureOptions) -> HalResult<Self>
    where
        S: FrameSource<Frame = T>,
    {
        let buffer = Arc::new(CaptureBuffer::new(options.buffer_size)?);
        let producer_buffer = Arc::clone(&buffer);
        let stop = StopSignal::new();
        let producer_stop = stop.clone();
        let name = options.name.clone();
        let looping = options.looping;

        let handle = thread::Builder::new()
            .name(options.name.clone())
            .spawn(move || run_producer(source, &producer_buffer, &producer_stop, looping, &name))?;

        info!(
            thread = %options.name,
            buffer_size = options.buffer_size,
            looping = options.looping,
            "Started capture thread"
        );

        Ok(Self {
            name: options.name,
            buffer,
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Block until the next frame is available.
    ///
    /// # Errors
    /// [`HalError::StreamClosed`] after [`stop`](Self::stop);
    /// [`HalError::EndOfStream`] once a non-looping source is drained.
    pub fn capture(&self) -> HalResult<T> {
        self.buffer.pop()
    }

    /// Return a queued frame if there is one, without blocking.
    ///
    /// # Errors
    /// Same terminal errors as [`capture`](Self::capture).
    pub fn try_capture(&self) -> HalResult<Option<T>> {
        self.buffer.try_pop()
    }

    /// Wait at most `timeout` for a frame.
    ///
    /// # Errors
    /// Same terminal errors as [`capture`](Self::capture).
    pub fn capture_timeout(&self, timeout: Duration) -> HalResult<Option<T>> {
        self.buffer.pop_timeout(timeout)
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Arc<CaptureBuffer<T>> {
        &self.buffer
    }

    /// True while the producer thread has not been joined.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Raise the stop signal, close the buffer and join the producer.
    /// Idempotent.
    pub fn stop(&self) {
        self.stop.trigger();
        self.buffer.close();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!(thread = %self.name, "Capture thread panicked");
            } else {
                debug!(thread = %self.name, "Capture thread joined");
            }
        }
    }
}

impl<T: Send + 'static> Drop for CaptureThread<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ends the stream however the producer exits, including by panic, so
/// consumers see `EndOfStream` instead of waiting forever.
struct FinishOnExit<'a, T> {
    buffer: &'a CaptureBuffer<T>,
    name: &'a str,
}

impl<T> Drop for FinishOnExit<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(thread = %self.name, "Frame source panicked, ending stream");
        }
        self.buffer.finish();
    }
}

fn run_producer<S: FrameSource>(
    mut source: S,
    buffer: &CaptureBuffer<S::Frame>,
    stop: &StopSignal,
    looping: bool,
    name: &str,
) {
    let _finish = FinishOnExit { buffer, name };
    let mut produced_this_pass = 0usize;
    let mut total = 0u64;

    while !stop.is_triggered() && !buffer.is_closed() {
        match source.next_frame(stop) {
            _ if stop.is_triggered() => break,
            Ok(Some(frame)) => {
                if buffer.push(frame).is_err() {
                    break;
                }
                produced_this_pass += 1;
                total += 1;
            }
            Ok(None) if looping && produced_this_pass > 0 => {
                if let Err(e) = source.rewind() {
                    warn!(thread = %name, error = %e, "Rewind failed, ending stream");
                    break;
                }
                debug!(thread = %name, frames = produced_this_pass, "Source exhausted, looping");
                produced_this_pass = 0;
            }
            Ok(None) => {
                debug!(thread = %name, frames = total, "Source exhausted, end of stream");
                break;
            }
            Err(e) => {
                warn!(thread = %name, error = %e, "Acquisition failed, ending stream");
                break;
            }
        }
    }

    debug!(thread = %name, frames = total, "Capture thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        next: usize,
        len: usize,
        produced: Arc<AtomicUsize>,
    }

    impl Counting {
        fn new(len: usize) -> (Self, Arc<AtomicUsize>) {
            let produced = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    next: 0,
                    len,
                    produced: Arc::clone(&produced),
                },
                produced,
            )
        }
    }

    impl FrameSource for Counting {
        type Frame = usize;

        fn next_frame(&mut self, _stop: &StopSignal) -> HalResult<Option<usize>> {
            if self.next == self.len {
                return Ok(None);
            }
            self.next += 1;
            self.produced.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.next - 1))
        }

        fn rewind(&mut self) -> HalResult<()> {
            self.next = 0;
            Ok(())
        }
    }

    #[test]
    fn non_looping_source_ends_stream() {
        let (source, _) = Counting::new(5);
        let capture = CaptureThread::spawn(source, CaptureOptions::new("count").with_buffer_size(2)).unwrap();
        let frames: Vec<_> = (0..5).map(|_| capture.capture().unwrap()).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4]);
        assert!(matches!(capture.capture(), Err(HalError::EndOfStream)));
    }

    #[test]
    fn looping_source_repeats() {
        let (source, _) = Counting::new(3);
        let capture = CaptureThread::spawn(
            source,
            CaptureOptions::new("loop").with_buffer_size(2).with_looping(true),
        )
        .unwrap();
        let frames: Vec<_> = (0..8).map(|_| capture.capture().unwrap()).collect();
        assert_eq!(frames, vec![0, 1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn empty_looping_source_does_not_spin() {
        let (source, _) = Counting::new(0);
        let capture = CaptureThread::spawn(source, CaptureOptions::new("empty").with_looping(true)).unwrap();
        assert!(matches!(capture.capture(), Err(HalError::EndOfStream)));
    }

    #[test]
    fn stop_joins_and_closes() {
        let (source, _) = Counting::new(1000);
        let capture = CaptureThread::spawn(source, CaptureOptions::new("stop").with_buffer_size(4)).unwrap();
        assert_eq!(capture.capture().unwrap(), 0);
        capture.stop();
        assert!(!capture.is_running());
        assert!(matches!(capture.capture(), Err(HalError::StreamClosed)));
        capture.stop();
    }

    #[test]
    fn backpressure_limits_production() {
        let (source, produced) = Counting::new(1000);
        let capture = CaptureThread::spawn(source, CaptureOptions::new("bp").with_buffer_size(3)).unwrap();
        thread::sleep(Duration::from_millis(50));
        // Three frames queued plus at most one acquired and blocked in push.
        assert!(produced.load(Ordering::SeqCst) <= 4);
        assert_eq!(capture.buffer().len(), 3);
    }

    /// Emits frame 0, then panics.
    struct Fragile {
        sent: bool,
    }

    impl FrameSource for Fragile {
        type Frame = u32;

        fn next_frame(&mut self, _stop: &StopSignal) -> HalResult<Option<u32>> {
            if self.sent {
                panic!("sensor went away");
            }
            self.sent = true;
            Ok(Some(0))
        }
    }

    #[test]
    fn panicking_source_ends_stream() {
        let capture = CaptureThread::spawn(Fragile { sent: false }, CaptureOptions::new("fragile")).unwrap();
        assert_eq!(capture.capture().unwrap(), 0);
        assert!(matches!(capture.capture(), Err(HalError::EndOfStream)));
        capture.stop();
        assert!(!capture.is_running());
    }

    /// Emits a frame every four seconds.
    struct Slow {
        pacer: Pacer,
    }

    impl FrameSource for Slow {
        type Frame = u8;

        fn next_frame(&mut self, stop: &StopSignal) -> HalResult<Option<u8>> {
            if !self.pacer.wait(stop) {
                return Ok(None);
            }
            Ok(Some(7))
        }
    }

    #[test]
    fn stop_interrupts_paced_wait() {
        let source = Slow {
            pacer: Pacer::from_rate("rate", 0.25).unwrap(),
        };
        let capture = CaptureThread::spawn(source, CaptureOptions::new("slow")).unwrap();
        assert_eq!(capture.capture().unwrap(), 7);

        // The producer is now waiting out a four second period.
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        drop(capture);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn pacer_spaces_frames() {
        let stop = StopSignal::new();
        let mut pacer = Pacer::from_rate("rate", 100.0).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            assert!(pacer.wait(&stop));
        }
        assert!(start.elapsed() >= Duration::from_millis(30));

        stop.trigger();
        assert!(!pacer.wait(&stop));
    }

    #[test]
    fn period_rejects_unusable_rates() {
        assert_eq!(period_for_rate("fps", 4.0).unwrap(), Duration::from_millis(250));
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-300, 1e-6] {
            assert!(
                matches!(period_for_rate("fps", rate), Err(HalError::Configuration(_))),
                "rate {rate} accepted"
            );
        }
        assert_eq!(period_for_rate("fps", 0.0625).unwrap(), Duration::from_secs(16));
    }
}
