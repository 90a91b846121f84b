//! Frame hand-off between acquisition threads and consumers.
pub mod acquisition;
pub mod capture_buffer;

pub use acquisition::{period_for_rate, CaptureOptions, CaptureThread, FrameSource, Pacer, StopSignal};
pub use capture_buffer::{BufferPhase, CaptureBuffer};
