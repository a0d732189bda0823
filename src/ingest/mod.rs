//! Frame ingestion sources.
//!
//! A frame source wraps one camera sensor or recorded video stream and hands
//! out frames one at a time. The contract the pipeline loop relies on:
//! - `acquire` uses a bounded wait; a timeout is a transient failure (`Err`),
//!   not end-of-stream.
//! - End-of-stream is data, not an error: finite sources report it through
//!   `FrameRead::EndOfStream` and rewind on `reset`.
//! - Every handle returned by `acquire` is given back through `release`
//!   exactly once before the next `acquire`; the `CapturedFrame` guard
//!   enforces this on every exit path.
//!
//! The only in-tree implementation is the synthetic `stub://` source; real
//! sensor backends live behind the same trait.

use anyhow::Result;

use crate::frame::FrameHandle;

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Outcome of a successful sensor read.
pub enum FrameRead {
    Frame(FrameHandle),
    /// The finite stream is exhausted. Recoverable: `reset` rewinds it.
    EndOfStream,
}

/// Whether the source is a live sensor or recorded video.
///
/// Recorded sources are rate-limited to their native frame interval and
/// every frame is processed; live sources run unthrottled and are decimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMode {
    Live,
    Video,
}

/// Static properties of a source, read once at pipeline construction.
#[derive(Clone, Debug)]
pub struct SourceProperties {
    pub framerate: f32,
    pub width: u32,
    pub height: u32,
    pub mode: SourceMode,
}

/// One camera sensor or video stream.
pub trait FrameSource {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);

    /// Read the next frame with a bounded wait.
    ///
    /// `Err` is a transient read failure: the caller logs it and retries on
    /// the next tick with no backoff.
    fn acquire(&mut self) -> Result<FrameRead>;

    /// Return a frame to the sensor. The handle and any views derived from
    /// it are dead after this call.
    fn release(&mut self, frame: FrameHandle);

    /// Rewind after end-of-stream.
    fn reset(&mut self) -> Result<()>;

    fn properties(&self) -> SourceProperties;
}

/// Scoped ownership of one acquired frame.
///
/// Holds the source mutably for its lifetime and releases the handle on
/// drop, so decimation skips, processing errors, and normal completion all
/// balance the acquire.
pub struct CapturedFrame<'a> {
    source: &'a mut dyn FrameSource,
    handle: Option<FrameHandle>,
}

impl<'a> CapturedFrame<'a> {
    pub fn new(source: &'a mut dyn FrameSource, handle: FrameHandle) -> Self {
        Self {
            source,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> &FrameHandle {
        self.handle.as_ref().expect("frame already released")
    }
}

impl Drop for CapturedFrame<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.source.release(handle);
        }
    }
}
