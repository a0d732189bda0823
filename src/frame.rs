//! Per-frame image resources.
//!
//! Every camera frame yields two views of the same pixels:
//! - `ProcessingBuffer`: a single-plane compute view consumed by inference.
//! - `DisplayBuffer`: an RGBA view consumed by rendering and publishing.
//!
//! Both views are derived from a `FrameHandle` by an `ImageExtractor` and
//! are only valid while that handle is alive. The `FrameImages` guard owns
//! the pair for the duration of one loop iteration and returns it to the
//! extractor on drop, so no exit path can leak or double-release a view.

use anyhow::{anyhow, Result};

// ----------------------------------------------------------------------------
// FrameHandle: opaque sensor-owned frame
// ----------------------------------------------------------------------------

/// Opaque handle to one captured frame.
///
/// Handles are created by frame sources and owned by exactly one consumer at
/// a time. They are not `Clone`: returning a handle to its source is a move,
/// which makes use-after-release unrepresentable.
pub struct FrameHandle {
    id: u64,
    width: u32,
    height: u32,
    /// Private RGBA8 payload. Consumers go through the extractor views.
    pixels: Vec<u8>,
}

impl FrameHandle {
    /// Create a new frame handle. Called by frame sources.
    pub fn new(id: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            pixels,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Internal: raw pixel access for in-crate extractors.
    pub(crate) fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

// ----------------------------------------------------------------------------
// Buffer views
// ----------------------------------------------------------------------------

/// Compute-oriented single-plane (luma) view of a frame.
pub struct ProcessingBuffer {
    frame_id: u64,
    width: u32,
    height: u32,
    plane: Vec<u8>,
}

impl ProcessingBuffer {
    /// Create a processing view. Called by image extractors.
    pub fn new(frame_id: u64, width: u32, height: u32, plane: Vec<u8>) -> Self {
        Self {
            frame_id,
            width,
            height,
            plane,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read-only plane data for inference stages.
    pub fn plane(&self) -> &[u8] {
        &self.plane
    }
}

/// Render-oriented RGBA8 view of a frame.
pub struct DisplayBuffer {
    frame_id: u64,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl DisplayBuffer {
    /// Create a display view. Called by image extractors.
    pub fn new(frame_id: u64, width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            frame_id,
            width,
            height,
            rgba,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read-only RGBA data, used by renderers and CPU-mapped publishing.
    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }
}

/// The two views of one frame, moved as a unit between extractor and loop.
pub struct ImagePair {
    pub processing: ProcessingBuffer,
    pub display: DisplayBuffer,
}

// ----------------------------------------------------------------------------
// ImageExtractor: derives and reclaims the per-frame views
// ----------------------------------------------------------------------------

/// Derives the processing/display views from a frame and reclaims them.
///
/// Extraction failure means the frame data path itself is broken and is
/// treated as fatal by the pipeline loop. `release` must be called exactly
/// once per successful `extract`; the `FrameImages` guard enforces this.
pub trait ImageExtractor {
    fn extract(&mut self, frame: &FrameHandle) -> Result<ImagePair>;
    fn release(&mut self, images: ImagePair);
}

/// Scoped ownership of one frame's image pair.
///
/// Holds the extractor mutably for its lifetime and releases the pair on
/// drop, covering normal completion, early-continue, and error paths alike.
pub struct FrameImages<'a> {
    extractor: &'a mut dyn ImageExtractor,
    images: Option<ImagePair>,
}

impl<'a> FrameImages<'a> {
    pub fn acquire(extractor: &'a mut dyn ImageExtractor, frame: &FrameHandle) -> Result<Self> {
        let images = extractor.extract(frame)?;
        Ok(Self {
            extractor,
            images: Some(images),
        })
    }

    pub fn processing(&self) -> &ProcessingBuffer {
        &self
            .images
            .as_ref()
            .expect("image pair already released")
            .processing
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self
            .images
            .as_ref()
            .expect("image pair already released")
            .display
    }
}

impl Drop for FrameImages<'_> {
    fn drop(&mut self) {
        if let Some(images) = self.images.take() {
            self.extractor.release(images);
        }
    }
}

// ----------------------------------------------------------------------------
// CpuImageExtractor: software view derivation
// ----------------------------------------------------------------------------

/// Software extractor: derives a luma plane and an RGBA copy on the CPU.
///
/// Stands in for a hardware path that would hand out device-resident views.
/// Tracks outstanding pairs so an unbalanced release shows up immediately.
pub struct CpuImageExtractor {
    outstanding: u64,
    extracted_total: u64,
}

impl CpuImageExtractor {
    pub fn new() -> Self {
        Self {
            outstanding: 0,
            extracted_total: 0,
        }
    }

    /// Image pairs currently held by the loop. Zero between iterations.
    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    pub fn extracted_total(&self) -> u64 {
        self.extracted_total
    }
}

impl Default for CpuImageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageExtractor for CpuImageExtractor {
    fn extract(&mut self, frame: &FrameHandle) -> Result<ImagePair> {
        if self.outstanding > 0 {
            return Err(anyhow!(
                "image pair for a previous frame was never released"
            ));
        }

        let rgba = frame.pixels();
        let expected = frame.width() as usize * frame.height() as usize * 4;
        if rgba.len() != expected {
            return Err(anyhow!(
                "frame {} payload is {} bytes, expected {}",
                frame.id(),
                rgba.len(),
                expected
            ));
        }

        // BT.601 integer luma approximation.
        let mut plane = Vec::with_capacity(rgba.len() / 4);
        for px in rgba.chunks_exact(4) {
            let luma = (77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8;
            plane.push(luma as u8);
        }

        self.outstanding += 1;
        self.extracted_total += 1;

        Ok(ImagePair {
            processing: ProcessingBuffer::new(frame.id(), frame.width(), frame.height(), plane),
            display: DisplayBuffer::new(frame.id(), frame.width(), frame.height(), rgba.to_vec()),
        })
    }

    fn release(&mut self, images: ImagePair) {
        if self.outstanding == 0 {
            log::error!(
                "release of image pair for frame {} with none outstanding",
                images.processing.frame_id()
            );
            return;
        }
        self.outstanding -= 1;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
