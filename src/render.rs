//! Overlay rendering stage.
//!
//! The render stage is an opaque draw-call sink: the loop hands it the
//! display view as a full-frame texture, then per-class region overlays and
//! the static detection regions, and finally asks it to present. Box colors
//! come from a fixed palette indexed by class, so a class keeps its color
//! for the lifetime of the process.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::DisplayBuffer;
use crate::infer::ClassResult;

/// RGBA color with components in 0..=1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

/// Per-class box colors; a class index selects `BOX_PALETTE[class % len]`.
pub const BOX_PALETTE: [Color; 8] = [
    Color::rgb(1.0, 0.0, 0.0),
    Color::rgb(0.0, 1.0, 0.0),
    Color::rgb(0.0, 0.0, 1.0),
    Color::rgb(1.0, 1.0, 0.0),
    Color::rgb(1.0, 0.0, 1.0),
    Color::rgb(0.0, 1.0, 1.0),
    Color::rgb(1.0, 0.5, 0.0),
    Color::rgb(1.0, 1.0, 1.0),
];

/// Fixed colors for the two static detection regions.
pub const ROI_PRIMARY_COLOR: Color = Color::rgb(0.6, 0.8, 1.0);
pub const ROI_SECONDARY_COLOR: Color = Color::rgb(1.0, 1.0, 0.0);

/// Static pixel-space rectangle, fixed for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Opaque draw-call sink for one window or output surface.
pub trait RenderStage {
    /// Draw the display view as the frame background.
    fn draw_full_frame(&mut self, image: &DisplayBuffer) -> Result<()>;

    /// Draw one class's regions in the given color.
    fn draw_regions(&mut self, result: &ClassResult, color: Color) -> Result<()>;

    /// Draw a static region outline.
    fn draw_static_region(&mut self, roi: &RegionOfInterest, color: Color) -> Result<()>;

    /// Swap the rendered frame to the output.
    fn present(&mut self) -> Result<()>;

    /// True once the window asked to close; checked once per loop tick.
    fn should_close(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------
// HeadlessRenderer
// ----------------------------------------------------------------------------

/// Renderer without an output surface: counts draw calls and logs them.
///
/// Used by the daemon when no display is attached and by bounded demo runs.
pub struct HeadlessRenderer {
    frames_presented: u64,
    regions_drawn: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self {
            frames_presented: 0,
            regions_drawn: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn regions_drawn(&self) -> u64 {
        self.regions_drawn
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStage for HeadlessRenderer {
    fn draw_full_frame(&mut self, image: &DisplayBuffer) -> Result<()> {
        log::debug!(
            "draw frame {} ({}x{})",
            image.frame_id(),
            image.width(),
            image.height()
        );
        Ok(())
    }

    fn draw_regions(&mut self, result: &ClassResult, _color: Color) -> Result<()> {
        self.regions_drawn += result.regions.len() as u64;
        for region in &result.regions {
            log::debug!(
                "draw box x={:.3} y={:.3} w={:.3} h={:.3} conf={:.2} track={:?}",
                region.x,
                region.y,
                region.w,
                region.h,
                region.confidence,
                region.track_id
            );
        }
        Ok(())
    }

    fn draw_static_region(&mut self, roi: &RegionOfInterest, _color: Color) -> Result<()> {
        log::debug!(
            "draw roi {}x{} at ({}, {})",
            roi.width,
            roi.height,
            roi.x,
            roi.y
        );
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frames_presented += 1;
        Ok(())
    }
}
