//! Synthetic frame source.
//!
//! Generates frames in-process for `stub://` URIs, so the full pipeline can
//! run and be tested without camera hardware or video files. The synthetic
//! stream simulates:
//! - a slowly changing scene (a bright block that relocates periodically),
//! - optional per-frame sensor noise,
//! - a finite stream in video mode (`stream_len` frames, then end-of-stream
//!   until `reset` rewinds it).

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{FrameRead, FrameSource, SourceMode, SourceProperties};
use crate::frame::FrameHandle;

/// How many frames the simulated scene stays put before the block moves.
const SCENE_HOLD_FRAMES: u64 = 50;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URI; only `stub://` schemes are accepted here.
    pub uri: String,
    pub mode: SourceMode,
    /// Native frame rate reported through `properties()`.
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
    /// Frames per playthrough in video mode. 0 = endless.
    pub stream_len: u64,
    /// Peak amplitude of per-frame sensor noise. 0 disables noise, which
    /// keeps frame content deterministic for tests.
    pub noise: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            mode: SourceMode::Live,
            framerate: 30,
            width: 640,
            height: 480,
            stream_len: 0,
            noise: 4,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// Synthetic camera/video source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    started: bool,
    next_frame_id: u64,
    /// Position within the current playthrough; rewound by `reset`.
    cursor: u64,
    captured_total: u64,
    outstanding: Option<u64>,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.uri.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source only supports stub:// URIs, got {}",
                config.uri
            ));
        }
        if config.framerate == 0 {
            return Err(anyhow!("framerate must be >= 1"));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("frame dimensions must be nonzero"));
        }
        Ok(Self {
            config,
            started: false,
            next_frame_id: 0,
            cursor: 0,
            captured_total: 0,
            outstanding: None,
            scene_state: 0,
        })
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.captured_total,
            uri: self.config.uri.clone(),
        }
    }

    /// Simulated scene: a flat background with one bright block whose
    /// position follows the scene state.
    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.cursor % SCENE_HOLD_FRAMES == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let w = self.config.width as usize;
        let h = self.config.height as usize;

        let jitter: u8 = if self.config.noise > 0 {
            rand::thread_rng().gen_range(0..=self.config.noise)
        } else {
            0
        };

        // Block occupies a quarter of the frame, cycling through positions.
        let block_w = w / 2;
        let block_h = h / 2;
        let block_x = if self.scene_state % 2 == 0 { 0 } else { w - block_w };
        let block_y = if (self.scene_state / 2) % 2 == 0 {
            0
        } else {
            h - block_h
        };

        let mut pixels = vec![0u8; w * h * 4];
        for y in 0..h {
            for x in 0..w {
                let in_block = x >= block_x
                    && x < block_x + block_w
                    && y >= block_y
                    && y < block_y + block_h;
                let base: u8 = if in_block { 200 } else { 40 };
                let idx = (y * w + x) * 4;
                pixels[idx] = base.wrapping_add(jitter);
                pixels[idx + 1] = base;
                pixels[idx + 2] = base / 2;
                pixels[idx + 3] = 255;
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        log::info!(
            "SyntheticSource: started {} ({:?}, {} fps)",
            self.config.uri,
            self.config.mode,
            self.config.framerate
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        log::info!(
            "SyntheticSource: stopped {} after {} frames",
            self.config.uri,
            self.captured_total
        );
    }

    fn acquire(&mut self) -> Result<FrameRead> {
        if !self.started {
            return Err(anyhow!("source not started"));
        }
        if self.outstanding.is_some() {
            return Err(anyhow!("previous frame has not been released"));
        }
        if self.config.mode == SourceMode::Video
            && self.config.stream_len > 0
            && self.cursor >= self.config.stream_len
        {
            return Ok(FrameRead::EndOfStream);
        }

        let pixels = self.generate_pixels();
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.cursor += 1;
        self.captured_total += 1;
        self.outstanding = Some(id);

        Ok(FrameRead::Frame(FrameHandle::new(
            id,
            self.config.width,
            self.config.height,
            pixels,
        )))
    }

    fn release(&mut self, frame: FrameHandle) {
        match self.outstanding {
            Some(id) if id == frame.id() => self.outstanding = None,
            Some(id) => log::error!(
                "released frame {} while frame {} was outstanding",
                frame.id(),
                id
            ),
            None => log::error!("released frame {} with none outstanding", frame.id()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        log::info!("SyntheticSource: rewound {}", self.config.uri);
        Ok(())
    }

    fn properties(&self) -> SourceProperties {
        SourceProperties {
            framerate: self.config.framerate as f32,
            width: self.config.width,
            height: self.config.height,
            mode: self.config.mode,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
