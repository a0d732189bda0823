//! Detection and tracking inference stage.
//!
//! The stage contract is a two-phase submit/harvest protocol:
//! - `submit_detect` / `submit_track` queue work against a processing
//!   buffer and return immediately. At most one batch may be in flight;
//!   a second submission before `harvest` is a contract error.
//! - `harvest` is the single synchronization point. It completes the
//!   in-flight batch and replaces the per-class results wholesale.
//!
//! Nothing may touch the shared buffer between submit and harvest; the
//! pipeline loop upholds that by keeping submissions and harvest adjacent
//! within one iteration.
//!
//! `StubInference` is an in-process stand-in for a GPU-backed network. It
//! finds luma-band regions, flags scene motion via a content digest, and
//! keeps track ids stable across frames with a greedy nearest-center match.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::frame::ProcessingBuffer;

/// Object classes reported by the stub stage.
pub const CLASS_NAMES: [&str; 4] = ["vehicle", "pedestrian", "cyclist", "traffic_sign"];

/// Normalized luma band width per class.
const CLASS_BAND: u32 = 36;
/// Luma floor of the first class band.
const CLASS_BAND_FLOOR: u32 = 80;
/// Maximum normalized center distance for reusing a track id.
const TRACK_ASSOC_RADIUS: f32 = 0.25;
/// Confidence bump applied when the scene changed since the last harvest.
const MOTION_CONFIDENCE_BONUS: f32 = 0.1;

/// One detected or tracked region, in normalized 0..=1 coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    /// Stable identity across frames; present when tracking ran.
    pub track_id: Option<u32>,
}

impl Region {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Per-class regions from one harvest. Replaced wholesale every harvest.
#[derive(Clone, Debug, Default)]
pub struct ClassResult {
    pub regions: Vec<Region>,
}

/// Asynchronous detect/track stage.
pub trait InferenceStage {
    /// Queue detection against the buffer. Non-blocking.
    fn submit_detect(&mut self, image: &ProcessingBuffer) -> Result<()>;

    /// Queue tracking against the buffer. Non-blocking.
    fn submit_track(&mut self, image: &ProcessingBuffer) -> Result<()>;

    /// Block until the in-flight batch completes and expose its results.
    /// With nothing submitted, yields empty results.
    fn harvest(&mut self) -> Result<()>;

    fn class_count(&self) -> usize;

    /// Results for one class from the latest harvest.
    /// `class_index` must be below `class_count`.
    fn class_result(&self, class_index: usize) -> &ClassResult;

    /// Drop detector and tracker state, e.g. after a stream restart.
    fn reset(&mut self);
}

// ----------------------------------------------------------------------------
// StubInference
// ----------------------------------------------------------------------------

struct DetectBatch {
    digest: [u8; 32],
    /// (class index, geometry-only region) candidates.
    candidates: Vec<(usize, Region)>,
}

struct TrackPoint {
    class: usize,
    id: u32,
    cx: f32,
    cy: f32,
}

/// In-process detect/track stand-in.
pub struct StubInference {
    detect_pending: Option<DetectBatch>,
    track_pending: bool,
    last_digest: Option<[u8; 32]>,
    results: Vec<ClassResult>,
    prev_tracks: Vec<TrackPoint>,
    next_track_id: u32,
    motion_frames: u64,
}

impl StubInference {
    pub fn new() -> Self {
        Self {
            detect_pending: None,
            track_pending: false,
            last_digest: None,
            results: vec![ClassResult::default(); CLASS_NAMES.len()],
            prev_tracks: Vec::new(),
            next_track_id: 0,
            motion_frames: 0,
        }
    }

    /// Frames whose content digest differed from the previous harvest.
    pub fn motion_frames(&self) -> u64 {
        self.motion_frames
    }

    fn sample_step(width: u32, height: u32) -> usize {
        (width.max(height) / 64).max(1) as usize
    }

    fn digest_plane(image: &ProcessingBuffer) -> [u8; 32] {
        let step = Self::sample_step(image.width(), image.height());
        let mut hasher = Sha256::new();
        for byte in image.plane().iter().step_by(step) {
            hasher.update([*byte]);
        }
        hasher.finalize().into()
    }

    /// Find the bounding box of sampled pixels within each class luma band.
    fn find_candidates(image: &ProcessingBuffer) -> Vec<(usize, Region)> {
        let w = image.width() as usize;
        let h = image.height() as usize;
        let step = Self::sample_step(image.width(), image.height());
        let plane = image.plane();

        let mut candidates = Vec::new();
        for (class, _) in CLASS_NAMES.iter().enumerate() {
            let lo = (CLASS_BAND_FLOOR + CLASS_BAND * class as u32) as u8;
            let hi = lo.saturating_add(CLASS_BAND as u8);

            let mut sampled = 0u32;
            let mut hits = 0u32;
            let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
            let (mut max_x, mut max_y) = (0usize, 0usize);

            for y in (0..h).step_by(step) {
                for x in (0..w).step_by(step) {
                    sampled += 1;
                    let luma = plane[y * w + x];
                    if luma >= lo && luma < hi {
                        hits += 1;
                        min_x = min_x.min(x);
                        min_y = min_y.min(y);
                        max_x = max_x.max(x);
                        max_y = max_y.max(y);
                    }
                }
            }

            // Ignore empty bands and full-frame floods.
            if hits == 0 || sampled == 0 || hits == sampled {
                continue;
            }

            let confidence = (hits as f32 / sampled as f32).clamp(0.05, 0.99);
            candidates.push((
                class,
                Region {
                    x: min_x as f32 / w as f32,
                    y: min_y as f32 / h as f32,
                    w: (max_x - min_x + 1) as f32 / w as f32,
                    h: (max_y - min_y + 1) as f32 / h as f32,
                    confidence,
                    track_id: None,
                },
            ));
        }
        candidates
    }

    /// Reuse the id of the nearest previous track of the same class, or
    /// allocate a fresh one.
    fn assign_track_id(&mut self, class: usize, cx: f32, cy: f32) -> u32 {
        let mut best: Option<(f32, u32)> = None;
        for track in self.prev_tracks.iter().filter(|t| t.class == class) {
            let dist = ((track.cx - cx).powi(2) + (track.cy - cy).powi(2)).sqrt();
            if dist <= TRACK_ASSOC_RADIUS && best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, track.id));
            }
        }
        match best {
            Some((_, id)) => id,
            None => {
                let id = self.next_track_id;
                self.next_track_id += 1;
                id
            }
        }
    }
}

impl Default for StubInference {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceStage for StubInference {
    fn submit_detect(&mut self, image: &ProcessingBuffer) -> Result<()> {
        if self.detect_pending.is_some() {
            return Err(anyhow!("detection batch already in flight"));
        }
        // The "submission" captures everything it needs; the buffer is not
        // referenced again until the results are harvested.
        self.detect_pending = Some(DetectBatch {
            digest: Self::digest_plane(image),
            candidates: Self::find_candidates(image),
        });
        Ok(())
    }

    fn submit_track(&mut self, _image: &ProcessingBuffer) -> Result<()> {
        if self.track_pending {
            return Err(anyhow!("tracking batch already in flight"));
        }
        self.track_pending = true;
        Ok(())
    }

    fn harvest(&mut self) -> Result<()> {
        let Some(batch) = self.detect_pending.take() else {
            self.track_pending = false;
            for result in &mut self.results {
                result.regions.clear();
            }
            return Ok(());
        };

        let motion = self.last_digest.is_some_and(|prev| prev != batch.digest);
        if motion {
            self.motion_frames += 1;
        }
        self.last_digest = Some(batch.digest);

        let run_tracker = self.track_pending;
        self.track_pending = false;

        let mut fresh: Vec<ClassResult> = vec![ClassResult::default(); CLASS_NAMES.len()];
        let mut new_tracks = Vec::new();
        for (class, mut region) in batch.candidates {
            if motion {
                region.confidence = (region.confidence + MOTION_CONFIDENCE_BONUS).min(0.99);
            }
            if run_tracker {
                let (cx, cy) = region.center();
                let id = self.assign_track_id(class, cx, cy);
                region.track_id = Some(id);
                new_tracks.push(TrackPoint { class, id, cx, cy });
            }
            fresh[class].regions.push(region);
        }

        self.prev_tracks = new_tracks;
        self.results = fresh;
        Ok(())
    }

    fn class_count(&self) -> usize {
        CLASS_NAMES.len()
    }

    fn class_result(&self, class_index: usize) -> &ClassResult {
        &self.results[class_index]
    }

    fn reset(&mut self) {
        self.detect_pending = None;
        self.track_pending = false;
        self.last_digest = None;
        self.prev_tracks.clear();
        for result in &mut self.results {
            result.regions.clear();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
