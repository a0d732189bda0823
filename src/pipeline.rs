//! Frame pipeline orchestration loop.
//!
//! A single thread drives the whole pipeline: acquire a frame, derive its
//! two image views, submit asynchronous detect/track work, harvest the
//! results, draw the overlays, optionally republish the raw pixels, and
//! return every per-frame resource before the next acquisition.
//!
//! Failure policy, per kind:
//! - end-of-stream: rewind the source, reset inference state, keep looping
//!   (supports looping playback of recorded video);
//! - transient read failure: log and retry next tick, no backoff;
//! - image extraction failure: fatal, the loop stops and the sensor is
//!   stopped exactly once;
//! - publish mapping/forward failure: log and skip that frame's publish.
//!
//! Recorded sources are throttled to their native frame interval and every
//! frame is processed; live sources run unthrottled and every second frame
//! is processed to halve inference load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::frame::{FrameImages, ImageExtractor};
use crate::infer::InferenceStage;
use crate::ingest::{CapturedFrame, FrameRead, FrameSource, SourceMode};
use crate::publish::PublishSink;
use crate::render::{
    RegionOfInterest, RenderStage, BOX_PALETTE, ROI_PRIMARY_COLOR, ROI_SECONDARY_COLOR,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Shutdown flag
// ----------------------------------------------------------------------------

/// Process-wide stop request, checked once per tick.
///
/// Cancellation is cooperative: an iteration that is already processing a
/// frame runs to completion (including resource release) before the flag is
/// honored.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Frame clock
// ----------------------------------------------------------------------------

/// Rate limiter for recorded sources.
///
/// `ready` returns true when at least one target interval has elapsed since
/// it last fired, and records the new firing time. A zero interval is always
/// ready.
pub struct FrameClock {
    interval: Duration,
    last_update: Option<Instant>,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_update: None,
        }
    }

    pub fn for_framerate(framerate: f32) -> Self {
        let millis = if framerate > 0.0 {
            (1000.0 / framerate) as u64
        } else {
            0
        };
        Self::new(Duration::from_millis(millis))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        if let Some(prev) = self.last_update {
            if now.duration_since(prev) < self.interval {
                return false;
            }
        }
        self.last_update = Some(now);
        true
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// All collaborators the loop drives, owned explicitly so the loop can be
/// exercised with any implementations of the stage contracts.
pub struct PipelineContext {
    pub source: Box<dyn FrameSource>,
    pub extractor: Box<dyn ImageExtractor>,
    pub inference: Box<dyn InferenceStage>,
    pub render: Box<dyn RenderStage>,
    pub publish: Option<Box<dyn PublishSink>>,
    pub shutdown: ShutdownFlag,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    /// Stop after this many frames; 0 = unlimited.
    pub stop_frame: u64,
    /// The two static detection regions drawn on every processed frame.
    pub rois: [RegionOfInterest; 2],
}

/// Why the loop terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    ShutdownRequested,
    WindowClosed,
    FrameLimitReached,
    ImageExtractionFailed,
}

/// Outcome of one loop tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickStatus {
    /// Recorded-source rate limit: no frame was requested.
    Throttled,
    /// Transient read failure; the next tick retries immediately.
    ReadFailed,
    /// End-of-stream: source rewound and inference state reset.
    StreamRestarted,
    /// A frame was acquired and released; `processed` is false for frames
    /// skipped by live-feed decimation.
    FrameComplete { processed: bool },
    Stop(StopReason),
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub frames_published: u64,
    pub stop_reason: StopReason,
}

pub struct Pipeline {
    ctx: PipelineContext,
    options: PipelineOptions,
    mode: SourceMode,
    clock: FrameClock,
    frames_seen: u64,
    frames_processed: u64,
    frames_published: u64,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, options: PipelineOptions) -> Self {
        let props = ctx.source.properties();
        Self {
            options,
            mode: props.mode,
            clock: FrameClock::for_framerate(props.framerate),
            ctx,
            frames_seen: 0,
            frames_processed: 0,
            frames_published: 0,
        }
    }

    /// Frames acquired and released, whether or not they were processed.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    /// Run ticks until a stop condition, then stop the sensor.
    pub fn run(&mut self) -> Result<PipelineStats> {
        self.ctx.source.start()?;
        let props = self.ctx.source.properties();
        log::info!(
            "pipeline running: {:?} {}x{} @ {} fps, stop_frame={}",
            props.mode,
            props.width,
            props.height,
            props.framerate,
            self.options.stop_frame
        );

        let mut last_health = Instant::now();
        let stop_reason = loop {
            if let TickStatus::Stop(reason) = self.tick() {
                break reason;
            }
            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "pipeline: {} frames seen, {} processed, {} published",
                    self.frames_seen,
                    self.frames_processed,
                    self.frames_published
                );
                last_health = Instant::now();
            }
        };

        self.ctx.source.stop();
        let stats = PipelineStats {
            frames_seen: self.frames_seen,
            frames_processed: self.frames_processed,
            frames_published: self.frames_published,
            stop_reason,
        };
        log::info!(
            "pipeline stopped ({:?}): {} frames seen, {} processed, {} published",
            stats.stop_reason,
            stats.frames_seen,
            stats.frames_processed,
            stats.frames_published
        );
        Ok(stats)
    }

    /// Advance the loop by one tick.
    ///
    /// `run` is the normal entry point; `tick` exists so the loop can be
    /// single-stepped when embedded in an external event loop.
    pub fn tick(&mut self) -> TickStatus {
        if self.ctx.shutdown.is_stop_requested() {
            return TickStatus::Stop(StopReason::ShutdownRequested);
        }
        if self.ctx.render.should_close() {
            return TickStatus::Stop(StopReason::WindowClosed);
        }

        // Cooperative scheduling point: let other process-wide work (e.g. a
        // UI event pump) interleave.
        std::thread::yield_now();

        if self.mode == SourceMode::Video && !self.clock.ready(Instant::now()) {
            return TickStatus::Throttled;
        }

        let PipelineContext {
            source,
            extractor,
            inference,
            render,
            publish,
            ..
        } = &mut self.ctx;

        let handle = match source.acquire() {
            Ok(FrameRead::Frame(handle)) => handle,
            Ok(FrameRead::EndOfStream) => {
                log::info!("source reached end of stream; rewinding");
                if let Err(e) = source.reset() {
                    log::error!("source rewind failed: {:#}", e);
                    return TickStatus::ReadFailed;
                }
                inference.reset();
                return TickStatus::StreamRestarted;
            }
            Err(e) => {
                log::warn!("cannot read frame: {:#}", e);
                return TickStatus::ReadFailed;
            }
        };

        // Process every second frame of a live feed to bound inference
        // load; recorded video processes every frame.
        let selected = self.frames_seen % 2 == 0 || self.mode == SourceMode::Video;

        let frame = CapturedFrame::new(source.as_mut(), handle);
        let mut processed = false;
        let mut published = false;

        if selected {
            let images = match FrameImages::acquire(extractor.as_mut(), frame.handle()) {
                Ok(images) => images,
                Err(e) => {
                    log::error!("cannot obtain frame images: {:#}", e);
                    drop(frame);
                    return TickStatus::Stop(StopReason::ImageExtractionFailed);
                }
            };

            match process_frame(
                inference.as_mut(),
                render.as_mut(),
                publish.as_deref_mut(),
                &images,
                &self.options.rois,
            ) {
                Ok(did_publish) => {
                    processed = true;
                    published = did_publish;
                    // Views go back to the extractor before the swap.
                    drop(images);
                    if let Err(e) = render.present() {
                        log::warn!("present failed: {:#}", e);
                    }
                }
                Err(e) => {
                    log::warn!("frame {} dropped: {:#}", frame.handle().id(), e);
                }
            }
        }

        drop(frame);
        self.frames_seen += 1;
        if processed {
            self.frames_processed += 1;
        }
        if published {
            self.frames_published += 1;
        }

        if self.options.stop_frame != 0 && self.frames_seen == self.options.stop_frame {
            return TickStatus::Stop(StopReason::FrameLimitReached);
        }
        TickStatus::FrameComplete { processed }
    }
}

/// Run one selected frame through inference, rendering, and publishing.
///
/// Ordering within the frame: both submissions precede the harvest, the
/// harvest precedes every result read and draw call, and the caller releases
/// the image views only after this returns. Publishing happens here, while
/// the display view is still live, and is best-effort: its failures are
/// logged and only skip the publish.
fn process_frame(
    inference: &mut dyn InferenceStage,
    render: &mut dyn RenderStage,
    publish: Option<&mut (dyn PublishSink + 'static)>,
    images: &FrameImages<'_>,
    rois: &[RegionOfInterest; 2],
) -> Result<bool> {
    inference.submit_detect(images.processing())?;
    inference.submit_track(images.processing())?;
    inference.harvest()?;

    render.draw_full_frame(images.display())?;
    for class in 0..inference.class_count() {
        let color = BOX_PALETTE[class % BOX_PALETTE.len()];
        render.draw_regions(inference.class_result(class), color)?;
    }
    render.draw_static_region(&rois[0], ROI_PRIMARY_COLOR)?;
    render.draw_static_region(&rois[1], ROI_SECONDARY_COLOR)?;

    let mut published = false;
    if let Some(sink) = publish {
        match sink.map_for_read(images.display()) {
            Ok(pixels) => {
                if let Err(e) = sink.forward(&pixels) {
                    log::warn!("publish forward failed: {:#}", e);
                } else {
                    published = true;
                }
                drop(pixels);
                sink.unmap(images.display());
            }
            Err(e) => {
                log::warn!("display buffer mapping failed: {:#}", e);
            }
        }
    }
    Ok(published)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_clock_enforces_interval() {
        let mut clock = FrameClock::new(Duration::from_millis(33));
        let t0 = Instant::now();

        assert!(clock.ready(t0));
        assert!(!clock.ready(t0 + Duration::from_millis(10)));
        assert!(!clock.ready(t0 + Duration::from_millis(32)));
        assert!(clock.ready(t0 + Duration::from_millis(40)));
        // The window restarts from the last firing, not the last check.
        assert!(!clock.ready(t0 + Duration::from_millis(60)));
        assert!(clock.ready(t0 + Duration::from_millis(80)));
    }

    #[test]
    fn frame_clock_from_framerate() {
        let clock = FrameClock::for_framerate(30.0);
        assert_eq!(clock.interval(), Duration::from_millis(33));

        // Unknown framerate means no throttling.
        let mut clock = FrameClock::for_framerate(0.0);
        let t0 = Instant::now();
        assert!(clock.ready(t0));
        assert!(clock.ready(t0));
    }

    #[test]
    fn shutdown_flag_is_shared() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_stop_requested());
        flag.request_stop();
        assert!(observer.is_stop_requested());
    }
}
