//! Roadwatch - real-time camera perception pipeline.
//!
//! One thread of control pulls frames from a camera or video source, runs a
//! two-stage detect/track inference against a compute view of each frame,
//! renders bounding-box overlays over the display view, and optionally
//! republishes raw pixels to an external sink.
//!
//! # Architecture
//!
//! The pipeline loop owns frame cadence, stage ordering, failure handling,
//! and per-frame resource lifecycle. Its collaborators are trait contracts:
//!
//! - `ingest::FrameSource`: one frame handle at a time; end-of-stream is
//!   data, transient failures are retried next tick.
//! - `frame::ImageExtractor`: derives a processing view (inference) and a
//!   display view (render/publish) from each frame; both are returned
//!   through a scoped guard on every exit path.
//! - `infer::InferenceStage`: non-blocking detect/track submissions with a
//!   single synchronous harvest point per frame.
//! - `render::RenderStage`: opaque draw-call sink plus the window-close
//!   signal.
//! - `publish::PublishSink`: best-effort raw-pixel republishing; its
//!   failures never affect detection or rendering.
//!
//! # Module Structure
//!
//! - `pipeline`: the orchestration loop (the core)
//! - `frame`: per-frame image resources and the extractor seam
//! - `ingest`: frame sources (synthetic `stub://` in-tree)
//! - `infer`: detect/track stage contract and the stub stage
//! - `render`: overlay drawing contract, colors, headless renderer
//! - `publish`: frame republishing (log sink; MQTT behind `publish-mqtt`)
//! - `config`: process configuration (JSON file + env overrides)

pub mod config;
pub mod frame;
pub mod infer;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod render;

pub use config::{PublishSettings, RoadwatchConfig, SourceSettings};
pub use frame::{
    CpuImageExtractor, DisplayBuffer, FrameHandle, FrameImages, ImageExtractor, ImagePair,
    ProcessingBuffer,
};
pub use infer::{ClassResult, InferenceStage, Region, StubInference, CLASS_NAMES};
pub use ingest::{
    CapturedFrame, FrameRead, FrameSource, SourceMode, SourceProperties, SyntheticConfig,
    SyntheticSource,
};
pub use pipeline::{
    FrameClock, Pipeline, PipelineContext, PipelineOptions, PipelineStats, ShutdownFlag,
    StopReason, TickStatus,
};
pub use publish::{LogPublisher, PublishSink, RawPixels};
#[cfg(feature = "publish-mqtt")]
pub use publish::{MqttConfig, MqttPublisher};
pub use render::{
    Color, HeadlessRenderer, RegionOfInterest, RenderStage, BOX_PALETTE, ROI_PRIMARY_COLOR,
    ROI_SECONDARY_COLOR,
};
