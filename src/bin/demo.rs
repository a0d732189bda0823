//! demo - bounded end-to-end synthetic run of the perception pipeline

use anyhow::{anyhow, Result};
use clap::Parser;

use roadwatch::{
    CpuImageExtractor, HeadlessRenderer, LogPublisher, Pipeline, PipelineContext, PipelineOptions,
    RegionOfInterest, ShutdownFlag, SourceMode, StubInference, SyntheticConfig, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of frames to run before stopping.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Synthetic source frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Treat the source as recorded video (rate-limited, every frame
    /// processed) instead of a live camera.
    #[arg(long)]
    video: bool,
    /// Frame width.
    #[arg(long, default_value_t = 320)]
    width: u32,
    /// Frame height.
    #[arg(long, default_value_t = 240)]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let mode = if args.video {
        SourceMode::Video
    } else {
        SourceMode::Live
    };

    stage("build synthetic pipeline");
    let source = SyntheticSource::new(SyntheticConfig {
        uri: "stub://demo".to_string(),
        mode,
        framerate: args.fps,
        width: args.width,
        height: args.height,
        stream_len: 0,
        noise: 4,
    })?;

    let rois = [
        RegionOfInterest {
            x: args.width / 4,
            y: args.height / 8,
            width: args.width / 2,
            height: args.height / 4,
        },
        RegionOfInterest {
            x: 0,
            y: args.height / 2,
            width: args.width,
            height: args.height / 2,
        },
    ];

    let ctx = PipelineContext {
        source: Box::new(source),
        extractor: Box::new(CpuImageExtractor::new()),
        inference: Box::new(StubInference::new()),
        render: Box::new(HeadlessRenderer::new()),
        publish: Some(Box::new(LogPublisher::new())),
        shutdown: ShutdownFlag::new(),
    };

    stage("run pipeline");
    let mut pipeline = Pipeline::new(
        ctx,
        PipelineOptions {
            stop_frame: args.frames,
            rois,
        },
    );
    let stats = pipeline.run()?;

    println!("demo summary:");
    println!("  mode: {:?}", mode);
    println!("  frames seen: {}", stats.frames_seen);
    println!("  frames processed: {}", stats.frames_processed);
    println!("  frames published: {}", stats.frames_published);
    println!("  stop reason: {:?}", stats.stop_reason);
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
