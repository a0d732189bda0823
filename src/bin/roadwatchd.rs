//! roadwatchd - Roadwatch perception pipeline daemon
//!
//! This daemon:
//! 1. Loads configuration from a JSON file and environment overrides
//! 2. Builds the frame source, image extractor, inference stage, renderer,
//!    and optional publish sink
//! 3. Runs the pipeline loop until a stop signal, window close, fatal
//!    extraction failure, or the configured frame limit

use anyhow::{Context, Result};

use roadwatch::{
    CpuImageExtractor, HeadlessRenderer, Pipeline, PipelineContext, PipelineOptions,
    PublishSettings, PublishSink, RoadwatchConfig, ShutdownFlag, StubInference, SyntheticConfig,
    SyntheticSource,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RoadwatchConfig::load()?;

    let shutdown = ShutdownFlag::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested");
            shutdown.request_stop();
        })
        .context("install signal handler")?;
    }

    let source = SyntheticSource::new(SyntheticConfig {
        uri: cfg.source.uri.clone(),
        mode: cfg.source.mode,
        framerate: cfg.source.framerate,
        width: cfg.source.width,
        height: cfg.source.height,
        stream_len: cfg.source.stream_len,
        noise: cfg.source.noise,
    })?;

    let publish = if cfg.publish.enabled {
        Some(build_publisher(&cfg.publish)?)
    } else {
        None
    };

    let ctx = PipelineContext {
        source: Box::new(source),
        extractor: Box::new(CpuImageExtractor::new()),
        inference: Box::new(StubInference::new()),
        render: Box::new(HeadlessRenderer::new()),
        publish,
        shutdown,
    };

    log::info!(
        "roadwatchd running: source={} stop_frame={}",
        cfg.source.uri,
        cfg.stop_frame
    );

    let mut pipeline = Pipeline::new(
        ctx,
        PipelineOptions {
            stop_frame: cfg.stop_frame,
            rois: cfg.rois,
        },
    );
    let stats = pipeline.run()?;

    log::info!(
        "roadwatchd exiting ({:?}): {} frames seen, {} processed, {} published",
        stats.stop_reason,
        stats.frames_seen,
        stats.frames_processed,
        stats.frames_published
    );
    Ok(())
}

fn build_publisher(settings: &PublishSettings) -> Result<Box<dyn PublishSink>> {
    #[cfg(feature = "publish-mqtt")]
    {
        let publisher = roadwatch::MqttPublisher::new(roadwatch::MqttConfig {
            broker_addr: settings.broker_addr.clone(),
            topic: settings.topic.clone(),
            client_id: "roadwatchd".to_string(),
            jpeg_quality: settings.jpeg_quality,
        })?;
        log::info!(
            "publishing frames to mqtt://{}/{}",
            settings.broker_addr,
            settings.topic
        );
        return Ok(Box::new(publisher));
    }
    #[cfg(not(feature = "publish-mqtt"))]
    {
        log::info!(
            "publish enabled without the publish-mqtt feature; frames for topic {} go to the log sink",
            settings.topic
        );
        Ok(Box::new(roadwatch::LogPublisher::new()))
    }
}
