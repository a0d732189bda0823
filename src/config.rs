use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::ingest::SourceMode;
use crate::render::RegionOfInterest;

const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_FRAMERATE: u32 = 30;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 800;
const DEFAULT_NOISE: u8 = 4;
const DEFAULT_STOP_FRAME: u64 = 0;
const DEFAULT_MQTT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_PUBLISH_TOPIC: &str = "roadwatch/frames";
const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Deserialize, Default)]
struct RoadwatchConfigFile {
    source: Option<SourceConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    publish: Option<PublishConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    mode: Option<String>,
    framerate: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    stream_len: Option<u64>,
    noise: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    stop_frame: Option<u64>,
    rois: Option<Vec<RegionOfInterest>>,
}

#[derive(Debug, Deserialize, Default)]
struct PublishConfigFile {
    enabled: Option<bool>,
    broker_addr: Option<String>,
    topic: Option<String>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct RoadwatchConfig {
    pub source: SourceSettings,
    pub stop_frame: u64,
    pub rois: [RegionOfInterest; 2],
    pub publish: PublishSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub uri: String,
    pub mode: SourceMode,
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
    pub stream_len: u64,
    pub noise: u8,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub enabled: bool,
    pub broker_addr: String,
    pub topic: String,
    pub jpeg_quality: u8,
}

impl RoadwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROADWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoadwatchConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let mode = match source_file.mode.as_deref() {
            Some(mode) => parse_source_mode(mode)?,
            None => SourceMode::Live,
        };
        let source = SourceSettings {
            uri: source_file
                .uri
                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            mode,
            framerate: source_file.framerate.unwrap_or(DEFAULT_FRAMERATE),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            stream_len: source_file.stream_len.unwrap_or(0),
            noise: source_file.noise.unwrap_or(DEFAULT_NOISE),
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let rois = match pipeline_file.rois {
            Some(rois) => {
                let [first, second]: [RegionOfInterest; 2] = rois
                    .try_into()
                    .map_err(|_| anyhow!("pipeline.rois must contain exactly two regions"))?;
                [first, second]
            }
            None => default_rois(source.width, source.height),
        };

        let publish_file = file.publish.unwrap_or_default();
        let publish = PublishSettings {
            enabled: publish_file.enabled.unwrap_or(false),
            broker_addr: publish_file
                .broker_addr
                .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
            topic: publish_file
                .topic
                .unwrap_or_else(|| DEFAULT_PUBLISH_TOPIC.to_string()),
            jpeg_quality: publish_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        };

        Ok(Self {
            source,
            stop_frame: pipeline_file.stop_frame.unwrap_or(DEFAULT_STOP_FRAME),
            rois,
            publish,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("ROADWATCH_SOURCE_URI") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(mode) = std::env::var("ROADWATCH_SOURCE_MODE") {
            if !mode.trim().is_empty() {
                self.source.mode = parse_source_mode(&mode)?;
            }
        }
        if let Ok(stop_frame) = std::env::var("ROADWATCH_STOP_FRAME") {
            self.stop_frame = stop_frame
                .parse()
                .map_err(|_| anyhow!("ROADWATCH_STOP_FRAME must be an integer frame count"))?;
        }
        if let Ok(addr) = std::env::var("ROADWATCH_MQTT_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                self.publish.broker_addr = addr;
            }
        }
        if let Ok(topic) = std::env::var("ROADWATCH_PUBLISH_TOPIC") {
            if !topic.trim().is_empty() {
                self.publish.topic = topic;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.framerate == 0 {
            return Err(anyhow!("source framerate must be >= 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be nonzero"));
        }
        for roi in &self.rois {
            if roi.width == 0 || roi.height == 0 {
                return Err(anyhow!("detection regions must have nonzero size"));
            }
            if roi.x + roi.width > self.source.width || roi.y + roi.height > self.source.height {
                return Err(anyhow!(
                    "detection region {}x{}+{}+{} exceeds the {}x{} frame",
                    roi.width,
                    roi.height,
                    roi.x,
                    roi.y,
                    self.source.width,
                    self.source.height
                ));
            }
        }
        if self.publish.jpeg_quality == 0 || self.publish.jpeg_quality > 100 {
            return Err(anyhow!("publish jpeg_quality must be in 1..=100"));
        }
        Ok(())
    }
}

/// Far-field band in the upper middle, near-field band across the bottom.
fn default_rois(width: u32, height: u32) -> [RegionOfInterest; 2] {
    [
        RegionOfInterest {
            x: width / 4,
            y: height / 8,
            width: width / 2,
            height: height / 4,
        },
        RegionOfInterest {
            x: 0,
            y: height / 2,
            width,
            height: height / 2,
        },
    ]
}

fn parse_source_mode(value: &str) -> Result<SourceMode> {
    match value.to_lowercase().as_str() {
        "live" | "camera" => Ok(SourceMode::Live),
        "video" | "file" => Ok(SourceMode::Video),
        other => Err(anyhow!("unknown source mode {:?} (live or video)", other)),
    }
}

fn read_config_file(path: &Path) -> Result<RoadwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
