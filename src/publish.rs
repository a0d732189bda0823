//! Frame publishing sink.
//!
//! Publishing is a best-effort side channel: the loop maps the display view
//! into CPU-addressable memory, forwards the raw pixels to an external
//! consumer, and unmaps. A mapping or forwarding failure skips that frame's
//! publish and nothing else; detection, tracking, and rendering are never
//! affected by the publish path.
//!
//! `LogPublisher` is the default in-process sink. `MqttPublisher`
//! (feature `publish-mqtt`) JPEG-encodes each frame and publishes it to an
//! MQTT v5 broker.

use anyhow::Result;

use crate::frame::DisplayBuffer;

/// CPU-mapped view of a display buffer's pixels.
///
/// Borrows the buffer, so the mapping cannot outlive the frame it belongs
/// to. `unmap` must be called on the same buffer after the mapping is gone.
pub struct RawPixels<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// External consumer of raw decoded frames.
pub trait PublishSink {
    /// Map the display buffer for CPU reads. `Err` is a mapping failure:
    /// the caller logs it and skips publishing this frame.
    fn map_for_read<'a>(&mut self, image: &'a DisplayBuffer) -> Result<RawPixels<'a>>;

    /// Forward mapped pixels to the external consumer.
    fn forward(&mut self, pixels: &RawPixels<'_>) -> Result<()>;

    /// Release the CPU mapping.
    fn unmap(&mut self, image: &DisplayBuffer);
}

// ----------------------------------------------------------------------------
// LogPublisher
// ----------------------------------------------------------------------------

/// Sink that records forwards and logs them; no external transport.
pub struct LogPublisher {
    frames_forwarded: u64,
    bytes_forwarded: u64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self {
            frames_forwarded: 0,
            bytes_forwarded: 0,
        }
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishSink for LogPublisher {
    fn map_for_read<'a>(&mut self, image: &'a DisplayBuffer) -> Result<RawPixels<'a>> {
        Ok(RawPixels {
            data: image.pixels(),
            width: image.width(),
            height: image.height(),
        })
    }

    fn forward(&mut self, pixels: &RawPixels<'_>) -> Result<()> {
        self.frames_forwarded += 1;
        self.bytes_forwarded += pixels.data.len() as u64;
        log::debug!(
            "forwarded frame {}x{} ({} bytes)",
            pixels.width,
            pixels.height,
            pixels.data.len()
        );
        Ok(())
    }

    fn unmap(&mut self, _image: &DisplayBuffer) {}
}

// ----------------------------------------------------------------------------
// MqttPublisher (feature: publish-mqtt)
// ----------------------------------------------------------------------------

#[cfg(feature = "publish-mqtt")]
pub use mqtt::{MqttConfig, MqttPublisher};

#[cfg(feature = "publish-mqtt")]
mod mqtt {
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
    use rumqttc::v5::{mqttbytes::QoS, Client, MqttOptions};

    use super::{PublishSink, RawPixels};
    use crate::frame::DisplayBuffer;

    /// Configuration for the MQTT frame sink.
    #[derive(Clone, Debug)]
    pub struct MqttConfig {
        /// Broker address as `host:port`.
        pub broker_addr: String,
        pub topic: String,
        pub client_id: String,
        pub jpeg_quality: u8,
    }

    impl Default for MqttConfig {
        fn default() -> Self {
            Self {
                broker_addr: "127.0.0.1:1883".to_string(),
                topic: "roadwatch/frames".to_string(),
                client_id: "roadwatch".to_string(),
                jpeg_quality: 80,
            }
        }
    }

    /// Sink that JPEG-encodes frames and publishes them over MQTT v5.
    ///
    /// The connection event loop runs on a background thread; frames are
    /// published fire-and-forget with QoS 0, since a dropped video frame is
    /// cheaper than a stalled pipeline.
    pub struct MqttPublisher {
        client: Client,
        topic: String,
        jpeg_quality: u8,
        frames_forwarded: u64,
    }

    impl MqttPublisher {
        pub fn new(config: MqttConfig) -> Result<Self> {
            if config.jpeg_quality == 0 || config.jpeg_quality > 100 {
                return Err(anyhow!("jpeg_quality must be in 1..=100"));
            }
            let (host, port) = config
                .broker_addr
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("broker_addr must be host:port"))?;
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid broker port in {}", config.broker_addr))?;

            let mut options = MqttOptions::new(&config.client_id, host, port);
            options.set_keep_alive(Duration::from_secs(30));
            let (client, mut connection) = Client::new(options, 10);

            std::thread::spawn(move || {
                for event in connection.iter() {
                    if let Err(e) = event {
                        log::warn!("mqtt connection error: {}", e);
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            });

            Ok(Self {
                client,
                topic: config.topic,
                jpeg_quality: config.jpeg_quality,
                frames_forwarded: 0,
            })
        }

        pub fn frames_forwarded(&self) -> u64 {
            self.frames_forwarded
        }
    }

    impl PublishSink for MqttPublisher {
        fn map_for_read<'a>(&mut self, image: &'a DisplayBuffer) -> Result<RawPixels<'a>> {
            Ok(RawPixels {
                data: image.pixels(),
                width: image.width(),
                height: image.height(),
            })
        }

        fn forward(&mut self, pixels: &RawPixels<'_>) -> Result<()> {
            // JPEG carries no alpha; drop it before encoding.
            let mut rgb = Vec::with_capacity(pixels.data.len() / 4 * 3);
            for px in pixels.data.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }

            let mut jpeg = Vec::new();
            JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
                .write_image(&rgb, pixels.width, pixels.height, ExtendedColorType::Rgb8)
                .context("jpeg encode")?;

            self.client
                .publish(self.topic.clone(), QoS::AtMostOnce, false, jpeg)
                .context("mqtt publish")?;
            self.frames_forwarded += 1;
            Ok(())
        }

        fn unmap(&mut self, _image: &DisplayBuffer) {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
