use std::sync::Mutex;

use tempfile::NamedTempFile;

use roadwatch::config::RoadwatchConfig;
use roadwatch::{RegionOfInterest, SourceMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ROADWATCH_CONFIG",
        "ROADWATCH_SOURCE_URI",
        "ROADWATCH_SOURCE_MODE",
        "ROADWATCH_STOP_FRAME",
        "ROADWATCH_MQTT_BROKER_ADDR",
        "ROADWATCH_PUBLISH_TOPIC",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "uri": "stub://dashcam",
            "mode": "video",
            "framerate": 25,
            "width": 800,
            "height": 600,
            "stream_len": 500,
            "noise": 0
        },
        "pipeline": {
            "stop_frame": 250,
            "rois": [
                { "x": 200, "y": 75, "width": 400, "height": 150 },
                { "x": 0, "y": 300, "width": 800, "height": 300 }
            ]
        },
        "publish": {
            "enabled": true,
            "broker_addr": "10.0.0.5:1883",
            "topic": "garage/frames",
            "jpeg_quality": 70
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ROADWATCH_CONFIG", file.path());
    std::env::set_var("ROADWATCH_SOURCE_MODE", "live");
    std::env::set_var("ROADWATCH_STOP_FRAME", "90");

    let cfg = RoadwatchConfig::load().expect("load config");

    assert_eq!(cfg.source.uri, "stub://dashcam");
    assert_eq!(cfg.source.mode, SourceMode::Live);
    assert_eq!(cfg.source.framerate, 25);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.source.stream_len, 500);
    assert_eq!(cfg.source.noise, 0);
    assert_eq!(cfg.stop_frame, 90);
    assert_eq!(
        cfg.rois[0],
        RegionOfInterest {
            x: 200,
            y: 75,
            width: 400,
            height: 150
        }
    );
    assert!(cfg.publish.enabled);
    assert_eq!(cfg.publish.broker_addr, "10.0.0.5:1883");
    assert_eq!(cfg.publish.topic, "garage/frames");
    assert_eq!(cfg.publish.jpeg_quality, 70);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RoadwatchConfig::load().expect("load defaults");

    assert_eq!(cfg.source.uri, "stub://camera");
    assert_eq!(cfg.source.mode, SourceMode::Live);
    assert_eq!(cfg.source.framerate, 30);
    assert_eq!(cfg.stop_frame, 0);
    assert!(!cfg.publish.enabled);

    // Default detection regions sit inside the frame.
    for roi in &cfg.rois {
        assert!(roi.width > 0 && roi.height > 0);
        assert!(roi.x + roi.width <= cfg.source.width);
        assert!(roi.y + roi.height <= cfg.source.height);
    }

    clear_env();
}

#[test]
fn rejects_out_of_frame_detection_regions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": { "width": 320, "height": 240 },
        "pipeline": {
            "rois": [
                { "x": 300, "y": 0, "width": 100, "height": 100 },
                { "x": 0, "y": 0, "width": 10, "height": 10 }
            ]
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("ROADWATCH_CONFIG", file.path());

    assert!(RoadwatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unknown_source_mode() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ROADWATCH_SOURCE_MODE", "hologram");
    assert!(RoadwatchConfig::load().is_err());

    clear_env();
}
