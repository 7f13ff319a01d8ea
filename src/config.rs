use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::ModelConfig;
use crate::source::SourceConfig;

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_CROWD_THRESHOLD: usize = 10;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8642";
const DEFAULT_MODEL_GRAPH: &str = "models/mobilenet_ssd.onnx";
const DEFAULT_MODEL_LABELS: &str = "models/mobilenet_ssd.labels";
const DEFAULT_MODEL_INPUT: u32 = 300;

#[derive(Debug, Deserialize, Default)]
struct CrowdwatchConfigFile {
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    mock: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence: Option<f32>,
    crowd_threshold: Option<usize>,
    model_graph: Option<PathBuf>,
    model_labels: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

/// Resolved daemon configuration.
///
/// Loaded from an optional JSON file (`CROWDWATCH_CONFIG`), then overridden
/// by `CROWDWATCH_*` environment variables, then validated.
#[derive(Debug, Clone)]
pub struct CrowdwatchConfig {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub api_addr: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device index or device path.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Force the placeholder source (degraded mode).
    pub mock: bool,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence: f32,
    /// People count at which consumers flag an alert.
    pub crowd_threshold: usize,
    pub model_graph: PathBuf,
    pub model_labels: PathBuf,
}

impl Default for CrowdwatchConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings {
                source: DEFAULT_SOURCE.to_string(),
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                fps: DEFAULT_FPS,
                mock: false,
            },
            detection: DetectionSettings {
                confidence: DEFAULT_CONFIDENCE,
                crowd_threshold: DEFAULT_CROWD_THRESHOLD,
                model_graph: PathBuf::from(DEFAULT_MODEL_GRAPH),
                model_labels: PathBuf::from(DEFAULT_MODEL_LABELS),
            },
            api_addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

impl CrowdwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWDWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CrowdwatchConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(camera) = file.camera {
            if let Some(source) = camera.source {
                cfg.camera.source = source;
            }
            if let Some(width) = camera.width {
                cfg.camera.width = width;
            }
            if let Some(height) = camera.height {
                cfg.camera.height = height;
            }
            if let Some(fps) = camera.fps {
                cfg.camera.fps = fps;
            }
            if let Some(mock) = camera.mock {
                cfg.camera.mock = mock;
            }
        }
        if let Some(detection) = file.detection {
            if let Some(confidence) = detection.confidence {
                cfg.detection.confidence = confidence;
            }
            if let Some(threshold) = detection.crowd_threshold {
                cfg.detection.crowd_threshold = threshold;
            }
            if let Some(graph) = detection.model_graph {
                cfg.detection.model_graph = graph;
            }
            if let Some(labels) = detection.model_labels {
                cfg.detection.model_labels = labels;
            }
        }
        if let Some(api) = file.api {
            if let Some(addr) = api.addr {
                cfg.api_addr = addr;
            }
        }
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("CROWDWATCH_SOURCE") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Some(width) = env_u32("CROWDWATCH_WIDTH")? {
            self.camera.width = width;
        }
        if let Some(height) = env_u32("CROWDWATCH_HEIGHT")? {
            self.camera.height = height;
        }
        if let Some(fps) = env_u32("CROWDWATCH_FPS")? {
            self.camera.fps = fps;
        }
        if let Ok(mock) = std::env::var("CROWDWATCH_MOCK") {
            self.camera.mock = matches!(mock.trim(), "1" | "true" | "yes");
        }
        if let Ok(confidence) = std::env::var("CROWDWATCH_CONFIDENCE") {
            self.detection.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_CONFIDENCE must be a number"))?;
        }
        if let Ok(threshold) = std::env::var("CROWDWATCH_CROWD_THRESHOLD") {
            self.detection.crowd_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_CROWD_THRESHOLD must be an integer"))?;
        }
        if let Ok(graph) = std::env::var("CROWDWATCH_MODEL_GRAPH") {
            if !graph.trim().is_empty() {
                self.detection.model_graph = PathBuf::from(graph);
            }
        }
        if let Ok(labels) = std::env::var("CROWDWATCH_MODEL_LABELS") {
            if !labels.trim().is_empty() {
                self.detection.model_labels = PathBuf::from(labels);
            }
        }
        if let Ok(addr) = std::env::var("CROWDWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(anyhow!("detection confidence must be within [0, 1]"));
        }
        Ok(())
    }

    /// Acquisition settings consumed by the frame source.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            identifier: self.camera.source.clone(),
            width: self.camera.width,
            height: self.camera.height,
            target_fps: self.camera.fps,
        }
    }

    /// Model settings consumed by the detection engine.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            graph_path: self.detection.model_graph.clone(),
            labels_path: self.detection.model_labels.clone(),
            input_size: DEFAULT_MODEL_INPUT,
            confidence_threshold: self.detection.confidence,
        }
    }
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{key} must be an integer"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<CrowdwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
