// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration read from the environment

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MODEL_NAME: &str = "product_classifier";
pub const DEFAULT_MODEL_PATH: &str = "./models/product_classifier.onnx";
pub const DEFAULT_MODEL_VERSION: &str = "yolo-v11";
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Weights location for every model name the node may be asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPaths {
    /// Used for any name without an explicit entry
    pub default_path: String,
    pub named: HashMap<String, String>,
}

impl ModelPaths {
    pub fn new(default_path: impl Into<String>) -> Self {
        Self {
            default_path: default_path.into(),
            named: HashMap::new(),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.named.insert(name.into(), path.into());
        self
    }

    pub fn resolve(&self, model_name: &str) -> &str {
        self.named
            .get(model_name)
            .map(String::as_str)
            .unwrap_or(&self.default_path)
    }
}

/// Vision node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub default_model_name: String,
    pub default_model_path: String,
    /// Extra `name=path` registrations from `VISION_MODELS`
    pub models: HashMap<String, String>,
    pub labels_path: Option<PathBuf>,
    pub model_version: String,
    pub input_size: u32,
    pub force_mock: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub api_host: String,
    pub api_port: u16,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            default_model_name: DEFAULT_MODEL_NAME.to_string(),
            default_model_path: DEFAULT_MODEL_PATH.to_string(),
            models: HashMap::new(),
            labels_path: None,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            force_mock: false,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
        }
    }
}

impl VisionConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// Binaries load `.env` before calling this.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let input_size = match env::var("VISION_INPUT_SIZE") {
            Ok(value) => value.parse::<u32>().unwrap_or_else(|_| {
                warn!("Invalid VISION_INPUT_SIZE '{}', using {}", value, DEFAULT_INPUT_SIZE);
                DEFAULT_INPUT_SIZE
            }),
            Err(_) => defaults.input_size,
        };

        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.api_port);

        let models = env::var("VISION_MODELS")
            .map(|v| parse_model_list(&v))
            .unwrap_or_default();

        Self {
            default_model_name: env::var("VISION_MODEL_NAME")
                .unwrap_or(defaults.default_model_name),
            default_model_path: env::var("VISION_MODEL_PATH")
                .unwrap_or(defaults.default_model_path),
            models,
            labels_path: env::var("VISION_MODEL_LABELS").ok().map(PathBuf::from),
            model_version: env::var("VISION_MODEL_VERSION").unwrap_or(defaults.model_version),
            input_size,
            force_mock: env::var("VISION_FORCE_MOCK")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port,
        }
    }

    /// Weights paths keyed by model name.
    ///
    /// The default model always maps to `default_model_path`, even when
    /// `VISION_MODELS` lists the same name.
    pub fn model_paths(&self) -> ModelPaths {
        let mut paths = ModelPaths::new(self.default_model_path.clone());
        paths.named = self.models.clone();
        if let Some(listed) = paths
            .named
            .insert(self.default_model_name.clone(), self.default_model_path.clone())
        {
            if listed != self.default_model_path {
                warn!(
                    "VISION_MODELS entry for '{}' ({}) ignored in favour of {}",
                    self.default_model_name, listed, self.default_model_path
                );
            }
        }
        paths
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Parse `name=path,name2=path2`. Malformed entries are skipped with a warning.
pub fn parse_model_list(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
                Some((name.trim().to_string(), path.trim().to_string()))
            }
            _ => {
                warn!("Ignoring malformed VISION_MODELS entry: '{}'", entry);
                None
            }
        })
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
