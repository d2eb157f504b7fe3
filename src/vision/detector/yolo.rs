// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO object detector on ONNX Runtime
//!
//! Expects the Ultralytics export layout: one output tensor of shape
//! `[1, 4 + num_classes, num_candidates]` with centre-format boxes in
//! model-input pixels followed by per-class scores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayViewD, Axis};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info, warn};

use super::{BackendError, BoundingBox, Detection, DetectionSet, DetectorBackend};
use crate::vision::model_handle::BackendLoader;

/// Default square input size for YOLO exports
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// IoU above which overlapping boxes of the same class are suppressed
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// YOLO detector backed by an ONNX Runtime session (CPU only)
pub struct OnnxYoloDetector {
    /// ONNX Runtime session (`run` needs exclusive access)
    session: Arc<Mutex<Session>>,
    input_name: String,
    input_size: u32,
    class_names: Vec<String>,
    model_version: String,
}

impl std::fmt::Debug for OnnxYoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxYoloDetector")
            .field("input_name", &self.input_name)
            .field("input_size", &self.input_size)
            .field("classes", &self.class_names.len())
            .field("model_version", &self.model_version)
            .finish_non_exhaustive()
    }
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX export
    ///
    /// # Errors
    /// Returns error if the weights file is missing, ONNX Runtime rejects it,
    /// or the labels file cannot be parsed.
    pub fn load(
        model_path: &Path,
        labels_path: Option<&Path>,
        input_size: u32,
        model_version: impl Into<String>,
    ) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::runtime(format!(
                "YOLO model not found: {}",
                model_path.display()
            )));
        }

        info!("🚀 Initializing YOLO model from {}", model_path.display());

        let session = build_session(model_path)
            .map_err(|e| BackendError::runtime(format!("{:#}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        let labels_path = labels_path
            .map(Path::to_path_buf)
            .or_else(|| find_labels_file(model_path));
        let class_names = match labels_path {
            Some(path) => load_class_names(&path)?,
            None => {
                warn!(
                    "⚠️ No labels file found next to {}, using numeric class names",
                    model_path.display()
                );
                Vec::new()
            }
        };

        debug!(
            "YOLO model loaded - input: {}, {} classes",
            input_name,
            class_names.len()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            input_size: if input_size == 0 { DEFAULT_INPUT_SIZE } else { input_size },
            class_names,
            model_version: model_version.into(),
        })
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl DetectorBackend for OnnxYoloDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        min_confidence: f32,
    ) -> Result<DetectionSet, BackendError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BackendError::DegenerateInput(
                "image has no pixels".to_string(),
            ));
        }

        let input = preprocess(image, self.input_size);
        let input_value = Value::from_array(input)
            .map_err(|e| BackendError::runtime(format!("failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| BackendError::runtime(format!("YOLO inference failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| BackendError::runtime(format!("failed to extract output tensor: {}", e)))?;

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;

        let candidates = decode_candidates(output.view(), min_confidence, scale_x, scale_y)?;
        let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD);

        Ok(kept
            .into_iter()
            .map(|c| {
                Detection::new(c.class_id as i64, self.class_name(c.class_id), c.score)
                    .with_bounding_box(c.bbox)
            })
            .collect())
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }
}

/// Builds `OnnxYoloDetector`s for model handles
#[derive(Debug, Clone)]
pub struct OnnxYoloLoader {
    labels_path: Option<PathBuf>,
    input_size: u32,
    model_version: String,
}

impl OnnxYoloLoader {
    pub fn new(model_version: impl Into<String>) -> Self {
        Self {
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            model_version: model_version.into(),
        }
    }

    pub fn with_labels_path(mut self, labels_path: Option<PathBuf>) -> Self {
        self.labels_path = labels_path;
        self
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }
}

impl BackendLoader for OnnxYoloLoader {
    fn load(&self, weights: &Path) -> Result<Arc<dyn DetectorBackend>, BackendError> {
        let detector = OnnxYoloDetector::load(
            weights,
            self.labels_path.as_deref(),
            self.input_size,
            self.model_version.clone(),
        )?;
        Ok(Arc::new(detector))
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    class_id: usize,
    score: f32,
    bbox: BoundingBox,
}

fn build_session(model_path: &Path) -> anyhow::Result<Session> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(4)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load YOLO model from {}",
            model_path.display()
        ))?;
    Ok(session)
}

/// Resize to a square NCHW tensor scaled to [0, 1]
fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let resized = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let size = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }
    input
}

/// Turn the raw output tensor into scored boxes above the confidence floor
fn decode_candidates(
    output: ArrayViewD<f32>,
    min_confidence: f32,
    scale_x: f32,
    scale_y: f32,
) -> Result<Vec<Candidate>, BackendError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(BackendError::DegenerateInput(format!(
            "unexpected output array shape {:?}, expected [1, 4 + classes, candidates]",
            shape
        )));
    }

    let view = output.index_axis(Axis(0), 0);
    let rows = shape[1];
    let num_candidates = shape[2];
    let mut candidates = Vec::new();

    for i in 0..num_candidates {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for row in 4..rows {
            let score = view[[row, i]];
            if score > best_score {
                best_score = score;
                best_class = row - 4;
            }
        }

        if best_score.is_nan() || best_score < min_confidence {
            continue;
        }

        let cx = view[[0, i]];
        let cy = view[[1, i]];
        let w = view[[2, i]];
        let h = view[[3, i]];

        candidates.push(Candidate {
            class_id: best_class,
            score: best_score.min(1.0),
            bbox: BoundingBox {
                x1: (cx - w / 2.0) * scale_x,
                y1: (cy - h / 2.0) * scale_y,
                x2: (cx + w / 2.0) * scale_x,
                y2: (cy + h / 2.0) * scale_y,
            },
        });
    }

    Ok(candidates)
}

/// Class-aware greedy NMS, result sorted by descending score
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Look for `<model>.labels.json` or `<model>.names` beside the weights
fn find_labels_file(model_path: &Path) -> Option<PathBuf> {
    ["labels.json", "names"]
        .iter()
        .map(|ext| model_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Parse class names from a JSON array, a JSON object keyed by class id, or
/// one name per line
fn load_class_names(path: &Path) -> Result<Vec<String>, BackendError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        BackendError::runtime(format!("cannot read labels file {}: {}", path.display(), e))
    })?;
    parse_class_names(&text)
        .map_err(|e| BackendError::runtime(format!("invalid labels file {}: {}", path.display(), e)))
}

fn parse_class_names(text: &str) -> Result<Vec<String>, String> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| e.to_string());
    }

    if trimmed.starts_with('{') {
        let by_id: HashMap<String, String> =
            serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
        let mut indexed = by_id
            .into_iter()
            .map(|(id, name)| {
                id.parse::<usize>()
                    .map(|id| (id, name))
                    .map_err(|_| format!("class id '{}' is not a number", id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        indexed.sort_by_key(|(id, _)| *id);

        let len = indexed.last().map(|(id, _)| id + 1).unwrap_or(0);
        let mut names: Vec<String> = (0..len).map(|id| format!("class_{}", id)).collect();
        for (id, name) in indexed {
            names[id] = name;
        }
        return Ok(names);
    }

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
