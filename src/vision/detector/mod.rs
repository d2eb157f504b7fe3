// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection behind a uniform "run detection, return ranked boxes" contract
//!
//! Components:
//! - `DetectorBackend` - a concrete detector (ONNX YOLO, or a stub in tests)
//! - `DetectorAdapter` - reads the input image, runs the backend off the async
//!   runtime and classifies backend failures

#[cfg(feature = "onnx")]
pub mod yolo;

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::errors::{VisionError, VisionResult};
use super::image_utils::{decode_image_bytes, ImageError};

/// Minimum confidence a detection needs to be reported by a backend
pub const MIN_CONFIDENCE: f32 = 0.40;

/// Substrings that mark a backend error as caused by malformed or empty pixel data.
///
/// This is a heuristic: backends without structured errors only give us text,
/// and the list is not exhaustive.
const DEGENERATE_INPUT_MARKERS: &[&str] = &["array", "stack"];

/// Axis-aligned box in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One candidate object found in an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class_id: i64,
    pub class_name: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class_id: i64, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            confidence,
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// All detections for one image, in backend order
pub type DetectionSet = Vec<Detection>;

/// Errors reported by a detector backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend knows the input pixels were empty or malformed
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Any other backend failure
    #[error("{0}")]
    Runtime(String),
}

impl BackendError {
    pub fn runtime(message: impl Into<String>) -> Self {
        BackendError::Runtime(message.into())
    }
}

impl From<ImageError> for BackendError {
    fn from(err: ImageError) -> Self {
        if err.is_degenerate() {
            BackendError::DegenerateInput(err.to_string())
        } else {
            BackendError::Runtime(err.to_string())
        }
    }
}

/// How the adapter treats a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Reported to the caller as "no objects found"
    DegenerateInput,
    /// Propagated as an inference failure
    Fatal,
}

/// Classify a backend error.
///
/// Structured `DegenerateInput` errors are trusted. `Runtime` errors fall back to
/// substring matching on the message, which can misclassify genuine bugs whose
/// text mentions arrays or stacks.
pub fn classify_backend_error(err: &BackendError) -> FailureClass {
    match err {
        BackendError::DegenerateInput(_) => FailureClass::DegenerateInput,
        BackendError::Runtime(message) => {
            let message = message.to_lowercase();
            if DEGENERATE_INPUT_MARKERS
                .iter()
                .any(|marker| message.contains(marker))
            {
                FailureClass::DegenerateInput
            } else {
                FailureClass::Fatal
            }
        }
    }
}

/// A concrete object detector
///
/// Implementations are compute bound and are always invoked from a blocking
/// thread. They must drop candidates below `min_confidence` themselves.
pub trait DetectorBackend: Send + Sync {
    /// Run detection on one decoded image
    fn detect(
        &self,
        image: &DynamicImage,
        min_confidence: f32,
    ) -> Result<DetectionSet, BackendError>;

    /// Version tag reported in prediction metadata
    fn model_version(&self) -> &str;

    /// Class names known to the model, indexed by class id
    fn class_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Runs a ready backend against an image file
#[derive(Debug, Clone)]
pub struct DetectorAdapter {
    min_confidence: f32,
}

impl Default for DetectorAdapter {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
        }
    }
}

impl DetectorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Detect objects in the image at `image_path`.
    ///
    /// Returns an empty set when nothing is found or the image data is
    /// degenerate. A missing or unreadable file and every other backend error
    /// are inference failures.
    pub async fn detect(
        &self,
        backend: Arc<dyn DetectorBackend>,
        image_path: &Path,
    ) -> VisionResult<DetectionSet> {
        let bytes = tokio::fs::read(image_path).await.map_err(|e| {
            VisionError::Inference(format!(
                "cannot read input image {}: {}",
                image_path.display(),
                e
            ))
        })?;

        let min_confidence = self.min_confidence;
        let outcome = tokio::task::spawn_blocking(move || {
            let (image, info) = decode_image_bytes(&bytes)?;
            debug!(
                "Running detector on {}x{} image ({} bytes)",
                info.width, info.height, info.size_bytes
            );
            backend.detect(&image, min_confidence)
        })
        .await
        .map_err(|e| VisionError::Inference(format!("detector task failed: {}", e)))?;

        match outcome {
            Ok(detections) => Ok(detections),
            Err(err) => match classify_backend_error(&err) {
                FailureClass::DegenerateInput => {
                    warn!("Handling degenerate input as no detection: {}", err);
                    Ok(Vec::new())
                }
                FailureClass::Fatal => Err(VisionError::Inference(err.to_string())),
            },
        }
    }
}
