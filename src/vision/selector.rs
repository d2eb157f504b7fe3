// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Picks the single answer returned for an image from its detections

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::detector::{Detection, DetectionSet};

/// Label returned when the detector found nothing
pub const NO_PRODUCT_LABEL: &str = "No Product Detected";
/// Label returned when the detector output could not be interpreted
pub const UNKNOWN_LABEL: &str = "Unknown";
/// Class id carried by sentinel results
pub const NO_CLASS_ID: i64 = -1;

/// Uniform prediction payload returned by every path (real, mock, sentinel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub label: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    /// -1 for sentinel results
    pub class_id: i64,
    pub metadata: Map<String, Value>,
}

impl PredictionResult {
    /// Sentinel for "detector ran and found nothing"
    pub fn no_detection() -> Self {
        let mut metadata = Map::new();
        metadata.insert("message".to_string(), json!("No objects found"));
        Self {
            label: NO_PRODUCT_LABEL.to_string(),
            confidence: 0.0,
            class_id: NO_CLASS_ID,
            metadata,
        }
    }

    /// Sentinel for "detector output was unusable"
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
            class_id: NO_CLASS_ID,
            metadata: Map::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.class_id == NO_CLASS_ID
    }

    /// `metadata.modelVersion`, if present
    pub fn model_version(&self) -> Option<&str> {
        self.metadata.get("modelVersion").and_then(Value::as_str)
    }
}

/// Choose the answer for one image.
///
/// - empty set: the "No Product Detected" sentinel
/// - no entry with a finite confidence in [0, 1]: the "Unknown" sentinel
/// - otherwise the highest-confidence entry; on ties the earliest one wins.
///   `metadata.allDetections` lists every entry in backend order.
pub fn select(detections: &DetectionSet, model_version: &str) -> PredictionResult {
    if detections.is_empty() {
        info!("No objects detected in image.");
        return PredictionResult::no_detection();
    }

    let Some(top) = first_max(detections) else {
        return PredictionResult::unknown();
    };

    info!("Detected class: {} ({:.2})", top.class_name, top.confidence);

    let all_detections: Vec<Value> = detections
        .iter()
        .map(|d| json!({ "class": d.class_name, "conf": confidence_value(d.confidence) }))
        .collect();

    let mut metadata = Map::new();
    metadata.insert("modelVersion".to_string(), json!(model_version));
    metadata.insert("allDetections".to_string(), Value::Array(all_detections));

    PredictionResult {
        label: top.class_name.clone(),
        confidence: top.confidence,
        class_id: top.class_id,
        metadata,
    }
}

/// Widen to f64 keeping the shortest f32 decimal form, so `0.8f32` stays `0.8`
/// instead of `0.800000011920929`
fn confidence_value(confidence: f32) -> f64 {
    confidence
        .to_string()
        .parse()
        .unwrap_or(f64::from(confidence))
}

fn is_well_formed(confidence: f32) -> bool {
    confidence.is_finite() && (0.0..=1.0).contains(&confidence)
}

/// First entry holding the strictly maximal well-formed confidence
fn first_max(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .filter(|d| is_well_formed(d.confidence))
        .fold(None, |best: Option<&Detection>, d| match best {
            Some(current) if d.confidence <= current.confidence => Some(current),
            _ => Some(d),
        })
}
