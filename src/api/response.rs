// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload endpoint response types

use serde::{Deserialize, Serialize};

use crate::vision::{ModelStatus, PredictionResult};

/// Response from image and video detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    /// Always "success"; failures use `ErrorResponse`
    pub status: String,
    /// Original upload filename
    pub filename: String,
    /// `prediction`, `confidence`, `classId`, `metadata`
    #[serde(flatten)]
    pub result: PredictionResult,
}

impl DetectResponse {
    pub fn new(filename: impl Into<String>, result: PredictionResult) -> Self {
        Self {
            status: "success".to_string(),
            filename: filename.into(),
            result,
        }
    }
}

/// Response from the model listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub default_model: String,
    pub backend_available: bool,
    pub models: Vec<ModelStatus>,
}
