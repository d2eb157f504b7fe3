// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the inference core
//!
//! Surfaced errors:
//! - Configuration errors (configured weights missing)
//! - Backend initialisation errors (weights present but rejected)
//! - Inference failures (detector errors that are not degenerate input)
//! - Video input and frame extraction errors
//!
//! Backend unavailability and degenerate input are recovered locally and never
//! reach callers as errors.

use thiserror::Error;

use super::image_utils::ImageError;

/// Errors returned by the inference service and the video pipeline
#[derive(Error, Debug)]
pub enum VisionError {
    /// Configured weights file does not exist
    #[error("Model weights for '{model}' not found at: {path}")]
    Configuration { model: String, path: String },

    /// Weights exist but the backend could not be constructed from them
    #[error("Failed to load model '{model}': {message}")]
    BackendInit { model: String, message: String },

    /// Detector failed for a reason other than degenerate input
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Video source cannot be opened at all
    #[error("Could not open video: {0}")]
    Input(String),

    /// No frame could be extracted by either sampling strategy
    #[error("Could not extract any frame from video: {0}")]
    Extraction(String),

    /// Image could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    /// Short machine-readable error type used in API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            VisionError::Configuration { .. } => "configuration_error",
            VisionError::BackendInit { .. } => "backend_init_error",
            VisionError::Inference(_) => "inference_failure",
            VisionError::Input(_) => "input_error",
            VisionError::Extraction(_) => "extraction_error",
            VisionError::Image(_) => "image_error",
            VisionError::Io(_) => "io_error",
        }
    }

    /// Whether the error was caused by the caller's input rather than the node
    pub fn is_client_error(&self) -> bool {
        matches!(self, VisionError::Input(_) | VisionError::Extraction(_))
    }
}

/// Result alias for the inference core
pub type VisionResult<T> = Result<T, VisionError>;
