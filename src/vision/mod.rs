// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Product recognition from images and video
//!
//! This module provides:
//! - Lifecycle-managed detection models with a mock fallback
//! - Detection ranking into a single prediction payload
//! - Representative-frame extraction for video input
//!
//! The detector runs on CPU via ONNX Runtime when built with the `onnx` feature.

pub mod detector;
pub mod errors;
pub mod image_utils;
pub mod mock;
pub mod model_handle;
pub mod selector;
pub mod service;
pub mod video;

pub use detector::{
    classify_backend_error, BackendError, BoundingBox, Detection, DetectionSet, DetectorAdapter,
    DetectorBackend, FailureClass, MIN_CONFIDENCE,
};
pub use errors::{VisionError, VisionResult};
pub use image_utils::{decode_image_bytes, detect_format, encode_jpeg, ImageError, ImageInfo};
pub use mock::{MockPredictor, MOCK_MODEL_VERSION};
pub use model_handle::{
    BackendCapability, BackendLoader, HandleState, LoadedModel, ModelHandle, ModelStatus,
    NoBackendLoader, MOCK_WEIGHTS_SENTINEL,
};
pub use selector::{select, PredictionResult, NO_PRODUCT_LABEL, UNKNOWN_LABEL};
pub use service::{InferenceService, Predictor};
pub use video::{
    FfmpegDecoder, FrameSampler, VideoDecoder, VideoError, VideoInferencePipeline, VideoSample,
    VideoStream,
};
