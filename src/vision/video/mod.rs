// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Video input: pick one representative frame and run image prediction on it
//!
//! Components:
//! - `VideoDecoder` / `VideoStream` - decoding capability (ffmpeg, or a stub in tests)
//! - `FrameSampler` - middle frame first, first frame as fallback
//! - `VideoInferencePipeline` - sampler + inference service

pub mod ffmpeg;
pub mod pipeline;
pub mod sampler;

use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

pub use ffmpeg::FfmpegDecoder;
pub use pipeline::VideoInferencePipeline;
pub use sampler::FrameSampler;

/// Errors reported by a video decoder
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("cannot open video: {0}")]
    Open(String),

    #[error("cannot seek to frame {index}: {message}")]
    Seek { index: u64, message: String },

    #[error("cannot read frame: {0}")]
    Read(String),
}

/// Opens video sources
pub trait VideoDecoder: Send + Sync {
    fn open(&self, source: &Path) -> Result<Box<dyn VideoStream>, VideoError>;
}

/// An opened video, positioned at frame 0
pub trait VideoStream: Send {
    /// Total frames, if the container reports it
    fn frame_count(&self) -> Option<u64>;

    /// Position the stream so the next read returns frame `index`
    fn seek(&mut self, index: u64) -> Result<(), VideoError>;

    /// Read the frame at the current position and advance.
    ///
    /// `Ok(None)` means there is no frame at this position.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>, VideoError>;
}

/// One frame pulled out of a video for prediction
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub frame_index: u64,
    pub image: DynamicImage,
}
