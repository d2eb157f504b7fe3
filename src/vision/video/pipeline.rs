// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Video to prediction: sample one frame, then reuse the image path

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::info;

use super::sampler::FrameSampler;
use crate::vision::errors::{VisionError, VisionResult};
use crate::vision::image_utils::encode_jpeg;
use crate::vision::selector::PredictionResult;
use crate::vision::service::Predictor;

pub struct VideoInferencePipeline {
    sampler: FrameSampler,
    predictor: Arc<dyn Predictor>,
    /// Where extracted frames are written; system temp dir when unset
    frame_dir: Option<PathBuf>,
}

impl VideoInferencePipeline {
    pub fn new(sampler: FrameSampler, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            sampler,
            predictor,
            frame_dir: None,
        }
    }

    pub fn with_frame_dir(mut self, frame_dir: impl Into<PathBuf>) -> Self {
        self.frame_dir = Some(frame_dir.into());
        self
    }

    /// Predict from the representative frame of `video_path`.
    ///
    /// Sampling errors are returned as-is and no prediction is attempted. The
    /// extracted frame file is removed before this returns, and also when the
    /// returned future is dropped early.
    pub async fn predict_from_video(
        &self,
        model_name: &str,
        video_path: &Path,
    ) -> VisionResult<PredictionResult> {
        let sampler = self.sampler.clone();
        let source = video_path.to_path_buf();
        let frame_dir = self.frame_dir.clone();

        let frame_file = tokio::task::spawn_blocking(move || {
            extract_frame(&sampler, &source, frame_dir.as_deref())
        })
        .await
        .map_err(|e| VisionError::Extraction(format!("frame extraction task failed: {}", e)))??;

        let result = self.predictor.predict(model_name, frame_file.path()).await;
        drop(frame_file);
        result
    }
}

/// Sample a frame and write it to a JPEG temp file owned by the caller
fn extract_frame(
    sampler: &FrameSampler,
    source: &Path,
    frame_dir: Option<&Path>,
) -> VisionResult<NamedTempFile> {
    let sample = sampler.sample(source)?;
    info!(
        "🎞️ Extracted frame {} ({}x{}) from {}",
        sample.frame_index,
        sample.image.width(),
        sample.image.height(),
        source.display()
    );

    let jpeg = encode_jpeg(&sample.image)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("frame-").suffix(".jpg");
    let mut file = match frame_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(&jpeg)?;
    file.flush()?;
    Ok(file)
}
