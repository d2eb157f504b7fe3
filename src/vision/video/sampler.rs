// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Representative frame selection

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{VideoDecoder, VideoError, VideoSample, VideoStream};
use crate::vision::errors::{VisionError, VisionResult};

/// Extracts one still frame from a video.
///
/// Tries the middle frame first (more likely to show the subject than a
/// lead-in), then reopens the source and reads the first frame.
#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler").finish_non_exhaustive()
    }
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn VideoDecoder>) -> Self {
        Self { decoder }
    }

    /// Blocking; call from a blocking thread.
    ///
    /// # Errors
    /// - `VisionError::Input` if the source cannot be opened at all
    /// - `VisionError::Extraction` if neither the middle nor the first frame can be read
    pub fn sample(&self, source: &Path) -> VisionResult<VideoSample> {
        let mut stream = self.decoder.open(source).map_err(|e| {
            VisionError::Input(format!("{}: {}", source.display(), e))
        })?;

        let frame_count = stream.frame_count().unwrap_or(0);
        debug!("Video {} reports {} frames", source.display(), frame_count);

        if frame_count > 0 {
            let middle = frame_count / 2;
            match read_at(stream.as_mut(), middle) {
                Ok(Some(image)) => {
                    return Ok(VideoSample {
                        frame_index: middle,
                        image,
                    })
                }
                Ok(None) => warn!("No frame at index {} of {}", middle, source.display()),
                Err(e) => warn!("Failed to read middle frame of {}: {}", source.display(), e),
            }
        }
        drop(stream);

        warn!("Falling back to first frame of {}", source.display());
        let mut stream = self.decoder.open(source).map_err(|e| {
            VisionError::Extraction(format!("reopening {} failed: {}", source.display(), e))
        })?;

        match stream.read_frame() {
            Ok(Some(image)) => Ok(VideoSample {
                frame_index: 0,
                image,
            }),
            Ok(None) => Err(VisionError::Extraction(format!(
                "{} has no readable frames",
                source.display()
            ))),
            Err(e) => Err(VisionError::Extraction(format!(
                "{}: {}",
                source.display(),
                e
            ))),
        }
    }
}

fn read_at(
    stream: &mut dyn VideoStream,
    index: u64,
) -> Result<Option<image::DynamicImage>, VideoError> {
    stream.seek(index)?;
    stream.read_frame()
}
