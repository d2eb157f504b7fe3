// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Video decoding through the `ffprobe` / `ffmpeg` command-line tools

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use super::{VideoDecoder, VideoError, VideoStream};

/// Runs `ffprobe` to open a source and `ffmpeg` to pull single frames as PNG
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn probe_frame_count(&self, source: &Path) -> Result<Option<u64>, VideoError> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-count_packets")
            .arg("-show_entries")
            .arg("stream=nb_read_packets")
            .arg("-of")
            .arg("csv=p=0")
            .arg(source);

        let output = run(cmd, &self.ffprobe_path).map_err(VideoError::Open)?;
        if !output.status.success() {
            return Err(VideoError::Open(stderr_message(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("").trim();
        if first_line.is_empty() {
            return Err(VideoError::Open("no video stream found".to_string()));
        }
        Ok(parse_frame_count(first_line))
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, source: &Path) -> Result<Box<dyn VideoStream>, VideoError> {
        if !source.is_file() {
            return Err(VideoError::Open(format!(
                "file not found: {}",
                source.display()
            )));
        }

        let frame_count = self.probe_frame_count(source)?;
        debug!("ffprobe: {} has {:?} frames", source.display(), frame_count);

        Ok(Box::new(FfmpegStream {
            ffmpeg_path: self.ffmpeg_path.clone(),
            source: source.to_path_buf(),
            frame_count,
            position: 0,
        }))
    }
}

/// Position-tracking handle; every read spawns one `ffmpeg` process
#[derive(Debug)]
pub struct FfmpegStream {
    ffmpeg_path: String,
    source: PathBuf,
    frame_count: Option<u64>,
    position: u64,
}

impl VideoStream for FfmpegStream {
    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<(), VideoError> {
        if let Some(count) = self.frame_count {
            if index >= count {
                return Err(VideoError::Seek {
                    index,
                    message: format!("video has {} frames", count),
                });
            }
        }
        self.position = index;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, VideoError> {
        let index = self.position;
        let select = format!("select=eq(n\\,{})", index);

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&self.source)
            .arg("-vf")
            .arg(&select)
            .arg("-vsync")
            .arg("0")
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("-");

        let output = run(cmd, &self.ffmpeg_path).map_err(VideoError::Read)?;
        if !output.status.success() {
            return Err(VideoError::Read(stderr_message(&output)));
        }

        self.position += 1;
        if output.stdout.is_empty() {
            return Ok(None);
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map(Some)
            .map_err(|e| VideoError::Read(format!("frame {} is not a valid image: {}", index, e)))
    }
}

fn run(mut cmd: Command, program: &str) -> Result<Output, String> {
    cmd.output()
        .map_err(|e| format!("failed to run {}: {}", program, e))
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    if message.is_empty() {
        format!("exited with {}", output.status)
    } else {
        message.to_string()
    }
}

/// `nb_read_packets` is `N/A` for some containers
fn parse_frame_count(value: &str) -> Option<u64> {
    value.trim().trim_end_matches(',').parse::<u64>().ok()
}
