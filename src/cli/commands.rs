// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::VisionConfig;
use crate::vision::{
    BackendCapability, FfmpegDecoder, FrameSampler, InferenceService, LoadedModel, PredictionResult,
    VideoInferencePipeline,
};

/// Arguments for predict command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long)]
    pub image: PathBuf,

    /// Model name (defaults to VISION_MODEL_NAME)
    #[arg(long)]
    pub model: Option<String>,
}

/// Arguments for predict-video command
#[derive(Args, Debug)]
pub struct PredictVideoArgs {
    /// Video file to classify
    #[arg(long)]
    pub video: PathBuf,

    /// Model name (defaults to VISION_MODEL_NAME)
    #[arg(long)]
    pub model: Option<String>,
}

/// Arguments for inspect-model command
#[derive(Args, Debug)]
pub struct InspectModelArgs {
    /// Weights file to load (can also be set via VISION_MODEL_PATH env var)
    #[arg(long, env = "VISION_MODEL_PATH")]
    pub path: Option<String>,

    /// Labels file (can also be set via VISION_MODEL_LABELS env var)
    #[arg(long, env = "VISION_MODEL_LABELS")]
    pub labels: Option<PathBuf>,
}

/// Classify one image and print the prediction JSON
pub async fn predict(args: PredictArgs) -> Result<()> {
    dotenv::dotenv().ok();
    let config = VisionConfig::from_env();

    if !args.image.is_file() {
        return Err(anyhow!("Image not found: {}", args.image.display()));
    }

    let model = args.model.unwrap_or_else(|| config.default_model_name.clone());
    let service = InferenceService::from_config(&config);
    let result = service.predict(&model, &args.image).await?;

    print_prediction(&result)
}

/// Classify a video from its representative frame and print the prediction JSON
pub async fn predict_video(args: PredictVideoArgs) -> Result<()> {
    dotenv::dotenv().ok();
    let config = VisionConfig::from_env();

    let model = args.model.unwrap_or_else(|| config.default_model_name.clone());
    let service = Arc::new(InferenceService::from_config(&config));
    let decoder = Arc::new(FfmpegDecoder::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    ));
    let pipeline = VideoInferencePipeline::new(FrameSampler::new(decoder), service);

    let result = pipeline.predict_from_video(&model, &args.video).await?;

    print_prediction(&result)
}

/// Load a weights file once and report what the node would serve from it
pub async fn inspect_model(args: InspectModelArgs) -> Result<()> {
    dotenv::dotenv().ok();
    let mut config = VisionConfig::from_env();
    if let Some(path) = args.path {
        config.default_model_path = path;
    }
    if args.labels.is_some() {
        config.labels_path = args.labels;
    }

    println!("🔍 Inspecting model at {}", config.default_model_path);

    let service = InferenceService::from_config(&config);
    let loaded = service.load_model(&config.default_model_name).await?;

    let report = match &loaded {
        LoadedModel::Ready(backend) => {
            let class_names = backend.class_names();
            info!("Model exposes {} classes", class_names.len());
            serde_json::json!({
                "state": "ready",
                "path": config.default_model_path,
                "modelVersion": backend.model_version(),
                "classes": class_names,
            })
        }
        LoadedModel::MockFallback => {
            let reason = match service.capability() {
                BackendCapability::Unavailable(reason) => reason.as_str(),
                BackendCapability::Available => "mock weights path",
            };
            serde_json::json!({
                "state": "mock",
                "path": config.default_model_path,
                "reason": reason,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_prediction(result: &PredictionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
