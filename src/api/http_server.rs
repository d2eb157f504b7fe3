// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{detect_handler, detect_video_handler, health_handler, models_handler};
use crate::config::VisionConfig;
use crate::vision::{FfmpegDecoder, FrameSampler, InferenceService, VideoInferencePipeline};

/// Largest accepted upload (videos included)
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub pipeline: Arc<VideoInferencePipeline>,
    /// Model used by the upload endpoints
    pub default_model: String,
    /// Where uploads are buffered; system temp dir when unset
    pub upload_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        service: Arc<InferenceService>,
        pipeline: Arc<VideoInferencePipeline>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            service,
            pipeline,
            default_model: default_model.into(),
            upload_dir: None,
        }
    }

    pub fn with_upload_dir(mut self, upload_dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(upload_dir.into());
        self
    }

    /// Service, ffmpeg-backed pipeline and default model from configuration
    pub fn from_config(config: &VisionConfig) -> Self {
        let service = Arc::new(InferenceService::from_config(config));
        let decoder = Arc::new(FfmpegDecoder::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        ));
        let pipeline = Arc::new(VideoInferencePipeline::new(
            FrameSampler::new(decoder),
            service.clone(),
        ));
        Self::new(service, pipeline, config.default_model_name.clone())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Model handles
        .route("/v1/models", get(models_handler))
        // Image upload
        .route("/v1/detect", post(detect_handler))
        // Video upload
        .route("/v1/detect-video", post(detect_video_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_server(addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
