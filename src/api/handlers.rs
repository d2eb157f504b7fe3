// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload endpoint handlers

use std::path::Path;

use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::Multipart;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::errors::ApiError;
use super::http_server::AppState;
use super::response::{DetectResponse, ModelsResponse};
use crate::version;

/// Multipart field carrying the uploaded media
pub const UPLOAD_FIELD: &str = "file";

/// Uploaded file written to a temp file; removed when dropped
struct Upload {
    filename: String,
    file: NamedTempFile,
}

impl Upload {
    fn path(&self) -> &Path {
        self.file.path()
    }
}

/// GET /health - Liveness plus build information
pub async fn health_handler() -> impl IntoResponse {
    let mut body = version::get_version_info();
    body["status"] = serde_json::json!("ok");
    Json(body)
}

/// GET /v1/models - Model handles created so far and their state
pub async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        default_model: state.default_model.clone(),
        backend_available: state.service.capability().is_available(),
        models: state.service.list_models().await,
    })
}

/// POST /v1/detect - Predict the product shown in an uploaded image
///
/// # Request
/// Multipart form with the image in the `file` field.
///
/// # Response
/// `status`, `filename`, `prediction`, `confidence`, `classId`, `metadata`.
/// "No Product Detected" is a successful response.
///
/// # Errors
/// - 400 Bad Request: no `file` field
/// - 503 Service Unavailable: configured weights missing or rejected
/// - 500 Internal Server Error: detector failure
pub async fn detect_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, ApiError> {
    let upload = receive_upload(&state, multipart).await?;
    info!("📷 Image upload received: {}", upload.filename);

    let result = state
        .service
        .predict(&state.default_model, upload.path())
        .await?;

    Ok(Json(DetectResponse::new(upload.filename, result)))
}

/// POST /v1/detect-video - Predict from a representative frame of an uploaded video
///
/// # Errors
/// - 400 Bad Request: no `file` field, video cannot be opened, or no frame
///   could be extracted
/// - 503 / 500 as for `/v1/detect`
pub async fn detect_video_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, ApiError> {
    let upload = receive_upload(&state, multipart).await?;
    info!("🎬 Video upload received: {}", upload.filename);

    let result = state
        .pipeline
        .predict_from_video(&state.default_model, upload.path())
        .await?;

    Ok(Json(DetectResponse::new(upload.filename, result)))
}

/// Stream the `file` field into a temp file that keeps the upload's extension
async fn receive_upload(state: &AppState, mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Invalid multipart body: {}", e);
        ApiError::InvalidRequest(format!("invalid multipart body: {}", e))
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("failed to read upload: {}", e)))?;

        let file = create_temp_file(state, &upload_suffix(&filename))?;
        tokio::fs::write(file.path(), &bytes)
            .await
            .map_err(|e| internal_io_error("failed to store upload", e))?;
        debug!("Stored {} bytes at {}", bytes.len(), file.path().display());

        return Ok(Upload { filename, file });
    }

    Err(ApiError::InvalidRequest(format!(
        "missing '{}' field in multipart body",
        UPLOAD_FIELD
    )))
}

fn create_temp_file(state: &AppState, suffix: &str) -> Result<NamedTempFile, ApiError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("upload-").suffix(suffix);
    match &state.upload_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| internal_io_error("failed to create temp file", e))
}

fn internal_io_error(context: &str, err: std::io::Error) -> ApiError {
    ApiError::InternalError {
        error_type: "io_error",
        message: format!("{}: {}", context, err),
    }
}

/// `.ext` of the client filename, restricted to a short alphanumeric extension
fn upload_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}
