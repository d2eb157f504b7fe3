// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upload endpoint tests
//!
//! Drive the router with in-memory multipart requests and check response
//! shapes, status codes, and that upload temp files never outlive a request.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use product_vision_node::api::{create_router, AppState};
use product_vision_node::config::ModelPaths;
use product_vision_node::vision::{
    BackendCapability, BackendError, BackendLoader, Detection, DetectionSet, DetectorBackend,
    FrameSampler, InferenceService, MockPredictor, NoBackendLoader, VideoDecoder, VideoError,
    VideoInferencePipeline, VideoStream,
};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "vision-test-boundary";

/// Decoder that can open anything but never yields a frame
struct BlankDecoder;

struct BlankStream;

impl VideoDecoder for BlankDecoder {
    fn open(&self, _source: &Path) -> Result<Box<dyn VideoStream>, VideoError> {
        Ok(Box::new(BlankStream))
    }
}

impl VideoStream for BlankStream {
    fn frame_count(&self) -> Option<u64> {
        Some(30)
    }

    fn seek(&mut self, _index: u64) -> Result<(), VideoError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, VideoError> {
        Ok(None)
    }
}

/// Decoder returning a frame from any position
struct SolidDecoder;

struct SolidStream;

impl VideoDecoder for SolidDecoder {
    fn open(&self, _source: &Path) -> Result<Box<dyn VideoStream>, VideoError> {
        Ok(Box::new(SolidStream))
    }
}

impl VideoStream for SolidStream {
    fn frame_count(&self) -> Option<u64> {
        Some(30)
    }

    fn seek(&mut self, _index: u64) -> Result<(), VideoError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, VideoError> {
        Ok(Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            8,
            Rgb([1, 2, 3]),
        ))))
    }
}

struct LaptopBackend;

impl DetectorBackend for LaptopBackend {
    fn detect(&self, _image: &DynamicImage, _min: f32) -> Result<DetectionSet, BackendError> {
        Ok(vec![
            Detection::new(1, "HP EliteBook 840", 0.55),
            Detection::new(0, "Dell Latitude 7490", 0.87),
        ])
    }

    fn model_version(&self) -> &str {
        "yolo-v11"
    }
}

struct LaptopLoader;

impl BackendLoader for LaptopLoader {
    fn load(&self, _weights: &Path) -> Result<Arc<dyn DetectorBackend>, BackendError> {
        Ok(Arc::new(LaptopBackend))
    }
}

struct TestApp {
    router: Router,
    upload_dir: TempDir,
    _weights_dir: TempDir,
}

fn app_with(
    capability: BackendCapability,
    loader: Arc<dyn BackendLoader>,
    weights_present: bool,
    decoder: Arc<dyn VideoDecoder>,
) -> TestApp {
    let weights_dir = tempfile::tempdir().unwrap();
    let weights = weights_dir.path().join("best.onnx");
    if weights_present {
        std::fs::write(&weights, b"weights").unwrap();
    }

    let service = Arc::new(
        InferenceService::new(
            ModelPaths::new(weights.to_string_lossy()),
            capability,
            loader,
        )
        .with_mock_predictor(MockPredictor::seeded(9)),
    );
    let pipeline = Arc::new(VideoInferencePipeline::new(
        FrameSampler::new(decoder),
        service.clone(),
    ));

    let upload_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(service, pipeline, "product_classifier")
        .with_upload_dir(upload_dir.path());

    TestApp {
        router: create_router(state),
        upload_dir,
        _weights_dir: weights_dir,
    }
}

fn mock_app() -> TestApp {
    app_with(
        BackendCapability::Unavailable("not compiled in".into()),
        Arc::new(NoBackendLoader),
        false,
        Arc::new(SolidDecoder),
    )
}

fn png_bytes() -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 12, Rgb([50, 60, 70])))
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn multipart_request(uri: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn dir_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn test_health() {
    let app = mock_app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], "0.1.0");
    assert!(json["build"].as_str().unwrap().starts_with("v0.1.0"));
    assert!(json["features"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "video-frame-sampling"));
}

#[tokio::test]
async fn test_detect_with_mock_backend() {
    let app = mock_app();
    let request = multipart_request("/v1/detect", "file", "shelf.png", &png_bytes());

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["filename"], "shelf.png");
    assert_eq!(json["classId"], 0);
    assert!(json["confidence"].as_f64().unwrap() > 0.0);
    assert!(json["prediction"].is_string());
    assert!(json["metadata"]["modelVersion"]
        .as_str()
        .unwrap()
        .ends_with("-mock"));
    assert!(dir_is_empty(&app.upload_dir));
}

#[tokio::test]
async fn test_detect_with_ready_backend() {
    let app = app_with(
        BackendCapability::Available,
        Arc::new(LaptopLoader),
        true,
        Arc::new(SolidDecoder),
    );
    let request = multipart_request("/v1/detect", "file", "desk.png", &png_bytes());

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "Dell Latitude 7490");
    assert_eq!(json["classId"], 0);
    assert_eq!(json["metadata"]["modelVersion"], "yolo-v11");
    assert_eq!(json["metadata"]["allDetections"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_detect_corrupt_image_is_no_product() {
    let app = app_with(
        BackendCapability::Available,
        Arc::new(LaptopLoader),
        true,
        Arc::new(SolidDecoder),
    );
    let request = multipart_request("/v1/detect", "file", "broken.jpg", b"not an image");

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "No Product Detected");
    assert_eq!(json["classId"], -1);
    assert!(dir_is_empty(&app.upload_dir));
}

#[tokio::test]
async fn test_detect_missing_weights_is_503() {
    let app = app_with(
        BackendCapability::Available,
        Arc::new(LaptopLoader),
        false,
        Arc::new(SolidDecoder),
    );
    let request = multipart_request("/v1/detect", "file", "shelf.png", &png_bytes());

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error_type"], "configuration_error");
    assert!(dir_is_empty(&app.upload_dir));
}

#[tokio::test]
async fn test_detect_without_file_field_is_400() {
    let app = mock_app();
    let request = multipart_request("/v1/detect", "attachment", "shelf.png", &png_bytes());

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_type"], "invalid_request");
}

#[tokio::test]
async fn test_detect_video_with_mock_backend() {
    let app = mock_app();
    let request = multipart_request("/v1/detect-video", "file", "walkthrough.mp4", b"fake video");

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["filename"], "walkthrough.mp4");
    assert_eq!(json["classId"], 0);
    assert!(dir_is_empty(&app.upload_dir));
}

#[tokio::test]
async fn test_detect_video_without_frames_is_400() {
    let app = app_with(
        BackendCapability::Unavailable("not compiled in".into()),
        Arc::new(NoBackendLoader),
        false,
        Arc::new(BlankDecoder),
    );
    let request = multipart_request("/v1/detect-video", "file", "black.mp4", b"fake video");

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_type"], "extraction_error");
    assert!(dir_is_empty(&app.upload_dir));
}

#[tokio::test]
async fn test_models_listing_reports_state() {
    let app = mock_app();
    let request = multipart_request("/v1/detect", "file", "shelf.png", &png_bytes());
    send(&app.router, request).await;

    let request = Request::builder()
        .uri("/v1/models")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["defaultModel"], "product_classifier");
    assert_eq!(json["backendAvailable"], false);
    let models = json["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["name"], "product_classifier");
    assert_eq!(models[0]["state"], "mock");
}
