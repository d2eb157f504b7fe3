// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! InferenceService tests
//!
//! Cover the predict contract end to end with stub backends:
//! - single-flight model loading under concurrent first requests
//! - an abandoned first request does not restart the load
//! - mock fallback when no detector backend is available
//! - detection ranking and degenerate-input handling with a ready backend
//! - load failures and retry after the weights appear

use futures_util::future::join_all;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use product_vision_node::config::ModelPaths;
use product_vision_node::vision::{
    BackendCapability, BackendError, BackendLoader, Detection, DetectionSet, DetectorBackend,
    HandleState, InferenceService, MockPredictor, VisionError, MOCK_WEIGHTS_SENTINEL,
    NO_PRODUCT_LABEL,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Backend returning the same outcome for every image
struct StubBackend {
    outcome: fn() -> Result<DetectionSet, BackendError>,
}

impl DetectorBackend for StubBackend {
    fn detect(&self, _image: &DynamicImage, _min: f32) -> Result<DetectionSet, BackendError> {
        (self.outcome)()
    }

    fn model_version(&self) -> &str {
        "yolo-v11"
    }
}

/// Loader counting constructions; each one takes a while
struct CountingLoader {
    calls: AtomicUsize,
    outcome: fn() -> Result<DetectionSet, BackendError>,
}

impl CountingLoader {
    fn new(outcome: fn() -> Result<DetectionSet, BackendError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackendLoader for CountingLoader {
    fn load(&self, _weights: &Path) -> Result<Arc<dyn DetectorBackend>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        Ok(Arc::new(StubBackend {
            outcome: self.outcome,
        }))
    }
}

fn two_detections() -> Result<DetectionSet, BackendError> {
    Ok(vec![Detection::new(2, "X", 0.3), Detection::new(5, "Y", 0.8)])
}

fn array_error() -> Result<DetectionSet, BackendError> {
    Err(BackendError::runtime(
        "need at least one array to concatenate",
    ))
}

fn fatal_error() -> Result<DetectionSet, BackendError> {
    Err(BackendError::runtime("execution provider crashed"))
}

struct Fixture {
    dir: TempDir,
    weights: PathBuf,
    image: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("best.onnx");
    std::fs::write(&weights, b"weights").unwrap();

    let image = dir.path().join("shelf.png");
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([120, 30, 200])))
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    std::fs::write(&image, buffer.into_inner()).unwrap();

    Fixture {
        dir,
        weights,
        image,
    }
}

fn ready_service(weights: &Path, loader: Arc<CountingLoader>) -> InferenceService {
    InferenceService::new(
        ModelPaths::new(weights.to_string_lossy()),
        BackendCapability::Available,
        loader,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_predicts_load_once() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = Arc::new(ready_service(&fx.weights, loader.clone()));

    let tasks = (0..8).map(|_| {
        let service = service.clone();
        let image = fx.image.clone();
        tokio::spawn(async move { service.predict("classifier", &image).await })
    });

    for joined in join_all(tasks).await {
        let result = joined.unwrap().unwrap();
        assert_eq!(result.label, "Y");
    }

    assert_eq!(loader.calls(), 1);
    assert_eq!(service.handle("classifier").await.state(), HandleState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aborted_first_predict_does_not_restart_load() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = Arc::new(ready_service(&fx.weights, loader.clone()));

    let spawn_predict = || {
        let service = service.clone();
        let image = fx.image.clone();
        tokio::spawn(async move { service.predict("classifier", &image).await })
    };

    let leader = spawn_predict();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let follower = spawn_predict();
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();

    let result = follower.await.unwrap().unwrap();
    assert_eq!(result.label, "Y");
    assert_eq!(loader.calls(), 1);
    assert!(leader.await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_later_predicts_reuse_loaded_backend() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = ready_service(&fx.weights, loader.clone());

    for _ in 0..3 {
        service.predict("classifier", &fx.image).await.unwrap();
    }
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_unavailable_backend_returns_mock_prediction() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = InferenceService::new(
        ModelPaths::new("/nonexistent/best.onnx"),
        BackendCapability::Unavailable("not compiled in".into()),
        loader.clone(),
    )
    .with_mock_predictor(MockPredictor::seeded(11));

    let result = service.predict("classifier", &fx.image).await.unwrap();

    assert!(result.model_version().unwrap().contains("mock"));
    assert!(result.confidence > 0.0);
    assert_eq!(result.class_id, 0);
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_mock_sentinel_path_returns_mock_prediction() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = InferenceService::new(
        ModelPaths::new(MOCK_WEIGHTS_SENTINEL),
        BackendCapability::Available,
        loader.clone(),
    );

    let result = service.predict("classifier", &fx.image).await.unwrap();
    assert!(result.model_version().unwrap().ends_with("-mock"));
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_ready_backend_selects_highest_confidence() {
    let fx = fixture();
    let service = ready_service(&fx.weights, CountingLoader::new(two_detections));

    let result = service.predict("classifier", &fx.image).await.unwrap();

    assert_eq!(result.label, "Y");
    assert!((result.confidence - 0.8).abs() < 1e-6);
    assert_eq!(result.class_id, 5);
    assert_eq!(result.model_version(), Some("yolo-v11"));
    assert_eq!(
        result.metadata["allDetections"].as_array().unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_array_error_becomes_no_product_detected() {
    let fx = fixture();
    let service = ready_service(&fx.weights, CountingLoader::new(array_error));

    let result = service.predict("classifier", &fx.image).await.unwrap();

    assert_eq!(result.label, NO_PRODUCT_LABEL);
    assert_eq!(result.class_id, -1);
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn test_other_backend_errors_are_inference_failures() {
    let fx = fixture();
    let service = ready_service(&fx.weights, CountingLoader::new(fatal_error));

    let err = service.predict("classifier", &fx.image).await.unwrap_err();
    assert!(matches!(err, VisionError::Inference(ref m) if m.contains("crashed")));
}

#[tokio::test]
async fn test_missing_weights_fail_then_recover() {
    let fx = fixture();
    let late_weights = fx.dir.path().join("late.onnx");
    let loader = CountingLoader::new(two_detections);
    let service = ready_service(&late_weights, loader.clone());

    let err = service.predict("classifier", &fx.image).await.unwrap_err();
    assert!(matches!(err, VisionError::Configuration { ref model, .. } if model == "classifier"));
    assert_eq!(service.handle("classifier").await.state(), HandleState::Unloaded);
    assert_eq!(loader.calls(), 0);

    std::fs::write(&late_weights, b"weights").unwrap();

    let result = service.predict("classifier", &fx.image).await.unwrap();
    assert_eq!(result.label, "Y");
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_models_are_loaded_independently() {
    let fx = fixture();
    let loader = CountingLoader::new(two_detections);
    let service = InferenceService::new(
        ModelPaths::new(fx.weights.to_string_lossy()).with_model("demo", MOCK_WEIGHTS_SENTINEL),
        BackendCapability::Available,
        loader.clone(),
    );

    let real = service.predict("classifier", &fx.image).await.unwrap();
    let mock = service.predict("demo", &fx.image).await.unwrap();

    assert_eq!(real.model_version(), Some("yolo-v11"));
    assert!(mock.model_version().unwrap().ends_with("-mock"));

    let states: Vec<(String, HandleState)> = service
        .list_models()
        .await
        .into_iter()
        .map(|m| (m.name, m.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("classifier".to_string(), HandleState::Ready),
            ("demo".to_string(), HandleState::Mock),
        ]
    );
}
