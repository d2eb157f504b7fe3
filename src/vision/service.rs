// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference service facade
//!
//! Resolves a model name to a [`ModelHandle`], loads it once, and routes the
//! request to the real detector or the mock predictor depending on how the
//! load ended.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::detector::DetectorAdapter;
use super::errors::VisionResult;
use super::mock::MockPredictor;
use super::model_handle::{
    BackendCapability, BackendLoader, LoadedModel, ModelHandle, ModelStatus,
};
use super::selector::{select, PredictionResult};
use crate::config::{ModelPaths, VisionConfig};

/// Anything that turns an image file into a prediction
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, model_name: &str, image_path: &Path) -> VisionResult<PredictionResult>;
}

/// Named model registry plus the predict pipeline
pub struct InferenceService {
    paths: ModelPaths,
    capability: BackendCapability,
    loader: Arc<dyn BackendLoader>,
    registry: RwLock<HashMap<String, Arc<ModelHandle>>>,
    adapter: DetectorAdapter,
    mock: MockPredictor,
}

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("paths", &self.paths)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

impl InferenceService {
    pub fn new(
        paths: ModelPaths,
        capability: BackendCapability,
        loader: Arc<dyn BackendLoader>,
    ) -> Self {
        Self {
            paths,
            capability,
            loader,
            registry: RwLock::new(HashMap::new()),
            adapter: DetectorAdapter::new(),
            mock: MockPredictor::new(),
        }
    }

    /// Replace the mock predictor (e.g. with a seeded one)
    pub fn with_mock_predictor(mut self, mock: MockPredictor) -> Self {
        self.mock = mock;
        self
    }

    /// Build the service for this node: probe the backend and wire the
    /// configured loader
    pub fn from_config(config: &VisionConfig) -> Self {
        let capability = BackendCapability::probe(config.force_mock);
        info!("Detector backend capability: {:?}", capability);
        Self::new(config.model_paths(), capability, default_loader(config))
    }

    pub fn capability(&self) -> &BackendCapability {
        &self.capability
    }

    /// Handle for `model_name`, created on first access
    pub async fn handle(&self, model_name: &str) -> Arc<ModelHandle> {
        if let Some(handle) = self.registry.read().await.get(model_name) {
            return Arc::clone(handle);
        }

        let mut registry = self.registry.write().await;
        let handle = registry.entry(model_name.to_string()).or_insert_with(|| {
            let source_path = self.paths.resolve(model_name);
            debug!("Registering model '{}' -> {}", model_name, source_path);
            Arc::new(ModelHandle::new(
                model_name,
                source_path,
                self.capability.clone(),
                Arc::clone(&self.loader),
            ))
        });
        Arc::clone(handle)
    }

    /// Load `model_name` without running a prediction
    pub async fn load_model(&self, model_name: &str) -> VisionResult<LoadedModel> {
        self.handle(model_name).await.ensure_loaded().await
    }

    /// Predict the product shown in the image at `image_path`.
    ///
    /// Waits for an in-flight load of the same model instead of starting
    /// another one.
    pub async fn predict(
        &self,
        model_name: &str,
        image_path: &Path,
    ) -> VisionResult<PredictionResult> {
        match self.load_model(model_name).await? {
            LoadedModel::Ready(backend) => {
                info!("🔮 Running prediction with '{}' on {}", model_name, image_path.display());
                let model_version = backend.model_version().to_string();
                let detections = self.adapter.detect(backend, image_path).await?;
                Ok(select(&detections, &model_version))
            }
            LoadedModel::MockFallback => Ok(self.mock.predict()),
        }
    }

    /// Status of every handle created so far, sorted by name
    pub async fn list_models(&self) -> Vec<ModelStatus> {
        let mut models: Vec<ModelStatus> = self
            .registry
            .read()
            .await
            .values()
            .map(|handle| handle.status())
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }
}

#[async_trait]
impl Predictor for InferenceService {
    async fn predict(&self, model_name: &str, image_path: &Path) -> VisionResult<PredictionResult> {
        InferenceService::predict(self, model_name, image_path).await
    }
}

#[cfg(feature = "onnx")]
fn default_loader(config: &VisionConfig) -> Arc<dyn BackendLoader> {
    use super::detector::yolo::OnnxYoloLoader;

    Arc::new(
        OnnxYoloLoader::new(config.model_version.clone())
            .with_labels_path(config.labels_path.clone())
            .with_input_size(config.input_size),
    )
}

#[cfg(not(feature = "onnx"))]
fn default_loader(_config: &VisionConfig) -> Arc<dyn BackendLoader> {
    Arc::new(super::model_handle::NoBackendLoader)
}
