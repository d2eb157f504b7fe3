// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lifecycle of one loadable detection model
//!
//! ```text
//! Unloaded -> Loading -> Ready(backend)
//!                     -> MockFallback   (sentinel weights path or backend unavailable)
//!                     -> Unloaded       (configuration / backend init error)
//! ```
//!
//! `Ready` and `MockFallback` are terminal for a handle. A load runs in its own
//! task, so callers that give up waiting never cancel it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::detector::{BackendError, DetectorBackend};
use super::errors::{VisionError, VisionResult};

/// Weights path that requests the mock predictor explicitly
pub const MOCK_WEIGHTS_SENTINEL: &str = "dummy_path";

/// Whether a real detector backend can be constructed in this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCapability {
    Available,
    Unavailable(String),
}

impl BackendCapability {
    /// Probe the compiled-in detector backend.
    ///
    /// `force_mock` lets operators disable the backend without rebuilding.
    pub fn probe(force_mock: bool) -> Self {
        if force_mock {
            return BackendCapability::Unavailable(
                "detector backend disabled by configuration".to_string(),
            );
        }
        if cfg!(feature = "onnx") {
            BackendCapability::Available
        } else {
            BackendCapability::Unavailable("built without the `onnx` feature".to_string())
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, BackendCapability::Available)
    }
}

/// Constructs a detector backend from a weights file
pub trait BackendLoader: Send + Sync {
    fn load(&self, weights: &Path) -> Result<Arc<dyn DetectorBackend>, BackendError>;
}

/// Loader used when no detector backend is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackendLoader;

impl BackendLoader for NoBackendLoader {
    fn load(&self, weights: &Path) -> Result<Arc<dyn DetectorBackend>, BackendError> {
        Err(BackendError::runtime(format!(
            "no detector backend available to load {}",
            weights.display()
        )))
    }
}

/// Internal lifecycle state. The backend exists only in `Ready`.
#[derive(Clone)]
enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn DetectorBackend>),
    MockFallback,
}

/// Outcome of a completed load
#[derive(Clone)]
pub enum LoadedModel {
    Ready(Arc<dyn DetectorBackend>),
    MockFallback,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadedModel::Ready(backend) => f
                .debug_tuple("Ready")
                .field(&backend.model_version())
                .finish(),
            LoadedModel::MockFallback => f.write_str("MockFallback"),
        }
    }
}

/// Published once by the load task; `None` while the load is running
type LoadOutcome = Option<Result<LoadedModel, Arc<VisionError>>>;

/// Externally visible handle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Unloaded,
    Loading,
    Ready,
    Mock,
}

/// Status entry for model listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub name: String,
    pub source_path: String,
    pub state: HandleState,
}

/// One named model and its load lifecycle
pub struct ModelHandle {
    name: String,
    source_path: String,
    capability: BackendCapability,
    loader: Arc<dyn BackendLoader>,
    state: RwLock<ModelState>,
    /// Outcome channel of the running load, shared by every waiter
    in_flight: Mutex<Option<watch::Receiver<LoadOutcome>>>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("capability", &self.capability)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<String>,
        capability: BackendCapability,
        loader: Arc<dyn BackendLoader>,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            capability,
            loader,
            state: RwLock::new(ModelState::Unloaded),
            in_flight: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Current state; never blocks on an in-flight load
    pub fn state(&self) -> HandleState {
        match &*self.read_state() {
            ModelState::Unloaded => HandleState::Unloaded,
            ModelState::Loading => HandleState::Loading,
            ModelState::Ready(_) => HandleState::Ready,
            ModelState::MockFallback => HandleState::Mock,
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            name: self.name.clone(),
            source_path: self.source_path.clone(),
            state: self.state(),
        }
    }

    /// Load the model unless a previous load already reached a terminal state.
    ///
    /// The first caller starts one load task and every concurrent caller waits
    /// for that task's outcome. Dropping a waiting future leaves the task
    /// running. Failed loads leave the handle `Unloaded`, so the next caller
    /// starts a fresh attempt.
    pub async fn ensure_loaded(self: &Arc<Self>) -> VisionResult<LoadedModel> {
        if let Some(loaded) = self.terminal() {
            return Ok(loaded);
        }

        let mut outcome = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(loaded) = self.terminal() {
                return Ok(loaded);
            }
            match in_flight.as_ref() {
                Some(receiver) => receiver.clone(),
                None => {
                    let receiver = self.spawn_load();
                    *in_flight = Some(receiver.clone());
                    receiver
                }
            }
        };

        let published = outcome
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());

        match published {
            Ok(Some(Ok(loaded))) => Ok(loaded),
            Ok(Some(Err(err))) => Err(self.reissue(&err)),
            Ok(None) | Err(_) => Err(VisionError::BackendInit {
                model: self.name.clone(),
                message: "load task ended without an outcome".to_string(),
            }),
        }
    }

    /// Mark the handle `Loading` and run the load detached from any caller
    fn spawn_load(self: &Arc<Self>) -> watch::Receiver<LoadOutcome> {
        let (sender, receiver) = watch::channel(None);
        self.set_state(ModelState::Loading);

        let handle = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = handle.load().await;
            handle.set_state(match &outcome {
                Ok(LoadedModel::Ready(backend)) => ModelState::Ready(Arc::clone(backend)),
                Ok(LoadedModel::MockFallback) => ModelState::MockFallback,
                Err(_) => ModelState::Unloaded,
            });
            *handle.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
            // No receivers left is fine: the state above already records the outcome
            let _ = sender.send(Some(outcome.map_err(Arc::new)));
        });

        receiver
    }

    /// Per-caller copy of a shared load error
    fn reissue(&self, err: &VisionError) -> VisionError {
        match err {
            VisionError::Configuration { model, path } => VisionError::Configuration {
                model: model.clone(),
                path: path.clone(),
            },
            VisionError::BackendInit { model, message } => VisionError::BackendInit {
                model: model.clone(),
                message: message.clone(),
            },
            other => VisionError::BackendInit {
                model: self.name.clone(),
                message: other.to_string(),
            },
        }
    }

    async fn load(&self) -> VisionResult<LoadedModel> {
        info!("⚡ Loading model '{}' from: {}", self.name, self.source_path);

        if self.source_path == MOCK_WEIGHTS_SENTINEL {
            warn!("⚠️ Dummy path detected for '{}'. Using mock predictions.", self.name);
            return Ok(LoadedModel::MockFallback);
        }

        if let BackendCapability::Unavailable(reason) = &self.capability {
            error!(
                "❌ Detector backend unavailable ({}). Falling back to mock for '{}'.",
                reason, self.name
            );
            return Ok(LoadedModel::MockFallback);
        }

        let weights = PathBuf::from(&self.source_path);
        if !tokio::fs::try_exists(&weights).await.unwrap_or(false) {
            error!("❌ Model file not found at: {}", self.source_path);
            return Err(VisionError::Configuration {
                model: self.name.clone(),
                path: self.source_path.clone(),
            });
        }

        let loader = Arc::clone(&self.loader);
        let backend = tokio::task::spawn_blocking(move || loader.load(&weights))
            .await
            .map_err(|e| VisionError::BackendInit {
                model: self.name.clone(),
                message: format!("loader task failed: {}", e),
            })?
            .map_err(|e| {
                error!("❌ Failed to load model '{}': {}", self.name, e);
                VisionError::BackendInit {
                    model: self.name.clone(),
                    message: e.to_string(),
                }
            })?;

        info!(
            "✅ Model '{}' loaded successfully ({})",
            self.name,
            backend.model_version()
        );
        Ok(LoadedModel::Ready(backend))
    }

    fn terminal(&self) -> Option<LoadedModel> {
        match &*self.read_state() {
            ModelState::Ready(backend) => Some(LoadedModel::Ready(Arc::clone(backend))),
            ModelState::MockFallback => Some(LoadedModel::MockFallback),
            ModelState::Unloaded | ModelState::Loading => None,
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ModelState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
