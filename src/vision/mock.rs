// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Simulated predictions for handles without a usable detector backend

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde_json::{json, Map};
use tracing::warn;

use super::selector::PredictionResult;

/// Version tag carried by every mock prediction
pub const MOCK_MODEL_VERSION: &str = "1.0.0-mock";

/// Class id reported by mock predictions
pub const MOCK_CLASS_ID: i64 = 0;

/// One canned answer
#[derive(Debug, Clone, PartialEq)]
pub struct MockProduct {
    pub label: &'static str,
    pub brand: &'static str,
    pub sku_hint: &'static str,
    pub confidence: f32,
    pub sales_pitch: &'static str,
}

/// Products that match the demo inventory
pub const MOCK_CATALOG: &[MockProduct] = &[
    MockProduct {
        label: "Dell Latitude 7490",
        brand: "Dell",
        sku_hint: "SKU-LAPTOP-let01",
        confidence: 0.94,
        sales_pitch: "This Dell Latitude is built like a tank.",
    },
    MockProduct {
        label: "HP EliteBook 840",
        brand: "HP",
        sku_hint: "SKU-LAPTOP-al01",
        confidence: 0.91,
        sales_pitch: "HP EliteBook, the balanced choice.",
    },
    MockProduct {
        label: "MacBook Pro M1",
        brand: "Apple",
        sku_hint: "SKU-LAPTOP-asu01",
        confidence: 0.98,
        sales_pitch: "A beast from Apple.",
    },
];

/// Picks a catalog entry uniformly at random
pub struct MockPredictor {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for MockPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPredictor")
            .field("catalog", &MOCK_CATALOG.len())
            .finish_non_exhaustive()
    }
}

impl Default for MockPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPredictor {
    /// Predictor seeded from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Predictor with a fixed seed, for reproducible selection
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn predict(&self) -> PredictionResult {
        warn!("⚠️ Returning mock prediction - no detector backend is active");

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let product = MOCK_CATALOG
            .choose(&mut *rng)
            .unwrap_or(&MOCK_CATALOG[0]);

        let mut metadata = Map::new();
        metadata.insert("modelVersion".to_string(), json!(MOCK_MODEL_VERSION));
        metadata.insert("brandDetected".to_string(), json!(product.brand));
        metadata.insert("skuMatch".to_string(), json!(product.sku_hint));
        metadata.insert("salesPitch".to_string(), json!(product.sales_pitch));

        PredictionResult {
            label: product.label.to_string(),
            confidence: product.confidence,
            class_id: MOCK_CLASS_ID,
            metadata,
        }
    }
}
