// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use product_vision_node::{
    api::{start_server, AppState},
    config::VisionConfig,
    version,
};
use std::env;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading configuration
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Product Vision Node...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!();

    let config = VisionConfig::from_env();

    println!("👁️  Initializing inference service...");
    println!("   Default model: {}", config.default_model_name);
    println!("   Weights: {}", config.default_model_path);
    for (name, path) in &config.models {
        println!("   Extra model: {} -> {}", name, path);
    }

    let state = AppState::from_config(&config);
    if state.service.capability().is_available() {
        println!("✅ Detector backend available (models load on first request)");
    } else {
        println!("⚠️  Detector backend unavailable - predictions will use the mock catalog");
    }

    // Warm the default model so configuration errors show up at startup
    match state.service.load_model(&config.default_model_name).await {
        Ok(_) => println!("✅ Default model ready"),
        Err(e) => {
            println!("⚠️  Failed to load default model: {}", e);
            println!("   /v1/detect will return 503 until the weights are fixed");
        }
    }

    let addr = config.api_addr();
    println!("🌐 API server starting on http://{}", addr);

    tokio::select! {
        result = start_server(&addr, state) => result?,
        _ = signal::ctrl_c() => {
            println!("\n👋 Shutting down Product Vision Node...");
        }
    }

    Ok(())
}
