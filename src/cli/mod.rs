// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Product Vision Node CLI
#[derive(Parser, Debug)]
#[command(name = "vision-cli")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "CLI tools for running product predictions locally", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Predict the product shown in an image
    Predict(commands::PredictArgs),

    /// Predict the product shown in a video
    PredictVideo(commands::PredictVideoArgs),

    /// Load a weights file and print its state and class names
    InspectModel(commands::InspectModelArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Predict(args) => commands::predict(args).await,
        Commands::PredictVideo(args) => commands::predict_video(args).await,
        Commands::InspectModel(args) => commands::inspect_model(args).await,
    }
}
