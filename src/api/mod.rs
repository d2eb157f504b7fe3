// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod handlers;
pub mod http_server;
pub mod response;

pub use errors::{ApiError, ErrorResponse};
pub use handlers::{detect_handler, detect_video_handler, UPLOAD_FIELD};
pub use http_server::{create_router, start_server, AppState, MAX_UPLOAD_SIZE};
pub use response::{DetectResponse, ModelsResponse};
