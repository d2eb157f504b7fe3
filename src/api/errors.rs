// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

use crate::vision::VisionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Malformed upload (missing `file` field, unreadable multipart body)
    InvalidRequest(String),
    /// The uploaded media could not be used
    BadInput {
        error_type: &'static str,
        message: String,
    },
    /// No usable model behind the endpoint
    ServiceUnavailable {
        error_type: &'static str,
        message: String,
    },
    InternalError {
        error_type: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, message) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone()),
            ApiError::BadInput {
                error_type,
                message,
            }
            | ApiError::ServiceUnavailable {
                error_type,
                message,
            }
            | ApiError::InternalError {
                error_type,
                message,
            } => (*error_type, message.clone()),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::BadInput { .. } => 400,
            ApiError::ServiceUnavailable { .. } => 503,
            ApiError::InternalError { .. } => 500,
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        let error_type = err.error_type();
        let message = err.to_string();
        if err.is_client_error() {
            warn!("Rejected upload: {}", message);
            return ApiError::BadInput {
                error_type,
                message,
            };
        }

        match err {
            VisionError::Configuration { .. } | VisionError::BackendInit { .. } => {
                error!("Model unavailable: {}", message);
                ApiError::ServiceUnavailable {
                    error_type,
                    message,
                }
            }
            _ => {
                error!("Prediction failed: {}", message);
                ApiError::InternalError {
                    error_type,
                    message,
                }
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::BadInput { message, .. } => write!(f, "Bad input: {}", message),
            ApiError::ServiceUnavailable { message, .. } => {
                write!(f, "Service unavailable: {}", message)
            }
            ApiError::InternalError { message, .. } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
