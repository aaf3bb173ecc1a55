use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::core::ErrorCode;

/// API-layer error type
#[derive(Debug)]
pub enum ApiError {
    /// 400 - symbol query parameter absent or blank
    MissingSymbol,

    /// 405 - anything but GET
    MethodNotAllowed,

    /// 502 - upstream provider failed or returned garbage
    Provider {
        code: ErrorCode,
        provider: String,
        details: String,
    },

    /// 503 - rules document could not be loaded
    ConfigUnavailable(String),
}

#[derive(Serialize)]
struct ErrorDetail {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

impl ApiError {
    pub fn provider(provider: &str, err: &anyhow::Error) -> Self {
        ApiError::Provider {
            code: ErrorCode::classify(err),
            provider: provider.to_string(),
            details: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::MissingSymbol => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: ErrorCode::MissingSymbol,
                    message: "Symbol is required.".into(),
                    provider: None,
                    details: None,
                },
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                ErrorDetail {
                    code: ErrorCode::MethodNotAllowed,
                    message: "Only GET is allowed.".into(),
                    provider: None,
                    details: None,
                },
            ),
            ApiError::Provider {
                code,
                provider,
                details,
            } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail {
                    code,
                    message: "Failed to fetch metrics.".into(),
                    provider: Some(provider),
                    details: Some(details),
                },
            ),
            ApiError::ConfigUnavailable(details) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail {
                    code: ErrorCode::ConfigUnavailable,
                    message: "Rules could not be loaded.".into(),
                    provider: None,
                    details: Some(details),
                },
            ),
        };

        (status, Json(ErrorBody { error: detail })).into_response()
    }
}
