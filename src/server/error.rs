//! API error responses

use crate::grafana::GrafanaError;
use crate::keys::KeyError;
use crate::token::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Grafana(#[from] GrafanaError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        ApiError::Token(TokenError::Key(err))
    }
}

/// Error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Token(TokenError::EmptySubject) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Grafana(GrafanaError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Grafana(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Token(TokenError::Key(_)) => "Signing key unavailable; run --install".to_string(),
            ApiError::Token(TokenError::EmptySubject) => {
                "Grafana service account is not configured".to_string()
            }
            ApiError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Token(TokenError::Key(err)) => Some(serde_json::json!(err.to_string())),
            ApiError::Grafana(GrafanaError::Status { status, .. }) => {
                Some(serde_json::json!({ "grafana_status": status }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::Token(_) | ApiError::Internal(_) => error!("{}", self),
            ApiError::Grafana(_) => warn!("{}", self),
            _ => {}
        }

        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.message(),
            details: self.details(),
        });

        (status, body).into_response()
    }
}
