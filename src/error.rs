//! Typed errors and HTTP mapping.

use crate::rules::MessageBag;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Programmer and configuration errors. These are never swallowed by bulk isolation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown endpoint: '{0}'")]
    UnknownEndpoint(String),
    #[error("you must provide a model identifier '{key}' that exists inside the field list")]
    MissingIdentifier { key: String },
    #[error("invalid rule '{rule}' on {field}: {message}")]
    InvalidRule {
        field: String,
        rule: String,
        message: String,
    },
    #[error("unknown table: '{0}'")]
    UnknownTable(String),
    #[error("internal requests need a dispatcher")]
    NoDispatcher,
    #[error("config load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the given data was invalid")]
    Validation(MessageBag),
    #[error("you can only process {limit} at a time, given {given}")]
    BulkLimitExceeded { limit: usize, given: usize },
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("action failed: {0}")]
    Action(String),
}

impl ApiError {
    /// HTTP-style error with a fixed status, as raised by the `error*` response helpers.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Action(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BulkLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            ApiError::Http { status, .. } => *status,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Config(_) => "config_error",
            ApiError::Validation(_) => "validation_error",
            ApiError::BulkLimitExceeded { .. } => "bulk_limit_exceeded",
            ApiError::Conflict(_) => "conflict",
            ApiError::Action(_) => "action_error",
            ApiError::Http { status, .. } => match status.as_u16() {
                400 => "bad_request",
                401 => "unauthorized",
                403 => "forbidden",
                404 => "not_found",
                405 => "method_not_allowed",
                _ => "internal_error",
            },
        }
    }

    /// Field errors carried by a validation failure.
    pub fn errors(&self) -> Option<&MessageBag> {
        match self {
            ApiError::Validation(bag) => Some(bag),
            _ => None,
        }
    }

    /// The JSON error body for this error.
    pub fn body(&self) -> ErrorBody {
        let details = match self {
            ApiError::Validation(bag) => serde_json::to_value(bag).ok(),
            ApiError::BulkLimitExceeded { limit, given } => {
                Some(serde_json::json!({ "limit": limit, "given": given }))
            }
            _ => None,
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Debug)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
