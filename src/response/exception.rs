//! Exception-handling collaborator: render an error into a response.

use crate::error::ApiError;
use crate::response::wire::WireResponse;

pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, error: &ApiError) -> WireResponse;
}

/// Renders the `{"error": {code, message, details}}` body with the error's status.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonExceptionHandler;

impl ExceptionHandler for JsonExceptionHandler {
    fn handle(&self, error: &ApiError) -> WireResponse {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(error = %error, code = error.code(), "request failed");
        } else {
            tracing::debug!(error = %error, code = error.code(), "request rejected");
        }
        let body = serde_json::to_value(error.body()).unwrap_or_default();
        WireResponse::json(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MessageBag;
    use axum::http::StatusCode;

    #[test]
    fn validation_renders_422_with_messages() {
        let mut bag = MessageBag::default();
        bag.add("age", "The age must be an integer.");
        let wire = JsonExceptionHandler.handle(&ApiError::Validation(bag));
        assert_eq!(wire.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = wire.body().unwrap();
        assert_eq!(body["error"]["details"]["age"][0], "The age must be an integer.");
        assert_eq!(wire.original(), body);
    }
}
