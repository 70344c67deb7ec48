//! Build the request context from the method and request headers.

use crate::context::RequestContext;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Caller-supplied request id. A fresh UUID is used when absent.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const API_VERSION_HEADER: &str = "X-Api-Version";
/// Acting user id, set by whatever authenticates in front of the engine.
pub const USER_ID_HEADER: &str = "X-User-ID";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = RequestContext::new(parts.method.as_str());
        if let Some(id) = header(&parts.headers, REQUEST_ID_HEADER) {
            ctx = ctx.with_request_id(id);
        }
        ctx.version = header(&parts.headers, API_VERSION_HEADER);
        ctx.user = header(&parts.headers, USER_ID_HEADER);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn headers_fill_the_context() {
        let (mut parts, _) = Request::builder()
            .method("PATCH")
            .header(REQUEST_ID_HEADER, "abc")
            .header(USER_ID_HEADER, " 7 ")
            .header(API_VERSION_HEADER, "")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.method, "PATCH");
        assert_eq!(ctx.request_id, "abc");
        assert_eq!(ctx.user.as_deref(), Some("7"));
        assert_eq!(ctx.version, None);
        assert!(!ctx.internal);
    }
}
