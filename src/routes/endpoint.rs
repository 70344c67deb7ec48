//! Routes that run registered endpoints.
//! Query string, JSON body and path parameters merge into one payload; path parameters win.
//! The engine is synchronous, so each call runs on the blocking pool.

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::internal::Dispatcher;
use crate::payload::Payload;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone)]
struct Route {
    method: MethodFilter,
    path: String,
    endpoint: String,
}

/// Maps `(method, path)` pairs to registered endpoint names.
#[derive(Clone)]
pub struct EndpointRouter {
    routes: Vec<Route>,
    body_limit: usize,
}

impl Default for EndpointRouter {
    fn default() -> Self {
        EndpointRouter {
            routes: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl EndpointRouter {
    pub fn new() -> Self {
        EndpointRouter::default()
    }

    pub fn route(mut self, method: MethodFilter, path: &str, endpoint: &str) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            endpoint: endpoint.to_string(),
        });
        self
    }

    pub fn get(self, path: &str, endpoint: &str) -> Self {
        self.route(MethodFilter::GET, path, endpoint)
    }

    pub fn post(self, path: &str, endpoint: &str) -> Self {
        self.route(MethodFilter::POST, path, endpoint)
    }

    pub fn put(self, path: &str, endpoint: &str) -> Self {
        self.route(MethodFilter::PUT, path, endpoint)
    }

    pub fn patch(self, path: &str, endpoint: &str) -> Self {
        self.route(MethodFilter::PATCH, path, endpoint)
    }

    pub fn delete(self, path: &str, endpoint: &str) -> Self {
        self.route(MethodFilter::DELETE, path, endpoint)
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn into_router(self, state: AppState) -> Router {
        let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        for route in self.routes {
            let name: Arc<str> = Arc::from(route.endpoint.as_str());
            let handler = move |State(state): State<AppState>,
                                request: RequestContext,
                                path: Option<Path<HashMap<String, String>>>,
                                Query(pairs): Query<Vec<(String, String)>>,
                                body: Bytes| {
                let name = name.clone();
                async move {
                    let params = path.map(|Path(p)| p).unwrap_or_default();
                    dispatch(state, name, request, params, pairs, body).await
                }
            };
            let methods = by_path.remove(&route.path).unwrap_or_default();
            by_path.insert(route.path, methods.on(route.method, handler));
        }

        let mut router = Router::new();
        for (path, methods) in by_path {
            router = router.route(&path, methods);
        }
        router
            .layer(RequestBodyLimitLayer::new(self.body_limit))
            .with_state(state)
    }
}

fn build_payload(params: HashMap<String, String>, pairs: Vec<(String, String)>, body: &Bytes) -> Result<Payload, ApiError> {
    let mut payload = Payload::from_query_pairs(pairs);
    if !body.is_empty() {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::http(axum::http::StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)))?;
        if !value.is_object() {
            return Err(ApiError::http(
                axum::http::StatusCode::BAD_REQUEST,
                "body must be a JSON object",
            ));
        }
        payload = payload.merge(Payload::new(value));
    }
    let params: Map<String, Value> = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    Ok(payload.merge(Payload::new(Value::Object(params))))
}

async fn dispatch(
    state: AppState,
    name: Arc<str>,
    request: RequestContext,
    params: HashMap<String, String>,
    pairs: Vec<(String, String)>,
    body: Bytes,
) -> Response {
    let payload = match build_payload(params, pairs, &body) {
        Ok(payload) => payload,
        Err(e) => return state.engine.handle_error(&e).into_response(),
    };
    let engine = state.engine.clone();
    let endpoint = name.clone();
    let task = tokio::task::spawn_blocking(move || Dispatcher::new(engine).handle(&endpoint, payload, request));
    match task.await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(endpoint = %name, error = %e, "endpoint task failed");
            let error = ApiError::Action(format!("endpoint '{}' did not complete", name));
            state.engine.handle_error(&error).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_parameters_win_over_body_and_query() {
        let params = HashMap::from([("id".to_string(), "7".to_string())]);
        let pairs = vec![("id".to_string(), "1".to_string()), ("page[size]".to_string(), "2".to_string())];
        let body = Bytes::from(r#"{"id": 3, "name": "ann"}"#);
        let payload = build_payload(params, pairs, &body).unwrap();
        assert_eq!(payload.get_payload(), &json!({"id": "7", "page": {"size": "2"}, "name": "ann"}));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = build_payload(HashMap::new(), Vec::new(), &Bytes::from("[1]")).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
