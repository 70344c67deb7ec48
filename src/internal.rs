//! Internal sub-requests: run a registered endpoint as if a fresh request had arrived.
//!
//! The [`Dispatcher`] owns the current [`RequestContext`]. Every dispatch swaps in the new
//! context behind a [`ContextGuard`], which puts the previous one back on drop, so errors
//! and early returns restore it too.

use crate::context::{ExecutionContext, RequestContext};
use crate::endpoint::Engine;
use crate::error::ApiError;
use crate::model::PAGE_NAME;
use crate::payload::{value_as_u64, Payload};
use crate::query::Page;
use crate::response::WireResponse;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, RwLock};

pub struct Dispatcher {
    engine: Arc<Engine>,
    current: RwLock<RequestContext>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("current", &self.current()).finish()
    }
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        Dispatcher {
            engine,
            current: RwLock::new(RequestContext::default()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The request being served right now.
    pub fn current(&self) -> RequestContext {
        match self.current.read() {
            Ok(ctx) => ctx.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make `ctx` current until the guard drops.
    pub fn enter(&self, ctx: RequestContext) -> ContextGuard<'_> {
        let previous = self.replace(ctx);
        ContextGuard {
            dispatcher: self,
            previous: Some(previous),
        }
    }

    fn replace(&self, ctx: RequestContext) -> RequestContext {
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *current, ctx)
    }

    /// Run endpoint `name` under `request`.
    pub fn dispatch(&self, name: &str, payload: Payload, request: RequestContext) -> Result<WireResponse, ApiError> {
        let _guard = self.enter(request.clone());
        tracing::debug!(
            endpoint = name,
            method = %request.method,
            request_id = %request.request_id,
            internal = request.internal,
            "dispatching"
        );
        let ctx = ExecutionContext::new(request).with_dispatcher(self);
        self.engine.execute_named(name, payload, &ctx)
    }

    /// Dispatch and render any error, as a transport would.
    pub fn handle(&self, name: &str, payload: Payload, request: RequestContext) -> WireResponse {
        let result = self.dispatch(name, payload, request);
        self.engine.respond(result)
    }

    pub fn request(&self) -> InternalRequest<'_> {
        InternalRequest {
            dispatcher: self,
            json: None,
            with: None,
            user: None,
            version: None,
        }
    }
}

/// Restores the previous request context when dropped.
pub struct ContextGuard<'a> {
    dispatcher: &'a Dispatcher,
    previous: Option<RequestContext>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.dispatcher.replace(previous);
        }
    }
}

/// One internal request. Settings apply to the single call that consumes the builder.
#[must_use]
pub struct InternalRequest<'a> {
    dispatcher: &'a Dispatcher,
    json: Option<Value>,
    with: Option<Value>,
    user: Option<String>,
    version: Option<String>,
}

impl<'a> InternalRequest<'a> {
    /// Request body.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Request parameters, as a query string would carry them.
    pub fn with(mut self, params: Value) -> Self {
        self.with = Some(params);
        self
    }

    /// Act as `user` for this call.
    pub fn be(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn get(self, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        self.go("GET", name, params)
    }

    pub fn post(self, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        self.go("POST", name, params)
    }

    pub fn put(self, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        self.go("PUT", name, params)
    }

    pub fn patch(self, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        self.go("PATCH", name, params)
    }

    pub fn delete(self, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        self.go("DELETE", name, params)
    }

    fn go(self, method: &str, name: &str, params: Value) -> Result<InternalResult, ApiError> {
        let outer = self.dispatcher.current();
        let mut request = RequestContext::new(method);
        request.internal = true;
        request.user = self.user.or(outer.user);
        request.version = self.version.or(outer.version);

        let mut payload = Payload::default();
        for part in [self.with, self.json, Some(params)].into_iter().flatten() {
            payload = payload.merge(Payload::new(part));
        }
        let response = self.dispatcher.dispatch(name, payload, request)?;
        Ok(InternalResult::from_response(&response))
    }
}

/// The parsed result of an internal request.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalResult {
    data: Option<Value>,
    meta: Option<Map<String, Value>>,
    original: Value,
}

impl InternalResult {
    pub fn from_response(response: &WireResponse) -> Self {
        let body = response.body();
        let data = body.and_then(|b| b.get("data")).filter(|v| !v.is_null()).cloned();
        let meta = body.and_then(|b| b.get("meta")).and_then(Value::as_object).cloned();
        InternalResult {
            data,
            meta,
            original: response.original().clone(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref()
    }

    /// The data before any transformer shaped it.
    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn has_pagination(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.contains_key("pagination"))
    }

    pub fn pagination(&self) -> Option<Page> {
        let pagination = self.meta.as_ref()?.get("pagination")?;
        let number = |key: &str| pagination.get(key).and_then(value_as_u64).unwrap_or(0);
        let items = match &self.data {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        Some(Page {
            items,
            total: number("total"),
            per_page: number("per_page"),
            current_page: number("current_page"),
            page_name: PAGE_NAME.to_string(),
            appends: Map::new(),
        })
    }
}
