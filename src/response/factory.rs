//! Response envelope: accumulated status, headers, cookies, meta, data and transformer.

use crate::error::ApiError;
use crate::query::Page;
use crate::response::render::{RenderOptions, Renderer};
use crate::response::transformer::{ArrayTransformer, BlankTransformer, Transformer};
use crate::response::wire::{Cookie, WireResponse};
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// The data an envelope carries.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    Item(Value),
    Collection(Vec<Value>),
    Page(Page),
    /// Rendered as-is, without a `data` wrapper.
    Raw(Value),
}

impl Data {
    /// The data before transformation.
    pub fn original(&self) -> Value {
        match self {
            Data::Item(v) | Data::Raw(v) => v.clone(),
            Data::Collection(items) => Value::Array(items.clone()),
            Data::Page(page) => Value::Array(page.items.clone()),
        }
    }
}

/// Envelope builder. Every mutator consumes and returns the builder; [`ResponseFactory::transform`]
/// is the single finalize step.
#[derive(Clone)]
pub struct ResponseFactory {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    meta: Map<String, Value>,
    data: Option<Data>,
    transformer: Option<Arc<dyn Transformer>>,
    resource_key: Option<String>,
}

impl Default for ResponseFactory {
    fn default() -> Self {
        ResponseFactory {
            status: StatusCode::OK,
            headers: Vec::new(),
            cookies: Vec::new(),
            meta: Map::new(),
            data: None,
            transformer: None,
            resource_key: None,
        }
    }
}

impl fmt::Debug for ResponseFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFactory")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("meta", &self.meta)
            .field("data", &self.data)
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

impl ResponseFactory {
    pub fn new() -> Self {
        ResponseFactory::default()
    }

    pub fn data(mut self, data: Data) -> Self {
        self.data = Some(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Replace all meta.
    pub fn meta_map(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn clear_cookies(mut self) -> Self {
        self.cookies.clear();
        self
    }

    /// Resource name used to pick a sparse fieldset.
    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn created(location: Option<&str>) -> Self {
        ResponseFactory::bodiless(StatusCode::CREATED, location)
    }

    pub fn accepted(location: Option<&str>) -> Self {
        ResponseFactory::bodiless(StatusCode::ACCEPTED, location)
    }

    pub fn no_content() -> Self {
        ResponseFactory::bodiless(StatusCode::NO_CONTENT, None)
    }

    fn bodiless(status: StatusCode, location: Option<&str>) -> Self {
        let factory = ResponseFactory::new()
            .status_code(status)
            .transformer(Arc::new(BlankTransformer));
        match location {
            Some(location) => factory.header("Location", location),
            None => factory,
        }
    }

    /// Plain data rendered as given.
    pub fn array(data: Value) -> Self {
        ResponseFactory::new()
            .data(Data::Raw(data))
            .transformer(Arc::new(ArrayTransformer))
    }

    pub fn collection(items: Vec<Value>, transformer: Arc<dyn Transformer>) -> Self {
        ResponseFactory::new()
            .data(Data::Collection(items))
            .transformer(transformer)
    }

    pub fn paginated(page: Page, transformer: Arc<dyn Transformer>) -> Self {
        ResponseFactory::new().data(Data::Page(page)).transformer(transformer)
    }

    pub fn item(item: Value, transformer: Arc<dyn Transformer>) -> Self {
        ResponseFactory::new().data(Data::Item(item)).transformer(transformer)
    }

    pub fn error(message: impl Into<String>, status: StatusCode) -> ApiError {
        ApiError::http(status, message)
    }

    pub fn error_not_found() -> ApiError {
        ResponseFactory::error("Not Found", StatusCode::NOT_FOUND)
    }

    pub fn error_bad_request() -> ApiError {
        ResponseFactory::error("Bad Request", StatusCode::BAD_REQUEST)
    }

    pub fn error_forbidden() -> ApiError {
        ResponseFactory::error("Forbidden", StatusCode::FORBIDDEN)
    }

    pub fn error_internal() -> ApiError {
        ResponseFactory::error("Internal Error", StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn error_unauthorized() -> ApiError {
        ResponseFactory::error("Unauthorized", StatusCode::UNAUTHORIZED)
    }

    pub fn error_method_not_allowed() -> ApiError {
        ResponseFactory::error("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn get_status(&self) -> StatusCode {
        self.status
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn get_data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    /// Render through `renderer`, then attach cookies. The result keeps the untransformed data.
    pub fn transform(self, renderer: &dyn Renderer, options: &RenderOptions) -> WireResponse {
        let original = self.data.as_ref().map(Data::original).unwrap_or(Value::Null);
        let options = match (&self.resource_key, options.resource_key.is_none()) {
            (Some(key), true) => RenderOptions {
                resource_key: Some(key.clone()),
                ..options.clone()
            },
            _ => options.clone(),
        };
        let mut response = renderer.render(
            self.data.as_ref(),
            self.transformer.as_deref(),
            &options,
            &self.meta,
            self.status,
            &self.headers,
        );
        for cookie in self.cookies {
            response.attach_cookie(cookie);
        }
        response.with_original(original)
    }
}
