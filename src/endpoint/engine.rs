//! The execution engine: single path, bulk path, validation and finalization.

use super::{ApiEndpoint, Endpoint, EndpointRegistry, Reply, RunContext};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{ApiError, ConfigError};
use crate::payload::Payload;
use crate::response::{
    ExceptionHandler, JsonExceptionHandler, JsonRenderer, RenderOptions, Renderer, ResponseFactory, WireResponse,
};
use crate::rules::{compile, RuleScope, RuleSet, RuleValidator, Validator};
use crate::transaction::{self, NoTransaction, Transactional};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Payload keys every endpoint keeps after narrowing, whatever it declares.
pub const COMMON_FIELDS: &[&str] = &["fields", "filter", "sort", "page", "include"];

/// Runs endpoints against its collaborators. Cheap to share behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    validator: Arc<dyn Validator>,
    renderer: Arc<dyn Renderer>,
    exceptions: Arc<dyn ExceptionHandler>,
    transactions: Arc<dyn Transactional>,
    endpoints: EndpointRegistry,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn execute(
        &self,
        endpoint: &dyn Endpoint,
        payload: Payload,
        ctx: &ExecutionContext<'_>,
    ) -> Result<WireResponse, ApiError> {
        endpoint.execute(self, payload, ctx)
    }

    /// Execute a registered endpoint by name.
    pub fn execute_named(
        &self,
        name: &str,
        payload: Payload,
        ctx: &ExecutionContext<'_>,
    ) -> Result<WireResponse, ApiError> {
        let endpoint = self.endpoints.get(name)?;
        endpoint.execute(self, payload, ctx)
    }

    /// Either the response or the rendered error.
    pub fn respond(&self, result: Result<WireResponse, ApiError>) -> WireResponse {
        result.unwrap_or_else(|e| self.handle_error(&e))
    }

    pub fn handle_error(&self, error: &ApiError) -> WireResponse {
        self.exceptions.handle(error)
    }

    /// Entry point for declared endpoints: bulk when the bulk key holds a list or map.
    pub fn execute_api<E: ApiEndpoint + ?Sized>(
        &self,
        endpoint: &E,
        payload: Payload,
        ctx: &ExecutionContext<'_>,
    ) -> Result<WireResponse, ApiError> {
        if let Some(key) = endpoint.bulk_identifier().filter(|k| !k.is_empty()) {
            if matches!(payload.get(key), Some(Value::Array(_) | Value::Object(_))) {
                return self.execute_bulk(endpoint, key, payload, ctx);
            }
        }
        self.execute_single(endpoint, payload, ctx)
    }

    fn execute_single<E: ApiEndpoint + ?Sized>(
        &self,
        endpoint: &E,
        payload: Payload,
        ctx: &ExecutionContext<'_>,
    ) -> Result<WireResponse, ApiError> {
        let fields = endpoint.fields();
        let keys: Vec<&str> = fields.field_keys().chain(COMMON_FIELDS.iter().copied()).collect();

        let payload = match endpoint.as_modify_payload() {
            Some(hook) => hook.modify_payload(payload)?,
            None => payload,
        };

        let rules = compile(fields, RuleScope::Full);
        self.validate(&payload, &rules)?;

        let payload = match endpoint.as_modify_payload_post_validation() {
            Some(hook) => hook.modify_payload_post_validation(payload)?,
            None => payload,
        };

        tracing::debug!(
            endpoint = endpoint.name(),
            request_id = %ctx.request().request_id,
            "running endpoint"
        );
        let page_size = endpoint.default_page_size().unwrap_or(self.config.default_page_size);
        let mut run = RunContext::new(payload.only(&keys), self, ctx, page_size);
        let reply = endpoint.run(&mut run)?;
        let reply = match endpoint.as_modify_response() {
            Some(hook) => hook.modify_response(reply),
            None => reply,
        };
        Ok(self.finalize(reply, &run.into_payload()))
    }

    fn execute_bulk<E: ApiEndpoint + ?Sized>(
        &self,
        endpoint: &E,
        key: &str,
        payload: Payload,
        ctx: &ExecutionContext<'_>,
    ) -> Result<WireResponse, ApiError> {
        let (entries, is_list) = match payload.get(key) {
            Some(Value::Array(items)) => ((0..items.len()).map(|i| i.to_string()).collect::<Vec<_>>(), true),
            Some(Value::Object(map)) => (map.keys().cloned().collect(), false),
            _ => (Vec::new(), true),
        };
        let limit = endpoint.bulk_limit().unwrap_or(self.config.bulk_limit);
        if entries.len() > limit {
            return Err(ApiError::BulkLimitExceeded {
                limit,
                given: entries.len(),
            });
        }

        tracing::debug!(endpoint = endpoint.name(), items = entries.len(), "running bulk");
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let item = payload.pluck(&format!("{}.{}", key, entry));
            let outcome = self.run_in_transaction(|| self.execute_single(endpoint, item, ctx));
            let slot = match outcome {
                Ok(response) => response.into_original(),
                Err(e @ ApiError::Config(_)) => return Err(e),
                Err(e) if ctx.is_atomic() => return Err(e),
                Err(e) => {
                    tracing::warn!(endpoint = endpoint.name(), item = %entry, error = %e, "bulk item failed");
                    self.handle_error(&e).into_original()
                }
            };
            results.push((entry, slot));
        }

        let results = if is_list {
            Value::Array(results.into_iter().map(|(_, v)| v).collect())
        } else {
            Value::Object(results.into_iter().collect::<Map<_, _>>())
        };
        Ok(self.finalize(ResponseFactory::array(json!({ "data": results })).into(), &Payload::default()))
    }

    /// Validate `payload`, failing with the full message bag.
    pub fn validate(&self, payload: &Payload, rules: &RuleSet) -> Result<(), ApiError> {
        let validation = self.validator.validate(payload.get_payload(), rules);
        if validation.fails() {
            tracing::warn!(fields = ?validation.errors().keys().collect::<Vec<_>>(), "validation failed");
            return Err(ApiError::Validation(validation.into_errors()));
        }
        Ok(())
    }

    /// Run `f` in one unit of the engine's transaction collaborator.
    pub fn run_in_transaction<T>(&self, f: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
        transaction::run_in_transaction(&*self.transactions, f)
    }

    /// Render an envelope with the options the payload requested; direct responses pass through.
    pub(crate) fn finalize(&self, reply: Reply, payload: &Payload) -> WireResponse {
        match reply {
            Reply::Envelope(factory) => factory.transform(&*self.renderer, &RenderOptions::from_payload(payload)),
            Reply::Direct(response) => response,
        }
    }
}

/// Assembles an [`Engine`]; every collaborator has a default.
pub struct EngineBuilder {
    config: EngineConfig,
    validator: Arc<dyn Validator>,
    renderer: Arc<dyn Renderer>,
    exceptions: Arc<dyn ExceptionHandler>,
    transactions: Arc<dyn Transactional>,
    endpoints: EndpointRegistry,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder {
            config: EngineConfig::default(),
            validator: Arc::new(RuleValidator),
            renderer: Arc::new(JsonRenderer),
            exceptions: Arc::new(JsonExceptionHandler),
            transactions: Arc::new(NoTransaction),
            endpoints: EndpointRegistry::default(),
        }
    }
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exceptions = handler;
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn Transactional>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn endpoint(mut self, name: impl Into<String>, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoints.register(name, endpoint);
        self
    }

    pub fn build(self) -> Result<Engine, ConfigError> {
        self.config.validate()?;
        Ok(Engine {
            config: self.config,
            validator: self.validator,
            renderer: self.renderer,
            exceptions: self.exceptions,
            transactions: self.transactions,
            endpoints: self.endpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::endpoint::{ModifyPayload, ModifyResponse};
    use crate::field::{Field, FieldRegistry};
    use crate::response::DefaultTransformer;
    use axum::http::StatusCode;

    struct Echo {
        fields: FieldRegistry,
    }

    impl Echo {
        fn new() -> Self {
            let fields = FieldRegistry::builder()
                .field(Field::new("name").rules("required|string"))
                .field(Field::new("age").rules("integer").filterable())
                .freeze()
                .unwrap();
            Echo { fields }
        }
    }

    impl ApiEndpoint for Echo {
        fn fields(&self) -> &FieldRegistry {
            &self.fields
        }

        fn run(&self, ctx: &mut RunContext<'_>) -> Result<Reply, ApiError> {
            if ctx.payload().get_str("name") == Some("boom") {
                return Err(ApiError::Action("boom".into()));
            }
            let item = ctx.payload().get_payload().clone();
            Ok(ResponseFactory::item(item, Arc::new(DefaultTransformer::new())).into())
        }

        fn bulk_identifier(&self) -> Option<&str> {
            Some("bulk")
        }

        fn bulk_limit(&self) -> Option<usize> {
            Some(3)
        }

        fn as_modify_payload(&self) -> Option<&dyn ModifyPayload> {
            Some(self)
        }

        fn as_modify_response(&self) -> Option<&dyn ModifyResponse> {
            Some(self)
        }
    }

    impl ModifyPayload for Echo {
        fn modify_payload(&self, mut payload: Payload) -> Result<Payload, ApiError> {
            if let Some(name) = payload.get_str("name").map(str::trim).map(str::to_string) {
                payload.set("name", json!(name));
            }
            Ok(payload)
        }
    }

    impl ModifyResponse for Echo {
        fn modify_response(&self, reply: Reply) -> Reply {
            match reply {
                Reply::Envelope(factory) => factory.header("X-Echo", "1").into(),
                direct => direct,
            }
        }
    }

    fn run(payload: Value) -> Result<WireResponse, ApiError> {
        let engine = Engine::builder().build().unwrap();
        let ctx = ExecutionContext::new(RequestContext::new("POST"));
        engine.execute(&Echo::new(), Payload::new(payload), &ctx)
    }

    #[test]
    fn single_path_narrows_and_runs_hooks() {
        let response = run(json!({"name": "  Ann ", "age": 3, "extra": true, "page": {"number": 1}})).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header("X-Echo"), Some("1"));
        assert_eq!(response.original(), &json!({"name": "Ann", "age": 3, "page": {"number": 1}}));
    }

    #[test]
    fn validation_failure_carries_every_field() {
        let err = run(json!({"age": "old"})).unwrap_err();
        let bag = err.errors().unwrap();
        assert!(bag.has("name"));
        assert!(bag.has("age"));
    }

    #[test]
    fn bulk_isolates_failing_items() {
        let response = run(json!({"bulk": [{"name": "a"}, {"name": "boom"}, {}]})).unwrap();
        let data = &response.original()["data"];
        assert_eq!(data[0]["name"], "a");
        assert_eq!(data[1]["error"]["code"], "action_error");
        assert_eq!(data[2]["error"]["code"], "validation_error");
    }

    #[test]
    fn bulk_keeps_map_keys() {
        let response = run(json!({"bulk": {"first": {"name": "a"}, "second": {"name": "b"}}})).unwrap();
        assert_eq!(response.original()["data"]["second"]["name"], "b");
    }

    #[test]
    fn bulk_over_limit_is_rejected_up_front() {
        let err = run(json!({"bulk": [{}, {}, {}, {}]})).unwrap_err();
        assert!(matches!(err, ApiError::BulkLimitExceeded { limit: 3, given: 4 }));
    }

    #[test]
    fn atomic_context_propagates_item_failures() {
        let engine = Engine::builder().build().unwrap();
        let ctx = ExecutionContext::new(RequestContext::default());
        let payload = Payload::new(json!({"bulk": [{"name": "boom"}]}));
        let err = engine.execute(&Echo::new(), payload, &ctx.atomic()).unwrap_err();
        assert_eq!(err.code(), "action_error");
    }

    #[test]
    fn unknown_named_endpoint_is_a_config_error() {
        let engine = Engine::builder().build().unwrap();
        let ctx = ExecutionContext::new(RequestContext::default());
        let err = engine.execute_named("nope", Payload::default(), &ctx).unwrap_err();
        assert!(matches!(err, ApiError::Config(ConfigError::UnknownEndpoint(_))));
    }
}
