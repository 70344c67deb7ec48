//! Several endpoints behind one payload, run as one transaction.

use super::{Endpoint, Engine, Reply};
use crate::context::ExecutionContext;
use crate::error::ApiError;
use crate::payload::Payload;
use crate::response::{ResponseFactory, TransformScope, Transformer, WireResponse};
use crate::rules::{Rule, RuleScope, RuleSet};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};

/// Called after a sub-endpoint runs with its untransformed result and the composed payload.
pub type SubCallback = Box<dyn Fn(&Value, &mut Payload) -> Result<(), ApiError> + Send + Sync>;

type PayloadHook = Box<dyn Fn(Payload) -> Result<Payload, ApiError> + Send + Sync>;
type ResponseHook = Box<dyn Fn(Reply) -> Reply + Send + Sync>;

/// How a composite names one of its parts.
#[derive(Clone)]
pub enum EndpointRef {
    /// Looked up in the engine's registry the first time it is needed.
    Named(String),
    Direct(Arc<dyn Endpoint>),
}

impl From<&str> for EndpointRef {
    fn from(name: &str) -> Self {
        EndpointRef::Named(name.to_string())
    }
}

impl From<String> for EndpointRef {
    fn from(name: String) -> Self {
        EndpointRef::Named(name)
    }
}

impl From<Arc<dyn Endpoint>> for EndpointRef {
    fn from(endpoint: Arc<dyn Endpoint>) -> Self {
        EndpointRef::Direct(endpoint)
    }
}

struct SubEndpoint {
    key: String,
    target: EndpointRef,
    callback: Option<SubCallback>,
    excluded: Vec<String>,
    resolved: OnceLock<Arc<dyn Endpoint>>,
}

impl SubEndpoint {
    fn resolve(&self, engine: &Engine) -> Result<Arc<dyn Endpoint>, ApiError> {
        if let Some(endpoint) = self.resolved.get() {
            return Ok(endpoint.clone());
        }
        let endpoint = match &self.target {
            EndpointRef::Named(name) => engine.endpoints().get(name)?,
            EndpointRef::Direct(endpoint) => endpoint.clone(),
        };
        Ok(self.resolved.get_or_init(|| endpoint).clone())
    }
}

/// Runs its sub-endpoints in registration order, each on the payload under its key.
///
/// Validation of the whole payload happens before anything runs. Any failure rolls back
/// every sub-endpoint's mutations; bulk items inside a composite fail the whole unit too.
#[derive(Default)]
pub struct CompositeEndpoint {
    subs: Vec<SubEndpoint>,
    modify_payload: Option<PayloadHook>,
    post_validation: Option<PayloadHook>,
    modify_response: Option<ResponseHook>,
}

impl CompositeEndpoint {
    pub fn new() -> Self {
        CompositeEndpoint::default()
    }

    /// Register `target` under `key`. Rules named in `excluded` (un-prefixed) are not applied.
    pub fn add_api(
        mut self,
        key: impl Into<String>,
        target: impl Into<EndpointRef>,
        callback: Option<SubCallback>,
        excluded: &[&str],
    ) -> Self {
        self.subs.push(SubEndpoint {
            key: key.into(),
            target: target.into(),
            callback,
            excluded: excluded.iter().map(|s| s.to_string()).collect(),
            resolved: OnceLock::new(),
        });
        self
    }

    /// Box a closure as a [`SubCallback`].
    pub fn callback<F>(f: F) -> Option<SubCallback>
    where
        F: Fn(&Value, &mut Payload) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        Some(Box::new(f))
    }

    pub fn on_modify_payload<F>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> Result<Payload, ApiError> + Send + Sync + 'static,
    {
        self.modify_payload = Some(Box::new(f));
        self
    }

    pub fn on_post_validation<F>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> Result<Payload, ApiError> + Send + Sync + 'static,
    {
        self.post_validation = Some(Box::new(f));
        self
    }

    pub fn on_modify_response<F>(mut self, f: F) -> Self
    where
        F: Fn(Reply) -> Reply + Send + Sync + 'static,
    {
        self.modify_response = Some(Box::new(f));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.subs.iter().map(|s| s.key.as_str())
    }

    fn run(&self, engine: &Engine, payload: Payload, ctx: &ExecutionContext<'_>) -> Result<WireResponse, ApiError> {
        let payload = match &self.modify_payload {
            Some(hook) => hook(payload)?,
            None => payload,
        };
        let rules = self.build_rules(engine, &payload, RuleScope::External)?;
        engine.validate(&payload, &rules)?;
        let mut payload = match &self.post_validation {
            Some(hook) => hook(payload)?,
            None => payload,
        };

        let atomic = ctx.atomic();
        let mut out = Map::new();
        for sub in &self.subs {
            let endpoint = sub.resolve(engine)?;
            tracing::debug!(part = %sub.key, "running composed endpoint");
            let original = endpoint.execute(engine, payload.pluck(&sub.key), &atomic)?.into_original();
            if let Some(callback) = &sub.callback {
                callback(&original, &mut payload)?;
            }
            let shaped = shape(endpoint.result_transformer().as_deref(), original);
            out.insert(sub.key.clone(), shaped);
        }

        let reply = Reply::from(ResponseFactory::array(json!({ "data": out })));
        let reply = match &self.modify_response {
            Some(hook) => hook(reply),
            None => reply,
        };
        Ok(engine.finalize(reply, &Payload::default()))
    }
}

fn shape(transformer: Option<&dyn Transformer>, original: Value) -> Value {
    let Some(transformer) = transformer else {
        return original;
    };
    let scope = TransformScope::default();
    match original {
        Value::Array(items) => Value::Array(items.iter().map(|item| transformer.transform(item, &scope)).collect()),
        record => transformer.transform(&record, &scope),
    }
}

impl Endpoint for CompositeEndpoint {
    fn build_rules(&self, engine: &Engine, payload: &Payload, _scope: RuleScope) -> Result<RuleSet, ApiError> {
        let mut rules = RuleSet::new();
        for sub in &self.subs {
            let endpoint = sub.resolve(engine)?;
            let inner = endpoint.build_rules(engine, &payload.pluck(&sub.key), RuleScope::External)?;
            rules.insert(sub.key.clone(), vec![Rule::Array]);
            for (key, list) in inner {
                if sub.excluded.contains(&key) {
                    continue;
                }
                let list = list.iter().map(|rule| rule.prefixed(&sub.key)).collect();
                rules.insert(format!("{}.{}", sub.key, key), list);
            }
        }
        Ok(rules)
    }

    fn execute(&self, engine: &Engine, payload: Payload, ctx: &ExecutionContext<'_>) -> Result<WireResponse, ApiError> {
        engine.run_in_transaction(|| self.run(engine, payload, ctx))
    }

    fn result_transformer(&self) -> Option<Arc<dyn Transformer>> {
        None
    }
}
