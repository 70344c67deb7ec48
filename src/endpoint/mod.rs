//! Endpoint contracts, capabilities and the execution engine.
//!
//! An [`ApiEndpoint`] declares fields and a `run` action; the [`Engine`] validates, narrows
//! and runs it, singly or in bulk. A [`CompositeEndpoint`] runs several endpoints as one
//! transaction. Both satisfy [`Endpoint`], the contract the engine and composer call.

mod composite;
mod engine;
mod registry;

pub use composite::{CompositeEndpoint, EndpointRef, SubCallback};
pub use engine::{Engine, EngineBuilder, COMMON_FIELDS};
pub use registry::EndpointRegistry;

use crate::context::{ExecutionContext, RequestContext};
use crate::error::{ApiError, ConfigError};
use crate::field::FieldRegistry;
use crate::internal::InternalRequest;
use crate::payload::Payload;
use crate::response::{ResponseFactory, Transformer, WireResponse};
use crate::rules::{compile, RuleScope, RuleSet};
use std::sync::Arc;

/// Replace the payload before validation.
pub trait ModifyPayload {
    fn modify_payload(&self, payload: Payload) -> Result<Payload, ApiError>;
}

/// Replace the payload after validation passes, before it is narrowed.
pub trait ModifyPayloadPostValidation {
    fn modify_payload_post_validation(&self, payload: Payload) -> Result<Payload, ApiError>;
}

/// Adjust the reply before it is finalized.
pub trait ModifyResponse {
    fn modify_response(&self, reply: Reply) -> Reply;
}

/// What a `run` action produces: an envelope still to render, or a finished response.
#[derive(Debug)]
pub enum Reply {
    Envelope(ResponseFactory),
    Direct(WireResponse),
}

impl From<ResponseFactory> for Reply {
    fn from(factory: ResponseFactory) -> Self {
        Reply::Envelope(factory)
    }
}

impl From<WireResponse> for Reply {
    fn from(response: WireResponse) -> Self {
        Reply::Direct(response)
    }
}

/// A declared endpoint: fields plus a `run` action over the narrowed payload.
///
/// Optional behaviour is opted into by returning `Some(self)` from the `as_*` capability
/// accessors.
pub trait ApiEndpoint: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn fields(&self) -> &FieldRegistry;

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<Reply, ApiError>;

    /// Payload key whose list or map value switches execution to bulk mode.
    fn bulk_identifier(&self) -> Option<&str> {
        None
    }

    /// Overrides the engine's bulk limit.
    fn bulk_limit(&self) -> Option<usize> {
        None
    }

    /// Overrides the engine's default page size.
    fn default_page_size(&self) -> Option<u64> {
        None
    }

    /// Shapes this endpoint's records when another endpoint embeds its result.
    fn transformer(&self) -> Option<Arc<dyn Transformer>> {
        None
    }

    fn as_modify_payload(&self) -> Option<&dyn ModifyPayload> {
        None
    }

    fn as_modify_payload_post_validation(&self) -> Option<&dyn ModifyPayloadPostValidation> {
        None
    }

    fn as_modify_response(&self) -> Option<&dyn ModifyResponse> {
        None
    }
}

/// The capability contract every runnable endpoint satisfies.
pub trait Endpoint: Send + Sync {
    /// Rules this endpoint applies to `payload`.
    fn build_rules(&self, engine: &Engine, payload: &Payload, scope: RuleScope) -> Result<RuleSet, ApiError>;

    fn execute(&self, engine: &Engine, payload: Payload, ctx: &ExecutionContext<'_>) -> Result<WireResponse, ApiError>;

    /// Transformer applied to this endpoint's result when it is embedded in a composed response.
    fn result_transformer(&self) -> Option<Arc<dyn Transformer>>;
}

impl<T: ApiEndpoint> Endpoint for T {
    fn build_rules(&self, _engine: &Engine, _payload: &Payload, scope: RuleScope) -> Result<RuleSet, ApiError> {
        Ok(compile(self.fields(), scope))
    }

    fn execute(&self, engine: &Engine, payload: Payload, ctx: &ExecutionContext<'_>) -> Result<WireResponse, ApiError> {
        engine.execute_api(self, payload, ctx)
    }

    fn result_transformer(&self) -> Option<Arc<dyn Transformer>> {
        self.transformer()
    }
}

/// What a `run` action sees: the narrowed payload and the request it serves.
pub struct RunContext<'a> {
    payload: Payload,
    engine: &'a Engine,
    context: &'a ExecutionContext<'a>,
    default_page_size: u64,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        payload: Payload,
        engine: &'a Engine,
        context: &'a ExecutionContext<'a>,
        default_page_size: u64,
    ) -> Self {
        RunContext {
            payload,
            engine,
            context,
            default_page_size,
        }
    }

    /// The payload narrowed to declared fields and the common keys.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn request(&self) -> &RequestContext {
        self.context.request()
    }

    pub fn context(&self) -> &ExecutionContext<'a> {
        self.context
    }

    /// A fresh response envelope.
    pub fn response(&self) -> ResponseFactory {
        ResponseFactory::new()
    }

    pub fn default_page_size(&self) -> u64 {
        self.default_page_size
    }

    /// Builder for a request to another registered endpoint.
    pub fn internal(&self) -> Result<InternalRequest<'a>, ConfigError> {
        self.context
            .dispatcher()
            .map(|d| d.request())
            .ok_or(ConfigError::NoDispatcher)
    }

    pub(crate) fn into_payload(self) -> Payload {
        self.payload
    }
}
