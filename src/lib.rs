//! Endpoint SDK: declarative API endpoints over abstract collaborators.
//!
//! Endpoints declare fields; the engine compiles them into validation rules, narrows the
//! payload, runs the endpoint singly or in bulk, and renders a response envelope. Composite
//! endpoints run several endpoints in one transaction.

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod extractors;
pub mod field;
pub mod internal;
pub mod memory;
pub mod model;
pub mod payload;
pub mod query;
pub mod response;
pub mod routes;
pub mod rules;
pub mod state;
pub mod telemetry;
pub mod transaction;

pub use config::EngineConfig;
pub use context::{ExecutionContext, RequestContext};
pub use endpoint::{
    ApiEndpoint, CompositeEndpoint, Endpoint, EndpointRef, EndpointRegistry, Engine, EngineBuilder, ModifyPayload,
    ModifyPayloadPostValidation, ModifyResponse, Reply, RunContext, COMMON_FIELDS,
};
pub use error::{ApiError, ConfigError};
pub use field::{Field, FieldRegistry};
pub use internal::{Dispatcher, InternalRequest, InternalResult};
pub use memory::MemoryStore;
pub use model::{ModelEndpoint, ModelHooks, RecordStore, RunType, TableSpec};
pub use payload::Payload;
pub use response::{ResponseFactory, WireResponse};
pub use routes::{common_routes, EndpointRouter};
pub use rules::{compile, RuleScope};
pub use state::AppState;
pub use telemetry::init_tracing;
pub use transaction::{run_in_transaction, Transactional};
