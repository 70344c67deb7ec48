//! Response envelopes, transformers, rendering and wire responses.

mod exception;
mod factory;
mod render;
mod transformer;
mod wire;

pub use exception::{ExceptionHandler, JsonExceptionHandler};
pub use factory::{Data, ResponseFactory};
pub use render::{JsonRenderer, RenderOptions, Renderer, PRIMARY_RESOURCE};
pub use transformer::{parse_date, ArrayTransformer, BlankTransformer, DefaultTransformer, TransformScope, Transformer};
pub use wire::{Cookie, SameSite, WireResponse};
