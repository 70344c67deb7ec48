//! HTTP surface: common routes and the endpoint router.

mod common;
mod endpoint;

pub use common::common_routes;
pub use endpoint::{EndpointRouter, DEFAULT_BODY_LIMIT};
