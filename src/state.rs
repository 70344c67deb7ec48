//! Shared application state for the HTTP routes.

use crate::endpoint::Engine;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        AppState {
            engine: Arc::new(engine),
        }
    }
}
