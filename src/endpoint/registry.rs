//! Named endpoints, resolved by the router, the composer and internal requests.

use super::Endpoint;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, Arc<dyn Endpoint>>,
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.endpoints.keys()).finish()
    }
}

impl EndpointRegistry {
    /// Register `endpoint` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, endpoint: Arc<dyn Endpoint>) -> &mut Self {
        let name = name.into();
        if self.endpoints.insert(name.clone(), endpoint).is_some() {
            tracing::warn!(endpoint = %name, "endpoint replaced");
        }
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Endpoint>, ConfigError> {
        self.endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEndpoint(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}
