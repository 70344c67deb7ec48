//! Request context, passed explicitly through every execution.

use crate::internal::Dispatcher;

/// Who and what a request is. Internal sub-requests get a fresh one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub version: Option<String>,
    /// Acting user id, if authenticated.
    pub user: Option<String>,
    /// Issued from inside another request rather than by a client.
    pub internal: bool,
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContext::new("GET")
    }
}

impl RequestContext {
    pub fn new(method: impl Into<String>) -> Self {
        RequestContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            method: method.into().to_ascii_uppercase(),
            version: None,
            user: None,
            internal: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }
}

/// Everything one execution may consult: the request, an optional dispatcher for internal
/// requests, and whether it runs inside an all-or-nothing unit.
#[derive(Clone, Debug)]
pub struct ExecutionContext<'a> {
    request: RequestContext,
    dispatcher: Option<&'a Dispatcher>,
    atomic: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(request: RequestContext) -> Self {
        ExecutionContext {
            request,
            dispatcher: None,
            atomic: false,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: &'a Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn dispatcher(&self) -> Option<&'a Dispatcher> {
        self.dispatcher
    }

    /// Inside a composed transaction: bulk item failures propagate instead of being isolated.
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub(crate) fn atomic(&self) -> Self {
        ExecutionContext {
            atomic: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_get_unique_ids() {
        let a = RequestContext::new("post");
        let b = RequestContext::new("post");
        assert_eq!(a.method, "POST");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn atomic_scope_keeps_request() {
        let ctx = ExecutionContext::new(RequestContext::default().with_user("7"));
        let atomic = ctx.atomic();
        assert!(atomic.is_atomic());
        assert!(!ctx.is_atomic());
        assert_eq!(atomic.request().user.as_deref(), Some("7"));
    }
}
