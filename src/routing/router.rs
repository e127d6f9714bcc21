//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store handlers keyed by exact path
//! - Look up the handler for a request path
//! - Return the handler or an explicit no-match
//!
//! # Design Decisions
//! - Immutable once the server starts (thread-safe without locks)
//! - O(1) exact lookup via HashMap; no prefix, wildcard or query stripping
//! - Re-registering a path replaces the earlier handler

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::http::request::Request;
use crate::http::writer::ResponseWriter;

/// Produces a response for a request.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: &Request, response: &mut ResponseWriter);
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut ResponseWriter) + Send + Sync + 'static,
{
    fn handle(&self, request: &Request, response: &mut ResponseWriter) {
        self(request, response)
    }
}

/// Exact-match routing table.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`. The last registration for a pattern wins.
    pub fn add_route(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        let pattern = pattern.into();
        if self.routes.insert(pattern.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(pattern = %pattern, "Route replaced");
        }
    }

    /// Builder form of [`add_route`](Self::add_route).
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Handler) -> Self {
        self.add_route(pattern, handler);
        self
    }

    /// Find the handler registered for exactly `path`.
    pub fn find_handler(&self, path: &str) -> Option<&dyn Handler> {
        self.routes.get(path).map(|handler| handler.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut patterns: Vec<_> = self.routes.keys().collect();
        patterns.sort();
        f.debug_struct("Router").field("routes", &patterns).finish()
    }
}
