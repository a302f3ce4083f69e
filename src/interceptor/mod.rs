//! Interceptors — security policies that run around every handler.
//!
//! An [`Interceptor`] is invoked at two points of the request lifecycle:
//!
//! - **before**: after routing, before the handler. It may inspect the
//!   request, claim and set response headers, stash per-request state in the
//!   [`Context`] extensions, or short-circuit with [`Flow::Respond`].
//! - **commit**: after a response has been written (by the handler, by an
//!   interceptor's `before`, or by the router for 404/405) and before it is
//!   encoded. It may finish headers and add template functions.
//!
//! The [`ServeMux`](crate::router::ServeMux) runs `before` in registration
//! order and `commit` in reverse order, and only calls `commit` on
//! interceptors whose `before` actually ran.
//!
//! Per-route settings reach interceptors as [`Configs`]: arbitrary typed
//! values registered with the route, looked up by type with
//! [`Configs::find`].

use std::any::Any;
use std::sync::Arc;

use tracing::error;

use crate::context::{Context, HeaderError};
use crate::http::StatusCode;
use crate::response::Response;

/// Outcome of an interceptor's `before` phase.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next interceptor, then the handler.
    Continue,
    /// Stop here and answer with this response. No later interceptor's
    /// `before` and no handler will run.
    Respond(Response),
}

impl Flow {
    /// Short-circuits with an error status.
    pub fn reject(code: StatusCode) -> Self {
        Self::Respond(Response::Error(code))
    }

    /// Logs a header failure inside an interceptor and answers 500.
    ///
    /// Two interceptors claiming the same header is a configuration bug; it
    /// must not silently produce a response without the expected policy.
    pub(crate) fn header_failure(interceptor: &'static str, err: HeaderError) -> Self {
        error!(interceptor, error = %err, "interceptor could not write its header");
        Self::reject(StatusCode::InternalServerError)
    }
}

/// A value that can be attached to a route to tune interceptors.
///
/// Implemented automatically for every `Send + Sync + 'static` type.
pub trait InterceptorConfig: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> InterceptorConfig for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The configuration values registered with one route.
#[derive(Clone, Default)]
pub struct Configs {
    items: Arc<[Arc<dyn InterceptorConfig>]>,
}

impl Configs {
    pub fn new(items: Vec<Arc<dyn InterceptorConfig>>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Returns the first registered value of type `T`.
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.items
            .iter()
            .find_map(|item| (**item).as_any().downcast_ref::<T>())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.find::<T>().is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl std::fmt::Debug for Configs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configs")
            .field("len", &self.items.len())
            .finish()
    }
}

/// Collects route configuration values.
///
/// ```
/// use safeweb::configs;
/// use safeweb::security::xsrf::SkipTokens;
///
/// let cfgs = configs![SkipTokens];
/// assert!(cfgs.contains::<SkipTokens>());
/// ```
#[macro_export]
macro_rules! configs {
    ($($cfg:expr),* $(,)?) => {
        $crate::interceptor::Configs::new(vec![
            $(::std::sync::Arc::new($cfg) as ::std::sync::Arc<dyn $crate::interceptor::InterceptorConfig>),*
        ])
    };
}

/// The core trait for all safeweb interceptors.
///
/// # Contract
///
/// - Implementations are shared across Tokio tasks and must be `Send + Sync`.
/// - Both phases are synchronous: policy checks never wait on I/O.
/// - An interceptor that owns a response header must
///   [`claim`](crate::context::ResponseHeaders::claim) it in `before`, which
///   makes conflicting writers fail loudly instead of racing.
pub trait Interceptor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs before the handler.
    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow;

    /// Runs after a response was written, before it is encoded.
    fn commit(&self, _ctx: &mut Context, _response: &mut Response, _configs: &Configs) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Limit(u32);
    struct Marker;

    #[test]
    fn find_by_type() {
        let cfgs = crate::configs![Limit(3), Marker, Limit(9)];
        assert_eq!(cfgs.len(), 3);
        assert_eq!(cfgs.find::<Limit>(), Some(&Limit(3)));
        assert!(cfgs.contains::<Marker>());
        assert!(!cfgs.contains::<String>());
    }

    #[test]
    fn empty_configs() {
        let cfgs = Configs::default();
        assert!(cfgs.is_empty());
        assert!(cfgs.find::<Marker>().is_none());
    }

    #[test]
    fn reject_builds_error_response() {
        assert!(matches!(
            Flow::reject(StatusCode::Forbidden),
            Flow::Respond(Response::Error(StatusCode::Forbidden))
        ));
    }
}
