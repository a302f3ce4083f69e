//! Per-request context — the request, its extensions, and the response being built.
//!
//! A handler receives a [`Context`] by value and must hand back a [`Written`]
//! token. The only way to get one is to consume the context through
//! [`Context::write`] (or one of its shorthands), so every request produces
//! exactly one response and nothing can be written after it.

pub mod header;

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::http::{Cookie, Form, FormError, Headers, Request, StatusCode};
use crate::response::Response;

pub use header::{Claim, HeaderError, ResponseHeaders};

/// Type-erased request extensions map — used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
///
/// Interceptors keep their per-request values here (the CSP nonce, the XSRF
/// token) so that handlers and the commit phase can read them back.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        return Self {
            map: HashMap::new(),
        };
    }

    /// Insert a value into the extensions map
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value from the extensions map
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context: the incoming request plus the response under construction.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
    headers: ResponseHeaders,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub(crate) fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
            headers: ResponseHeaders::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The headers of the response this request will produce.
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    /// Queues a `Set-Cookie` header on the response.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.headers.add_cookie(cookie);
    }

    /// Parses the request body as a url-encoded form.
    ///
    /// # Errors
    ///
    /// See [`Request::form`].
    pub fn form(&self) -> Result<Form, FormError> {
        self.request.form()
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.request.body();
        serde_json::from_slice(body)
    }

    pub(crate) fn into_headers(self) -> Headers {
        self.headers.into_headers()
    }

    /// Finishes the request with `response`.
    pub fn write(self, response: impl Into<Response>) -> Written {
        Written {
            ctx: self,
            response: response.into(),
        }
    }

    /// Finishes the request with an error status.
    pub fn write_error(self, code: StatusCode) -> Written {
        self.write(Response::Error(code))
    }

    /// Finishes the request with a redirect to `location`.
    ///
    /// `code` must be a 3xx status; anything else is turned into a 500 when
    /// the response is dispatched.
    pub fn redirect(self, location: impl Into<String>, code: StatusCode) -> Written {
        self.write(Response::redirect(location, code))
    }

    /// Finishes the request with `204 No Content`.
    pub fn no_content(self) -> Written {
        self.write(Response::NoContent)
    }
}

/// Proof that a request's response has been written.
///
/// Returned by the writing methods of [`Context`]; handlers return it to the
/// multiplexer, which runs the commit phase and serializes the response.
pub struct Written {
    ctx: Context,
    response: Response,
}

impl Written {
    /// The response that was written.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The response headers as they stood when the response was written.
    pub fn headers(&self) -> &ResponseHeaders {
        &self.ctx.headers
    }

    pub(crate) fn into_parts(self) -> (Context, Response) {
        (self.ctx, self.response)
    }
}
