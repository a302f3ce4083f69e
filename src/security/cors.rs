//! Cross-Origin Resource Sharing.
//!
//! Only origins on an explicit allow-list may read responses; there is no
//! wildcard. The interceptor:
//!
//! - lets requests without an `Origin` header (and same-origin requests)
//!   through untouched;
//! - rejects requests from origins not on the list with `403 Forbidden`;
//! - answers preflights (`OPTIONS` with `Access-Control-Request-Method`)
//!   itself with `204 No Content`, or `403` for a disallowed method or
//!   header;
//! - requires cross-origin requests that a browser would send without a
//!   preflight (GET, HEAD and POST with a CORS-safelisted content type) to
//!   carry `X-Cors: 1`, else `412 Precondition Failed`. Setting that header
//!   forces a preflight, so a form on a foreign site can never reach the
//!   handler;
//! - adds `Access-Control-Allow-Origin`, `Vary: Origin` and, when
//!   configured, the credentials and expose-headers headers to allowed
//!   responses.

use std::time::Duration;

use tracing::warn;

use crate::config::ConfigError;
use crate::context::{Context, HeaderError, ResponseHeaders};
use crate::http::{Method, StatusCode};
use crate::interceptor::{self, Configs, Flow};
use crate::response::Response;

/// Header that cross-origin simple requests must carry.
pub const CORS_HEADER: &str = "X-Cors";

const SAFELISTED_CONTENT_TYPES: [&str; 3] = [
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

/// The CORS interceptor.
///
/// ```
/// use std::time::Duration;
/// use safeweb::http::Method;
/// use safeweb::security::cors;
///
/// let cors = cors::Interceptor::new(["https://app.example.com"])
///     .unwrap()
///     .allow_method(Method::Put)
///     .allow_header("Authorization")
///     .expose_header("X-Request-Id")
///     .allow_credentials(true)
///     .max_age(Duration::from_secs(600));
///
/// assert!(cors::Interceptor::new(["*"]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interceptor {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<Method>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Duration,
}

impl Interceptor {
    /// Creates an interceptor for the given origins, allowing `GET`, `HEAD`
    /// and `POST` and no extra request headers besides `X-Cors`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::WildcardOrigin`] for `*`, [`ConfigError::InvalidOrigin`]
    /// for anything that is not `scheme://host[:port]`.
    pub fn new<I, S>(origins: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed_origins = Vec::new();
        for origin in origins {
            let origin = origin.into();
            if origin == "*" {
                return Err(ConfigError::WildcardOrigin);
            }
            if !is_origin(&origin) {
                return Err(ConfigError::InvalidOrigin(origin));
            }
            allowed_origins.push(origin);
        }
        Ok(Self {
            allowed_origins,
            allowed_methods: vec![Method::Get, Method::Head, Method::Post],
            allowed_headers: vec![CORS_HEADER.to_owned()],
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age: Duration::from_secs(5),
        })
    }

    #[must_use]
    pub fn allow_method(mut self, method: Method) -> Self {
        if !self.allowed_methods.contains(&method) {
            self.allowed_methods.push(method);
        }
        self
    }

    /// Allows a request header in preflighted requests. Matching is
    /// case-insensitive.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    /// Lets scripts read a response header.
    #[must_use]
    pub fn expose_header(mut self, header: impl Into<String>) -> Self {
        self.exposed_headers.push(header.into());
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, on: bool) -> Self {
        self.allow_credentials = on;
        self
    }

    /// How long browsers may cache a preflight result.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn preflight(&self, ctx: &mut Context, origin: &str, method: &str) -> Flow {
        if !self.allowed_methods.iter().any(|m| m.as_str() == method) {
            warn!(origin, method, "CORS preflight for disallowed method");
            return Flow::reject(StatusCode::Forbidden);
        }
        let requested: Vec<String> = ctx
            .request()
            .headers()
            .get("access-control-request-headers")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(header) = requested.iter().find(|h| !self.header_allowed(h)) {
            warn!(origin, header = %header, "CORS preflight for disallowed header");
            return Flow::reject(StatusCode::Forbidden);
        }

        let methods = self
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let result = self.write_allow(ctx.headers_mut(), origin).and_then(|()| {
            let headers = ctx.headers_mut();
            headers.set("Access-Control-Allow-Methods", methods)?;
            if !requested.is_empty() {
                headers.set("Access-Control-Allow-Headers", requested.join(", "))?;
            }
            headers.set(
                "Access-Control-Max-Age",
                self.max_age.as_secs().to_string(),
            )
        });
        match result {
            Ok(()) => Flow::Respond(Response::NoContent),
            Err(err) => Flow::header_failure(self.name_str(), err),
        }
    }

    fn header_allowed(&self, header: &str) -> bool {
        self.allowed_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header))
    }

    fn write_allow(&self, headers: &mut ResponseHeaders, origin: &str) -> Result<(), HeaderError> {
        let claim = headers.claim("Access-Control-Allow-Origin")?;
        headers.set_claimed(&claim, [origin])?;
        headers.add("Vary", "Origin")?;
        if self.allow_credentials {
            headers.set("Access-Control-Allow-Credentials", "true")?;
        }
        if !self.exposed_headers.is_empty() {
            headers.set(
                "Access-Control-Expose-Headers",
                self.exposed_headers.join(", "),
            )?;
        }
        Ok(())
    }

    fn name_str(&self) -> &'static str {
        "cors"
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        self.name_str()
    }

    fn before(&self, ctx: &mut Context, _configs: &Configs) -> Flow {
        let request = ctx.request();
        let Some(origin) = request.headers().get("origin").map(str::to_owned) else {
            return Flow::Continue;
        };
        if is_same_origin(&origin, request.host()) {
            return Flow::Continue;
        }
        if !self.allowed_origins.contains(&origin) {
            warn!(origin = %origin, "CORS request from disallowed origin");
            return Flow::reject(StatusCode::Forbidden);
        }

        let method = request.method().clone();
        if method == Method::Options {
            if let Some(requested) = request.headers().get("access-control-request-method") {
                let requested = requested.to_owned();
                return self.preflight(ctx, &origin, &requested);
            }
        }

        if !self.allowed_methods.contains(&method) {
            warn!(origin = %origin, method = %method, "CORS request with disallowed method");
            return Flow::reject(StatusCode::MethodNotAllowed);
        }
        if is_simple(ctx) && request_flag(ctx) != Some("1") {
            warn!(origin = %origin, "cross-origin simple request without X-Cors");
            return Flow::reject(StatusCode::PreconditionFailed);
        }

        match self.write_allow(ctx.headers_mut(), &origin) {
            Ok(()) => Flow::Continue,
            Err(err) => Flow::header_failure(self.name_str(), err),
        }
    }
}

fn request_flag(ctx: &Context) -> Option<&str> {
    ctx.request().headers().get(CORS_HEADER)
}

// A request a browser sends cross-origin without asking first.
fn is_simple(ctx: &Context) -> bool {
    let request = ctx.request();
    if !matches!(request.method(), Method::Get | Method::Head | Method::Post) {
        return false;
    }
    match request.headers().get("content-type") {
        None => true,
        Some(value) => {
            let essence = value.split(';').next().unwrap_or("").trim();
            SAFELISTED_CONTENT_TYPES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(essence))
        }
    }
}

fn is_origin(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    matches!(scheme, "http" | "https") && !rest.is_empty() && !rest.contains('/')
}

fn is_same_origin(origin: &str, host: &str) -> bool {
    !host.is_empty()
        && origin
            .split_once("://")
            .is_some_and(|(_, authority)| authority.eq_ignore_ascii_case(host))
}
