//! HTTP Strict Transport Security.
//!
//! Plain HTTP requests are redirected to HTTPS with `301 Moved Permanently`,
//! and HTTPS responses carry `Strict-Transport-Security`. When the server
//! sits behind a TLS-terminating proxy it never sees HTTPS itself, so
//! [`Builder::behind_proxy`] turns the redirect off and always sends the
//! header instead.

use std::time::Duration;

use crate::config::ConfigError;
use crate::context::Context;
use crate::http::StatusCode;
use crate::interceptor::{self, Configs, Flow};
use crate::response::Response;

/// Two years, the value browsers' preload lists ask for.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(63_072_000);

/// The HSTS interceptor. See the [module docs](self).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interceptor {
    max_age: Duration,
    include_subdomains: bool,
    preload: bool,
    behind_proxy: bool,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            include_subdomains: true,
            preload: false,
            behind_proxy: false,
        }
    }
}

impl Interceptor {
    pub fn builder() -> Builder {
        Builder(Self::default())
    }

    /// The `Strict-Transport-Security` value this interceptor sends.
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age.as_secs());
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }
}

/// Configures an HSTS [`Interceptor`].
///
/// ```
/// use std::time::Duration;
/// use safeweb::security::hsts;
///
/// let hsts = hsts::Interceptor::builder()
///     .max_age(Duration::from_secs(86_400))
///     .include_subdomains(false)
///     .build()
///     .unwrap();
/// assert_eq!(hsts.header_value(), "max-age=86400");
///
/// assert!(hsts::Interceptor::builder()
///     .max_age(Duration::ZERO)
///     .preload(true)
///     .build()
///     .is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Builder(Interceptor);

impl Builder {
    /// Whole seconds only; sub-second parts are dropped.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.0.max_age = max_age;
        self
    }

    #[must_use]
    pub fn include_subdomains(mut self, on: bool) -> Self {
        self.0.include_subdomains = on;
        self
    }

    #[must_use]
    pub fn preload(mut self, on: bool) -> Self {
        self.0.preload = on;
        self
    }

    #[must_use]
    pub fn behind_proxy(mut self, on: bool) -> Self {
        self.0.behind_proxy = on;
        self
    }

    /// # Errors
    ///
    /// [`ConfigError::PreloadWithoutMaxAge`] when preload is requested with a
    /// zero max-age, which would ask browsers to both pin and forget the host.
    pub fn build(self) -> Result<Interceptor, ConfigError> {
        if self.0.preload && self.0.max_age.as_secs() == 0 {
            return Err(ConfigError::PreloadWithoutMaxAge);
        }
        Ok(self.0)
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "hsts"
    }

    fn before(&self, ctx: &mut Context, _configs: &Configs) -> Flow {
        if !self.behind_proxy && !ctx.request().is_tls() {
            let request = ctx.request();
            let mut location = format!("https://{}{}", request.host(), request.path());
            if let Some(query) = request.query_string() {
                location.push('?');
                location.push_str(query);
            }
            return Flow::Respond(Response::redirect(location, StatusCode::MovedPermanently));
        }

        let headers = ctx.headers_mut();
        let result = headers
            .claim("Strict-Transport-Security")
            .and_then(|claim| headers.set_claimed(&claim, [self.header_value()]));
        match result {
            Ok(()) => Flow::Continue,
            Err(err) => Flow::header_failure(self.name(), err),
        }
    }
}
