//! Double-submit XSRF protection for JavaScript clients.
//!
//! Frameworks such as Angular read the `XSRF-TOKEN` cookie and echo it in the
//! `X-XSRF-TOKEN` header of every mutating request. A cross-site attacker can
//! make the browser send the cookie but cannot read it, so cannot set the
//! header. The cookie holds a signed token, so values not minted by this
//! server are refused as well.

use tracing::{error, warn};

use crate::config::ConfigError;
use crate::context::Context;
use crate::http::{Cookie, StatusCode};
use crate::interceptor::{self, Configs, Flow};
use crate::router::pattern::normalize_host;

use super::{SkipTokens, TokenSigner};

pub const COOKIE_NAME: &str = "XSRF-TOKEN";
pub const HEADER_NAME: &str = "X-XSRF-TOKEN";

// The double-submit token is not bound to a client identity.
const USER: &str = "";

#[derive(Debug, Clone)]
pub struct Interceptor {
    signer: TokenSigner,
}

impl Interceptor {
    /// # Errors
    ///
    /// [`ConfigError::EmptyXsrfKey`] if `key` is empty.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyXsrfKey);
        }
        Ok(Self {
            signer: TokenSigner::new(key),
        })
    }

    fn check(&self, ctx: &Context, cookie: Option<&str>, action: &str) -> Result<(), StatusCode> {
        let request = ctx.request();
        let Some(cookie) = cookie else {
            warn!(path = %request.path(), "state-changing request without XSRF-TOKEN cookie");
            return Err(StatusCode::Forbidden);
        };
        let Some(header) = request.headers().get(HEADER_NAME) else {
            warn!(path = %request.path(), "state-changing request without X-XSRF-TOKEN");
            return Err(StatusCode::Unauthorized);
        };
        if header != cookie {
            warn!(path = %request.path(), "X-XSRF-TOKEN does not match cookie");
            return Err(StatusCode::Forbidden);
        }
        self.signer.validate(header, USER, action).map_err(|err| {
            warn!(path = %request.path(), error = %err, "XSRF-TOKEN rejected");
            StatusCode::Forbidden
        })
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "xsrf_angular"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        let action = normalize_host(ctx.request().host());
        let existing = ctx.request().cookie(COOKIE_NAME).map(str::to_owned);

        if ctx.request().method().is_state_changing() && !configs.contains::<SkipTokens>() {
            if let Err(code) = self.check(ctx, existing.as_deref(), &action) {
                return Flow::reject(code);
            }
        }

        let still_valid = existing
            .as_deref()
            .is_some_and(|token| self.signer.validate(token, USER, &action).is_ok());
        if still_valid {
            return Flow::Continue;
        }

        let cookie = self
            .signer
            .generate(USER, &action)
            .map_err(|err| err.to_string())
            .and_then(|token| Cookie::new(COOKIE_NAME, token).map_err(|err| err.to_string()));
        match cookie {
            Ok(mut cookie) => {
                cookie.disable_http_only();
                ctx.set_cookie(cookie);
                Flow::Continue
            }
            Err(err) => {
                error!(error = %err, "could not issue XSRF-TOKEN cookie");
                Flow::reject(StatusCode::InternalServerError)
            }
        }
    }
}
