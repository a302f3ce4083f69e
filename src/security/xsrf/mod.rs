//! Cross-site request forgery protection for server-rendered HTML.
//!
//! Every client gets a random, HttpOnly `__Host-xsrf` cookie. Forms carry a
//! token signed over that cookie and the request host; templates parsed with
//! [`inject`](crate::template::inject) insert it automatically through the
//! [`XSRF_TOKEN_FN`](crate::template::XSRF_TOKEN_FN) function.
//!
//! Requests with state-changing methods are rejected with:
//!
//! | Condition                     | Status             |
//! |-------------------------------|--------------------|
//! | no `__Host-xsrf` cookie       | `403 Forbidden`    |
//! | no `xsrf-token` form field    | `401 Unauthorized` |
//! | token does not validate       | `403 Forbidden`    |
//!
//! Single-page applications that send JSON should use [`angular`] instead.

pub mod angular;
pub mod token;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use tracing::{error, warn};

use crate::config::ConfigError;
use crate::context::Context;
use crate::http::{Cookie, StatusCode};
use crate::interceptor::{self, Configs, Flow};
use crate::response::Response;
use crate::router::pattern::normalize_host;
use crate::template::XSRF_TOKEN_FN;
use crate::template::inject::XSRF_FIELD_NAME;

pub use token::{TokenError, TokenSigner};

/// Name of the cookie identifying the client.
pub const COOKIE_NAME: &str = "__Host-xsrf";

/// Route configuration that skips token checks.
///
/// Meant for endpoints authenticated by other means, such as webhooks with
/// their own signatures. A token is still generated so templates render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipTokens;

// The token issued for the current request.
struct Token(String);

/// Returns the XSRF token issued for this request, if an XSRF interceptor ran.
pub fn token(ctx: &Context) -> Option<&str> {
    ctx.extensions().get::<Token>().map(|t| t.0.as_str())
}

/// The HTML XSRF interceptor. See the [module docs](self).
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
        let Some(cookie) = cookie else {
            warn!(path = %ctx.request().path(), "state-changing request without XSRF cookie");
            return Err(StatusCode::Forbidden);
        };
        let submitted = ctx
            .form()
            .ok()
            .and_then(|form| form.string(XSRF_FIELD_NAME).map(str::to_owned));
        let Some(submitted) = submitted else {
            warn!(path = %ctx.request().path(), "state-changing request without XSRF token");
            return Err(StatusCode::Unauthorized);
        };
        self.signer
            .validate(&submitted, cookie, action)
            .map_err(|err| {
                warn!(path = %ctx.request().path(), error = %err, "XSRF token rejected");
                StatusCode::Forbidden
            })
    }
}

pub(crate) fn random_cookie_value() -> String {
    let bytes: [u8; 20] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "xsrf"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        let action = normalize_host(ctx.request().host());
        let existing = ctx.request().cookie(COOKIE_NAME).map(str::to_owned);

        if ctx.request().method().is_state_changing() && !configs.contains::<SkipTokens>() {
            if let Err(code) = self.check(ctx, existing.as_deref(), &action) {
                return Flow::reject(code);
            }
        }

        let cookie_value = match existing {
            Some(value) => value,
            None => {
                let value = random_cookie_value();
                match Cookie::new(COOKIE_NAME, value.clone()) {
                    Ok(cookie) => ctx.set_cookie(cookie),
                    Err(err) => {
                        error!(error = %err, "could not build XSRF cookie");
                        return Flow::reject(StatusCode::InternalServerError);
                    }
                }
                value
            }
        };

        match self.signer.generate(&cookie_value, &action) {
            Ok(token) => {
                ctx.extensions_mut().insert(Token(token));
                Flow::Continue
            }
            Err(err) => {
                error!(error = %err, "could not generate XSRF token");
                Flow::reject(StatusCode::InternalServerError)
            }
        }
    }

    fn commit(&self, ctx: &mut Context, response: &mut Response, _configs: &Configs) {
        let Some(token) = token(ctx) else {
            return;
        };
        if let Some(template) = response.as_template_mut() {
            template.add_fn(XSRF_TOKEN_FN, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::configs;
    use crate::http::Method;
    use crate::router::{ServeMux, ServeMuxConfig};
    use crate::template::{HtmlTemplate, InjectConfig};
    use crate::test_utils::{capture_warnings, get, ok_html, request, text};

    const KEY: &[u8] = b"test key";
    const FORM: (&str, &str) = ("Content-Type", "application/x-www-form-urlencoded");

    fn mux() -> ServeMux {
        let form = Arc::new(
            HtmlTemplate::parse_injected("<form method=post></form>", &InjectConfig::default())
                .unwrap(),
        );
        ServeMuxConfig::default()
            .intercept(Interceptor::new(KEY).unwrap())
            .handle("/form", Method::Get, move |ctx: Context| {
                let form = Arc::clone(&form);
                async move { ctx.write(Response::template(form, serde_json::Value::Null)) }
            })
            .handle("/submit", Method::Post, ok_html)
            .handle_with("/hook", Method::Post, ok_html, configs![SkipTokens])
            .build()
    }

    fn valid_token(cookie: &str) -> String {
        TokenSigner::new(KEY).generate(cookie, "localhost").unwrap()
    }

    #[test]
    fn rejections_are_logged_as_warnings() {
        use crate::interceptor::Interceptor as _;

        let xsrf = Interceptor::new(KEY).unwrap();
        let mut ctx = Context::new(request("POST", "/submit", &[FORM], "a=1"));
        let (flow, logs) = capture_warnings(|| xsrf.before(&mut ctx, &Configs::default()));
        assert!(matches!(flow, Flow::Respond(Response::Error(StatusCode::Forbidden))));
        assert!(logs.contains("WARN") && logs.contains("without XSRF cookie"), "{logs}");

        let cookie = format!("{COOKIE_NAME}=abc");
        let headers = [FORM, ("Cookie", cookie.as_str())];
        let mut ctx = Context::new(request("POST", "/submit", &headers, "xsrf-token=forged"));
        let (flow, logs) = capture_warnings(|| xsrf.before(&mut ctx, &Configs::default()));
        assert!(matches!(flow, Flow::Respond(Response::Error(StatusCode::Forbidden))));
        assert!(logs.contains("WARN") && logs.contains("XSRF token rejected"), "{logs}");
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(Interceptor::new(Vec::<u8>::new()), Err(ConfigError::EmptyXsrfKey)));
    }

    #[tokio::test]
    async fn get_sets_cookie_and_injects_token() {
        let res = mux().serve(get("/form")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let set_cookie = res.headers().get("set-cookie").unwrap();
        assert!(set_cookie.starts_with("__Host-xsrf="));
        assert!(set_cookie.contains("; Secure; HttpOnly; SameSite=Lax"));

        let cookie = set_cookie
            .split(';')
            .next()
            .and_then(|kv| kv.split_once('='))
            .map(|(_, v)| v)
            .unwrap();
        let body = text(&res);
        let start = body.find("value=\"").unwrap() + 7;
        let end = start + body[start..].find('"').unwrap();
        let token = &body[start..end];
        assert!(
            TokenSigner::new(KEY)
                .validate(token, cookie, "localhost")
                .is_ok()
        );
    }

    #[tokio::test]
    async fn existing_cookie_is_kept() {
        let res = mux()
            .serve(request("GET", "/form", &[("Cookie", "__Host-xsrf=abc")], ""))
            .await;
        assert!(!res.headers().contains("set-cookie"));
    }

    #[tokio::test]
    async fn post_without_cookie_is_forbidden() {
        let body = format!("xsrf-token={}", valid_token("abc"));
        let res = mux().serve(request("POST", "/submit", &[FORM], &body)).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn post_without_token_is_unauthorized() {
        let headers = [FORM, ("Cookie", "__Host-xsrf=abc")];
        let res = mux().serve(request("POST", "/submit", &headers, "a=b")).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn post_with_wrong_token_is_forbidden() {
        let headers = [FORM, ("Cookie", "__Host-xsrf=abc")];
        let body = format!("xsrf-token={}", valid_token("other"));
        let res = mux().serve(request("POST", "/submit", &headers, &body)).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn post_with_valid_token_passes() {
        let headers = [FORM, ("Cookie", "__Host-xsrf=abc")];
        let body = format!("xsrf-token={}", valid_token("abc"));
        let res = mux().serve(request("POST", "/submit", &headers, &body)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn skip_tokens_route() {
        let res = mux().serve(request("POST", "/hook", &[], "")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
