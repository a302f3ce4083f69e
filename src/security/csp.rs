//! Content Security Policy.
//!
//! Every request gets a fresh nonce (20 random bytes, base64). The
//! interceptor stores it in the [`Context`] extensions, renders its policies
//! into `Content-Security-Policy` and `Content-Security-Policy-Report-Only`,
//! and, on commit, exposes the nonce to templates as
//! [`CSP_NONCE_FN`](crate::template::CSP_NONCE_FN).
//!
//! Several CSP interceptors may be installed (for example the default one and
//! the framing one from [`framing::interceptors`](super::framing::interceptors)).
//! They share the nonce and the header claims, and their policies accumulate
//! as separate header values, which browsers enforce independently.
//!
//! A route registered with the [`Disable`] configuration gets no CSP headers;
//! the nonce is still available so templates render.

use std::sync::Arc;

use crate::context::{Claim, Context, HeaderError};
use crate::interceptor::{self, Configs, Flow};
use crate::response::Response;
use crate::template::CSP_NONCE_FN;

use super::framing;

const NONCE_BYTES: usize = 20;

/// Route configuration turning CSP off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disable;

/// A policy the CSP interceptor can render.
pub trait Policy: Send + Sync {
    /// Renders the policy for one request, or `None` if it does not apply.
    fn serialize(&self, nonce: &str, configs: &Configs) -> Option<String>;

    /// Whether the policy goes into the report-only header.
    fn report_only(&self) -> bool;
}

fn with_report_uri(mut policy: String, report_uri: Option<&str>) -> String {
    if let Some(uri) = report_uri {
        policy.push_str("; report-uri ");
        policy.push_str(uri);
    }
    policy
}

/// A nonce-based strict policy.
///
/// ```
/// use safeweb::interceptor::Configs;
/// use safeweb::security::csp::{Policy, StrictPolicy};
///
/// let policy = StrictPolicy::default().unsafe_eval().base_uri("'self'");
/// assert_eq!(
///     policy.serialize("abc", &Configs::default()).unwrap(),
///     "object-src 'none'; script-src 'unsafe-inline' 'nonce-abc' 'strict-dynamic' \
///      'unsafe-eval' https: http:; base-uri 'self'"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrictPolicy {
    report_only: bool,
    report_uri: Option<String>,
    no_strict_dynamic: bool,
    unsafe_eval: bool,
    base_uri: Option<String>,
}

impl StrictPolicy {
    #[must_use]
    pub fn report_only(mut self) -> Self {
        self.report_only = true;
        self
    }

    #[must_use]
    pub fn report_uri(mut self, uri: impl Into<String>) -> Self {
        self.report_uri = Some(uri.into());
        self
    }

    /// Leaves out `'strict-dynamic'`, for pages whose scripts are not all
    /// nonced or loaded by nonced scripts.
    #[must_use]
    pub fn no_strict_dynamic(mut self) -> Self {
        self.no_strict_dynamic = true;
        self
    }

    #[must_use]
    pub fn unsafe_eval(mut self) -> Self {
        self.unsafe_eval = true;
        self
    }

    /// Replaces `base-uri 'none'`.
    #[must_use]
    pub fn base_uri(mut self, value: impl Into<String>) -> Self {
        self.base_uri = Some(value.into());
        self
    }
}

impl Policy for StrictPolicy {
    fn serialize(&self, nonce: &str, _configs: &Configs) -> Option<String> {
        let mut script_src = format!("'unsafe-inline' 'nonce-{nonce}'");
        if !self.no_strict_dynamic {
            script_src.push_str(" 'strict-dynamic'");
        }
        if self.unsafe_eval {
            script_src.push_str(" 'unsafe-eval'");
        }
        let base_uri = self.base_uri.as_deref().unwrap_or("'none'");
        let policy =
            format!("object-src 'none'; script-src {script_src} https: http:; base-uri {base_uri}");
        Some(with_report_uri(policy, self.report_uri.as_deref()))
    }

    fn report_only(&self) -> bool {
        self.report_only
    }
}

/// `frame-ancestors 'self'`, extended by a route's
/// [`framing::AllowList`] and skipped for routes with [`framing::Disable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramingPolicy {
    report_only: bool,
    report_uri: Option<String>,
}

impl FramingPolicy {
    pub fn new(report_only: bool, report_uri: Option<String>) -> Self {
        Self {
            report_only,
            report_uri,
        }
    }
}

impl Policy for FramingPolicy {
    fn serialize(&self, _nonce: &str, configs: &Configs) -> Option<String> {
        if configs.contains::<framing::Disable>() {
            return None;
        }
        let mut policy = String::from("frame-ancestors 'self'");
        if let Some(allow) = configs.find::<framing::AllowList>() {
            for origin in allow.origins() {
                policy.push(' ');
                policy.push_str(origin);
            }
        }
        Some(with_report_uri(policy, self.report_uri.as_deref()))
    }

    fn report_only(&self) -> bool {
        self.report_only
    }
}

/// `require-trusted-types-for 'script'`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedTypesPolicy {
    report_only: bool,
    report_uri: Option<String>,
}

impl TrustedTypesPolicy {
    pub fn new(report_only: bool, report_uri: Option<String>) -> Self {
        Self {
            report_only,
            report_uri,
        }
    }
}

impl Policy for TrustedTypesPolicy {
    fn serialize(&self, _nonce: &str, _configs: &Configs) -> Option<String> {
        Some(with_report_uri(
            "require-trusted-types-for 'script'".to_owned(),
            self.report_uri.as_deref(),
        ))
    }

    fn report_only(&self) -> bool {
        self.report_only
    }
}

// Per-request state shared by every CSP interceptor.
struct State {
    nonce: String,
    enforce: Claim,
    report: Claim,
    enforced: Vec<String>,
    reported: Vec<String>,
}

/// Returns the current request's CSP nonce, if a CSP interceptor ran.
pub fn nonce(ctx: &Context) -> Option<&str> {
    ctx.extensions()
        .get::<State>()
        .map(|state| state.nonce.as_str())
}

/// The CSP interceptor. See the [module docs](self).
#[derive(Clone)]
pub struct Interceptor {
    policies: Vec<Arc<dyn Policy>>,
}

impl Default for Interceptor {
    /// A strict policy plus Trusted Types, both enforced.
    fn default() -> Self {
        Self::new()
            .policy(StrictPolicy::default())
            .policy(TrustedTypesPolicy::default())
    }
}

impl Interceptor {
    /// An interceptor with no policies; add them with [`policy`](Self::policy).
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// The default policies, reporting violations to `report_uri`.
    pub fn with_report_uri(report_uri: impl Into<String>) -> Self {
        let uri = report_uri.into();
        Self::new()
            .policy(StrictPolicy::default().report_uri(uri.clone()))
            .policy(TrustedTypesPolicy::new(false, Some(uri)))
    }

    #[must_use]
    pub fn policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    fn state(ctx: &mut Context) -> Result<State, HeaderError> {
        if let Some(state) = ctx.extensions_mut().remove::<State>() {
            return Ok(state);
        }
        let headers = ctx.headers_mut();
        Ok(State {
            nonce: super::random_base64(NONCE_BYTES),
            enforce: headers.claim("Content-Security-Policy")?,
            report: headers.claim("Content-Security-Policy-Report-Only")?,
            enforced: Vec::new(),
            reported: Vec::new(),
        })
    }

    fn apply(&self, ctx: &mut Context, configs: &Configs) -> Result<(), HeaderError> {
        let mut state = Self::state(ctx)?;
        if !configs.contains::<Disable>() {
            for policy in &self.policies {
                let Some(value) = policy.serialize(&state.nonce, configs) else {
                    continue;
                };
                if policy.report_only() {
                    state.reported.push(value);
                } else {
                    state.enforced.push(value);
                }
            }
        }
        let headers = ctx.headers_mut();
        let written = headers
            .set_claimed(&state.enforce, state.enforced.iter().cloned())
            .and_then(|()| headers.set_claimed(&state.report, state.reported.iter().cloned()));
        ctx.extensions_mut().insert(state);
        written
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "csp"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        match self.apply(ctx, configs) {
            Ok(()) => Flow::Continue,
            Err(err) => Flow::header_failure(self.name(), err),
        }
    }

    fn commit(&self, ctx: &mut Context, response: &mut Response, _configs: &Configs) {
        let Some(nonce) = nonce(ctx) else {
            return;
        };
        if let Some(template) = response.as_template_mut() {
            template.add_fn(CSP_NONCE_FN, nonce);
        }
    }
}
