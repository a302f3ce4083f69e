//! Cross-Origin-Opener-Policy.
//!
//! Isolates the page's browsing context group from cross-origin windows it
//! opens or is opened by. A route can replace the policy by registering a
//! [`Policy`] as route configuration.

use serde::Deserialize;

use crate::context::Context;
use crate::interceptor::{self, Configs, Flow};

/// The COOP modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    SameOrigin,
    SameOriginAllowPopups,
    UnsafeNone,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SameOrigin => "same-origin",
            Self::SameOriginAllowPopups => "same-origin-allow-popups",
            Self::UnsafeNone => "unsafe-none",
        }
    }
}

/// One COOP policy, enforced or report-only.
///
/// ```
/// use safeweb::security::coop::{Mode, Policy};
///
/// let policy = Policy::new(Mode::SameOriginAllowPopups).report_to("coop");
/// assert_eq!(policy.header_value(), r#"same-origin-allow-popups; report-to="coop""#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub mode: Mode,
    pub report_to: Option<String>,
    pub report_only: bool,
}

impl Policy {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn report_to(mut self, group: impl Into<String>) -> Self {
        self.report_to = Some(group.into());
        self
    }

    #[must_use]
    pub fn report_only(mut self) -> Self {
        self.report_only = true;
        self
    }

    pub fn header_value(&self) -> String {
        match &self.report_to {
            Some(group) => format!("{}; report-to=\"{group}\"", self.mode.as_str()),
            None => self.mode.as_str().to_owned(),
        }
    }
}

/// Sets `Cross-Origin-Opener-Policy` and
/// `Cross-Origin-Opener-Policy-Report-Only` from a list of policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interceptor {
    policies: Vec<Policy>,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new([Policy::default()])
    }
}

impl Interceptor {
    pub fn new(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
        }
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "coop"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        let policies = match configs.find::<Policy>() {
            Some(route_policy) => std::slice::from_ref(route_policy),
            None => self.policies.as_slice(),
        };

        let (report_only, enforced): (Vec<&Policy>, Vec<&Policy>) =
            policies.iter().partition(|p| p.report_only);

        let headers = ctx.headers_mut();
        for (name, group) in [
            ("Cross-Origin-Opener-Policy", enforced),
            ("Cross-Origin-Opener-Policy-Report-Only", report_only),
        ] {
            let result = headers.claim(name).and_then(|claim| {
                headers.set_claimed(&claim, group.iter().map(|p| p.header_value()))
            });
            if let Err(err) = result {
                return Flow::header_failure(self.name(), err);
            }
        }
        Flow::Continue
    }
}
