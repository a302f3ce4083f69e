//! Fetch Metadata request filtering.
//!
//! Browsers tag every request with `Sec-Fetch-Site`, `Sec-Fetch-Mode` and
//! `Sec-Fetch-Dest`. The Resource Isolation Policy uses them to refuse
//! cross-site requests that are not plain navigations, which stops CSRF,
//! XSSI and most cross-site leaks before any handler runs. Requests from
//! browsers that do not send the headers are let through.
//!
//! The optional Navigation Isolation Policy additionally refuses cross-site
//! navigations, for applications that are never linked to from elsewhere.

use tracing::warn;

use crate::context::Context;
use crate::http::{Method, StatusCode};
use crate::interceptor::{self, Configs, Flow};

/// Route configuration exempting a route from both policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    Resource,
    Navigation,
}

impl Violation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource isolation",
            Self::Navigation => "navigation isolation",
        }
    }
}

/// The Fetch Metadata interceptor.
///
/// ```
/// use safeweb::security::fetch_metadata;
///
/// let fm = fetch_metadata::Interceptor::default()
///     .cors_endpoint("/api/public")
///     .report_only(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interceptor {
    navigation_isolation: bool,
    report_only: bool,
    cors_endpoints: Vec<String>,
}

impl Interceptor {
    /// Also reject cross-site navigations.
    #[must_use]
    pub fn navigation_isolation(mut self, on: bool) -> Self {
        self.navigation_isolation = on;
        self
    }

    /// Log violations at `warn` instead of rejecting them.
    #[must_use]
    pub fn report_only(mut self, on: bool) -> Self {
        self.report_only = on;
        self
    }

    /// Accept cross-site `cors` mode requests to `path`.
    #[must_use]
    pub fn cors_endpoint(mut self, path: impl Into<String>) -> Self {
        self.cors_endpoints.push(path.into());
        self
    }

    fn check(&self, ctx: &Context) -> Option<Violation> {
        let request = ctx.request();
        let headers = request.headers();
        let Some(site) = headers.get("sec-fetch-site") else {
            return None;
        };
        let mode = headers.get("sec-fetch-mode").unwrap_or("");
        let dest = headers.get("sec-fetch-dest").unwrap_or("");

        if matches!(site, "same-origin" | "same-site" | "none") {
            return None;
        }

        if mode == "navigate" {
            if self.navigation_isolation {
                return Some(Violation::Navigation);
            }
            let embedded = matches!(dest, "object" | "embed");
            if request.method() == &Method::Get && !embedded {
                return None;
            }
            return Some(Violation::Resource);
        }

        if mode == "cors" && self.cors_endpoints.iter().any(|p| p == request.path()) {
            return None;
        }
        Some(Violation::Resource)
    }
}

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "fetch_metadata"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        if configs.contains::<Exempt>() {
            return Flow::Continue;
        }
        let Some(violation) = self.check(ctx) else {
            return Flow::Continue;
        };

        let request = ctx.request();
        let headers = request.headers();
        warn!(
            policy = violation.as_str(),
            report_only = self.report_only,
            method = %request.method(),
            path = %request.path(),
            site = headers.get("sec-fetch-site").unwrap_or(""),
            mode = headers.get("sec-fetch-mode").unwrap_or(""),
            dest = headers.get("sec-fetch-dest").unwrap_or(""),
            "fetch metadata policy violation"
        );
        if self.report_only {
            Flow::Continue
        } else {
            Flow::reject(StatusCode::Forbidden)
        }
    }
}
