//! Clickjacking protection.
//!
//! Browsers that understand CSP `frame-ancestors` get it from the
//! [`FramingPolicy`](super::csp::FramingPolicy); older ones fall back to
//! `X-Frame-Options: SAMEORIGIN`, set by this module's [`Interceptor`].
//! [`interceptors`] returns both, ready to install.

use std::sync::Arc;

use crate::context::Context;
use crate::interceptor::{self, Configs, Flow};

use super::csp;

/// Route configuration that lets the listed origins frame the page.
///
/// `X-Frame-Options` cannot express an allow-list, so routes carrying this
/// configuration rely on CSP alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(Vec<String>);

impl AllowList {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(origins.into_iter().map(Into::into).collect())
    }

    pub fn origins(&self) -> &[String] {
        &self.0
    }
}

/// Route configuration that turns framing protection off entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disable;

/// Sets `X-Frame-Options`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interceptor;

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "framing"
    }

    fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
        let headers = ctx.headers_mut();
        let claim = match headers.claim("X-Frame-Options") {
            Ok(claim) => claim,
            Err(err) => return Flow::header_failure(self.name(), err),
        };
        if configs.contains::<Disable>() || configs.contains::<AllowList>() {
            return Flow::Continue;
        }
        match headers.set_claimed(&claim, ["SAMEORIGIN"]) {
            Ok(()) => Flow::Continue,
            Err(err) => Flow::header_failure(self.name(), err),
        }
    }
}

/// The CSP `frame-ancestors` interceptor followed by the `X-Frame-Options`
/// one.
pub fn interceptors(report_uri: Option<&str>) -> Vec<Arc<dyn interceptor::Interceptor>> {
    let policy = csp::FramingPolicy::new(false, report_uri.map(str::to_owned));
    vec![
        Arc::new(csp::Interceptor::new().policy(policy)),
        Arc::new(Interceptor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs;
    use crate::http::Method;
    use crate::router::{ServeMux, ServeMuxConfig};
    use crate::test_utils::{get, ok_html};

    fn mux() -> ServeMux {
        let mut cfg = ServeMuxConfig::default();
        for interceptor in interceptors(Some("/report")) {
            cfg = cfg.intercept_shared(interceptor);
        }
        cfg.handle("/", Method::Get, ok_html)
            .handle_with(
                "/embed",
                Method::Get,
                ok_html,
                configs![AllowList::new(["https://a.example", "https://b.example"])],
            )
            .handle_with("/open", Method::Get, ok_html, configs![Disable])
            .build()
    }

    #[tokio::test]
    async fn same_origin_by_default() {
        let res = mux().serve(get("/")).await;
        assert_eq!(res.headers().get("x-frame-options"), Some("SAMEORIGIN"));
        assert_eq!(
            res.headers().get("content-security-policy"),
            Some("frame-ancestors 'self'; report-uri /report")
        );
    }

    #[tokio::test]
    async fn allow_list_extends_csp_and_drops_xfo() {
        let res = mux().serve(get("/embed")).await;
        assert_eq!(res.headers().get("x-frame-options"), None);
        assert_eq!(
            res.headers().get("content-security-policy"),
            Some("frame-ancestors 'self' https://a.example https://b.example; report-uri /report")
        );
    }

    #[tokio::test]
    async fn disabled_route_has_neither_header() {
        let res = mux().serve(get("/open")).await;
        assert_eq!(res.headers().get("x-frame-options"), None);
        assert_eq!(res.headers().get("content-security-policy"), None);
    }
}
