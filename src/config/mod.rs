//! Configuration of the security interceptor stack.
//!
//! Every interceptor can be built directly with its own builder methods.
//! [`SecurityConfig`] bundles the same settings into one `serde` structure so
//! an application can keep them in a JSON document, and
//! [`SecurityConfig::mux_config`] turns it into a [`ServeMuxConfig`] with the
//! interceptors installed in the recommended order. Secrets such as the XSRF
//! key are passed separately and never deserialized.
//!
//! ```
//! use safeweb::config::SecurityConfig;
//!
//! let config = SecurityConfig::from_json(r#"{
//!     "hsts": { "behind_proxy": true },
//!     "csp": { "report_uri": "/csp-report" },
//!     "cors": { "allowed_origins": ["https://app.example.com"] }
//! }"#).unwrap();
//! let mux = config.mux_config(b"secret key").unwrap().build();
//! assert!(mux.is_empty());
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::http::Method;
use crate::interceptor::Interceptor;
use crate::router::ServeMuxConfig;
use crate::security::{coop, cors, csp, fetch_metadata, framing, hsts, static_headers, xsrf};

/// Invalid interceptor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HSTS preload requires a non-zero max-age")]
    PreloadWithoutMaxAge,

    #[error("CORS origins must be listed explicitly, \"*\" is not allowed")]
    WildcardOrigin,

    #[error("invalid CORS origin {0:?}, expected scheme://host[:port]")]
    InvalidOrigin(String),

    #[error("the XSRF key must not be empty")]
    EmptyXsrfKey,

    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HstsConfig {
    pub max_age_secs: u64,
    pub include_subdomains: bool,
    pub preload: bool,
    pub behind_proxy: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            max_age_secs: hsts::DEFAULT_MAX_AGE.as_secs(),
            include_subdomains: true,
            preload: false,
            behind_proxy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CspConfig {
    pub enabled: bool,
    pub report_only: bool,
    pub report_uri: Option<String>,
    pub no_strict_dynamic: bool,
    pub unsafe_eval: bool,
    pub base_uri: Option<String>,
    pub trusted_types: bool,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_only: false,
            report_uri: None,
            no_strict_dynamic: false,
            unsafe_eval: false,
            base_uri: None,
            trusted_types: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FramingConfig {
    pub enabled: bool,
    pub report_uri: Option<String>,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_uri: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchMetadataConfig {
    pub enabled: bool,
    pub navigation_isolation: bool,
    pub report_only: bool,
    pub cors_endpoints: Vec<String>,
}

impl Default for FetchMetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            navigation_isolation: false,
            report_only: false,
            cors_endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: 5,
        }
    }
}

/// Which XSRF scheme protects state-changing requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XsrfMode {
    /// Form tokens, see [`xsrf`].
    #[default]
    Html,
    /// Double-submit cookie, see [`xsrf::angular`].
    Angular,
    Disabled,
}

/// The whole security stack. Missing sections take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub hsts: HstsConfig,
    pub static_headers: bool,
    pub coop: Vec<coop::Policy>,
    pub csp: CspConfig,
    pub framing: FramingConfig,
    pub fetch_metadata: FetchMetadataConfig,
    pub cors: Option<CorsConfig>,
    pub xsrf: XsrfMode,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hsts: HstsConfig::default(),
            static_headers: true,
            coop: vec![coop::Policy::default()],
            csp: CspConfig::default(),
            framing: FramingConfig::default(),
            fetch_metadata: FetchMetadataConfig::default(),
            cors: None,
            xsrf: XsrfMode::default(),
        }
    }
}

impl SecurityConfig {
    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed documents or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the configured interceptors in installation order.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised by an interceptor's own validation.
    pub fn interceptors(&self, xsrf_key: &[u8]) -> Result<Vec<Arc<dyn Interceptor>>, ConfigError> {
        let mut out: Vec<Arc<dyn Interceptor>> = Vec::new();

        let hsts = hsts::Interceptor::builder()
            .max_age(Duration::from_secs(self.hsts.max_age_secs))
            .include_subdomains(self.hsts.include_subdomains)
            .preload(self.hsts.preload)
            .behind_proxy(self.hsts.behind_proxy)
            .build()?;
        out.push(Arc::new(hsts));

        if self.static_headers {
            out.push(Arc::new(static_headers::Interceptor));
        }
        if !self.coop.is_empty() {
            out.push(Arc::new(coop::Interceptor::new(self.coop.clone())));
        }
        if self.csp.enabled {
            out.push(Arc::new(self.csp_interceptor()));
        }
        if self.framing.enabled {
            out.extend(framing::interceptors(self.framing.report_uri.as_deref()));
        }
        if self.fetch_metadata.enabled {
            let fm = &self.fetch_metadata;
            let mut interceptor = fetch_metadata::Interceptor::default()
                .navigation_isolation(fm.navigation_isolation)
                .report_only(fm.report_only);
            for endpoint in &fm.cors_endpoints {
                interceptor = interceptor.cors_endpoint(endpoint.clone());
            }
            out.push(Arc::new(interceptor));
        }
        if let Some(cors) = &self.cors {
            out.push(Arc::new(cors_interceptor(cors)?));
        }
        match self.xsrf {
            XsrfMode::Html => out.push(Arc::new(xsrf::Interceptor::new(xsrf_key)?)),
            XsrfMode::Angular => out.push(Arc::new(xsrf::angular::Interceptor::new(xsrf_key)?)),
            XsrfMode::Disabled => {}
        }
        Ok(out)
    }

    /// A [`ServeMuxConfig`] with the default dispatcher and these interceptors.
    ///
    /// # Errors
    ///
    /// See [`interceptors`](Self::interceptors).
    pub fn mux_config(&self, xsrf_key: &[u8]) -> Result<ServeMuxConfig, ConfigError> {
        let mut config = ServeMuxConfig::default();
        for interceptor in self.interceptors(xsrf_key)? {
            config = config.intercept_shared(interceptor);
        }
        Ok(config)
    }

    fn csp_interceptor(&self) -> csp::Interceptor {
        let cfg = &self.csp;
        let mut strict = csp::StrictPolicy::default();
        if cfg.report_only {
            strict = strict.report_only();
        }
        if let Some(uri) = &cfg.report_uri {
            strict = strict.report_uri(uri.clone());
        }
        if cfg.no_strict_dynamic {
            strict = strict.no_strict_dynamic();
        }
        if cfg.unsafe_eval {
            strict = strict.unsafe_eval();
        }
        if let Some(base_uri) = &cfg.base_uri {
            strict = strict.base_uri(base_uri.clone());
        }

        let mut interceptor = csp::Interceptor::new().policy(strict);
        if cfg.trusted_types {
            interceptor = interceptor.policy(csp::TrustedTypesPolicy::new(
                cfg.report_only,
                cfg.report_uri.clone(),
            ));
        }
        interceptor
    }
}

fn cors_interceptor(cfg: &CorsConfig) -> Result<cors::Interceptor, ConfigError> {
    let mut interceptor = cors::Interceptor::new(cfg.allowed_origins.iter().cloned())?
        .allow_credentials(cfg.allow_credentials)
        .max_age(Duration::from_secs(cfg.max_age_secs));
    for method in &cfg.allowed_methods {
        let method = match method.to_ascii_uppercase().parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        interceptor = interceptor.allow_method(method);
    }
    for header in &cfg.allowed_headers {
        interceptor = interceptor.allow_header(header.clone());
    }
    for header in &cfg.exposed_headers {
        interceptor = interceptor.expose_header(header.clone());
    }
    Ok(interceptor)
}

/// The recommended stack with default settings.
///
/// # Errors
///
/// [`ConfigError::EmptyXsrfKey`] if `xsrf_key` is empty.
pub fn defaults(xsrf_key: &[u8]) -> Result<ServeMuxConfig, ConfigError> {
    SecurityConfig::default().mux_config(xsrf_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::test_utils::{ok_html, request, tls};

    fn names(config: &SecurityConfig) -> Vec<&'static str> {
        config
            .interceptors(b"k")
            .unwrap()
            .iter()
            .map(|i| i.name())
            .collect()
    }

    #[test]
    fn default_stack_order() {
        assert_eq!(
            names(&SecurityConfig::default()),
            vec![
                "hsts",
                "static_headers",
                "coop",
                "csp",
                "csp",
                "framing",
                "fetch_metadata",
                "xsrf"
            ]
        );
    }

    #[test]
    fn sections_can_be_turned_off() {
        let config = SecurityConfig::from_json(
            r#"{
                "static_headers": false,
                "coop": [],
                "csp": {"enabled": false},
                "framing": {"enabled": false},
                "fetch_metadata": {"enabled": false},
                "xsrf": "angular"
            }"#,
        )
        .unwrap();
        assert_eq!(names(&config), vec!["hsts", "xsrf_angular"]);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        assert!(matches!(
            SecurityConfig::from_json(r#"{"hsts": {"max_age": 1}}"#),
            Err(ConfigError::Json(_))
        ));
        let preload = SecurityConfig::from_json(r#"{"hsts": {"max_age_secs": 0, "preload": true}}"#)
            .unwrap();
        assert!(matches!(
            preload.interceptors(b"k"),
            Err(ConfigError::PreloadWithoutMaxAge)
        ));
        let wildcard = SecurityConfig::from_json(r#"{"cors": {"allowed_origins": ["*"]}}"#).unwrap();
        assert!(matches!(
            wildcard.interceptors(b"k"),
            Err(ConfigError::WildcardOrigin)
        ));
        assert!(matches!(defaults(b""), Err(ConfigError::EmptyXsrfKey)));
    }

    #[tokio::test]
    async fn default_stack_serves_secure_headers() {
        let mux = defaults(b"key")
            .unwrap()
            .handle("/", Method::Get, ok_html)
            .build();
        let res = mux
            .serve(tls(request("GET", "/", &[("Host", "example.com")], "")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        let h = res.headers();
        for name in [
            "strict-transport-security",
            "x-content-type-options",
            "x-xss-protection",
            "cross-origin-opener-policy",
            "content-security-policy",
            "x-frame-options",
            "set-cookie",
        ] {
            assert!(h.contains(name), "missing {name}");
        }
        assert_eq!(h.get_all("content-security-policy").count(), 3);
    }
}
