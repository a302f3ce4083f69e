//! HTML templates with interceptor-provided functions.
//!
//! Templates are plain HTML with two kinds of placeholders:
//!
//! - `{{.field.sub}}` — a lookup in the JSON data passed to
//!   [`Response::template`](crate::response::Response::template);
//! - `{{Name}}` — a template function. Interceptors register these during the
//!   commit phase: the CSP interceptor provides [`CSP_NONCE_FN`], the XSRF
//!   interceptor [`XSRF_TOKEN_FN`].
//!
//! Every substituted value is HTML-escaped. [`inject`] rewrites raw HTML so
//! that `<script>` tags and `<form>`s carry those placeholders automatically.

pub mod inject;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::response::{SafeHtml, escape_html};

pub use inject::{InjectConfig, InjectError};

/// Name of the template function returning the request's CSP nonce.
pub const CSP_NONCE_FN: &str = "CSPNonce";

/// Name of the template function returning the request's XSRF token.
pub const XSRF_TOKEN_FN: &str = "XSRFToken";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated action starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("malformed action {action:?} at byte {offset}")]
    Malformed { action: String, offset: usize },

    #[error("function {0:?} not defined")]
    UnknownFunction(String),

    #[error("field {0:?} missing from template data")]
    MissingField(String),

    #[error(transparent)]
    Inject(#[from] InjectError),
}

/// Values of the zero-argument functions available while executing a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFns {
    fns: BTreeMap<String, String>,
}

impl TemplateFns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fns.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fns.get(name).map(String::as_str)
    }
}

/// Something that renders to [`SafeHtml`].
pub trait Template: Send + Sync {
    /// # Errors
    ///
    /// Implementations fail on missing data or unknown functions rather than
    /// rendering a partial page.
    fn execute(&self, data: &Value, fns: &TemplateFns) -> Result<SafeHtml, TemplateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(Vec<String>),
    Func(String),
}

/// A parsed HTML template.
///
/// # Examples
///
/// ```
/// use safeweb::template::{HtmlTemplate, InjectConfig, Template, TemplateFns};
///
/// let tpl = HtmlTemplate::parse_injected(
///     "<p>Hi {{.name}}</p><script>go()</script>",
///     &InjectConfig::default(),
/// ).unwrap();
///
/// let mut fns = TemplateFns::new();
/// fns.insert("CSPNonce", "n0nce");
/// let html = tpl.execute(&serde_json::json!({"name": "<Ann>"}), &fns).unwrap();
/// assert_eq!(
///     html.as_str(),
///     "<p>Hi &lt;Ann&gt;</p><script nonce=\"n0nce\">go()</script>"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    nodes: Vec<Node>,
}

impl HtmlTemplate {
    /// Parses template source.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Unterminated`] for a `{{` without `}}` and
    /// [`TemplateError::Malformed`] for an action that is neither a field nor
    /// a function name.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                nodes.push(Node::Text(rest[..open].to_owned()));
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or(TemplateError::Unterminated {
                    offset: offset + open,
                })?;
            let action = after[..close].trim().trim_matches('-').trim();
            nodes.push(parse_action(action, offset + open)?);

            let consumed = open + 2 + close + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }
        if !rest.is_empty() {
            nodes.push(Node::Text(rest.to_owned()));
        }
        Ok(Self { nodes })
    }

    /// Runs [`inject::transform`] on `source` and parses the result.
    ///
    /// # Errors
    ///
    /// Propagates both injection and parse errors.
    pub fn parse_injected(source: &str, config: &InjectConfig) -> Result<Self, TemplateError> {
        let injected = inject::transform(source, config)?;
        Self::parse(&injected)
    }
}

impl Template for HtmlTemplate {
    fn execute(&self, data: &Value, fns: &TemplateFns) -> Result<SafeHtml, TemplateError> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Func(name) => {
                    let value = fns
                        .get(name)
                        .ok_or_else(|| TemplateError::UnknownFunction(name.clone()))?;
                    out.push_str(&escape_html(value));
                }
                Node::Field(path) => {
                    let value = path
                        .iter()
                        .try_fold(data, |v, key| v.get(key.as_str()))
                        .ok_or_else(|| TemplateError::MissingField(path.join(".")))?;
                    out.push_str(&escape_html(&display_value(value)));
                }
            }
        }
        Ok(SafeHtml::from_trusted(out))
    }
}

fn parse_action(action: &str, offset: usize) -> Result<Node, TemplateError> {
    let malformed = || TemplateError::Malformed {
        action: action.to_owned(),
        offset,
    };
    if action == "." {
        return Ok(Node::Field(Vec::new()));
    }
    if let Some(path) = action.strip_prefix('.') {
        let keys: Vec<String> = path.split('.').map(str::to_owned).collect();
        if keys.iter().any(|k| !is_identifier(k)) {
            return Err(malformed());
        }
        return Ok(Node::Field(keys));
    }
    if is_identifier(action) {
        return Ok(Node::Func(action.to_owned()));
    }
    Err(malformed())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(src: &str, data: Value) -> Result<String, TemplateError> {
        let mut fns = TemplateFns::new();
        fns.insert(XSRF_TOKEN_FN, "tok\"en");
        HtmlTemplate::parse(src)?
            .execute(&data, &fns)
            .map(SafeHtml::into_string)
    }

    #[test]
    fn fields_are_escaped() {
        let out = run(
            "<a title=\"{{ .user.name }}\">{{.count}}</a>{{.missing_ok}}",
            json!({"user": {"name": "\"><script>"}, "count": 3, "missing_ok": null}),
        )
        .unwrap();
        assert_eq!(out, "<a title=\"&#34;&gt;&lt;script&gt;\">3</a>");
    }

    #[test]
    fn functions_resolve_and_are_escaped() {
        let out = run("<i>{{- XSRFToken -}}</i>", Value::Null).unwrap();
        assert_eq!(out, "<i>tok&#34;en</i>");
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert_eq!(
            run("{{CSPNonce}}", Value::Null),
            Err(TemplateError::UnknownFunction("CSPNonce".into()))
        );
    }

    #[test]
    fn missing_field_is_an_error() {
        assert_eq!(
            run("{{.a.b}}", json!({"a": {}})),
            Err(TemplateError::MissingField("a.b".into()))
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            HtmlTemplate::parse("ok {{ .x"),
            Err(TemplateError::Unterminated { offset: 3 })
        );
        assert!(matches!(
            HtmlTemplate::parse("{{ 1 + 1 }}"),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn dot_renders_whole_data() {
        assert_eq!(run("{{.}}", json!("a<b")).unwrap(), "a&lt;b");
    }
}
