//! Responses a handler or interceptor can write.
//!
//! A [`Response`] describes *what* to send; the [`Dispatcher`] decides how it
//! is encoded. There is deliberately no variant for raw bytes with a caller
//! chosen content type: HTML has to come from [`SafeHtml`] or a template, so
//! unescaped user input cannot reach a page by accident.

pub mod dispatcher;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::http::StatusCode;
use crate::template::{Template, TemplateFns};

pub use dispatcher::{DefaultDispatcher, DispatchError, Dispatcher, Rendered};

/// HTML that is known to be safe to send to a browser.
///
/// # Examples
///
/// ```
/// use safeweb::response::SafeHtml;
///
/// let html = SafeHtml::escape("<b>\"hi\" & bye</b>");
/// assert_eq!(html.as_str(), "&lt;b&gt;&#34;hi&#34; &amp; bye&lt;/b&gt;");
/// assert_eq!(SafeHtml::from_static("<p>ok</p>").as_str(), "<p>ok</p>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SafeHtml(String);

impl SafeHtml {
    /// Escapes `text` so it renders literally.
    pub fn escape(text: &str) -> Self {
        Self(escape_html(text))
    }

    /// Wraps a string literal written by the application author.
    pub fn from_static(html: &'static str) -> Self {
        Self(html.to_owned())
    }

    /// Template engines produce trusted markup through this constructor.
    pub(crate) fn from_trusted(html: String) -> Self {
        Self(html)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\0' => out.push('\u{FFFD}'),
            other => out.push(other),
        }
    }
    out
}

/// A redirect target and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    location: String,
    code: StatusCode,
}

impl Redirect {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }
}

/// A template together with its data and the functions interceptors provide.
pub struct TemplateResponse {
    template: Arc<dyn Template>,
    data: serde_json::Value,
    fns: TemplateFns,
}

impl TemplateResponse {
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn fns(&self) -> &TemplateFns {
        &self.fns
    }

    /// Registers a value-returning template function, e.g. `CSPNonce`.
    pub fn add_fn(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fns.insert(name, value);
    }

    pub(crate) fn execute(&self) -> Result<SafeHtml, crate::template::TemplateError> {
        self.template.execute(&self.data, &self.fns)
    }
}

impl fmt::Debug for TemplateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResponse")
            .field("data", &self.data)
            .field("fns", &self.fns)
            .finish_non_exhaustive()
    }
}

/// Everything a request can be answered with.
#[derive(Debug)]
pub enum Response {
    Html(SafeHtml),
    Json(serde_json::Value),
    Template(TemplateResponse),
    Redirect(Redirect),
    NoContent,
    Error(StatusCode),
}

impl Response {
    /// Serializes `value` into a JSON response.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures from `serde_json`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn template(template: Arc<dyn Template>, data: serde_json::Value) -> Self {
        Self::Template(TemplateResponse {
            template,
            data,
            fns: TemplateFns::new(),
        })
    }

    pub fn redirect(location: impl Into<String>, code: StatusCode) -> Self {
        Self::Redirect(Redirect {
            location: location.into(),
            code,
        })
    }

    /// The status this response will be sent with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Html(_) | Self::Json(_) | Self::Template(_) => StatusCode::Ok,
            Self::Redirect(r) => r.code,
            Self::NoContent => StatusCode::NoContent,
            Self::Error(code) => *code,
        }
    }

    pub fn as_template_mut(&mut self) -> Option<&mut TemplateResponse> {
        match self {
            Self::Template(t) => Some(t),
            _ => None,
        }
    }
}

impl From<SafeHtml> for Response {
    fn from(html: SafeHtml) -> Self {
        Self::Html(html)
    }
}

impl From<StatusCode> for Response {
    fn from(code: StatusCode) -> Self {
        Self::Error(code)
    }
}
