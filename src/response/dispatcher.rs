//! Encoding of [`Response`] values into status, content type and body.

use thiserror::Error;

use super::Response;
use crate::http::StatusCode;
use crate::http::response::breaks_framing;
use crate::template::TemplateError;

/// Prefix that stops a JSON response from being executed as a `<script>`.
pub const XSSI_PREFIX: &str = ")]}',\n";

/// Failures while rendering a response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("template execution failed: {0}")]
    Template(#[from] TemplateError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("redirect requires a 3xx status, got {0}")]
    RedirectStatus(StatusCode),

    #[error("unsafe redirect location {0:?}")]
    RedirectLocation(String),

    #[error("status {0} is not an error status")]
    ErrorStatus(StatusCode),
}

/// A response ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl Rendered {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            location: None,
            body: Vec::new(),
        }
    }
}

/// Turns responses into bytes.
///
/// The multiplexer calls `render` once per request after the commit phase.
/// The content type a dispatcher chooses always overrides any value a
/// handler put in the headers.
pub trait Dispatcher: Send + Sync {
    /// # Errors
    ///
    /// Any failure is logged by the caller and replaced with a 500.
    fn render(&self, response: Response) -> Result<Rendered, DispatchError>;
}

/// The stock dispatcher.
///
/// | Response   | Content-Type                       | Body                     |
/// |------------|------------------------------------|--------------------------|
/// | `Html`     | `text/html; charset=utf-8`         | the HTML                 |
/// | `Template` | `text/html; charset=utf-8`         | executed template        |
/// | `Json`     | `application/json; charset=utf-8`  | `)]}',\n` + JSON         |
/// | `Error`    | `text/plain; charset=utf-8`        | reason phrase            |
/// | `Redirect` | —                                  | empty, `Location` set    |
/// | `NoContent`| —                                  | empty                    |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDispatcher;

impl Dispatcher for DefaultDispatcher {
    fn render(&self, response: Response) -> Result<Rendered, DispatchError> {
        match response {
            Response::Html(html) => Ok(Rendered {
                content_type: Some("text/html; charset=utf-8"),
                body: html.into_string().into_bytes(),
                ..Rendered::new(StatusCode::Ok)
            }),
            Response::Template(t) => {
                let html = t.execute()?;
                Ok(Rendered {
                    content_type: Some("text/html; charset=utf-8"),
                    body: html.into_string().into_bytes(),
                    ..Rendered::new(StatusCode::Ok)
                })
            }
            Response::Json(value) => {
                let mut body = XSSI_PREFIX.as_bytes().to_vec();
                serde_json::to_writer(&mut body, &value)?;
                Ok(Rendered {
                    content_type: Some("application/json; charset=utf-8"),
                    body,
                    ..Rendered::new(StatusCode::Ok)
                })
            }
            Response::Redirect(redirect) => {
                if !redirect.code().is_redirection() {
                    return Err(DispatchError::RedirectStatus(redirect.code()));
                }
                if !is_safe_location(redirect.location()) {
                    return Err(DispatchError::RedirectLocation(
                        redirect.location().to_owned(),
                    ));
                }
                Ok(Rendered {
                    location: Some(redirect.location().to_owned()),
                    ..Rendered::new(redirect.code())
                })
            }
            Response::NoContent => Ok(Rendered::new(StatusCode::NoContent)),
            Response::Error(code) => {
                if !code.is_error() {
                    return Err(DispatchError::ErrorStatus(code));
                }
                Ok(Rendered {
                    content_type: Some("text/plain; charset=utf-8"),
                    body: code.canonical_reason().as_bytes().to_vec(),
                    ..Rendered::new(code)
                })
            }
        }
    }
}

/// Accepts relative references and absolute `http`/`https` URLs.
///
/// Anything with another scheme (`javascript:`, `data:`) or with characters
/// that could split the header is refused.
fn is_safe_location(location: &str) -> bool {
    if location.is_empty() || breaks_framing(location) {
        return false;
    }
    let scheme_end = location.find(|c: char| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(i) if location[i..].starts_with(':') => {
            let scheme = &location[..i];
            scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SafeHtml;

    fn render(r: Response) -> Result<Rendered, DispatchError> {
        DefaultDispatcher.render(r)
    }

    #[test]
    fn html_and_json() {
        let r = render(SafeHtml::escape("<x>").into()).unwrap();
        assert_eq!(r.content_type, Some("text/html; charset=utf-8"));
        assert_eq!(r.body, b"&lt;x&gt;");

        let r = render(Response::Json(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(r.content_type, Some("application/json; charset=utf-8"));
        assert_eq!(r.body, b")]}',\n{\"a\":1}");
    }

    #[test]
    fn error_body_is_reason_phrase() {
        let r = render(Response::Error(StatusCode::NotFound)).unwrap();
        assert_eq!(r.status, StatusCode::NotFound);
        assert_eq!(r.body, b"Not Found");
        assert!(matches!(
            render(Response::Error(StatusCode::Ok)),
            Err(DispatchError::ErrorStatus(StatusCode::Ok))
        ));
    }

    #[test]
    fn redirect_validation() {
        let r = render(Response::redirect("/next?a=1", StatusCode::SeeOther)).unwrap();
        assert_eq!(r.status, StatusCode::SeeOther);
        assert_eq!(r.location.as_deref(), Some("/next?a=1"));
        assert!(r.body.is_empty());

        assert!(render(Response::redirect("https://example.com/", StatusCode::Found)).is_ok());
        assert!(matches!(
            render(Response::redirect("/", StatusCode::Ok)),
            Err(DispatchError::RedirectStatus(_))
        ));
        for bad in ["javascript:alert(1)", "JaVaScRiPt:x", "data:text/html,x", "/a\r\nX: y", ""] {
            assert!(
                matches!(
                    render(Response::redirect(bad, StatusCode::Found)),
                    Err(DispatchError::RedirectLocation(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn no_content_is_empty() {
        let r = render(Response::NoContent).unwrap();
        assert_eq!(r.status, StatusCode::NoContent);
        assert_eq!(r.content_type, None);
    }
}
