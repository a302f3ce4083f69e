//! Rewrites HTML so templates pick up CSP nonces and XSRF tokens without
//! authors having to remember them.
//!
//! The rewriter walks the markup tag by tag. It understands comments,
//! doctypes, quoted attribute values (which may contain `>`), and raw-text
//! elements whose content must not be treated as markup. It does not build a
//! DOM and leaves everything it does not rewrite byte-for-byte intact.

use thiserror::Error;

use super::{CSP_NONCE_FN, XSRF_TOKEN_FN};

/// Name of the hidden form field carrying the XSRF token.
pub const XSRF_FIELD_NAME: &str = "xsrf-token";

const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    #[error("unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),

    #[error("unterminated attribute value starting at byte {0}")]
    UnterminatedAttribute(usize),

    #[error("<{element}> opened at byte {offset} is never closed")]
    UnclosedElement { element: String, offset: usize },
}

/// Which rewrites [`transform`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectConfig {
    /// Add `nonce="{{CSPNonce}}"` to `<script>` tags.
    pub csp_nonces: bool,
    /// Add a hidden XSRF token input to every `<form>`.
    pub xsrf_tokens: bool,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            csp_nonces: true,
            xsrf_tokens: true,
        }
    }
}

struct StartTag {
    name: String,
    /// Byte offset just past the tag name.
    name_end: usize,
    /// Byte offset just past the closing `>`.
    end: usize,
    attributes: Vec<String>,
    self_closing: bool,
}

/// Applies the configured rewrites to `html`.
///
/// # Errors
///
/// Fails on unterminated comments, tags, quoted attribute values, or
/// raw-text elements without an end tag.
///
/// # Examples
///
/// ```
/// use safeweb::template::inject::{transform, InjectConfig};
///
/// let out = transform(r#"<form method="post"><button>Go</button></form>"#, &InjectConfig::default()).unwrap();
/// assert_eq!(
///     out,
///     r#"<form method="post"><input type="hidden" name="xsrf-token" value="{{XSRFToken}}"><button>Go</button></form>"#
/// );
/// ```
pub fn transform(html: &str, config: &InjectConfig) -> Result<String, InjectError> {
    // ASCII lowercasing keeps byte offsets identical.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() + 64);
    let mut copied = 0;
    let mut pos = 0;

    while let Some(rel) = html[pos..].find('<') {
        let start = pos + rel;
        let rest = &html[start..];

        if rest.starts_with("<!--") {
            let end = html[start + 4..]
                .find("-->")
                .ok_or(InjectError::UnterminatedComment(start))?;
            pos = start + 4 + end + 3;
            continue;
        }
        if rest.starts_with("</") || rest.starts_with("<!") || rest.starts_with("<?") {
            let end = html[start..]
                .find('>')
                .ok_or(InjectError::UnterminatedTag(start))?;
            pos = start + end + 1;
            continue;
        }
        if !rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            // A bare `<` in text.
            pos = start + 1;
            continue;
        }

        let tag = parse_start_tag(html, &lower, start)?;

        if tag.name == "script" && config.csp_nonces && !tag.attributes.iter().any(|a| a == "nonce")
        {
            out.push_str(&html[copied..tag.name_end]);
            out.push_str(&format!(" nonce=\"{{{{{CSP_NONCE_FN}}}}}\""));
            copied = tag.name_end;
        }
        if tag.name == "form" && config.xsrf_tokens {
            out.push_str(&html[copied..tag.end]);
            out.push_str(&format!(
                "<input type=\"hidden\" name=\"{XSRF_FIELD_NAME}\" value=\"{{{{{XSRF_TOKEN_FN}}}}}\">"
            ));
            copied = tag.end;
        }

        pos = tag.end;
        if !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
            let closing = format!("</{}", tag.name);
            let end = lower[pos..]
                .find(&closing)
                .ok_or_else(|| InjectError::UnclosedElement {
                    element: tag.name.clone(),
                    offset: start,
                })?;
            pos += end;
        }
    }

    out.push_str(&html[copied..]);
    Ok(out)
}

fn parse_start_tag(html: &str, lower: &str, start: usize) -> Result<StartTag, InjectError> {
    let bytes = html.as_bytes();
    let unterminated = InjectError::UnterminatedTag(start);

    let mut i = start + 1;
    while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
        i += 1;
    }
    let name = lower[start + 1..i].to_owned();
    let name_end = i;
    let mut attributes = Vec::new();

    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(unterminated),
            Some(b'>') => {
                let self_closing = bytes[i - 1] == b'/';
                return Ok(StartTag {
                    name,
                    name_end,
                    end: i + 1,
                    attributes,
                    self_closing,
                });
            }
            Some(_) => {}
        }

        let attr_start = i;
        while i < bytes.len() && !is_tag_delimiter(bytes[i]) && bytes[i] != b'=' {
            i += 1;
        }
        attributes.push(lower[attr_start..i].to_owned());

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let close = html[i + 1..]
                    .find(quote as char)
                    .ok_or(InjectError::UnterminatedAttribute(i))?;
                i += close + 2;
            }
            Some(_) => {
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
            }
            None => return Err(unterminated),
        }
    }
}

fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(html: &str) -> String {
        transform(html, &InjectConfig::default()).unwrap()
    }

    #[test]
    fn script_gets_nonce() {
        assert_eq!(
            all("<SCRIPT src=\"/a.js\"></SCRIPT>"),
            "<SCRIPT nonce=\"{{CSPNonce}}\" src=\"/a.js\"></SCRIPT>"
        );
    }

    #[test]
    fn existing_nonce_is_kept() {
        let html = "<script nonce=\"{{CSPNonce}}\">x()</script>";
        assert_eq!(all(html), html);
    }

    #[test]
    fn script_body_is_not_parsed() {
        assert_eq!(
            all("<script>if (a<b) { document.write('<form>') }</script><p>"),
            "<script nonce=\"{{CSPNonce}}\">if (a<b) { document.write('<form>') }</script><p>"
        );
    }

    #[test]
    fn quoted_gt_inside_attribute() {
        assert_eq!(
            all("<form action='/a?x=>'>"),
            "<form action='/a?x=>'><input type=\"hidden\" name=\"xsrf-token\" value=\"{{XSRFToken}}\">"
        );
    }

    #[test]
    fn comments_and_doctype_are_skipped() {
        let html = "<!DOCTYPE html><!-- <script> <form> -->";
        assert_eq!(all(html), html);
    }

    #[test]
    fn rewrites_can_be_disabled() {
        let html = "<script></script><form></form>";
        let none = InjectConfig {
            csp_nonces: false,
            xsrf_tokens: false,
        };
        assert_eq!(transform(html, &none).unwrap(), html);
        let only_xsrf = InjectConfig {
            csp_nonces: false,
            xsrf_tokens: true,
        };
        assert!(transform(html, &only_xsrf).unwrap().starts_with("<script></script><form><input"));
    }

    #[test]
    fn bare_less_than_in_text() {
        let html = "<p>1 < 2</p>";
        assert_eq!(all(html), html);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let cfg = InjectConfig::default();
        assert_eq!(
            transform("<!-- open", &cfg),
            Err(InjectError::UnterminatedComment(0))
        );
        assert_eq!(transform("<p class", &cfg), Err(InjectError::UnterminatedTag(0)));
        assert_eq!(
            transform("<p class=\"x>", &cfg),
            Err(InjectError::UnterminatedAttribute(9))
        );
        assert_eq!(
            transform("ab<script>x()", &cfg),
            Err(InjectError::UnclosedElement {
                element: "script".into(),
                offset: 2
            })
        );
    }
}
