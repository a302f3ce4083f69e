//! Outgoing cookies with secure defaults.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Rejected cookie names and values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("invalid cookie name {0:?}")]
    InvalidName(String),

    #[error("invalid value for cookie {0:?}")]
    InvalidValue(String),

    #[error("invalid {attribute} attribute for cookie {name:?}")]
    InvalidAttribute {
        name: String,
        attribute: &'static str,
    },
}

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// A cookie to be sent in a `Set-Cookie` response header.
///
/// New cookies are `Secure`, `HttpOnly`, `SameSite=Lax` and scoped to `/`.
/// Weakening any of these needs an explicit call.
///
/// # Examples
///
/// ```
/// use safeweb::http::{Cookie, SameSite};
///
/// let mut cookie = Cookie::new("session", "abc123").unwrap();
/// cookie.set_same_site(SameSite::Strict);
/// assert_eq!(
///     cookie.to_string(),
///     "session=abc123; Path=/; Secure; HttpOnly; SameSite=Strict"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    same_site: SameSite,
}

impl Cookie {
    /// Creates a cookie with secure defaults.
    ///
    /// # Errors
    ///
    /// Fails if the name is not an RFC 6265 token or the value contains
    /// characters outside the cookie-octet set.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, CookieError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(CookieError::InvalidName(name));
        }
        if !value.bytes().all(is_cookie_octet) {
            return Err(CookieError::InvalidValue(name));
        }
        Ok(Self {
            name,
            value,
            path: Some("/".to_owned()),
            domain: None,
            max_age: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    pub fn set_same_site(&mut self, same_site: SameSite) {
        self.same_site = same_site;
    }

    /// Sets `Max-Age`. A zero duration expires the cookie immediately.
    pub fn set_max_age(&mut self, max_age: Duration) {
        self.max_age = Some(i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX));
    }

    /// Marks the cookie for deletion (`Max-Age=-1`) and clears its value.
    pub fn expire(&mut self) {
        self.value.clear();
        self.max_age = Some(-1);
    }

    /// # Errors
    ///
    /// Fails if `path` contains `;` or control characters.
    pub fn set_path(&mut self, path: impl Into<String>) -> Result<(), CookieError> {
        let path = path.into();
        if !is_attribute_value(&path) {
            return Err(self.invalid_attribute("Path"));
        }
        self.path = Some(path);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if `domain` contains `;` or control characters.
    pub fn set_domain(&mut self, domain: impl Into<String>) -> Result<(), CookieError> {
        let domain = domain.into();
        if domain.is_empty() || !is_attribute_value(&domain) {
            return Err(self.invalid_attribute("Domain"));
        }
        self.domain = Some(domain);
        Ok(())
    }

    pub fn disable_secure(&mut self) {
        self.secure = false;
    }

    /// Makes the cookie readable from JavaScript.
    pub fn disable_http_only(&mut self) {
        self.http_only = false;
    }

    fn invalid_attribute(&self, attribute: &'static str) -> CookieError {
        CookieError::InvalidAttribute {
            name: self.name.clone(),
            attribute,
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

// RFC 6265 cookie-octet: printable ASCII minus space, DQUOTE, comma, semicolon and backslash.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

fn is_attribute_value(v: &str) -> bool {
    v.bytes().all(|b| !b.is_ascii_control() && b != b';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_secure() {
        let c = Cookie::new("id", "v").unwrap();
        assert!(c.is_secure());
        assert!(c.is_http_only());
        assert_eq!(c.same_site(), SameSite::Lax);
        assert_eq!(c.to_string(), "id=v; Path=/; Secure; HttpOnly; SameSite=Lax");
    }

    #[test]
    fn weakened_cookie_serializes_all_attributes() {
        let mut c = Cookie::new("XSRF-TOKEN", "t0k").unwrap();
        c.disable_http_only();
        c.disable_secure();
        c.set_same_site(SameSite::None);
        c.set_domain("example.com").unwrap();
        c.set_path("/app").unwrap();
        c.set_max_age(Duration::from_secs(60));
        assert_eq!(
            c.to_string(),
            "XSRF-TOKEN=t0k; Path=/app; Domain=example.com; Max-Age=60; SameSite=None"
        );
    }

    #[test]
    fn rejects_injection_in_name_and_value() {
        assert_eq!(
            Cookie::new("a;b", "v"),
            Err(CookieError::InvalidName("a;b".into()))
        );
        assert_eq!(Cookie::new("", "v"), Err(CookieError::InvalidName(String::new())));
        assert_eq!(
            Cookie::new("a", "v\r\nSet-Cookie: x=y"),
            Err(CookieError::InvalidValue("a".into()))
        );
        assert!(Cookie::new("a", "has space").is_err());
    }

    #[test]
    fn rejects_attribute_injection() {
        let mut c = Cookie::new("a", "b").unwrap();
        assert!(c.set_path("/; Domain=evil.com").is_err());
        assert!(c.set_domain("").is_err());
    }

    #[test]
    fn expire_clears_value() {
        let mut c = Cookie::new("a", "b").unwrap();
        c.expire();
        assert_eq!(c.value(), "");
        assert!(c.to_string().contains("Max-Age=-1"));
    }
}
