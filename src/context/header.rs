//! Response headers with claiming and injection checks.
//!
//! Every response header written by application code or an interceptor goes
//! through [`ResponseHeaders`]. Two rules are enforced here rather than left
//! to convention:
//!
//! - A header can be *claimed*. Once claimed, only the holder of the returned
//!   [`Claim`] may write it, so two interceptors can never silently overwrite
//!   each other's security headers.
//! - `Set-Cookie` is never writable as a raw header; cookies are added as
//!   validated [`Cookie`] values.

use std::collections::HashSet;

use thiserror::Error;

use crate::http::response::breaks_framing;
use crate::http::{Cookie, Headers};

/// Rejected header operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header {0:?} is already claimed")]
    AlreadyClaimed(String),

    #[error("header {0:?} is claimed and cannot be modified directly")]
    Claimed(String),

    #[error("Set-Cookie cannot be written directly, use add_cookie")]
    SetCookie,

    #[error("invalid header name {0:?}")]
    InvalidName(String),

    #[error("invalid value for header {0:?}")]
    InvalidValue(String),
}

/// Exclusive write access to one response header.
///
/// Only [`ResponseHeaders::claim`] creates these, so holding a `Claim` proves
/// the header was reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    name: String,
}

impl Claim {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The header map of the response being built for one request.
#[derive(Debug, Default)]
pub struct ResponseHeaders {
    headers: Headers,
    claimed: HashSet<String>,
    cookies: Vec<Cookie>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values of `name` with `value`.
    ///
    /// # Errors
    ///
    /// Fails if the header is claimed, is `Set-Cookie`, or the name or value
    /// is malformed.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        let value = value.into();
        self.check_writable(name)?;
        check_value(name, &value)?;
        self.headers.set(name, value);
        Ok(())
    }

    /// Appends `value` to `name`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`set`](Self::set).
    pub fn add(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        let value = value.into();
        self.check_writable(name)?;
        check_value(name, &value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Removes every value of `name`.
    ///
    /// # Errors
    ///
    /// Fails if the header is claimed or is `Set-Cookie`.
    pub fn del(&mut self, name: &str) -> Result<(), HeaderError> {
        self.check_writable(name)?;
        self.headers.remove(name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.get_all(name)
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(&name.to_ascii_lowercase())
    }

    /// Reserves `name` for the caller.
    ///
    /// # Errors
    ///
    /// [`HeaderError::AlreadyClaimed`] if someone else holds it,
    /// [`HeaderError::SetCookie`] for `Set-Cookie`.
    pub fn claim(&mut self, name: &str) -> Result<Claim, HeaderError> {
        check_name(name)?;
        if name.eq_ignore_ascii_case("set-cookie") {
            return Err(HeaderError::SetCookie);
        }
        if !self.claimed.insert(name.to_ascii_lowercase()) {
            return Err(HeaderError::AlreadyClaimed(name.to_owned()));
        }
        Ok(Claim {
            name: name.to_owned(),
        })
    }

    /// Sets a claimed header to exactly `values`; an empty list removes it.
    ///
    /// # Errors
    ///
    /// [`HeaderError::InvalidValue`] if any value would break header framing.
    /// Nothing is written in that case.
    pub fn set_claimed<I, V>(&mut self, claim: &Claim, values: I) -> Result<(), HeaderError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        for value in &values {
            check_value(&claim.name, value)?;
        }
        self.headers.remove(&claim.name);
        for value in values {
            self.headers.insert(claim.name.as_str(), value);
        }
        Ok(())
    }

    /// Queues a cookie to be sent as a `Set-Cookie` header.
    ///
    /// A cookie with the same name queued earlier is replaced.
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name() != cookie.name());
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Flattens claims and cookies into a plain header map for serialization.
    pub(crate) fn into_headers(self) -> Headers {
        let mut headers = self.headers;
        for cookie in &self.cookies {
            headers.insert("Set-Cookie", cookie.to_string());
        }
        headers
    }

    fn check_writable(&self, name: &str) -> Result<(), HeaderError> {
        check_name(name)?;
        if name.eq_ignore_ascii_case("set-cookie") {
            return Err(HeaderError::SetCookie);
        }
        if self.is_claimed(name) {
            return Err(HeaderError::Claimed(name.to_owned()));
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), HeaderError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if valid {
        Ok(())
    } else {
        Err(HeaderError::InvalidName(name.to_owned()))
    }
}

fn check_value(name: &str, value: &str) -> Result<(), HeaderError> {
    if breaks_framing(value) {
        return Err(HeaderError::InvalidValue(name.to_owned()));
    }
    Ok(())
}
