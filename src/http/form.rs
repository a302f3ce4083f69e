//! Parsed `application/x-www-form-urlencoded` request bodies.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while reading a form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unsupported content type for form parsing: {0:?}")]
    UnsupportedContentType(String),

    #[error("form body is not valid UTF-8")]
    Encoding,

    #[error("form field {field:?} has invalid value {value:?}")]
    InvalidValue { field: String, value: String },
}

/// The decoded fields of a url-encoded request body.
///
/// Obtain one with [`Request::form`](super::Request::form). Fields may repeat;
/// single-value accessors return the first occurrence.
///
/// # Examples
///
/// ```
/// use safeweb::http::Request;
///
/// let raw = b"POST /items HTTP/1.1\r\n\
///     Content-Type: application/x-www-form-urlencoded\r\n\
///     Content-Length: 21\r\n\r\n\
///     count=3&id=7&id=8&x=1";
/// let (req, _) = Request::parse(raw).unwrap();
/// let form = req.form().unwrap();
///
/// assert_eq!(form.get::<u32>("count").unwrap(), Some(3));
/// assert_eq!(form.get_all::<u64>("id").unwrap(), vec![7, 8]);
/// assert!(form.get::<bool>("x").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Form {
    values: HashMap<String, Vec<String>>,
}

impl Form {
    pub(crate) fn from_pairs(values: HashMap<String, Vec<String>>) -> Self {
        Self { values }
    }

    /// Returns the first raw value of `field`.
    pub fn string(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Returns every raw value of `field`.
    pub fn strings(&self, field: &str) -> &[String] {
        self.values.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Parses the first value of `field`. A missing field is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`FormError::InvalidValue`] when the value does not parse as `T`.
    pub fn get<T: FromStr>(&self, field: &str) -> Result<Option<T>, FormError> {
        self.string(field)
            .map(|raw| parse_field(field, raw))
            .transpose()
    }

    /// Parses every value of `field`, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// [`FormError::InvalidValue`] naming the first value that does not parse.
    pub fn get_all<T: FromStr>(&self, field: &str) -> Result<Vec<T>, FormError> {
        self.strings(field)
            .iter()
            .map(|raw| parse_field(field, raw))
            .collect()
    }

    /// Returns `true` if the form contains `field` at least once.
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }
}

fn parse_field<T: FromStr>(field: &str, raw: &str) -> Result<T, FormError> {
    raw.parse().map_err(|_| FormError::InvalidValue {
        field: field.to_owned(),
        value: raw.to_owned(),
    })
}
