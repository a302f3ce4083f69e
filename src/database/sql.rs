//! SQL text that is known not to contain user input.

use std::fmt;

use tracing::warn;

/// A piece of SQL built only from string literals and integers.
///
/// There is no conversion from `String`: anything that depends on request
/// data has to travel as a query argument. Dynamic queries are assembled
/// from trusted pieces with [`concat`](Self::concat) and
/// [`join`](Self::join).
///
/// ```
/// use safeweb::database::TrustedSql;
///
/// let columns = ["id", "name"].map(TrustedSql::new);
/// let query = TrustedSql::concat([
///     TrustedSql::new("SELECT "),
///     TrustedSql::join(columns, &TrustedSql::new(", ")),
///     TrustedSql::new(" FROM users LIMIT "),
///     TrustedSql::from_int(10),
/// ]);
/// assert_eq!(query.as_str(), "SELECT id, name FROM users LIMIT 10");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrustedSql(String);

impl TrustedSql {
    /// Wraps a string literal.
    pub fn new(sql: &'static str) -> Self {
        Self(sql.to_owned())
    }

    pub fn from_int(value: i64) -> Self {
        Self(value.to_string())
    }

    pub fn concat(parts: impl IntoIterator<Item = TrustedSql>) -> Self {
        Self(parts.into_iter().map(|p| p.0).collect())
    }

    pub fn join(parts: impl IntoIterator<Item = TrustedSql>, separator: &TrustedSql) -> Self {
        let parts: Vec<String> = parts.into_iter().map(|p| p.0).collect();
        Self(parts.join(&separator.0))
    }

    /// Splits on `separator`, for example to run a trusted script statement
    /// by statement.
    pub fn split(&self, separator: &TrustedSql) -> Vec<TrustedSql> {
        self.0
            .split(separator.0.as_str())
            .map(|part| Self(part.to_owned()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for TrustedSql {
    fn from(sql: &'static str) -> Self {
        Self::new(sql)
    }
}

impl fmt::Display for TrustedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape hatches for SQL that cannot be expressed with literals, such as
/// queries loaded from migration files shipped with the binary.
///
/// Every use is logged at `warn` so it shows up in review and in production
/// logs.
pub mod unchecked {
    use super::*;

    pub fn from_string(sql: impl Into<String>) -> TrustedSql {
        let sql = sql.into();
        warn!(sql = %sql, "building TrustedSql from an unchecked string");
        TrustedSql(sql)
    }
}
