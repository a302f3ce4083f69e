//! Safe SQL — a database handle that only runs [`TrustedSql`].
//!
//! [`Db`] wraps a [`Driver`], the seam to a concrete database client. Its
//! methods take the query text as [`TrustedSql`] and the request-dependent
//! data as separate [`Value`] arguments, so SQL injection through string
//! formatting does not type-check.
//!
//! ```rust,no_run
//! use safeweb::database::{Db, Driver, TrustedSql, Value};
//!
//! async fn rename<D: Driver>(db: &Db<D>, id: i64, name: &str) -> Result<u64, safeweb::database::SqlError> {
//!     db.execute(
//!         &TrustedSql::new("UPDATE users SET name = ? WHERE id = ?"),
//!         &[Value::from(name), Value::from(id)],
//!     )
//!     .await
//! }
//! ```

pub mod sql;

use std::future::Future;

use thiserror::Error;
use tracing::debug;

pub use sql::{TrustedSql, unchecked};

#[derive(Debug, Error, PartialEq)]
pub enum SqlError {
    #[error("database driver error: {0}")]
    Driver(String),

    #[error("query returned no rows")]
    NoRows,

    #[error("column {0:?} not found")]
    NoColumn(String),
}

/// A query argument or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// # Errors
    ///
    /// [`SqlError::NoColumn`] if the row has no such column.
    pub fn get(&self, column: &str) -> Result<&Value, SqlError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| SqlError::NoColumn(column.to_owned()))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A database client. Implementations receive SQL only from [`Db`].
pub trait Driver: Send + Sync {
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<Vec<Row>, SqlError>> + Send;

    /// Returns the number of affected rows.
    fn execute(&self, sql: &str, args: &[Value])
    -> impl Future<Output = Result<u64, SqlError>> + Send;
}

/// The safe database handle.
#[derive(Debug, Clone)]
pub struct Db<D> {
    driver: D,
}

impl<D: Driver> Db<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn query(&self, sql: &TrustedSql, args: &[Value]) -> Result<Vec<Row>, SqlError> {
        debug!(sql = %sql, args = args.len(), "query");
        self.driver.query(sql.as_str(), args).await
    }

    /// Like [`query`](Self::query), for exactly one expected row.
    ///
    /// # Errors
    ///
    /// [`SqlError::NoRows`] when the result is empty.
    pub async fn query_row(&self, sql: &TrustedSql, args: &[Value]) -> Result<Row, SqlError> {
        self.query(sql, args)
            .await?
            .into_iter()
            .next()
            .ok_or(SqlError::NoRows)
    }

    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn execute(&self, sql: &TrustedSql, args: &[Value]) -> Result<u64, SqlError> {
        debug!(sql = %sql, args = args.len(), "execute");
        self.driver.execute(sql.as_str(), args).await
    }

    /// Binds a statement for repeated use.
    pub fn prepare(&self, sql: TrustedSql) -> Stmt<'_, D> {
        Stmt { db: self, sql }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

/// A statement bound to a [`Db`].
#[derive(Debug)]
pub struct Stmt<'a, D> {
    db: &'a Db<D>,
    sql: TrustedSql,
}

impl<D: Driver> Stmt<'_, D> {
    pub fn sql(&self) -> &TrustedSql {
        &self.sql
    }

    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn query(&self, args: &[Value]) -> Result<Vec<Row>, SqlError> {
        self.db.query(&self.sql, args).await
    }

    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn execute(&self, args: &[Value]) -> Result<u64, SqlError> {
        self.db.execute(&self.sql, args).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        rows: Vec<Row>,
    }

    impl Recording {
        fn record(&self, sql: &str, args: &[Value]) {
            self.calls.lock().unwrap().push((sql.to_owned(), args.to_vec()));
        }
    }

    impl Driver for Recording {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, SqlError> {
            self.record(sql, args);
            Ok(self.rows.clone())
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, SqlError> {
            self.record(sql, args);
            if sql.starts_with("DROP") {
                return Err(SqlError::Driver("permission denied".into()));
            }
            Ok(1)
        }
    }

    #[tokio::test]
    async fn arguments_travel_separately() {
        let db = Db::new(Recording::default());
        let hostile = "x'; DROP TABLE users; --";
        db.execute(
            &TrustedSql::new("UPDATE users SET name = ? WHERE id = ?"),
            &[hostile.into(), 7i64.into()],
        )
        .await
        .unwrap();

        let calls = db.driver().calls.lock().unwrap();
        assert_eq!(calls[0].0, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(calls[0].1, vec![Value::Text(hostile.into()), Value::Int(7)]);
    }

    #[tokio::test]
    async fn prepared_statements_and_rows() {
        let row = Row::new(vec!["id".into()], vec![Value::Int(1)]);
        let db = Db::new(Recording {
            rows: vec![row],
            ..Recording::default()
        });
        let stmt = db.prepare(TrustedSql::new("SELECT id FROM users WHERE name = ?"));
        let rows = stmt.query(&[Value::from(Some("ann"))]).await.unwrap();
        assert_eq!(rows[0].get("id"), Ok(&Value::Int(1)));
        assert_eq!(rows[0].get("nope"), Err(SqlError::NoColumn("nope".into())));
        assert_eq!(stmt.execute(&[Value::Null]).await, Ok(1));
        assert_eq!(db.driver().calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn errors_propagate() {
        let db = Db::new(Recording::default());
        assert_eq!(
            db.query_row(&TrustedSql::new("SELECT 1"), &[]).await,
            Err(SqlError::NoRows)
        );
        assert!(matches!(
            db.execute(&TrustedSql::new("DROP TABLE t"), &[]).await,
            Err(SqlError::Driver(_))
        ));
    }
}
