//! Shared test harness for SQL-level tests.
//!
//! Wraps a [`database::Database`] over a temporary directory and adds small
//! row/value builders so tests read as data, not plumbing.

use common::{Config, DbError};
use database::{Database, SqlResult};
use types::Value;

/// A database in a temp directory that lives as long as the fixture.
pub struct TestDatabase {
    pub db: Database,
    _dir: tempfile::TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config::builder().data_dir(dir.path().to_path_buf()).build();
        let db = Database::open(config).expect("open database");
        Self { db, _dir: dir }
    }

    /// Path of the fixture's data directory, for file-based statements.
    pub fn dir(&self) -> &std::path::Path {
        self.db.config().data_dir.as_path()
    }

    /// Execute, panicking with the offending SQL on error.
    pub fn run(&mut self, sql: &str) -> SqlResult {
        self.db
            .execute(sql)
            .unwrap_or_else(|err| panic!("{sql}: {err}"))
    }

    /// Execute a statement that must fail, returning the error.
    pub fn run_err(&mut self, sql: &str) -> DbError {
        match self.db.execute(sql) {
            Ok(_) => panic!("{sql}: expected an error"),
            Err(err) => err,
        }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a sequence of statements against a fixture.
///
/// # Example
/// ```
/// use testsupport::{exec_all, TestDatabase};
///
/// let mut fixture = TestDatabase::new();
/// exec_all!(fixture, "CREATE TABLE t (id INT)", "INSERT INTO t VALUES (1)");
/// ```
#[macro_export]
macro_rules! exec_all {
    ($fixture:expr, $($sql:expr),+ $(,)?) => {
        $( $fixture.run($sql); )+
    };
}

pub fn int(i: i32) -> Value {
    Value::Int(i)
}

pub fn float(f: f32) -> Value {
    Value::Float(f)
}

pub fn chars(s: &str) -> Value {
    Value::Chars(s.into())
}

/// One all-int row.
pub fn int_row(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

/// The explain text of a result, panicking if it is not a text cell.
pub fn explain_text(result: &SqlResult) -> &str {
    match result.rows.first().and_then(|row| row.first()) {
        Some(Value::Chars(text)) => text,
        other => panic!("expected a Query Plan cell, got {other:?}"),
    }
}

pub mod prelude {
    pub use crate::{chars, explain_text, float, int, int_row, TestDatabase};
}
