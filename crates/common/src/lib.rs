use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Fully-qualified identifier for a record inside a table's heap file.
/// Examples:
/// - `let rid = Rid { page_num: 0, slot_num: 3 };`
/// - `let rid = Rid { page_num: 42, slot_num: 0 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub page_num: u64,
    pub slot_num: u16,
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page_num, self.slot_num)
    }
}

/// Canonical error type shared across database subsystems.
///
/// End-of-stream is not represented here: operators signal it through
/// `Ok(false)` from `next()`, and a successful call is simply `Ok(_)`.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("no such table: {0}")]
    SchemaTableNotExist(String),
    #[error("no such field: {0}")]
    SchemaFieldMissing(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse: {0}")]
    Parser(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("transaction: {0}")]
    Transaction(String),
    #[error("{0}")]
    Generic(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for a database instance.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .delimiter(" | ".into())
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table heaps and catalog metadata live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Separator between cells in rendered result rows.
    #[builder(default = String::from(" | "))]
    pub delimiter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            delimiter: String::from(" | "),
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, Rid};
    pub use types::{AttrType, Value};
}
