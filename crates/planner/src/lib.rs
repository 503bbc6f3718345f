//! Query planner: statement IR to executable physical plans.
//!
//! Planning runs in three stages:
//!
//! 1. **Logical construction** - the statement becomes a tree of
//!    relational-algebra nodes (scan, predicate, join, projection, ...).
//! 2. **Rewriting** - an ordered rule list simplifies constant expressions,
//!    folds trivial predicates and pushes filters toward the scans, looping
//!    to a fixed point.
//! 3. **Physical lowering** - each logical node picks its operator; a table
//!    get becomes an index scan when a pushed-down key range matches an
//!    index, a join becomes a nested-loop join, and so on.
//!
//! ```text
//! Statement IR
//!     |
//! create_logical_plan
//!     |
//! Rewriter (fixed point)
//!     |
//! create_physical_plan
//!     |
//! Volcano executor
//! ```
//!
//! # Example
//!
//! ```no_run
//! use planner::plan_statement;
//! use storage::Db;
//!
//! let db = Db::open(std::path::Path::new("./db_data")).unwrap();
//! let command = parser::parse_command("SELECT id FROM t WHERE id = 2").unwrap();
//! let statement = stmt::resolve(&db, command).unwrap();
//! let physical = plan_statement(&db, &statement).unwrap();
//! ```

mod logical;
mod physical;
mod rewrite;

pub use logical::{create_logical_plan, is_pushable_atom, LogicalPlan, ReadWriteMode};
pub use physical::{create_physical_plan, explain_physical, IndexBound, PhysicalPlan};
pub use rewrite::Rewriter;

use common::DbResult;
use stmt::Statement;
use storage::Db;

/// Full pipeline: logical construction, rewriting, physical lowering.
pub fn plan_statement(db: &Db, statement: &Statement) -> DbResult<PhysicalPlan> {
    let logical = create_logical_plan(statement)?;
    let rewritten = Rewriter::new().rewrite(logical)?;
    create_physical_plan(db, rewritten)
}
