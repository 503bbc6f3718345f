//! Volcano-style query executor.
//!
//! A physical plan becomes a tree of operators pulled one tuple at a time:
//!
//! ```text
//! Physical Plan
//!     |
//! build_operator
//!     |
//! open(ctx)  - acquire scanners, open children top-down
//!     |
//! next(ctx)  - advance; current_tuple() views the row
//!     |
//! close(ctx) - release resources; idempotent
//! ```
//!
//! End-of-stream is the normal `Ok(false)` return of `next`, never an
//! error. Any error aborts the statement; the driver still closes every
//! opened operator.
//!
//! # Example
//!
//! ```no_run
//! use executor::{execute_plan, ExecutionContext};
//! use storage::{Db, Trx};
//!
//! let db = Db::open(std::path::Path::new("./db_data")).unwrap();
//! let mut trx = Trx::new();
//! let command = parser::parse_command("SELECT id FROM t").unwrap();
//! let statement = stmt::resolve(&db, command).unwrap();
//! let plan = planner::plan_statement(&db, &statement).unwrap();
//! let mut ctx = ExecutionContext::new(&db, &mut trx);
//! let result = execute_plan(plan, &mut ctx).unwrap();
//! ```

mod builder;
mod calc;
mod dml;
mod filter;
mod groupby;
mod join;
mod project;
mod scan;
mod sort;
#[cfg(test)]
mod tests;

pub use builder::build_operator;

use common::{DbError, DbResult};
use expr::{Expression, Tuple, TupleSchema};
use planner::PhysicalPlan;
use storage::{Db, Trx};
use tracing::warn;
use types::Value;

/// Everything an operator needs at runtime: the catalog/table directory and
/// the session transaction. Passed explicitly into every call.
pub struct ExecutionContext<'a> {
    pub db: &'a Db,
    pub trx: &'a mut Trx,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(db: &'a Db, trx: &'a mut Trx) -> Self {
        Self { db, trx }
    }
}

/// Pull-based operator contract.
///
/// `open` must be called exactly once before `next`; `close` must succeed
/// after errors and is idempotent. `current_tuple` is valid only between a
/// successful `next` and the following `next`/`close`.
pub trait PhysicalOperator {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Advance to the next tuple; `Ok(false)` signals end of stream.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool>;

    fn current_tuple(&self) -> DbResult<&Tuple>;

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Output schema; stable between `open` and `close`.
    fn tuple_schema(&self) -> TupleSchema;
}

/// Materialized result of one executed plan.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub schema: TupleSchema,
    pub rows: Vec<Vec<Value>>,
}

/// Build, open, drain and close a plan.
///
/// On any error the operator tree is still closed before the error is
/// returned.
pub fn execute_plan(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<QueryResult> {
    let mut operator = build_operator(plan)?;

    if let Err(err) = operator.open(ctx) {
        if let Err(close_err) = operator.close(ctx) {
            warn!(%close_err, "close after failed open also failed");
        }
        return Err(err);
    }

    let schema = operator.tuple_schema();
    let mut rows = Vec::new();
    let outcome = drain(operator.as_mut(), ctx, &mut rows);

    let close_result = operator.close(ctx);
    outcome?;
    close_result?;

    Ok(QueryResult { schema, rows })
}

fn drain(
    operator: &mut dyn PhysicalOperator,
    ctx: &mut ExecutionContext,
    rows: &mut Vec<Vec<Value>>,
) -> DbResult<()> {
    while operator.next(ctx)? {
        let tuple = operator.current_tuple()?;
        rows.push(tuple.values()?);
    }
    Ok(())
}

/// Check that every predicate holds for the tuple.
///
/// Shared by the scan operators; predicates must produce booleans.
pub(crate) fn passes_predicates(
    predicates: &[Expression],
    tuple: &Tuple,
) -> DbResult<bool> {
    for predicate in predicates {
        let value = predicate.get_value(tuple)?;
        match value.as_bool() {
            Some(true) => {}
            Some(false) => return Ok(false),
            None => {
                return Err(DbError::InvalidArgument(format!(
                    "scan predicate produced {}, expected booleans",
                    value.attr_type()
                )))
            }
        }
    }
    Ok(true)
}
