//! Predicate operator: filters the child stream.

use common::{DbError, DbResult};
use expr::{Expression, Tuple, TupleSchema};

use crate::{ExecutionContext, PhysicalOperator};

/// Passes through child tuples for which the predicate is boolean-true.
pub struct PredicateExec {
    predicate: Expression,
    child: Box<dyn PhysicalOperator>,
}

impl PredicateExec {
    pub fn new(predicate: Expression, child: Box<dyn PhysicalOperator>) -> Self {
        Self { predicate, child }
    }
}

impl PhysicalOperator for PredicateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        while self.child.next(ctx)? {
            let tuple = self.child.current_tuple()?;
            let value = self.predicate.get_value(tuple)?;
            match value.as_bool() {
                Some(true) => return Ok(true),
                Some(false) => {}
                None => {
                    return Err(DbError::InvalidArgument(format!(
                        "predicate produced {}, expected booleans",
                        value.attr_type()
                    )))
                }
            }
        }
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.child.current_tuple()
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.close(ctx)
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.child.tuple_schema()
    }
}
