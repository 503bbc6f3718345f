//! Projection operator.

use common::{DbError, DbResult};
use expr::{Expression, ProjectTuple, Tuple, TupleCellSpec, TupleSchema};

use crate::{ExecutionContext, PhysicalOperator};

/// Exposes a computed view over the child's current tuple; cells evaluate
/// on demand, nothing is materialized here.
///
/// A childless projection (the rewriter dropped a provably-empty subtree)
/// produces no rows.
pub struct ProjectExec {
    specs: Vec<TupleCellSpec>,
    child: Option<Box<dyn PhysicalOperator>>,
    tuple: Tuple,
}

impl ProjectExec {
    pub fn new(
        expressions: Vec<Expression>,
        specs: Vec<TupleCellSpec>,
        child: Option<Box<dyn PhysicalOperator>>,
    ) -> Self {
        let tuple = Tuple::Project(ProjectTuple::new(expressions, specs.clone()));
        Self {
            specs,
            child,
            tuple,
        }
    }
}

impl PhysicalOperator for ProjectExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        let Some(child) = &mut self.child else {
            return Ok(false);
        };
        if !child.next(ctx)? {
            return Ok(false);
        }
        let inner = child.current_tuple()?.clone();
        let Tuple::Project(project) = &mut self.tuple else {
            return Err(DbError::Internal("project tuple state corrupted".into()));
        };
        project.set_inner(inner);
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        Ok(&self.tuple)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        match &mut self.child {
            Some(child) => child.close(ctx),
            None => Ok(()),
        }
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.specs.iter().cloned().collect()
    }
}
