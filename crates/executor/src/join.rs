//! Nested-loop join.

use common::{DbError, DbResult};
use expr::{JoinedTuple, Tuple, TupleSchema};

use crate::{ExecutionContext, PhysicalOperator};

/// Row-major nested loops: for each left row, the right child is drained
/// and then closed and re-opened for the next left row. The right child
/// must therefore be re-openable; nothing is assumed about its cursor
/// state surviving a reopen.
pub struct NestedLoopJoinExec {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    left_tuple: Option<Tuple>,
    current: Option<Tuple>,
    opened: bool,
}

impl NestedLoopJoinExec {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>) -> Self {
        Self {
            left,
            right,
            left_tuple: None,
            current: None,
            opened: false,
        }
    }
}

impl PhysicalOperator for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        self.left_tuple = None;
        self.current = None;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        loop {
            if self.left_tuple.is_none() {
                if !self.left.next(ctx)? {
                    return Ok(false);
                }
                self.left_tuple = Some(self.left.current_tuple()?.clone());
            }

            if self.right.next(ctx)? {
                let left = self
                    .left_tuple
                    .clone()
                    .ok_or_else(|| DbError::Internal("join lost its left tuple".into()))?;
                let right = self.right.current_tuple()?.clone();
                self.current = Some(Tuple::Joined(JoinedTuple::new(left, right)));
                return Ok(true);
            }

            // Right side exhausted: advance left, rewind right.
            self.left_tuple = None;
            self.right.close(ctx)?;
            self.right.open(ctx)?;
        }
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.current
            .as_ref()
            .ok_or_else(|| DbError::Internal("join has no current tuple".into()))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        self.left_tuple = None;
        self.current = None;
        self.left.close(ctx)?;
        self.right.close(ctx)
    }

    fn tuple_schema(&self) -> TupleSchema {
        let mut schema = TupleSchema::default();
        for spec in self.left.tuple_schema().cells() {
            schema.append_cell(spec.clone());
        }
        for spec in self.right.tuple_schema().cells() {
            schema.append_cell(spec.clone());
        }
        schema
    }
}
