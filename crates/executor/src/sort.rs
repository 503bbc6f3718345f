//! Order-by operator: buffer, sort, replay.

use std::cmp::Ordering;

use common::{DbError, DbResult};
use expr::{Tuple, TupleSchema, ValueListTuple};
use stmt::{OrderByItem, SortDirection};
use types::Value;

use crate::{ExecutionContext, PhysicalOperator};

/// Buffers the whole child stream on the first `next`, sorts it by the
/// order keys, then replays rows in order.
pub struct OrderExec {
    items: Vec<OrderByItem>,
    child: Option<Box<dyn PhysicalOperator>>,
    buffered: Option<Vec<ValueListTuple>>,
    cursor: usize,
    tuple: Option<Tuple>,
}

impl OrderExec {
    pub fn new(items: Vec<OrderByItem>, child: Option<Box<dyn PhysicalOperator>>) -> Self {
        Self {
            items,
            child,
            buffered: None,
            cursor: 0,
            tuple: None,
        }
    }

    fn fill_buffer(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut rows: Vec<(Vec<Value>, ValueListTuple)> = Vec::new();
        if let Some(child) = &mut self.child {
            while child.next(ctx)? {
                let tuple = child.current_tuple()?;
                let keys = self
                    .items
                    .iter()
                    .map(|item| item.expression.get_value(tuple))
                    .collect::<DbResult<Vec<_>>>()?;
                rows.push((keys, ValueListTuple::from_tuple(tuple)?));
            }
        }

        let directions: Vec<SortDirection> =
            self.items.iter().map(|item| item.direction).collect();
        rows.sort_by(|(a, _), (b, _)| compare_keys(a, b, &directions));

        self.buffered = Some(rows.into_iter().map(|(_, tuple)| tuple).collect());
        self.cursor = 0;
        Ok(())
    }
}

fn compare_keys(a: &[Value], b: &[Value], directions: &[SortDirection]) -> Ordering {
    for ((left, right), direction) in a.iter().zip(b).zip(directions) {
        let ordering = left.compare(right).unwrap_or(Ordering::Equal);
        let ordering = match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl PhysicalOperator for OrderExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.buffered = None;
        self.cursor = 0;
        self.tuple = None;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.buffered.is_none() {
            self.fill_buffer(ctx)?;
        }
        let rows = self
            .buffered
            .as_ref()
            .ok_or_else(|| DbError::Internal("order buffer missing".into()))?;
        let Some(row) = rows.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;
        self.tuple = Some(Tuple::ValueList(row.clone()));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("order has no current tuple".into()))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.buffered = None;
        match &mut self.child {
            Some(child) => child.close(ctx),
            None => Ok(()),
        }
    }

    fn tuple_schema(&self) -> TupleSchema {
        match &self.child {
            Some(child) => child.tuple_schema(),
            None => TupleSchema::default(),
        }
    }
}
