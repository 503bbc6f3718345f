//! Write operators: insert, delete, update.
//!
//! All mutations go through the session transaction so a failed statement
//! can be rolled back. None of these operators produce tuples; their
//! `next` drains (or has nothing to do) and reports end of stream.

use common::{DbError, DbResult, Rid};
use expr::{Tuple, TupleSchema};
use types::Value;

use crate::{ExecutionContext, PhysicalOperator};

/// The rid of the heap record a scan-produced tuple views.
fn rid_of(tuple: &Tuple) -> DbResult<Rid> {
    let Tuple::Row(row) = tuple else {
        return Err(DbError::Internal(
            "write operator expects row tuples from its child".into(),
        ));
    };
    row.record()
        .map(|r| r.rid())
        .ok_or_else(|| DbError::Internal("row tuple has no current record".into()))
}

/// One-shot insert; the write happens at `open`.
pub struct InsertExec {
    table: String,
    values: Vec<Value>,
}

impl InsertExec {
    pub fn new(table: String, values: Vec<Value>) -> Self {
        Self { table, values }
    }
}

impl PhysicalOperator for InsertExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let db = ctx.db;
        let table = db.find_table(&self.table)?;
        let image = table.make_record(&self.values)?;
        ctx.trx.insert_record(table, image)?;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        Err(DbError::Internal("insert produces no tuples".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        TupleSchema::default()
    }
}

/// Deletes every record the child produces.
pub struct DeleteExec {
    table: String,
    child: Option<Box<dyn PhysicalOperator>>,
    done: bool,
}

impl DeleteExec {
    pub fn new(table: String, child: Option<Box<dyn PhysicalOperator>>) -> Self {
        Self {
            table,
            child,
            done: false,
        }
    }
}

impl PhysicalOperator for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;

        let Some(child) = &mut self.child else {
            return Ok(false);
        };
        let db = ctx.db;
        while child.next(ctx)? {
            let rid = rid_of(child.current_tuple()?)?;
            let table = db.find_table(&self.table)?;
            ctx.trx.delete_record(table, rid)?;
        }
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        Err(DbError::Internal("delete produces no tuples".into()))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        match &mut self.child {
            Some(child) => child.close(ctx),
            None => Ok(()),
        }
    }

    fn tuple_schema(&self) -> TupleSchema {
        TupleSchema::default()
    }
}

/// Rewrites one field of every matching record.
///
/// An update is a delete plus a re-insert of the patched image; the record
/// gets a fresh rid.
pub struct UpdateExec {
    table: String,
    field: String,
    value: Value,
    child: Option<Box<dyn PhysicalOperator>>,
    done: bool,
}

impl UpdateExec {
    pub fn new(
        table: String,
        field: String,
        value: Value,
        child: Option<Box<dyn PhysicalOperator>>,
    ) -> Self {
        Self {
            table,
            field,
            value,
            child,
            done: false,
        }
    }
}

impl PhysicalOperator for UpdateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;

        let Some(child) = &mut self.child else {
            return Ok(false);
        };
        let db = ctx.db;

        // Collect victims first; mutating the heap mid-scan would let the
        // scanner observe its own re-inserts.
        let mut victims = Vec::new();
        while child.next(ctx)? {
            victims.push(rid_of(child.current_tuple()?)?);
        }

        let table = db.find_table(&self.table)?;
        let field = table.meta().field(&self.field).ok_or_else(|| {
            DbError::SchemaFieldMissing(format!("{}.{}", self.table, self.field))
        })?;
        let coerced = self.value.cast_to(field.attr_type()).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "value '{}' is not assignable to {}.{}",
                self.value, self.table, self.field
            ))
        })?;
        if let Value::Chars(s) = &coerced {
            if s.len() > field.len() {
                return Err(DbError::InvalidArgument(format!(
                    "'{s}' exceeds {}.{} length {}",
                    self.table,
                    self.field,
                    field.len()
                )));
            }
        }

        for rid in victims {
            let record = table.get_record(rid)?;
            let mut image = record.into_data();
            image[field.offset()..field.offset() + field.len()]
                .copy_from_slice(&coerced.to_bytes(field.len()));
            ctx.trx.delete_record(table, rid)?;
            ctx.trx.insert_record(table, image)?;
        }
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        Err(DbError::Internal("update produces no tuples".into()))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        match &mut self.child {
            Some(child) => child.close(ctx),
            None => Ok(()),
        }
    }

    fn tuple_schema(&self) -> TupleSchema {
        TupleSchema::default()
    }
}
