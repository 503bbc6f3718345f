//! Scan operators: table scan and index scan.

use common::{DbError, DbResult};
use expr::{Expression, RowTuple, Tuple, TupleCellSpec, TupleSchema};
use planner::IndexBound;
use storage::{IndexScanner, RecordScanner};

use crate::{passes_predicates, ExecutionContext, PhysicalOperator};

fn scan_schema(ctx: &ExecutionContext, table: &str) -> DbResult<TupleSchema> {
    let meta = ctx.db.find_table(table)?.meta();
    Ok(meta
        .fields()
        .iter()
        .map(|f| TupleCellSpec::new(table, f.name()))
        .collect())
}

fn fresh_row_tuple(ctx: &ExecutionContext, table: &str) -> DbResult<Tuple> {
    let meta = ctx.db.find_table(table)?.meta();
    Ok(Tuple::Row(RowTuple::new(table, meta.fields().to_vec())))
}

/// Heap scan with pushed-down filters.
///
/// Advances the record scanner until a record satisfies every predicate;
/// exhaustion of the scanner is the operator's end of stream.
pub struct TableScanExec {
    table: String,
    predicates: Vec<Expression>,
    scanner: Option<RecordScanner>,
    tuple: Option<Tuple>,
    schema: TupleSchema,
}

impl TableScanExec {
    pub fn new(table: String, predicates: Vec<Expression>) -> Self {
        Self {
            table,
            predicates,
            scanner: None,
            tuple: None,
            schema: TupleSchema::default(),
        }
    }
}

impl PhysicalOperator for TableScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let table = ctx.db.find_table(&self.table)?;
        self.scanner = Some(table.scanner()?);
        self.tuple = Some(fresh_row_tuple(ctx, &self.table)?);
        self.schema = scan_schema(ctx, &self.table)?;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        let scanner = self
            .scanner
            .as_mut()
            .ok_or_else(|| DbError::Internal("table scan used before open".into()))?;
        let tuple = self
            .tuple
            .as_mut()
            .ok_or_else(|| DbError::Internal("table scan has no tuple state".into()))?;

        while let Some(record) = scanner.next()? {
            let Tuple::Row(row) = tuple else {
                return Err(DbError::Internal("table scan tuple must be a row".into()));
            };
            row.set_record(record);
            if passes_predicates(&self.predicates, tuple)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("table scan has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.scanner = None;
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.schema.clone()
    }
}

/// Key-range scan over one index, with residual filters.
pub struct IndexScanExec {
    table: String,
    index: String,
    left: Option<IndexBound>,
    right: Option<IndexBound>,
    predicates: Vec<Expression>,
    scanner: Option<IndexScanner>,
    tuple: Option<Tuple>,
    schema: TupleSchema,
}

impl IndexScanExec {
    pub fn new(
        table: String,
        index: String,
        left: Option<IndexBound>,
        right: Option<IndexBound>,
        predicates: Vec<Expression>,
    ) -> Self {
        Self {
            table,
            index,
            left,
            right,
            predicates,
            scanner: None,
            tuple: None,
            schema: TupleSchema::default(),
        }
    }
}

impl PhysicalOperator for IndexScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let table = ctx.db.find_table(&self.table)?;
        let scanner = table.index_scanner(
            &self.index,
            self.left.as_ref().map(|b| &b.value),
            self.left.as_ref().is_none_or(|b| b.inclusive),
            self.right.as_ref().map(|b| &b.value),
            self.right.as_ref().is_none_or(|b| b.inclusive),
        )?;
        self.scanner = Some(scanner);
        self.tuple = Some(fresh_row_tuple(ctx, &self.table)?);
        self.schema = scan_schema(ctx, &self.table)?;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        let db = ctx.db;
        let scanner = self
            .scanner
            .as_mut()
            .ok_or_else(|| DbError::Internal("index scan used before open".into()))?;
        let tuple = self
            .tuple
            .as_mut()
            .ok_or_else(|| DbError::Internal("index scan has no tuple state".into()))?;

        while let Some(rid) = scanner.next_entry() {
            let record = db.find_table(&self.table)?.get_record(rid)?;
            let Tuple::Row(row) = tuple else {
                return Err(DbError::Internal("index scan tuple must be a row".into()));
            };
            row.set_record(record);
            if passes_predicates(&self.predicates, tuple)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("index scan has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.scanner = None;
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.schema.clone()
    }
}
