//! Shared fixtures for executor tests.

use std::cell::Cell;
use std::rc::Rc;

use catalog::Column;
use common::DbResult;
use expr::{
    CompOp, Expression, FieldRef, Tuple, TupleCellSpec, TupleSchema, ValueListTuple,
};
use storage::{Db, Trx};
use types::{AttrType, Value};

use crate::{ExecutionContext, PhysicalOperator};

/// Owns the on-disk database and the transaction a test executes under.
pub struct TestDb {
    pub db: Db,
    pub trx: Trx,
    _dir: tempfile::TempDir,
}

impl TestDb {
    /// Fresh database with `users(id INT, name CHAR(8))`.
    pub fn users() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        db.create_table(
            "users",
            vec![
                Column::new("id", AttrType::Ints, 4),
                Column::new("name", AttrType::Chars, 8),
            ],
        )
        .unwrap();
        Self {
            db,
            trx: Trx::new(),
            _dir: dir,
        }
    }

    pub fn ctx(&mut self) -> ExecutionContext<'_> {
        ExecutionContext::new(&self.db, &mut self.trx)
    }

    pub fn insert_user(&mut self, id: i32, name: &str) {
        let table = self.db.find_table("users").unwrap();
        let image = table
            .make_record(&[Value::Int(id), Value::Chars(name.into())])
            .unwrap();
        self.trx.insert_record(table, image).unwrap();
        self.trx.commit();
    }

    pub fn user_field(&self, name: &str) -> FieldRef {
        let meta = self.db.find_table("users").unwrap().meta();
        FieldRef::new("users", meta.field(name).unwrap().clone())
    }
}

pub fn cmp(op: CompOp, left: Expression, right: Expression) -> Expression {
    Expression::Comparison {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn lit(value: Value) -> Expression {
    Expression::Value(value)
}

/// Scripted operator yielding fixed rows; re-openable, and it counts its
/// `open`/`close` calls for lifecycle assertions.
pub struct MockExec {
    specs: Vec<TupleCellSpec>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    tuple: Option<Tuple>,
    pub opens: Rc<Cell<usize>>,
    pub closes: Rc<Cell<usize>>,
}

impl MockExec {
    pub fn new(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> Self {
        let specs = columns
            .iter()
            .map(|(table, field)| TupleCellSpec::new(table, field))
            .collect();
        Self {
            specs,
            rows,
            cursor: 0,
            tuple: None,
            opens: Rc::new(Cell::new(0)),
            closes: Rc::new(Cell::new(0)),
        }
    }

    pub fn counters(&self) -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        (self.opens.clone(), self.closes.clone())
    }
}

impl PhysicalOperator for MockExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.opens.set(self.opens.get() + 1);
        self.cursor = 0;
        self.tuple = None;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;
        self.tuple = Some(Tuple::ValueList(ValueListTuple::new(
            self.specs.clone(),
            row.clone(),
        )));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| common::DbError::Internal("mock has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.closes.set(self.closes.get() + 1);
        self.tuple = None;
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.specs.iter().cloned().collect()
    }
}

/// Drain an opened operator into materialized rows.
pub fn collect_rows(
    operator: &mut dyn PhysicalOperator,
    ctx: &mut ExecutionContext,
) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    while operator.next(ctx).unwrap() {
        rows.push(operator.current_tuple().unwrap().values().unwrap());
    }
    rows
}
