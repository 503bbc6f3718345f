//! Single-shot operators: calc, explain and string lists.

use common::{DbError, DbResult};
use expr::{Expression, Tuple, TupleCellSpec, TupleSchema, ValueListTuple};
use types::Value;

use crate::{ExecutionContext, PhysicalOperator};

/// Emits exactly one tuple of constant expressions.
pub struct CalcExec {
    expressions: Vec<Expression>,
    emitted: bool,
    tuple: Option<Tuple>,
}

impl CalcExec {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self {
            expressions,
            emitted: false,
            tuple: None,
        }
    }

    fn specs(&self) -> Vec<TupleCellSpec> {
        self.expressions
            .iter()
            .map(|e| TupleCellSpec::alias_only(&e.to_string()))
            .collect()
    }
}

impl PhysicalOperator for CalcExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.emitted = false;
        self.tuple = None;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.emitted {
            return Ok(false);
        }
        self.emitted = true;

        let cells = self
            .expressions
            .iter()
            .map(|e| e.try_get_value())
            .collect::<DbResult<Vec<_>>>()?;
        self.tuple = Some(Tuple::ValueList(ValueListTuple::new(self.specs(), cells)));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("calc has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.specs().into_iter().collect()
    }
}

/// Emits the rendered plan as a single `Query Plan` cell.
pub struct ExplainExec {
    text: String,
    emitted: bool,
    tuple: Option<Tuple>,
}

impl ExplainExec {
    pub fn new(text: String) -> Self {
        Self {
            text,
            emitted: false,
            tuple: None,
        }
    }

    fn spec() -> TupleCellSpec {
        TupleCellSpec::alias_only("Query Plan")
    }
}

impl PhysicalOperator for ExplainExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.emitted = false;
        self.tuple = None;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.emitted {
            return Ok(false);
        }
        self.emitted = true;
        self.tuple = Some(Tuple::ValueList(ValueListTuple::new(
            vec![Self::spec()],
            vec![Value::Chars(self.text.clone())],
        )));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("explain has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        vec![Self::spec()].into_iter().collect()
    }
}

/// Iterates a materialized list of string rows.
///
/// Backs the utility statements (HELP, SHOW TABLES, DESC).
pub struct StringListExec {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    cursor: usize,
    tuple: Option<Tuple>,
}

impl StringListExec {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            cursor: 0,
            tuple: None,
        }
    }

    fn specs(&self) -> Vec<TupleCellSpec> {
        self.headers
            .iter()
            .map(|h| TupleCellSpec::alias_only(h))
            .collect()
    }
}

impl PhysicalOperator for StringListExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.cursor = 0;
        self.tuple = None;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<bool> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;
        let cells = row.iter().map(|s| Value::Chars(s.clone())).collect();
        self.tuple = Some(Tuple::ValueList(ValueListTuple::new(self.specs(), cells)));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("string list has no current tuple".into()))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.specs().into_iter().collect()
    }
}
