//! Row views: the four tuple shapes operators expose.
//!
//! A tuple is a read view over one row of some source. `RowTuple` views a
//! heap record through its field metas; `ProjectTuple` computes cells from
//! expressions over an inner tuple; `JoinedTuple` concatenates two tuples;
//! `ValueListTuple` is a materialized row used for constants and explain
//! output.

use catalog::FieldMeta;
use common::{DbError, DbResult};
use storage::Record;
use types::Value;

use crate::Expression;

/// Name triple identifying one cell of a schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TupleCellSpec {
    table: Option<String>,
    field: Option<String>,
    alias: Option<String>,
}

impl TupleCellSpec {
    pub fn new(table: &str, field: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            field: Some(field.to_string()),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// A spec carrying only a display name, for computed columns.
    pub fn alias_only(alias: &str) -> Self {
        Self {
            table: None,
            field: None,
            alias: Some(alias.to_string()),
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Column header this spec renders as.
    pub fn display_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match (&self.table, &self.field) {
            (Some(table), Some(field)) => format!("{table}.{field}"),
            (None, Some(field)) => field.clone(),
            _ => String::new(),
        }
    }

    /// Two specs address the same cell when their table/field pair agrees.
    ///
    /// Alias-only specs fall back to comparing aliases.
    pub fn matches(&self, other: &TupleCellSpec) -> bool {
        match (&self.table, &self.field, &other.table, &other.field) {
            (Some(t1), Some(f1), Some(t2), Some(f2)) => t1 == t2 && f1 == f2,
            _ => self.alias.is_some() && self.alias == other.alias,
        }
    }
}

/// Ordered cell specs naming an operator's output columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TupleSchema {
    cells: Vec<TupleCellSpec>,
}

impl TupleSchema {
    pub fn append_cell(&mut self, spec: TupleCellSpec) {
        self.cells.push(spec);
    }

    pub fn cell_num(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_at(&self, index: usize) -> &TupleCellSpec {
        &self.cells[index]
    }

    pub fn cells(&self) -> &[TupleCellSpec] {
        &self.cells
    }
}

impl FromIterator<TupleCellSpec> for TupleSchema {
    fn from_iter<I: IntoIterator<Item = TupleCellSpec>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Sum type over the concrete tuple shapes.
#[derive(Clone, Debug)]
pub enum Tuple {
    Row(RowTuple),
    Project(ProjectTuple),
    Joined(JoinedTuple),
    ValueList(ValueListTuple),
}

impl Tuple {
    pub fn cell_num(&self) -> usize {
        match self {
            Tuple::Row(t) => t.cell_num(),
            Tuple::Project(t) => t.cell_num(),
            Tuple::Joined(t) => t.cell_num(),
            Tuple::ValueList(t) => t.cell_num(),
        }
    }

    pub fn cell_at(&self, index: usize) -> DbResult<Value> {
        match self {
            Tuple::Row(t) => t.cell_at(index),
            Tuple::Project(t) => t.cell_at(index),
            Tuple::Joined(t) => t.cell_at(index),
            Tuple::ValueList(t) => t.cell_at(index),
        }
    }

    pub fn spec_at(&self, index: usize) -> DbResult<TupleCellSpec> {
        match self {
            Tuple::Row(t) => t.spec_at(index),
            Tuple::Project(t) => t.spec_at(index),
            Tuple::Joined(t) => t.spec_at(index),
            Tuple::ValueList(t) => t.spec_at(index),
        }
    }

    /// Look a cell up by its spec; `NotFound` for specs outside the schema.
    pub fn find_cell(&self, spec: &TupleCellSpec) -> DbResult<Value> {
        match self {
            Tuple::Row(t) => t.find_cell(spec),
            Tuple::Project(t) => t.find_cell(spec),
            Tuple::Joined(t) => t.find_cell(spec),
            Tuple::ValueList(t) => t.find_cell(spec),
        }
    }

    /// Materialize every cell of this tuple.
    pub fn values(&self) -> DbResult<Vec<Value>> {
        (0..self.cell_num()).map(|i| self.cell_at(i)).collect()
    }
}

fn out_of_range(index: usize, len: usize) -> DbError {
    DbError::Internal(format!("cell index {index} out of range (len {len})"))
}

/// View over one heap record, cells read at field offset/length.
#[derive(Clone, Debug)]
pub struct RowTuple {
    table_name: String,
    fields: Vec<FieldMeta>,
    record: Option<Record>,
}

impl RowTuple {
    /// Schema comes from the table; the record arrives per `set_record`.
    pub fn new(table_name: &str, fields: Vec<FieldMeta>) -> Self {
        Self {
            table_name: table_name.to_string(),
            fields,
            record: None,
        }
    }

    pub fn set_record(&mut self, record: Record) {
        self.record = Some(record);
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn cell_num(&self) -> usize {
        self.fields.len()
    }

    fn record_ref(&self) -> DbResult<&Record> {
        self.record
            .as_ref()
            .ok_or_else(|| DbError::Internal("row tuple has no current record".into()))
    }

    pub fn cell_at(&self, index: usize) -> DbResult<Value> {
        let field = self
            .fields
            .get(index)
            .ok_or_else(|| out_of_range(index, self.fields.len()))?;
        let record = self.record_ref()?;
        let bytes = record.field_slice(field.offset(), field.len());
        Ok(Value::from_bytes(field.attr_type(), bytes))
    }

    pub fn spec_at(&self, index: usize) -> DbResult<TupleCellSpec> {
        let field = self
            .fields
            .get(index)
            .ok_or_else(|| out_of_range(index, self.fields.len()))?;
        Ok(TupleCellSpec::new(&self.table_name, field.name()))
    }

    pub fn find_cell(&self, spec: &TupleCellSpec) -> DbResult<Value> {
        let not_found = || {
            DbError::NotFound(format!(
                "cell {} in table {}",
                spec.display_name(),
                self.table_name
            ))
        };
        if spec.table_name() != Some(self.table_name.as_str()) {
            return Err(not_found());
        }
        let field_name = spec.field_name().ok_or_else(not_found)?;
        let index = self
            .fields
            .iter()
            .position(|f| f.name() == field_name)
            .ok_or_else(not_found)?;
        self.cell_at(index)
    }
}

/// Expression-computed cells over an inner tuple.
#[derive(Clone, Debug)]
pub struct ProjectTuple {
    expressions: Vec<Expression>,
    specs: Vec<TupleCellSpec>,
    inner: Option<Box<Tuple>>,
}

impl ProjectTuple {
    pub fn new(expressions: Vec<Expression>, specs: Vec<TupleCellSpec>) -> Self {
        debug_assert_eq!(expressions.len(), specs.len());
        Self {
            expressions,
            specs,
            inner: None,
        }
    }

    pub fn set_inner(&mut self, tuple: Tuple) {
        self.inner = Some(Box::new(tuple));
    }

    pub fn cell_num(&self) -> usize {
        self.expressions.len()
    }

    pub fn cell_at(&self, index: usize) -> DbResult<Value> {
        let expression = self
            .expressions
            .get(index)
            .ok_or_else(|| out_of_range(index, self.expressions.len()))?;
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| DbError::Internal("project tuple has no inner tuple".into()))?;
        expression.get_value(inner)
    }

    pub fn spec_at(&self, index: usize) -> DbResult<TupleCellSpec> {
        self.specs
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, self.specs.len()))
    }

    pub fn find_cell(&self, spec: &TupleCellSpec) -> DbResult<Value> {
        match &self.inner {
            Some(inner) => inner.find_cell(spec),
            None => Err(DbError::NotFound(spec.display_name())),
        }
    }
}

/// Two tuples concatenated; indices below the left count map left.
#[derive(Clone, Debug)]
pub struct JoinedTuple {
    left: Box<Tuple>,
    right: Box<Tuple>,
}

impl JoinedTuple {
    pub fn new(left: Tuple, right: Tuple) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cell_num(&self) -> usize {
        self.left.cell_num() + self.right.cell_num()
    }

    pub fn cell_at(&self, index: usize) -> DbResult<Value> {
        let left_num = self.left.cell_num();
        if index < left_num {
            self.left.cell_at(index)
        } else if index < self.cell_num() {
            self.right.cell_at(index - left_num)
        } else {
            Err(out_of_range(index, self.cell_num()))
        }
    }

    pub fn spec_at(&self, index: usize) -> DbResult<TupleCellSpec> {
        let left_num = self.left.cell_num();
        if index < left_num {
            self.left.spec_at(index)
        } else if index < self.cell_num() {
            self.right.spec_at(index - left_num)
        } else {
            Err(out_of_range(index, self.cell_num()))
        }
    }

    pub fn find_cell(&self, spec: &TupleCellSpec) -> DbResult<Value> {
        match self.left.find_cell(spec) {
            Err(DbError::NotFound(_)) => self.right.find_cell(spec),
            other => other,
        }
    }
}

/// A materialized row of `(spec, value)` pairs.
#[derive(Clone, Debug, Default)]
pub struct ValueListTuple {
    specs: Vec<TupleCellSpec>,
    cells: Vec<Value>,
}

impl ValueListTuple {
    pub fn new(specs: Vec<TupleCellSpec>, cells: Vec<Value>) -> Self {
        debug_assert_eq!(specs.len(), cells.len());
        Self { specs, cells }
    }

    /// Snapshot any tuple into an owned value list.
    pub fn from_tuple(tuple: &Tuple) -> DbResult<Self> {
        let mut specs = Vec::with_capacity(tuple.cell_num());
        let mut cells = Vec::with_capacity(tuple.cell_num());
        for i in 0..tuple.cell_num() {
            specs.push(tuple.spec_at(i)?);
            cells.push(tuple.cell_at(i)?);
        }
        Ok(Self { specs, cells })
    }

    pub fn cell_num(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_at(&self, index: usize) -> DbResult<Value> {
        self.cells
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, self.cells.len()))
    }

    pub fn spec_at(&self, index: usize) -> DbResult<TupleCellSpec> {
        self.specs
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, self.specs.len()))
    }

    pub fn find_cell(&self, spec: &TupleCellSpec) -> DbResult<Value> {
        for (i, candidate) in self.specs.iter().enumerate() {
            if candidate.matches(spec) {
                return self.cell_at(i);
            }
        }
        Err(DbError::NotFound(spec.display_name()))
    }
}
