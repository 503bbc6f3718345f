//! Group-by operators.
//!
//! Both variants buffer the whole child stream before emitting. Group
//! equality is value-equality over the group expressions in declaration
//! order; Undefined values group with themselves. Output order follows the
//! first appearance of each group, though callers may not rely on it.

use std::hash::{Hash, Hasher};

use ahash::RandomState;
use common::{DbError, DbResult};
use expr::{Expression, Tuple, TupleCellSpec, TupleSchema, ValueListTuple};
use hashbrown::HashMap;
use types::Value;

use crate::{ExecutionContext, PhysicalOperator};

/// Hashable wrapper over a row of group-key values.
#[derive(Clone, Debug)]
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().zip(&other.0).all(|(a, b)| match (a, b) {
            (Value::Undefined, Value::Undefined) => true,
            _ => a.attr_type() == b.attr_type() && a.compare(b) == Some(std::cmp::Ordering::Equal),
        })
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            match value {
                Value::Int(i) => (0u8, i).hash(state),
                Value::Float(f) => (1u8, f.to_bits()).hash(state),
                Value::Chars(s) => (2u8, s.as_bytes()).hash(state),
                Value::Bool(b) => (3u8, b).hash(state),
                Value::Undefined => 4u8.hash(state),
            }
        }
    }
}

/// One output row per distinct key row.
pub struct HashGroupByExec {
    group_exprs: Vec<Expression>,
    child: Option<Box<dyn PhysicalOperator>>,
    groups: Option<Vec<ValueListTuple>>,
    cursor: usize,
    tuple: Option<Tuple>,
}

impl HashGroupByExec {
    pub fn new(group_exprs: Vec<Expression>, child: Option<Box<dyn PhysicalOperator>>) -> Self {
        Self {
            group_exprs,
            child,
            groups: None,
            cursor: 0,
            tuple: None,
        }
    }

    /// Field expressions keep their table/field spec so the projection
    /// above can still resolve them; anything else gets a display alias.
    fn specs(&self) -> Vec<TupleCellSpec> {
        self.group_exprs
            .iter()
            .map(|e| match e {
                Expression::Field(field) => {
                    TupleCellSpec::new(field.table_name(), field.field_name())
                }
                other => TupleCellSpec::alias_only(&other.to_string()),
            })
            .collect()
    }

    fn fill_groups(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut seen: HashMap<GroupKey, (), RandomState> = HashMap::default();
        let mut groups = Vec::new();
        let specs = self.specs();

        if let Some(child) = &mut self.child {
            while child.next(ctx)? {
                let tuple = child.current_tuple()?;
                let keys = self
                    .group_exprs
                    .iter()
                    .map(|e| e.get_value(tuple))
                    .collect::<DbResult<Vec<_>>>()?;
                let key = GroupKey(keys);
                if seen.contains_key(&key) {
                    continue;
                }
                groups.push(ValueListTuple::new(specs.clone(), key.0.clone()));
                seen.insert(key, ());
            }
        }
        self.groups = Some(groups);
        self.cursor = 0;
        Ok(())
    }
}

impl PhysicalOperator for HashGroupByExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.groups = None;
        self.cursor = 0;
        self.tuple = None;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.groups.is_none() {
            self.fill_groups(ctx)?;
        }
        let groups = self
            .groups
            .as_ref()
            .ok_or_else(|| DbError::Internal("group buffer missing".into()))?;
        let Some(group) = groups.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;
        self.tuple = Some(Tuple::ValueList(group.clone()));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("group by has no current tuple".into()))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.groups = None;
        match &mut self.child {
            Some(child) => child.close(ctx),
            None => Ok(()),
        }
    }

    fn tuple_schema(&self) -> TupleSchema {
        self.specs().into_iter().collect()
    }
}

/// Keyless grouping: drain the child, emit a single (empty) row.
pub struct ScalarGroupByExec {
    child: Option<Box<dyn PhysicalOperator>>,
    emitted: bool,
    tuple: Option<Tuple>,
}

impl ScalarGroupByExec {
    pub fn new(child: Option<Box<dyn PhysicalOperator>>) -> Self {
        Self {
            child,
            emitted: false,
            tuple: None,
        }
    }
}

impl PhysicalOperator for ScalarGroupByExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.emitted = false;
        self.tuple = None;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        if self.emitted {
            return Ok(false);
        }
        self.emitted = true;
        if let Some(child) = &mut self.child {
            while child.next(ctx)? {}
        }
        self.tuple = Some(Tuple::ValueList(ValueListTuple::default()));
        Ok(true)
    }

    fn current_tuple(&self) -> DbResult<&Tuple> {
        self.tuple
            .as_ref()
            .ok_or_else(|| DbError::Internal("group by has no current tuple".into()))
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
