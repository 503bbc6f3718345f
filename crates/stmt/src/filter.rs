//! Resolved WHERE clauses.
//!
//! A [`FilterStmt`] is the AND-joined list of comparisons a statement
//! filters by; each [`FilterUnit`] has both sides bound to either a live
//! field of one of the statement's tables or a typed literal.

use common::{DbError, DbResult};
use expr::{CompOp, FieldRef};
use parser::{CondOperand, ConditionSql, RelAttr};
use storage::Table;
use types::Value;

/// One side of a resolved condition.
#[derive(Clone, Debug)]
pub enum FilterObj {
    Attr(FieldRef),
    Value(Value),
}

/// A resolved comparison atom.
#[derive(Clone, Debug)]
pub struct FilterUnit {
    pub comp: CompOp,
    pub left: FilterObj,
    pub right: FilterObj,
}

/// AND-joined list of resolved comparisons.
#[derive(Clone, Debug, Default)]
pub struct FilterStmt {
    units: Vec<FilterUnit>,
}

impl FilterStmt {
    /// Resolve the parsed conditions against the statement's tables.
    pub fn create(tables: &[&Table], conditions: &[ConditionSql]) -> DbResult<Self> {
        let units = conditions
            .iter()
            .map(|cond| {
                Ok(FilterUnit {
                    comp: cond.comp,
                    left: resolve_operand(tables, &cond.left)?,
                    right: resolve_operand(tables, &cond.right)?,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self { units })
    }

    pub fn units(&self) -> &[FilterUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn resolve_operand(tables: &[&Table], operand: &CondOperand) -> DbResult<FilterObj> {
    match operand {
        CondOperand::Value(value) => Ok(FilterObj::Value(value.clone())),
        CondOperand::Attr(attr) => Ok(FilterObj::Attr(resolve_attr(tables, attr)?)),
    }
}

/// Bind a (possibly qualified) attribute against the statement's tables.
///
/// Unqualified names must be unambiguous across the table list.
pub fn resolve_attr(tables: &[&Table], attr: &RelAttr) -> DbResult<FieldRef> {
    if let Some(table_name) = &attr.table {
        let table = tables
            .iter()
            .find(|t| t.name() == table_name.as_str())
            .ok_or_else(|| DbError::SchemaTableNotExist(table_name.clone()))?;
        let field = table
            .meta()
            .field(&attr.name)
            .ok_or_else(|| DbError::SchemaFieldMissing(format!("{table_name}.{}", attr.name)))?;
        return Ok(FieldRef::new(table.name(), field.clone()));
    }

    let mut matches = tables
        .iter()
        .filter_map(|t| t.meta().field(&attr.name).map(|f| (*t, f)));
    let first = matches.next();
    let second = matches.next();
    match (first, second) {
        (Some((table, field)), None) => Ok(FieldRef::new(table.name(), field.clone())),
        (Some(_), Some(_)) => Err(DbError::SchemaFieldMissing(format!(
            "'{}' is ambiguous across the FROM list",
            attr.name
        ))),
        (None, _) => Err(DbError::SchemaFieldMissing(attr.name.clone())),
    }
}
