//! SELECT resolution: tables, projection, filter, group-by and order-by.

use common::{DbError, DbResult};
use expr::{Expression, FieldRef, TupleCellSpec};
use parser::{RelAttr, SelectSql};
use storage::{Db, Table};

use crate::filter::{resolve_attr, FilterStmt};

/// Sort direction for one ORDER BY key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub struct OrderByItem {
    pub expression: Expression,
    pub direction: SortDirection,
}

/// A fully resolved SELECT.
#[derive(Clone, Debug)]
pub struct SelectStmt {
    /// FROM-list table names, in declaration order.
    pub tables: Vec<String>,
    /// Projected expressions, in SELECT-list order.
    pub query_expressions: Vec<Expression>,
    /// Output column names, parallel to `query_expressions`.
    pub query_specs: Vec<TupleCellSpec>,
    pub filter: FilterStmt,
    pub group_by: Vec<Expression>,
    pub order_by: Vec<OrderByItem>,
}

impl SelectStmt {
    pub fn create(db: &Db, select: &SelectSql) -> DbResult<Self> {
        if select.relations.is_empty() {
            return Err(DbError::InvalidArgument("empty FROM list".into()));
        }

        let mut tables: Vec<&Table> = Vec::with_capacity(select.relations.len());
        for name in &select.relations {
            tables.push(db.find_table(name)?);
        }
        // Column headers carry table prefixes only for multi-table queries.
        let with_table_name = tables.len() > 1;

        let mut query_expressions = Vec::new();
        let mut query_specs = Vec::new();
        for attr in &select.attributes {
            expand_attr(&tables, attr, with_table_name, &mut query_expressions, &mut query_specs)?;
        }
        if query_expressions.is_empty() {
            return Err(DbError::InvalidArgument("empty SELECT list".into()));
        }

        let filter = FilterStmt::create(&tables, &select.conditions)?;

        let group_by = select
            .group_by
            .iter()
            .map(|attr| Ok(Expression::Field(resolve_attr(&tables, attr)?)))
            .collect::<DbResult<Vec<_>>>()?;

        // Without aggregates, grouping only admits projections of group keys.
        if !group_by.is_empty() {
            for expression in &query_expressions {
                if !group_by.contains(expression) {
                    return Err(DbError::InvalidArgument(format!(
                        "'{expression}' must appear in GROUP BY"
                    )));
                }
            }
        }

        let order_by = select
            .order_by
            .iter()
            .map(|item| {
                Ok(OrderByItem {
                    expression: Expression::Field(resolve_attr(&tables, &item.attr)?),
                    direction: if item.asc {
                        SortDirection::Asc
                    } else {
                        SortDirection::Desc
                    },
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            tables: tables.iter().map(|t| t.name().to_string()).collect(),
            query_expressions,
            query_specs,
            filter,
            group_by,
            order_by,
        })
    }
}

/// Expand one SELECT-list attribute into field expressions and specs.
///
/// `*` covers every table in FROM order; `t.*` covers one table; plain
/// attributes resolve through the shared attribute binder.
fn expand_attr(
    tables: &[&Table],
    attr: &RelAttr,
    with_table_name: bool,
    expressions: &mut Vec<Expression>,
    specs: &mut Vec<TupleCellSpec>,
) -> DbResult<()> {
    let mut push_field = |field: FieldRef| {
        let display = if with_table_name {
            format!("{}.{}", field.table_name(), field.field_name())
        } else {
            field.field_name().to_string()
        };
        specs.push(
            TupleCellSpec::new(field.table_name(), field.field_name()).with_alias(&display),
        );
        expressions.push(Expression::Field(field));
    };

    if attr.is_wildcard() {
        match &attr.table {
            None => {
                for table in tables {
                    for field in table.meta().visible_fields() {
                        push_field(FieldRef::new(table.name(), field.clone()));
                    }
                }
            }
            Some(table_name) => {
                let table = tables
                    .iter()
                    .find(|t| t.name() == table_name.as_str())
                    .ok_or_else(|| DbError::SchemaTableNotExist(table_name.clone()))?;
                for field in table.meta().visible_fields() {
                    push_field(FieldRef::new(table.name(), field.clone()));
                }
            }
        }
        return Ok(());
    }

    push_field(resolve_attr(tables, attr)?);
    Ok(())
}
