//! Logical plan nodes and their construction from statements.

use common::{DbError, DbResult};
use expr::{CompOp, ConjunctionType, Expression, TupleCellSpec};
use stmt::{FilterObj, FilterStmt, OrderByItem, Statement};
use types::{implicit_cast_cost, Value};

/// Access mode a table-get acquires its scanners under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadWriteMode {
    ReadOnly,
    ReadWrite,
}

/// Relational-algebra tree; children are owned exclusively.
///
/// Single-child nodes hold an `Option` child: predicate folding may drop a
/// provably-empty subtree, leaving the parent childless (it then produces no
/// rows).
#[derive(Clone, Debug)]
pub enum LogicalPlan {
    TableGet {
        table: String,
        mode: ReadWriteMode,
        /// Filters pushed down onto the scan; all must hold per record.
        predicates: Vec<Expression>,
    },
    Predicate {
        predicate: Expression,
        child: Box<LogicalPlan>,
    },
    Projection {
        expressions: Vec<Expression>,
        specs: Vec<TupleCellSpec>,
        child: Option<Box<LogicalPlan>>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    GroupBy {
        group_exprs: Vec<Expression>,
        child: Option<Box<LogicalPlan>>,
    },
    Order {
        items: Vec<OrderByItem>,
        child: Option<Box<LogicalPlan>>,
    },
    Delete {
        table: String,
        child: Option<Box<LogicalPlan>>,
    },
    Update {
        table: String,
        field: String,
        value: Value,
        child: Option<Box<LogicalPlan>>,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Explain {
        child: Box<LogicalPlan>,
    },
    Calc {
        expressions: Vec<Expression>,
    },
}

/// Build the logical tree for a plannable statement.
///
/// Utility statements (SHOW TABLES, HELP, transaction control, DDL) never
/// reach the planner; handing one in is a planner-side `Unimplemented`.
pub fn create_logical_plan(statement: &Statement) -> DbResult<LogicalPlan> {
    match statement {
        Statement::Select(select) => create_select_plan(select),
        Statement::Delete(delete) => {
            let scan = LogicalPlan::TableGet {
                table: delete.table.clone(),
                mode: ReadWriteMode::ReadWrite,
                predicates: Vec::new(),
            };
            let child = wrap_with_filter(scan, &delete.filter)?;
            Ok(LogicalPlan::Delete {
                table: delete.table.clone(),
                child: Some(Box::new(child)),
            })
        }
        Statement::Update(update) => {
            let scan = LogicalPlan::TableGet {
                table: update.table.clone(),
                mode: ReadWriteMode::ReadWrite,
                predicates: Vec::new(),
            };
            let child = wrap_with_filter(scan, &update.filter)?;
            Ok(LogicalPlan::Update {
                table: update.table.clone(),
                field: update.field.clone(),
                value: update.value.clone(),
                child: Some(Box::new(child)),
            })
        }
        Statement::Insert(insert) => Ok(LogicalPlan::Insert {
            table: insert.table.clone(),
            values: insert.values.clone(),
        }),
        Statement::Explain(inner) => Ok(LogicalPlan::Explain {
            child: Box::new(create_logical_plan(inner)?),
        }),
        Statement::Calc(calc) => Ok(LogicalPlan::Calc {
            expressions: calc.expressions.clone(),
        }),
        other => Err(DbError::Unimplemented(format!(
            "no logical plan for {other:?}"
        ))),
    }
}

/// SELECT shape: left-deep join chain, predicate above it, optional
/// group-by, projection on top, optional order above the projection.
fn create_select_plan(select: &stmt::SelectStmt) -> DbResult<LogicalPlan> {
    let mut table_oper: Option<LogicalPlan> = None;
    for table in &select.tables {
        let scan = LogicalPlan::TableGet {
            table: table.clone(),
            mode: ReadWriteMode::ReadOnly,
            predicates: Vec::new(),
        };
        table_oper = Some(match table_oper {
            None => scan,
            Some(left) => LogicalPlan::Join {
                left: Box::new(left),
                right: Box::new(scan),
            },
        });
    }
    let table_oper =
        table_oper.ok_or_else(|| DbError::InvalidArgument("empty FROM list".into()))?;

    let mut plan = wrap_with_filter(table_oper, &select.filter)?;

    if !select.group_by.is_empty() {
        plan = LogicalPlan::GroupBy {
            group_exprs: select.group_by.clone(),
            child: Some(Box::new(plan)),
        };
    }

    plan = LogicalPlan::Projection {
        expressions: select.query_expressions.clone(),
        specs: select.query_specs.clone(),
        child: Some(Box::new(plan)),
    };

    if !select.order_by.is_empty() {
        plan = LogicalPlan::Order {
            items: select.order_by.clone(),
            child: Some(Box::new(plan)),
        };
    }

    Ok(plan)
}

/// Wrap `child` with a predicate built from the filter, if any.
fn wrap_with_filter(child: LogicalPlan, filter: &FilterStmt) -> DbResult<LogicalPlan> {
    let comparisons = filter
        .units()
        .iter()
        .map(comparison_from_unit)
        .collect::<DbResult<Vec<_>>>()?;
    if comparisons.is_empty() {
        return Ok(child);
    }
    Ok(LogicalPlan::Predicate {
        predicate: Expression::Conjunction {
            conj: ConjunctionType::And,
            children: comparisons,
        },
        child: Box::new(child),
    })
}

/// Build one comparison, inserting the cheaper implicit cast when the two
/// sides disagree on kind. A cast landing on a constant folds immediately.
fn comparison_from_unit(unit: &stmt::FilterUnit) -> DbResult<Expression> {
    let left = expression_from_obj(&unit.left);
    let right = expression_from_obj(&unit.right);

    let (left, right) = insert_implicit_cast(left, right)?;
    Ok(Expression::Comparison {
        op: unit.comp,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn expression_from_obj(obj: &FilterObj) -> Expression {
    match obj {
        FilterObj::Attr(field) => Expression::Field(field.clone()),
        FilterObj::Value(value) => Expression::Value(value.clone()),
    }
}

/// Pick the cheaper promotion side; both-infinite means the comparison can
/// never be evaluated and the statement is unsupported.
pub(crate) fn insert_implicit_cast(
    left: Expression,
    right: Expression,
) -> DbResult<(Expression, Expression)> {
    let left_type = left.value_type();
    let right_type = right.value_type();
    if left_type == right_type {
        return Ok((left, right));
    }

    let left_to_right = implicit_cast_cost(left_type, right_type);
    let right_to_left = implicit_cast_cost(right_type, left_type);
    if let Some(lr) = left_to_right {
        if right_to_left.map_or(true, |rl| lr <= rl) {
            return Ok((cast_side(left, right_type)?, right));
        }
    }
    if right_to_left.is_some() {
        return Ok((left, cast_side(right, left_type)?));
    }
    Err(DbError::Unsupported(format!(
        "cannot compare {left_type} with {right_type}"
    )))
}

fn cast_side(side: Expression, target: types::AttrType) -> DbResult<Expression> {
    let cast = Expression::Cast {
        child: Box::new(side),
        target,
    };
    // Constant casts fold to plain literals right away.
    match cast.try_get_value() {
        Ok(value) => Ok(Expression::Value(value)),
        Err(_) => Ok(cast),
    }
}

/// True iff a comparison can ride on a scan: a real comparison operator and
/// both sides plain fields or constants (at least one field).
pub fn is_pushable_atom(expression: &Expression) -> bool {
    let Expression::Comparison { op, left, right } = expression else {
        return false;
    };
    if *op >= CompOp::NoOp {
        return false;
    }
    let plain = |e: &Expression| matches!(e, Expression::Field(_) | Expression::Value(_));
    let has_field = matches!(**left, Expression::Field(_))
        || matches!(**right, Expression::Field(_));
    has_field && plain(left.as_ref()) && plain(right.as_ref())
}
