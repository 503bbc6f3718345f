//! Physical plan nodes: lowering the logical tree to executable operators.

use common::DbResult;
use expr::{CompOp, Expression, TupleCellSpec};
use stmt::OrderByItem;
use storage::Db;
use tracing::trace;
use types::Value;

use crate::logical::{LogicalPlan, ReadWriteMode};

/// Inclusive/exclusive key bound for an index scan.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexBound {
    pub value: Value,
    pub inclusive: bool,
}

/// Executor-ready plan tree.
#[derive(Clone, Debug)]
pub enum PhysicalPlan {
    TableScan {
        table: String,
        mode: ReadWriteMode,
        predicates: Vec<Expression>,
    },
    IndexScan {
        table: String,
        index: String,
        left: Option<IndexBound>,
        right: Option<IndexBound>,
        /// Filters the index range does not subsume.
        predicates: Vec<Expression>,
    },
    Predicate {
        predicate: Expression,
        child: Box<PhysicalPlan>,
    },
    Project {
        expressions: Vec<Expression>,
        specs: Vec<TupleCellSpec>,
        child: Option<Box<PhysicalPlan>>,
    },
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
    },
    Delete {
        table: String,
        child: Option<Box<PhysicalPlan>>,
    },
    Update {
        table: String,
        field: String,
        value: Value,
        child: Option<Box<PhysicalPlan>>,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Explain {
        child: Box<PhysicalPlan>,
    },
    Calc {
        expressions: Vec<Expression>,
    },
    Order {
        items: Vec<OrderByItem>,
        child: Option<Box<PhysicalPlan>>,
    },
    HashGroupBy {
        group_exprs: Vec<Expression>,
        child: Option<Box<PhysicalPlan>>,
    },
    ScalarGroupBy {
        child: Option<Box<PhysicalPlan>>,
    },
    /// Materialized string rows, used by utility statements.
    StringList {
        schema: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// Lower a rewritten logical plan, wiring children bottom-up.
pub fn create_physical_plan(db: &Db, logical: LogicalPlan) -> DbResult<PhysicalPlan> {
    match logical {
        LogicalPlan::TableGet {
            table,
            mode,
            predicates,
        } => lower_table_get(db, table, mode, predicates),
        LogicalPlan::Predicate { predicate, child } => Ok(PhysicalPlan::Predicate {
            predicate,
            child: Box::new(create_physical_plan(db, *child)?),
        }),
        LogicalPlan::Projection {
            expressions,
            specs,
            child,
        } => Ok(PhysicalPlan::Project {
            expressions,
            specs,
            child: lower_slot(db, child)?,
        }),
        LogicalPlan::Join { left, right } => Ok(PhysicalPlan::NestedLoopJoin {
            left: Box::new(create_physical_plan(db, *left)?),
            right: Box::new(create_physical_plan(db, *right)?),
        }),
        LogicalPlan::GroupBy { group_exprs, child } => {
            let child = lower_slot(db, child)?;
            if group_exprs.is_empty() {
                Ok(PhysicalPlan::ScalarGroupBy { child })
            } else {
                Ok(PhysicalPlan::HashGroupBy { group_exprs, child })
            }
        }
        LogicalPlan::Order { items, child } => Ok(PhysicalPlan::Order {
            items,
            child: lower_slot(db, child)?,
        }),
        LogicalPlan::Delete { table, child } => Ok(PhysicalPlan::Delete {
            table,
            child: lower_slot(db, child)?,
        }),
        LogicalPlan::Update {
            table,
            field,
            value,
            child,
        } => Ok(PhysicalPlan::Update {
            table,
            field,
            value,
            child: lower_slot(db, child)?,
        }),
        LogicalPlan::Insert { table, values } => Ok(PhysicalPlan::Insert { table, values }),
        LogicalPlan::Explain { child } => Ok(PhysicalPlan::Explain {
            child: Box::new(create_physical_plan(db, *child)?),
        }),
        LogicalPlan::Calc { expressions } => Ok(PhysicalPlan::Calc { expressions }),
    }
}

fn lower_slot(
    db: &Db,
    child: Option<Box<LogicalPlan>>,
) -> DbResult<Option<Box<PhysicalPlan>>> {
    match child {
        Some(child) => Ok(Some(Box::new(create_physical_plan(db, *child)?))),
        None => Ok(None),
    }
}

/// Choose index scan over table scan when a pushed-down predicate gives a
/// key range on an indexed column; everything else stays as a scan filter.
fn lower_table_get(
    db: &Db,
    table: String,
    mode: ReadWriteMode,
    mut predicates: Vec<Expression>,
) -> DbResult<PhysicalPlan> {
    let table_ref = db.find_table(&table)?;

    let mut selected: Option<(usize, String, Option<IndexBound>, Option<IndexBound>)> = None;
    for (position, predicate) in predicates.iter().enumerate() {
        if let Some((field_name, left, right)) = extract_key_range(predicate) {
            if let Some(index_meta) = table_ref.meta().find_index_by_field(&field_name) {
                selected = Some((position, index_meta.name().to_string(), left, right));
                break;
            }
        }
    }

    match selected {
        Some((position, index, left, right)) => {
            // The range subsumes the chosen comparison; the rest stay as
            // residual filters on the scan.
            predicates.remove(position);
            trace!(table, index, "table get lowered to index scan");
            Ok(PhysicalPlan::IndexScan {
                table,
                index,
                left,
                right,
                predicates,
            })
        }
        None => Ok(PhysicalPlan::TableScan {
            table,
            mode,
            predicates,
        }),
    }
}

/// Recognize `field <op> const` (either side) as an index key range.
fn extract_key_range(
    predicate: &Expression,
) -> Option<(String, Option<IndexBound>, Option<IndexBound>)> {
    let Expression::Comparison { op, left, right } = predicate else {
        return None;
    };

    let (field, value, op) = match (left.as_ref(), right.as_ref()) {
        (Expression::Field(field), Expression::Value(value)) => (field, value, *op),
        (Expression::Value(value), Expression::Field(field)) => {
            (field, value, mirror_comp(*op)?)
        }
        _ => return None,
    };

    let bound = |inclusive| {
        Some(IndexBound {
            value: value.clone(),
            inclusive,
        })
    };
    let (range_left, range_right) = match op {
        CompOp::EqualTo => (bound(true), bound(true)),
        CompOp::GreatThan => (bound(false), None),
        CompOp::GreatEqual => (bound(true), None),
        CompOp::LessThan => (None, bound(false)),
        CompOp::LessEqual => (None, bound(true)),
        CompOp::NotEqual | CompOp::NoOp => return None,
    };
    Some((field.field_name().to_string(), range_left, range_right))
}

/// Rewrite `const <op> field` as `field <mirrored op> const`.
fn mirror_comp(op: CompOp) -> Option<CompOp> {
    Some(match op {
        CompOp::EqualTo => CompOp::EqualTo,
        CompOp::NotEqual => CompOp::NotEqual,
        CompOp::LessThan => CompOp::GreatThan,
        CompOp::LessEqual => CompOp::GreatEqual,
        CompOp::GreatThan => CompOp::LessThan,
        CompOp::GreatEqual => CompOp::LessEqual,
        CompOp::NoOp => return None,
    })
}

// ------------------------------------------------------------ explain

impl PhysicalPlan {
    /// Operator name as it appears in explain output.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalPlan::TableScan { .. } => "TABLE_SCAN",
            PhysicalPlan::IndexScan { .. } => "INDEX_SCAN",
            PhysicalPlan::Predicate { .. } => "PREDICATE",
            PhysicalPlan::Project { .. } => "PROJECT",
            PhysicalPlan::NestedLoopJoin { .. } => "NESTED_LOOP_JOIN",
            PhysicalPlan::Delete { .. } => "DELETE",
            PhysicalPlan::Update { .. } => "UPDATE",
            PhysicalPlan::Insert { .. } => "INSERT",
            PhysicalPlan::Explain { .. } => "EXPLAIN",
            PhysicalPlan::Calc { .. } => "CALC",
            PhysicalPlan::Order { .. } => "ORDER",
            PhysicalPlan::HashGroupBy { .. } => "HASH_GROUP_BY",
            PhysicalPlan::ScalarGroupBy { .. } => "SCALAR_GROUP_BY",
            PhysicalPlan::StringList { .. } => "STRING_LIST",
        }
    }

    /// Operator parameter shown in parentheses, if any.
    pub fn param(&self) -> Option<String> {
        match self {
            PhysicalPlan::TableScan { table, .. }
            | PhysicalPlan::Delete { table, .. }
            | PhysicalPlan::Insert { table, .. } => Some(table.clone()),
            PhysicalPlan::Update { table, field, .. } => Some(format!("{table}.{field}")),
            PhysicalPlan::IndexScan { table, index, .. } => {
                Some(format!("{index} ON {table}"))
            }
            _ => None,
        }
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::Predicate { child, .. } | PhysicalPlan::Explain { child } => {
                vec![child]
            }
            PhysicalPlan::NestedLoopJoin { left, right } => vec![left, right],
            PhysicalPlan::Project { child, .. }
            | PhysicalPlan::Delete { child, .. }
            | PhysicalPlan::Update { child, .. }
            | PhysicalPlan::Order { child, .. }
            | PhysicalPlan::HashGroupBy { child, .. }
            | PhysicalPlan::ScalarGroupBy { child } => {
                child.iter().map(|c| c.as_ref()).collect()
            }
            PhysicalPlan::TableScan { .. }
            | PhysicalPlan::IndexScan { .. }
            | PhysicalPlan::Insert { .. }
            | PhysicalPlan::Calc { .. }
            | PhysicalPlan::StringList { .. } => vec![],
        }
    }
}

/// Render a plan as indented explain text, one operator per line.
///
/// The root carries no arrow; each child is indented under its parent with
/// a `-> ` marker. A trailing blank line closes the output.
pub fn explain_physical(plan: &PhysicalPlan) -> String {
    let mut out = String::new();
    print_plan(plan, 0, &mut out);
    out.push('\n');
    out
}

fn print_plan(plan: &PhysicalPlan, depth: usize, out: &mut String) {
    if depth > 0 {
        out.push_str(&"  ".repeat(depth));
        out.push_str("-> ");
    }
    out.push_str(plan.name());
    if let Some(param) = plan.param() {
        out.push('(');
        out.push_str(&param);
        out.push(')');
    }
    out.push('\n');
    for child in plan.children() {
        print_plan(child, depth + 1, out);
    }
}
