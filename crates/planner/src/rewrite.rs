//! Rule-driven logical plan rewriter.
//!
//! Three rules run in order against every node, then the driver recurses
//! into children and repeats the whole pass until a pass reports no change:
//!
//! 1. expression simplification - constant comparisons (and fully-constant
//!    conjunctions) collapse to boolean literals;
//! 2. predicate folding - a trivially-true predicate child is hoisted away,
//!    a trivially-false one drops its subtree;
//! 3. predicate push-down - comparison atoms move off a predicate onto the
//!    scans (or toward the join side) that produce their fields.
//!
//! Each rule strictly shrinks either the constant-expression count or the
//! total distance of predicate atoms from their scans, so the loop reaches a
//! fixed point.

use std::collections::BTreeSet;

use common::DbResult;
use expr::{ConjunctionType, Expression};
use tracing::trace;

use crate::logical::{is_pushable_atom, LogicalPlan};

#[derive(Debug, Default)]
pub struct Rewriter;

impl Rewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite to fixed point.
    pub fn rewrite(&self, mut plan: LogicalPlan) -> DbResult<LogicalPlan> {
        loop {
            let (next, changed) = rewrite_pass(plan)?;
            plan = next;
            if !changed {
                return Ok(plan);
            }
            trace!("rewriter pass made changes, looping");
        }
    }
}

/// One full pass: rules at this node, then recursion into children.
fn rewrite_pass(plan: LogicalPlan) -> DbResult<(LogicalPlan, bool)> {
    let (plan, simplified) = simplify_node_expressions(plan)?;
    let (plan, folded) = fold_trivial_predicate(plan);
    let (plan, pushed) = push_down_predicates(plan);
    let (plan, children_changed) = rewrite_children(plan)?;
    Ok((plan, simplified || folded || pushed || children_changed))
}

// ---------------------------------------------------------------- rule 1

fn simplify_node_expressions(plan: LogicalPlan) -> DbResult<(LogicalPlan, bool)> {
    match plan {
        LogicalPlan::Predicate { predicate, child } => {
            let (predicate, changed) = simplify_expression(predicate);
            Ok((LogicalPlan::Predicate { predicate, child }, changed))
        }
        LogicalPlan::TableGet {
            table,
            mode,
            predicates,
        } => {
            let mut changed = false;
            let predicates = predicates
                .into_iter()
                .map(|p| {
                    let (p, c) = simplify_expression(p);
                    changed |= c;
                    p
                })
                .collect();
            Ok((
                LogicalPlan::TableGet {
                    table,
                    mode,
                    predicates,
                },
                changed,
            ))
        }
        other => Ok((other, false)),
    }
}

/// Collapse constant comparisons and fully-constant conjunctions.
fn simplify_expression(expression: Expression) -> (Expression, bool) {
    match expression {
        Expression::Comparison { .. } => {
            match expression.try_get_value() {
                Ok(value) => (Expression::Value(value), true),
                Err(_) => (expression, false),
            }
        }
        Expression::Conjunction { conj, children } => {
            let mut changed = false;
            let children: Vec<Expression> = children
                .into_iter()
                .map(|c| {
                    let (c, sub) = simplify_expression(c);
                    changed |= sub;
                    c
                })
                .collect();
            let rebuilt = Expression::Conjunction { conj, children };
            match rebuilt.try_get_value() {
                Ok(value) => (Expression::Value(value), true),
                Err(_) => (rebuilt, changed),
            }
        }
        other => (other, false),
    }
}

// ---------------------------------------------------------------- rule 2

/// Hoist `Predicate(true)` children; drop `Predicate(false)` subtrees.
fn fold_trivial_predicate(plan: LogicalPlan) -> (LogicalPlan, bool) {
    fn fold_slot(child: Option<Box<LogicalPlan>>) -> (Option<Box<LogicalPlan>>, bool) {
        match child {
            Some(boxed) => match *boxed {
                LogicalPlan::Predicate {
                    predicate: Expression::Value(value),
                    child: inner,
                } => match value.as_bool() {
                    Some(true) => (Some(inner), true),
                    Some(false) => (None, true),
                    None => (
                        Some(Box::new(LogicalPlan::Predicate {
                            predicate: Expression::Value(value),
                            child: inner,
                        })),
                        false,
                    ),
                },
                other => (Some(Box::new(other)), false),
            },
            None => (None, false),
        }
    }

    match plan {
        LogicalPlan::Projection {
            expressions,
            specs,
            child,
        } => {
            let (child, changed) = fold_slot(child);
            (
                LogicalPlan::Projection {
                    expressions,
                    specs,
                    child,
                },
                changed,
            )
        }
        LogicalPlan::GroupBy { group_exprs, child } => {
            let (child, changed) = fold_slot(child);
            (LogicalPlan::GroupBy { group_exprs, child }, changed)
        }
        LogicalPlan::Order { items, child } => {
            let (child, changed) = fold_slot(child);
            (LogicalPlan::Order { items, child }, changed)
        }
        LogicalPlan::Delete { table, child } => {
            let (child, changed) = fold_slot(child);
            (LogicalPlan::Delete { table, child }, changed)
        }
        LogicalPlan::Update {
            table,
            field,
            value,
            child,
        } => {
            let (child, changed) = fold_slot(child);
            (
                LogicalPlan::Update {
                    table,
                    field,
                    value,
                    child,
                },
                changed,
            )
        }
        // A join keeps a false predicate child; it simply yields no rows on
        // that side at runtime. True predicates still hoist.
        LogicalPlan::Join { left, right } => {
            let (left, lc) = fold_join_side(left);
            let (right, rc) = fold_join_side(right);
            (LogicalPlan::Join { left, right }, lc || rc)
        }
        other => (other, false),
    }
}

fn fold_join_side(side: Box<LogicalPlan>) -> (Box<LogicalPlan>, bool) {
    match *side {
        LogicalPlan::Predicate {
            predicate: Expression::Value(value),
            child,
        } if value.as_bool() == Some(true) => (child, true),
        other => (Box::new(other), false),
    }
}

// ---------------------------------------------------------------- rule 3

/// Move comparison atoms from a predicate into the scans below it.
fn push_down_predicates(plan: LogicalPlan) -> (LogicalPlan, bool) {
    let (predicate, child) = match plan {
        LogicalPlan::Predicate { predicate, child } => (predicate, child),
        other => return (other, false),
    };

    match *child {
        LogicalPlan::TableGet {
            table,
            mode,
            mut predicates,
        } => {
            let (pushable, residual) = split_atoms(predicate, |_| true);
            if pushable.is_empty() {
                return (
                    LogicalPlan::Predicate {
                        predicate: residual,
                        child: Box::new(LogicalPlan::TableGet {
                            table,
                            mode,
                            predicates,
                        }),
                    },
                    false,
                );
            }
            predicates.extend(pushable);
            (
                LogicalPlan::Predicate {
                    predicate: residual,
                    child: Box::new(LogicalPlan::TableGet {
                        table,
                        mode,
                        predicates,
                    }),
                },
                true,
            )
        }
        LogicalPlan::Join { left, right } => {
            let left_tables = subtree_tables(&left);
            let right_tables = subtree_tables(&right);

            let (left_atoms, rest) =
                split_atoms(predicate, |atom| atom_tables(atom).is_subset(&left_tables));
            let (right_atoms, residual) =
                split_atoms(rest, |atom| atom_tables(atom).is_subset(&right_tables));

            let changed = !left_atoms.is_empty() || !right_atoms.is_empty();
            let left = attach_atoms(left, left_atoms);
            let right = attach_atoms(right, right_atoms);
            (
                LogicalPlan::Predicate {
                    predicate: residual,
                    child: Box::new(LogicalPlan::Join { left, right }),
                },
                changed,
            )
        }
        other => (
            LogicalPlan::Predicate {
                predicate,
                child: Box::new(other),
            },
            false,
        ),
    }
}

/// Split a predicate into atoms routed by `route` and the residual.
///
/// Only AND-conjunctions split; an OR stays whole. When every atom routes
/// away, the residual becomes the trivial `true` literal, preserving the
/// tree shape for later folding.
fn split_atoms(
    predicate: Expression,
    route: impl Fn(&Expression) -> bool,
) -> (Vec<Expression>, Expression) {
    let atoms = match predicate {
        Expression::Conjunction {
            conj: ConjunctionType::And,
            children,
        } => children,
        other => vec![other],
    };

    let mut routed = Vec::new();
    let mut kept = Vec::new();
    for atom in atoms {
        if is_pushable_atom(&atom) && route(&atom) {
            routed.push(atom);
        } else {
            kept.push(atom);
        }
    }

    let residual = match kept.len() {
        0 => Expression::Value(types::Value::Bool(true)),
        1 => kept.into_iter().next().unwrap(),
        _ => Expression::Conjunction {
            conj: ConjunctionType::And,
            children: kept,
        },
    };
    (routed, residual)
}

/// Push atoms into a scan directly, or park them in a predicate right above
/// the subtree for the next pass to carry further down.
fn attach_atoms(side: Box<LogicalPlan>, atoms: Vec<Expression>) -> Box<LogicalPlan> {
    if atoms.is_empty() {
        return side;
    }
    match *side {
        LogicalPlan::TableGet {
            table,
            mode,
            mut predicates,
        } => {
            predicates.extend(atoms);
            Box::new(LogicalPlan::TableGet {
                table,
                mode,
                predicates,
            })
        }
        other => {
            let predicate = if atoms.len() == 1 {
                atoms.into_iter().next().unwrap()
            } else {
                Expression::Conjunction {
                    conj: ConjunctionType::And,
                    children: atoms,
                }
            };
            Box::new(LogicalPlan::Predicate {
                predicate,
                child: Box::new(other),
            })
        }
    }
}

/// Table names a comparison's field sides reference.
fn atom_tables(expression: &Expression) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    if let Expression::Comparison { left, right, .. } = expression {
        for side in [left.as_ref(), right.as_ref()] {
            if let Expression::Field(field) = side {
                tables.insert(field.table_name().to_string());
            }
        }
    }
    tables
}

/// Table names produced anywhere under a plan node.
fn subtree_tables(plan: &LogicalPlan) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    collect_tables(plan, &mut tables);
    tables
}

fn collect_tables(plan: &LogicalPlan, out: &mut BTreeSet<String>) {
    match plan {
        LogicalPlan::TableGet { table, .. } => {
            out.insert(table.clone());
        }
        LogicalPlan::Predicate { child, .. } => collect_tables(child, out),
        LogicalPlan::Join { left, right } => {
            collect_tables(left, out);
            collect_tables(right, out);
        }
        LogicalPlan::Projection { child, .. }
        | LogicalPlan::GroupBy { child, .. }
        | LogicalPlan::Order { child, .. }
        | LogicalPlan::Delete { child, .. }
        | LogicalPlan::Update { child, .. } => {
            if let Some(child) = child {
                collect_tables(child, out);
            }
        }
        LogicalPlan::Explain { child } => collect_tables(child, out),
        LogicalPlan::Insert { .. } | LogicalPlan::Calc { .. } => {}
    }
}

// ------------------------------------------------------------- recursion

/// Recurse the pass into every child slot.
fn rewrite_children(plan: LogicalPlan) -> DbResult<(LogicalPlan, bool)> {
    fn recurse_slot(
        child: Option<Box<LogicalPlan>>,
        changed: &mut bool,
    ) -> DbResult<Option<Box<LogicalPlan>>> {
        match child {
            Some(boxed) => {
                let (plan, sub) = rewrite_pass(*boxed)?;
                *changed |= sub;
                Ok(Some(Box::new(plan)))
            }
            None => Ok(None),
        }
    }

    let mut changed = false;
    let plan = match plan {
        LogicalPlan::Predicate { predicate, child } => {
            let (child, sub) = rewrite_pass(*child)?;
            changed |= sub;
            LogicalPlan::Predicate {
                predicate,
                child: Box::new(child),
            }
        }
        LogicalPlan::Join { left, right } => {
            let (left, lc) = rewrite_pass(*left)?;
            let (right, rc) = rewrite_pass(*right)?;
            changed |= lc || rc;
            LogicalPlan::Join {
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        LogicalPlan::Projection {
            expressions,
            specs,
            child,
        } => {
            let child = recurse_slot(child, &mut changed)?;
            LogicalPlan::Projection {
                expressions,
                specs,
                child,
            }
        }
        LogicalPlan::GroupBy { group_exprs, child } => {
            let child = recurse_slot(child, &mut changed)?;
            LogicalPlan::GroupBy { group_exprs, child }
        }
        LogicalPlan::Order { items, child } => {
            let child = recurse_slot(child, &mut changed)?;
            LogicalPlan::Order { items, child }
        }
        LogicalPlan::Delete { table, child } => {
            let child = recurse_slot(child, &mut changed)?;
            LogicalPlan::Delete { table, child }
        }
        LogicalPlan::Update {
            table,
            field,
            value,
            child,
        } => {
            let child = recurse_slot(child, &mut changed)?;
            LogicalPlan::Update {
                table,
                field,
                value,
                child,
            }
        }
        LogicalPlan::Explain { child } => {
            let (child, sub) = rewrite_pass(*child)?;
            changed |= sub;
            LogicalPlan::Explain {
                child: Box::new(child),
            }
        }
        leaf @ (LogicalPlan::TableGet { .. }
        | LogicalPlan::Insert { .. }
        | LogicalPlan::Calc { .. }) => leaf,
    };
    Ok((plan, changed))
}
