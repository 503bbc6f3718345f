//! Builder: physical plan to operator tree.

use common::DbResult;
use planner::{explain_physical, PhysicalPlan};

use crate::{
    calc::{CalcExec, ExplainExec, StringListExec},
    dml::{DeleteExec, InsertExec, UpdateExec},
    filter::PredicateExec,
    groupby::{HashGroupByExec, ScalarGroupByExec},
    join::NestedLoopJoinExec,
    project::ProjectExec,
    scan::{IndexScanExec, TableScanExec},
    sort::OrderExec,
    PhysicalOperator,
};

/// Recursively construct operator instances, wiring up child inputs.
pub fn build_operator(plan: PhysicalPlan) -> DbResult<Box<dyn PhysicalOperator>> {
    Ok(match plan {
        PhysicalPlan::TableScan {
            table, predicates, ..
        } => Box::new(TableScanExec::new(table, predicates)),

        PhysicalPlan::IndexScan {
            table,
            index,
            left,
            right,
            predicates,
        } => Box::new(IndexScanExec::new(table, index, left, right, predicates)),

        PhysicalPlan::Predicate { predicate, child } => {
            Box::new(PredicateExec::new(predicate, build_operator(*child)?))
        }

        PhysicalPlan::Project {
            expressions,
            specs,
            child,
        } => Box::new(ProjectExec::new(expressions, specs, build_slot(child)?)),

        PhysicalPlan::NestedLoopJoin { left, right } => Box::new(NestedLoopJoinExec::new(
            build_operator(*left)?,
            build_operator(*right)?,
        )),

        PhysicalPlan::Delete { table, child } => {
            Box::new(DeleteExec::new(table, build_slot(child)?))
        }

        PhysicalPlan::Update {
            table,
            field,
            value,
            child,
        } => Box::new(UpdateExec::new(table, field, value, build_slot(child)?)),

        PhysicalPlan::Insert { table, values } => Box::new(InsertExec::new(table, values)),

        // Explain renders the plan without building or opening it.
        PhysicalPlan::Explain { child } => Box::new(ExplainExec::new(explain_physical(&child))),

        PhysicalPlan::Calc { expressions } => Box::new(CalcExec::new(expressions)),

        PhysicalPlan::Order { items, child } => {
            Box::new(OrderExec::new(items, build_slot(child)?))
        }

        PhysicalPlan::HashGroupBy { group_exprs, child } => {
            Box::new(HashGroupByExec::new(group_exprs, build_slot(child)?))
        }

        PhysicalPlan::ScalarGroupBy { child } => {
            Box::new(ScalarGroupByExec::new(build_slot(child)?))
        }

        PhysicalPlan::StringList { schema, rows } => Box::new(StringListExec::new(schema, rows)),
    })
}

fn build_slot(
    child: Option<Box<PhysicalPlan>>,
) -> DbResult<Option<Box<dyn PhysicalOperator>>> {
    Ok(match child {
        Some(child) => Some(build_operator(*child)?),
        None => None,
    })
}
