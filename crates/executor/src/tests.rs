pub mod helpers;

use helpers::{cmp, collect_rows, lit, MockExec, TestDb};

use crate::filter::PredicateExec;
use crate::groupby::HashGroupByExec;
use crate::join::NestedLoopJoinExec;
use crate::project::ProjectExec;
use crate::scan::TableScanExec;
use crate::sort::OrderExec;
use crate::{build_operator, execute_plan, PhysicalOperator};
use expr::{CompOp, Expression, TupleCellSpec};
use pretty_assertions::assert_eq;
use stmt::{OrderByItem, SortDirection};
use types::Value;

fn plan_sql(db: &storage::Db, sql: &str) -> planner::PhysicalPlan {
    let statement = stmt::resolve(db, parser::parse_command(sql).unwrap()).unwrap();
    planner::plan_statement(db, &statement).unwrap()
}

// ------------------------------------------------------------ table scan

#[test]
fn table_scan_filters_with_pushed_predicates() {
    let mut fixture = TestDb::users();
    fixture.insert_user(1, "ada");
    fixture.insert_user(2, "bob");
    fixture.insert_user(3, "cat");

    let predicate = cmp(
        CompOp::GreatThan,
        Expression::Field(fixture.user_field("id")),
        lit(Value::Int(1)),
    );
    let mut scan = TableScanExec::new("users".into(), vec![predicate]);

    let mut ctx = fixture.ctx();
    scan.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut scan, &mut ctx);
    scan.close(&mut ctx).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::Int(2));
    assert_eq!(rows[1][0], Value::Int(3));
}

#[test]
fn table_scan_on_empty_table_is_immediately_exhausted() {
    let mut fixture = TestDb::users();
    let mut scan = TableScanExec::new("users".into(), vec![]);

    let mut ctx = fixture.ctx();
    scan.open(&mut ctx).unwrap();
    assert!(!scan.next(&mut ctx).unwrap());
    scan.close(&mut ctx).unwrap();
}

#[test]
fn scan_schema_names_every_field() {
    let mut fixture = TestDb::users();
    let mut scan = TableScanExec::new("users".into(), vec![]);
    let mut ctx = fixture.ctx();
    scan.open(&mut ctx).unwrap();
    let schema = scan.tuple_schema();
    assert_eq!(schema.cell_num(), 2);
    assert_eq!(schema.cell_at(0), &TupleCellSpec::new("users", "id"));
    scan.close(&mut ctx).unwrap();
}

// ------------------------------------------------------------- predicate

#[test]
fn predicate_keeps_only_true_rows() {
    let mut fixture = TestDb::users();
    let rows = vec![
        vec![Value::Int(1), Value::Int(10)],
        vec![Value::Int(2), Value::Int(20)],
        vec![Value::Int(3), Value::Int(30)],
    ];
    let child = MockExec::new(&[("m", "id"), ("m", "v")], rows);
    let meta = catalog::FieldMeta::new("v", types::AttrType::Ints, 4, 4, true);
    let field = expr::FieldRef::new("m", meta);
    let predicate = cmp(
        CompOp::GreatEqual,
        Expression::Field(field),
        lit(Value::Int(20)),
    );

    let mut filter = PredicateExec::new(predicate, Box::new(child));
    let mut ctx = fixture.ctx();
    filter.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut filter, &mut ctx);
    filter.close(&mut ctx).unwrap();

    assert_eq!(
        rows,
        vec![
            vec![Value::Int(2), Value::Int(20)],
            vec![Value::Int(3), Value::Int(30)],
        ]
    );
}

#[test]
fn predicate_propagates_eval_errors() {
    let mut fixture = TestDb::users();
    let child = MockExec::new(&[("m", "id")], vec![vec![Value::Int(1)]]);
    // Non-boolean predicate expression.
    let mut filter = PredicateExec::new(lit(Value::Int(7)), Box::new(child));

    let mut ctx = fixture.ctx();
    filter.open(&mut ctx).unwrap();
    assert!(filter.next(&mut ctx).is_err());
    filter.close(&mut ctx).unwrap();
}

// ------------------------------------------------------------------ join

#[test]
fn join_is_row_major_with_full_right_rescans() {
    let mut fixture = TestDb::users();
    let left = MockExec::new(
        &[("a", "x")],
        vec![vec![Value::Int(1)], vec![Value::Int(2)]],
    );
    let right = MockExec::new(
        &[("b", "y")],
        vec![vec![Value::Int(10)], vec![Value::Int(20)]],
    );
    let (right_opens, right_closes) = right.counters();

    let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right));
    let mut ctx = fixture.ctx();
    join.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut join, &mut ctx);
    join.close(&mut ctx).unwrap();

    // Cross product in row-major order over the left side.
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::Int(10)],
            vec![Value::Int(1), Value::Int(20)],
            vec![Value::Int(2), Value::Int(10)],
            vec![Value::Int(2), Value::Int(20)],
        ]
    );
    // The right child was re-opened once per exhausted left row.
    assert_eq!(right_opens.get(), right_closes.get());
    assert!(right_opens.get() >= 2);
}

#[test]
fn join_with_empty_side_yields_nothing() {
    let mut fixture = TestDb::users();
    let left = MockExec::new(&[("a", "x")], vec![]);
    let right = MockExec::new(&[("b", "y")], vec![vec![Value::Int(1)]]);
    let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right));

    let mut ctx = fixture.ctx();
    join.open(&mut ctx).unwrap();
    assert!(!join.next(&mut ctx).unwrap());
    join.close(&mut ctx).unwrap();

    let left = MockExec::new(&[("a", "x")], vec![vec![Value::Int(1)]]);
    let right = MockExec::new(&[("b", "y")], vec![]);
    let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right));
    join.open(&mut ctx).unwrap();
    assert!(!join.next(&mut ctx).unwrap());
    join.close(&mut ctx).unwrap();
}

#[test]
fn join_schema_concatenates_children() {
    let left = MockExec::new(&[("a", "x")], vec![]);
    let right = MockExec::new(&[("b", "y")], vec![]);
    let join = NestedLoopJoinExec::new(Box::new(left), Box::new(right));
    let schema = join.tuple_schema();
    assert_eq!(schema.cell_num(), 2);
    assert_eq!(schema.cell_at(0), &TupleCellSpec::new("a", "x"));
    assert_eq!(schema.cell_at(1), &TupleCellSpec::new("b", "y"));
}

// --------------------------------------------------------------- project

#[test]
fn project_exposes_selected_expressions() {
    let mut fixture = TestDb::users();
    fixture.insert_user(5, "eve");

    let scan = TableScanExec::new("users".into(), vec![]);
    let name_field = fixture.user_field("name");
    let mut project = ProjectExec::new(
        vec![Expression::Field(name_field)],
        vec![TupleCellSpec::new("users", "name").with_alias("name")],
        Some(Box::new(scan)),
    );

    let mut ctx = fixture.ctx();
    project.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut project, &mut ctx);
    project.close(&mut ctx).unwrap();

    assert_eq!(rows, vec![vec![Value::Chars("eve".into())]]);
    assert_eq!(project.tuple_schema().cell_at(0).display_name(), "name");
}

#[test]
fn childless_project_produces_no_rows() {
    let mut fixture = TestDb::users();
    let mut project = ProjectExec::new(vec![], vec![], None);
    let mut ctx = fixture.ctx();
    project.open(&mut ctx).unwrap();
    assert!(!project.next(&mut ctx).unwrap());
    project.close(&mut ctx).unwrap();
}

// ------------------------------------------------------------- lifecycle

#[test]
fn close_cascades_exactly_once_per_open() {
    let mut fixture = TestDb::users();
    let child = MockExec::new(&[("m", "id")], vec![vec![Value::Int(1)]]);
    let (opens, closes) = child.counters();

    let mut filter = PredicateExec::new(lit(Value::Bool(true)), Box::new(child));
    let mut ctx = fixture.ctx();
    filter.open(&mut ctx).unwrap();
    while filter.next(&mut ctx).unwrap() {}
    filter.close(&mut ctx).unwrap();

    assert_eq!(opens.get(), 1);
    assert_eq!(closes.get(), 1);
}

// ------------------------------------------------------------------ sort

#[test]
fn order_replays_rows_sorted() {
    let mut fixture = TestDb::users();
    let rows = vec![
        vec![Value::Int(2)],
        vec![Value::Int(1)],
        vec![Value::Int(3)],
    ];
    let child = MockExec::new(&[("m", "id")], rows);
    let meta = catalog::FieldMeta::new("id", types::AttrType::Ints, 0, 4, true);
    let key = Expression::Field(expr::FieldRef::new("m", meta));

    let mut order = OrderExec::new(
        vec![OrderByItem {
            expression: key.clone(),
            direction: SortDirection::Desc,
        }],
        Some(Box::new(child)),
    );

    let mut ctx = fixture.ctx();
    order.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut order, &mut ctx);
    order.close(&mut ctx).unwrap();

    assert_eq!(
        rows,
        vec![vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]]
    );
}

// -------------------------------------------------------------- group by

#[test]
fn hash_group_by_emits_one_row_per_group() {
    let mut fixture = TestDb::users();
    let rows = vec![
        vec![Value::Int(1)],
        vec![Value::Int(2)],
        vec![Value::Int(1)],
        vec![Value::Undefined],
        vec![Value::Undefined],
    ];
    let child = MockExec::new(&[("m", "id")], rows);
    let meta = catalog::FieldMeta::new("id", types::AttrType::Ints, 0, 4, true);
    let key = Expression::Field(expr::FieldRef::new("m", meta));

    let mut group = HashGroupByExec::new(vec![key], Some(Box::new(child)));
    let mut ctx = fixture.ctx();
    group.open(&mut ctx).unwrap();
    let rows = collect_rows(&mut group, &mut ctx);
    group.close(&mut ctx).unwrap();

    // 1, 2 and the Undefined-group, first-seen order.
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Undefined],
        ]
    );
}

// ------------------------------------------------------------ end to end

#[test]
fn execute_plan_runs_a_filtered_select() {
    let mut fixture = TestDb::users();
    fixture.insert_user(1, "ada");
    fixture.insert_user(2, "bob");

    let plan = plan_sql(&fixture.db, "SELECT id FROM users WHERE id = 2");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();

    assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
    assert_eq!(result.schema.cell_at(0).display_name(), "id");
}

#[test]
fn execute_plan_uses_an_index_when_available() {
    let mut fixture = TestDb::users();
    fixture.insert_user(1, "ada");
    fixture.insert_user(2, "bob");
    fixture.db.create_index("users", "idx_id", "id").unwrap();

    let plan = plan_sql(&fixture.db, "SELECT name FROM users WHERE id = 1");
    assert!(matches!(
        &plan,
        planner::PhysicalPlan::Project { child: Some(c), .. }
            if matches!(**c, planner::PhysicalPlan::IndexScan { .. })
    ));

    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Chars("ada".into())]]);
}

#[test]
fn execute_plan_delete_then_scan_finds_nothing() {
    let mut fixture = TestDb::users();
    fixture.insert_user(1, "ada");
    fixture.insert_user(2, "bob");

    let plan = plan_sql(&fixture.db, "DELETE FROM users WHERE id > 0");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();
    assert!(result.rows.is_empty());

    let plan = plan_sql(&fixture.db, "SELECT * FROM users");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();
    assert!(result.rows.is_empty());
}

#[test]
fn execute_plan_update_rewrites_matching_rows() {
    let mut fixture = TestDb::users();
    fixture.insert_user(1, "ada");
    fixture.insert_user(2, "bob");

    let plan = plan_sql(&fixture.db, "UPDATE users SET name = 'zoe' WHERE id = 2");
    let mut ctx = fixture.ctx();
    execute_plan(plan, &mut ctx).unwrap();

    let plan = plan_sql(&fixture.db, "SELECT name FROM users WHERE id = 2");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Chars("zoe".into())]]);
}

#[test]
fn explain_emits_a_single_query_plan_cell() {
    let mut fixture = TestDb::users();
    let plan = plan_sql(&fixture.db, "EXPLAIN SELECT id FROM users WHERE id = 2");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();

    assert_eq!(result.schema.cell_at(0).display_name(), "Query Plan");
    assert_eq!(result.rows.len(), 1);
    let Value::Chars(text) = &result.rows[0][0] else {
        panic!("explain cell must be text");
    };
    assert!(text.starts_with("PROJECT"));
    assert!(text.trim_end().ends_with("TABLE_SCAN(users)"));
    assert!(text.ends_with('\n'));
}

#[test]
fn calc_plan_evaluates_constants() {
    let mut fixture = TestDb::users();
    let plan = plan_sql(&fixture.db, "SELECT 1 + 2, 10 / 4.0");
    let mut ctx = fixture.ctx();
    let result = execute_plan(plan, &mut ctx).unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][0], Value::Int(3));
    assert_eq!(result.rows[0][1], Value::Float(2.5));
}

#[test]
fn division_by_zero_surfaces_from_next() {
    let mut fixture = TestDb::users();
    let plan = plan_sql(&fixture.db, "SELECT 1 / 0");
    let mut ctx = fixture.ctx();
    let err = execute_plan(plan, &mut ctx).unwrap_err();
    assert!(matches!(err, common::DbError::Generic(_)));
}

#[test]
fn string_list_plan_replays_rows() {
    let mut fixture = TestDb::users();
    let plan = planner::PhysicalPlan::StringList {
        schema: vec!["Tables".into()],
        rows: vec![vec!["users".into()], vec!["orders".into()]],
    };
    let operator = build_operator(plan).unwrap();
    let mut operator = operator;
    let mut ctx = fixture.ctx();
    operator.open(&mut ctx).unwrap();
    let rows = collect_rows(operator.as_mut(), &mut ctx);
    operator.close(&mut ctx).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::Chars("users".into()));
}
