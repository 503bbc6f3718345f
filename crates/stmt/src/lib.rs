//! Statement IR: parsed commands bound to catalog objects.
//!
//! The resolver turns a [`parser::Command`] into a typed [`Statement`]
//! against a live [`storage::Db`]. Name binding, `*` expansion and
//! value/field assignability checks happen here; anything that fails leaves
//! no partial statement behind.

mod filter;
mod select;

pub use filter::{FilterObj, FilterStmt, FilterUnit};
pub use select::{OrderByItem, SelectStmt, SortDirection};

use catalog::Column;
use common::{DbError, DbResult};
use expr::Expression;
use parser::{CalcAst, Command};
use storage::Db;
use types::Value;

#[derive(Clone, Debug)]
pub struct InsertStmt {
    pub table: String,
    pub values: Vec<Value>,
}

#[derive(Clone, Debug)]
pub struct UpdateStmt {
    pub table: String,
    pub field: String,
    pub value: Value,
    pub filter: FilterStmt,
}

#[derive(Clone, Debug)]
pub struct DeleteStmt {
    pub table: String,
    pub filter: FilterStmt,
}

#[derive(Clone, Debug)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<Column>,
}

#[derive(Clone, Debug)]
pub struct CreateIndexStmt {
    pub index: String,
    pub table: String,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct CalcStmt {
    pub expressions: Vec<Expression>,
}

#[derive(Clone, Debug)]
pub struct LoadDataStmt {
    pub file: String,
    pub table: String,
}

/// One resolved statement, ready for planning or direct execution.
#[derive(Clone, Debug)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Explain(Box<Statement>),
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
    DropTable { table: String },
    DropIndex { index: String, table: String },
    ShowTables,
    DescTable { table: String },
    Help,
    Exit,
    Begin,
    Commit,
    Rollback,
    LoadData(LoadDataStmt),
    Calc(CalcStmt),
}

/// Resolve a parsed command against the database catalog.
pub fn resolve(db: &Db, command: Command) -> DbResult<Statement> {
    match command {
        Command::Select(select) => Ok(Statement::Select(SelectStmt::create(db, &select)?)),
        Command::Insert(insert) => {
            let table = db.find_table(&insert.table)?;
            // Surface arity/kind problems at bind time; encoding re-checks later.
            table.make_record(&insert.values)?;
            Ok(Statement::Insert(InsertStmt {
                table: table.name().to_string(),
                values: insert.values,
            }))
        }
        Command::Update(update) => {
            let table = db.find_table(&update.table)?;
            let field = table
                .meta()
                .field(&update.field)
                .ok_or_else(|| {
                    DbError::SchemaFieldMissing(format!("{}.{}", update.table, update.field))
                })?;
            if update.value.cast_to(field.attr_type()).is_none() {
                return Err(DbError::InvalidArgument(format!(
                    "value '{}' is not assignable to {}.{}",
                    update.value,
                    update.table,
                    update.field
                )));
            }
            let filter = FilterStmt::create(&[table], &update.conditions)?;
            Ok(Statement::Update(UpdateStmt {
                table: table.name().to_string(),
                field: field.name().to_string(),
                value: update.value,
                filter,
            }))
        }
        Command::Delete(delete) => {
            let table = db.find_table(&delete.table)?;
            let filter = FilterStmt::create(&[table], &delete.conditions)?;
            Ok(Statement::Delete(DeleteStmt {
                table: table.name().to_string(),
                filter,
            }))
        }
        Command::Explain(inner) => Ok(Statement::Explain(Box::new(resolve(db, *inner)?))),
        Command::CreateTable(create) => {
            let columns = create
                .columns
                .iter()
                .map(|c| Column::new(&c.name, c.attr_type, c.len))
                .collect();
            Ok(Statement::CreateTable(CreateTableStmt {
                table: create.table,
                columns,
            }))
        }
        Command::CreateIndex(create) => {
            let table = db.find_table(&create.table)?;
            if table.meta().field(&create.column).is_none() {
                return Err(DbError::SchemaFieldMissing(format!(
                    "{}.{}",
                    create.table, create.column
                )));
            }
            Ok(Statement::CreateIndex(CreateIndexStmt {
                index: create.index,
                table: create.table,
                column: create.column,
            }))
        }
        Command::DropTable { table } => {
            db.find_table(&table)?;
            Ok(Statement::DropTable { table })
        }
        Command::DropIndex { index, table } => {
            let t = db.find_table(&table)?;
            if t.meta().index(&index).is_none() {
                return Err(DbError::NotFound(format!("index '{index}' on '{table}'")));
            }
            Ok(Statement::DropIndex { index, table })
        }
        Command::ShowTables => Ok(Statement::ShowTables),
        Command::DescTable { table } => {
            db.find_table(&table)?;
            Ok(Statement::DescTable { table })
        }
        Command::Help => Ok(Statement::Help),
        Command::Exit => Ok(Statement::Exit),
        Command::Begin => Ok(Statement::Begin),
        Command::Commit => Ok(Statement::Commit),
        Command::Rollback => Ok(Statement::Rollback),
        Command::LoadData { file, table } => {
            db.find_table(&table)?;
            Ok(Statement::LoadData(LoadDataStmt { file, table }))
        }
        Command::Calc(calc) => {
            let expressions = calc
                .expressions
                .iter()
                .map(calc_to_expression)
                .collect::<DbResult<Vec<_>>>()?;
            Ok(Statement::Calc(CalcStmt { expressions }))
        }
    }
}

fn calc_to_expression(ast: &CalcAst) -> DbResult<Expression> {
    match ast {
        CalcAst::Value(value) => Ok(Expression::Value(value.clone())),
        CalcAst::Arith { op, left, right } => Ok(Expression::Arithmetic {
            op: *op,
            left: Box::new(calc_to_expression(left)?),
            right: Box::new(calc_to_expression(right)?),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse_command;
    use pretty_assertions::assert_eq;
    use types::AttrType;

    fn test_db(dir: &std::path::Path) -> Db {
        let mut db = Db::open(dir).unwrap();
        db.create_table(
            "t",
            vec![
                Column::new("id", AttrType::Ints, 4),
                Column::new("name", AttrType::Chars, 8),
            ],
        )
        .unwrap();
        db.create_table(
            "orders",
            vec![
                Column::new("id", AttrType::Ints, 4),
                Column::new("total", AttrType::Floats, 4),
            ],
        )
        .unwrap();
        db
    }

    fn resolve_sql(db: &Db, sql: &str) -> DbResult<Statement> {
        resolve(db, parse_command(sql).unwrap())
    }

    #[test]
    fn select_star_expands_in_from_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "SELECT * FROM t").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.query_expressions.len(), 2);
        assert_eq!(select.query_specs[0].display_name(), "id");
        assert_eq!(select.query_specs[1].display_name(), "name");
    }

    #[test]
    fn multi_table_headers_carry_table_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "SELECT t.id, orders.total FROM t, orders").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.query_specs[0].display_name(), "t.id");
        assert_eq!(select.query_specs[1].display_name(), "orders.total");
    }

    #[test]
    fn unknown_table_and_field_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        assert!(matches!(
            resolve_sql(&db, "SELECT * FROM missing"),
            Err(DbError::SchemaTableNotExist(_))
        ));
        assert!(matches!(
            resolve_sql(&db, "SELECT nope FROM t"),
            Err(DbError::SchemaFieldMissing(_))
        ));
        assert!(matches!(
            resolve_sql(&db, "SELECT t.nope FROM t"),
            Err(DbError::SchemaFieldMissing(_))
        ));
    }

    #[test]
    fn ambiguous_unqualified_attr_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        // Both tables have an `id` column.
        assert!(matches!(
            resolve_sql(&db, "SELECT id FROM t, orders"),
            Err(DbError::SchemaFieldMissing(_))
        ));
    }

    #[test]
    fn insert_arity_and_kinds_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        assert!(resolve_sql(&db, "INSERT INTO t VALUES (1, 'ab')").is_ok());
        assert!(resolve_sql(&db, "INSERT INTO t VALUES (1)").is_err());
        assert!(resolve_sql(&db, "INSERT INTO t VALUES ('x', 'ab')").is_err());
        // Int widens into the float column.
        assert!(resolve_sql(&db, "INSERT INTO orders VALUES (1, 2)").is_ok());
    }

    #[test]
    fn update_resolves_single_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "UPDATE t SET name = 'x' WHERE id = 1").unwrap();
        let Statement::Update(update) = stmt else {
            panic!("expected update");
        };
        assert_eq!(update.field, "name");
        assert_eq!(update.filter.units().len(), 1);

        assert!(resolve_sql(&db, "UPDATE t SET nope = 1").is_err());
        assert!(resolve_sql(&db, "UPDATE t SET id = 'text'").is_err());
    }

    #[test]
    fn delete_filter_binds_against_the_target_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "DELETE FROM t WHERE id > 0").unwrap();
        let Statement::Delete(delete) = stmt else {
            panic!("expected delete");
        };
        assert_eq!(delete.filter.units().len(), 1);

        assert!(resolve_sql(&db, "DELETE FROM t WHERE total > 0").is_err());
    }

    #[test]
    fn group_by_requires_projected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        assert!(resolve_sql(&db, "SELECT id FROM t GROUP BY id").is_ok());
        assert!(matches!(
            resolve_sql(&db, "SELECT name FROM t GROUP BY id"),
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn calc_resolves_to_pure_expressions() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "SELECT 1 + 2").unwrap();
        let Statement::Calc(calc) = stmt else {
            panic!("expected calc");
        };
        assert_eq!(
            calc.expressions[0].try_get_value().unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn explain_wraps_the_inner_statement() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(dir.path());

        let stmt = resolve_sql(&db, "EXPLAIN SELECT * FROM t").unwrap();
        assert!(matches!(stmt, Statement::Explain(inner) if matches!(*inner, Statement::Select(_))));
    }
}
