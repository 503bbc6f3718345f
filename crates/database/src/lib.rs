//! Session facade: one SQL string in, one result out.
//!
//! [`Database`] owns the table directory and the session transaction and
//! drives the whole pipeline: parse, resolve, plan, rewrite, lower,
//! execute. Utility statements (SHOW TABLES, DESC, HELP) run as string
//! lists; DDL goes straight to the storage layer outside the executor.
//!
//! Transaction discipline: in auto-commit mode every statement commits on
//! success and rolls back on failure; after BEGIN the session controls the
//! transaction with COMMIT/ROLLBACK and a failed statement leaves it open.
//!
//! # Example
//!
//! ```no_run
//! use common::Config;
//! use database::Database;
//!
//! let mut db = Database::open(Config::default()).unwrap();
//! db.execute("CREATE TABLE t (id INT, name CHAR(8))").unwrap();
//! db.execute("INSERT INTO t VALUES (1, 'ada')").unwrap();
//! let result = db.execute("SELECT * FROM t").unwrap();
//! println!("{}", result.render(" | "));
//! ```

use common::{Config, DbError, DbResult};
use executor::{execute_plan, ExecutionContext};
use planner::PhysicalPlan;
use stmt::Statement;
use storage::{Db, Trx};
use tracing::debug;
use types::{AttrType, Value};

/// Result of one executed statement: a rectangle of values and/or a status
/// message.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub message: Option<String>,
}

impl SqlResult {
    fn ok() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            message: Some("SUCCESS".into()),
        }
    }

    fn with_message(message: String) -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            message: Some(message),
        }
    }

    /// Render as text: a header row, data rows, then the status message,
    /// cells separated by `delimiter`.
    pub fn render(&self, delimiter: &str) -> String {
        let mut out = String::new();
        if !self.headers.is_empty() {
            out.push_str(&self.headers.join(delimiter));
            out.push('\n');
        }
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&cells.join(delimiter));
            out.push('\n');
        }
        if let Some(message) = &self.message {
            out.push_str(message);
            out.push('\n');
        }
        out
    }
}

/// One database instance bound to a data directory, with its session
/// transaction state.
pub struct Database {
    config: Config,
    db: Db,
    trx: Trx,
    in_explicit_trx: bool,
}

impl Database {
    pub fn open(config: Config) -> DbResult<Self> {
        let db = Db::open(&config.data_dir)?;
        Ok(Self {
            config,
            db,
            trx: Trx::new(),
            in_explicit_trx: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one SQL command.
    ///
    /// The statement fails as a whole: on error in auto-commit mode the
    /// transaction is rolled back; inside an explicit transaction the error
    /// is surfaced and the transaction stays open for the session.
    pub fn execute(&mut self, sql: &str) -> DbResult<SqlResult> {
        debug!(sql, "execute");
        let outcome = self.execute_inner(sql);
        match (&outcome, self.in_explicit_trx) {
            (Ok(_), false) => self.trx.commit(),
            (Err(_), false) => {
                if let Err(rollback_err) = self.trx.rollback(&self.db) {
                    return Err(rollback_err);
                }
            }
            _ => {}
        }
        outcome
    }

    fn execute_inner(&mut self, sql: &str) -> DbResult<SqlResult> {
        let command = parser::parse_command(sql)?;
        let statement = stmt::resolve(&self.db, command)?;

        match statement {
            Statement::CreateTable(create) => {
                self.db.create_table(&create.table, create.columns)?;
                Ok(SqlResult::ok())
            }
            Statement::DropTable { table } => {
                self.db.drop_table(&table)?;
                Ok(SqlResult::ok())
            }
            Statement::CreateIndex(create) => {
                self.db
                    .create_index(&create.table, &create.index, &create.column)?;
                Ok(SqlResult::ok())
            }
            Statement::DropIndex { index, table } => {
                self.db.drop_index(&table, &index)?;
                Ok(SqlResult::ok())
            }
            Statement::ShowTables => self.run_string_list(show_tables_plan(&self.db)),
            Statement::DescTable { table } => {
                let plan = desc_table_plan(&self.db, &table)?;
                self.run_string_list(plan)
            }
            Statement::Help => self.run_string_list(help_plan()),
            Statement::Exit => Ok(SqlResult::with_message("bye".into())),
            Statement::Begin => {
                self.in_explicit_trx = true;
                Ok(SqlResult::ok())
            }
            Statement::Commit => {
                self.trx.commit();
                self.in_explicit_trx = false;
                Ok(SqlResult::ok())
            }
            Statement::Rollback => {
                self.trx.rollback(&self.db)?;
                self.in_explicit_trx = false;
                Ok(SqlResult::ok())
            }
            Statement::LoadData(load) => self.load_data(&load.file, &load.table),
            other => {
                let plan = planner::plan_statement(&self.db, &other)?;
                let produces_rows = matches!(
                    other,
                    Statement::Select(_) | Statement::Calc(_) | Statement::Explain(_)
                );
                let mut ctx = ExecutionContext::new(&self.db, &mut self.trx);
                let result = execute_plan(plan, &mut ctx)?;
                if produces_rows {
                    Ok(SqlResult {
                        headers: result
                            .schema
                            .cells()
                            .iter()
                            .map(|spec| spec.display_name())
                            .collect(),
                        rows: result.rows,
                        message: None,
                    })
                } else {
                    Ok(SqlResult::ok())
                }
            }
        }
    }

    fn run_string_list(&mut self, plan: PhysicalPlan) -> DbResult<SqlResult> {
        let mut ctx = ExecutionContext::new(&self.db, &mut self.trx);
        let result = execute_plan(plan, &mut ctx)?;
        Ok(SqlResult {
            headers: result
                .schema
                .cells()
                .iter()
                .map(|spec| spec.display_name())
                .collect(),
            rows: result.rows,
            message: None,
        })
    }

    /// Bulk-load a delimited file, one row per line, fields separated by
    /// `|`. Every row goes through the session transaction.
    fn load_data(&mut self, file: &str, table_name: &str) -> DbResult<SqlResult> {
        let content = std::fs::read_to_string(file)
            .map_err(|err| DbError::InvalidArgument(format!("cannot read '{file}': {err}")))?;
        let table = self.db.find_table(table_name)?;
        let fields: Vec<_> = table.meta().visible_fields().cloned().collect();

        let mut inserted = 0usize;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split('|').map(str::trim).collect();
            if cells.len() != fields.len() {
                return Err(DbError::InvalidArgument(format!(
                    "line {}: expected {} fields, got {}",
                    line_no + 1,
                    fields.len(),
                    cells.len()
                )));
            }
            let values = cells
                .iter()
                .zip(&fields)
                .map(|(cell, field)| parse_field_value(cell, field.attr_type(), line_no + 1))
                .collect::<DbResult<Vec<_>>>()?;
            let image = table.make_record(&values)?;
            self.trx.insert_record(table, image)?;
            inserted += 1;
        }
        Ok(SqlResult::with_message(format!("{inserted} rows loaded")))
    }
}

fn parse_field_value(cell: &str, attr_type: AttrType, line_no: usize) -> DbResult<Value> {
    match attr_type {
        AttrType::Ints => cell
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|_| DbError::InvalidArgument(format!("line {line_no}: bad int '{cell}'"))),
        AttrType::Floats => cell
            .parse::<f32>()
            .map(Value::Float)
            .map_err(|_| DbError::InvalidArgument(format!("line {line_no}: bad float '{cell}'"))),
        AttrType::Booleans => match cell.to_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(DbError::InvalidArgument(format!(
                "line {line_no}: bad bool '{cell}'"
            ))),
        },
        AttrType::Chars => Ok(Value::Chars(cell.to_string())),
        AttrType::Undefined => Err(DbError::Internal("undefined field kind".into())),
    }
}

fn show_tables_plan(db: &Db) -> PhysicalPlan {
    PhysicalPlan::StringList {
        schema: vec!["Tables".into()],
        rows: db
            .all_tables()
            .into_iter()
            .map(|name| vec![name.to_string()])
            .collect(),
    }
}

fn desc_table_plan(db: &Db, table: &str) -> DbResult<PhysicalPlan> {
    let meta = db.find_table(table)?.meta();
    let rows = meta
        .visible_fields()
        .map(|field| {
            vec![
                field.name().to_string(),
                field.attr_type().to_string(),
                field.len().to_string(),
            ]
        })
        .collect();
    Ok(PhysicalPlan::StringList {
        schema: vec!["Field".into(), "Type".into(), "Length".into()],
        rows,
    })
}

fn help_plan() -> PhysicalPlan {
    let commands = [
        "show tables;",
        "desc `table name`;",
        "create table `table name` (`column name` `column type`, ...);",
        "create index `index name` on `table` (`column`);",
        "insert into `table` values(`value1`, `value2`);",
        "update `table` set `column` = `value` [where `condition`];",
        "delete from `table` [where `condition`];",
        "select [ * | `columns` ] from `table`;",
        "explain `statement`;",
        "begin; commit; rollback;",
        "load data infile `file path` into table `table`;",
        "help;",
        "exit;",
    ];
    PhysicalPlan::StringList {
        schema: vec!["Commands".into()],
        rows: commands.iter().map(|c| vec![c.to_string()]).collect(),
    }
}
