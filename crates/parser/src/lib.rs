//! SQL text to parsed command.
//!
//! Grammar work is delegated to the `sqlparser` crate; this module maps its
//! generic AST onto the small command set the resolver understands. A few
//! commands that `sqlparser`'s generic dialect does not know (HELP, EXIT,
//! LOAD DATA, `DROP INDEX ... ON t`, SHOW TABLES, DESC) are recognized
//! up front by a keyword scan.

mod ast;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{ArithOp, CompOp};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::{AttrType, Value};

/// Parse one SQL command.
pub fn parse_command(sql: &str) -> DbResult<Command> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(DbError::Parser("empty command".into()));
    }

    if let Some(command) = scan_keyword_command(trimmed)? {
        return Ok(command);
    }

    let dialect = GenericDialect {};
    let mut statements = SqlParser::parse_sql(&dialect, trimmed)
        .map_err(|e| DbError::Parser(format!("syntax error: {e}")))?;
    if statements.len() != 1 {
        return Err(DbError::Parser("expected exactly one statement".into()));
    }
    map_statement(statements.remove(0))
}

/// Commands recognized by leading keywords, outside the SQL grammar.
fn scan_keyword_command(sql: &str) -> DbResult<Option<Command>> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    match words.as_slice() {
        ["help"] => return Ok(Some(Command::Help)),
        ["exit"] | ["quit"] => return Ok(Some(Command::Exit)),
        ["begin"] | ["start", "transaction"] => return Ok(Some(Command::Begin)),
        ["commit"] => return Ok(Some(Command::Commit)),
        ["rollback"] => return Ok(Some(Command::Rollback)),
        ["show", "tables"] => return Ok(Some(Command::ShowTables)),
        ["desc", table] | ["describe", table] => {
            return Ok(Some(Command::DescTable {
                table: table.to_string(),
            }))
        }
        ["drop", "index", index, "on", table] => {
            return Ok(Some(Command::DropIndex {
                index: index.to_string(),
                table: table.to_string(),
            }))
        }
        _ => {}
    }

    if lower.starts_with("load data") {
        return parse_load_data(sql).map(Some);
    }
    Ok(None)
}

/// `LOAD DATA INFILE 'path' INTO TABLE t`
fn parse_load_data(sql: &str) -> DbResult<Command> {
    let lower = sql.to_lowercase();
    let infile = lower
        .find("infile")
        .ok_or_else(|| DbError::Parser("LOAD DATA expects INFILE".into()))?;
    let into = lower
        .find("into table")
        .ok_or_else(|| DbError::Parser("LOAD DATA expects INTO TABLE".into()))?;
    if into <= infile {
        return Err(DbError::Parser("malformed LOAD DATA".into()));
    }

    let file = sql[infile + "infile".len()..into]
        .trim()
        .trim_matches('\'')
        .trim_matches('"')
        .to_string();
    let table = sql[into + "into table".len()..].trim().to_lowercase();
    if file.is_empty() || table.is_empty() || table.contains(' ') {
        return Err(DbError::Parser("malformed LOAD DATA".into()));
    }
    Ok(Command::LoadData { file, table })
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Command> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable { name, columns, .. } => {
            let table = normalize_object_name(&name)?;
            let columns = columns
                .into_iter()
                .map(map_column_def)
                .collect::<DbResult<Vec<_>>>()?;
            Ok(Command::CreateTable(CreateTableSql { table, columns }))
        }
        SqlStatement::Drop {
            object_type, names, ..
        } => match object_type {
            sqlast::ObjectType::Table => Ok(Command::DropTable {
                table: first_name(names)?,
            }),
            other => Err(DbError::Parser(format!(
                "unsupported DROP target: {other:?}"
            ))),
        },
        SqlStatement::CreateIndex {
            name,
            table_name,
            columns,
            ..
        } => {
            let index = name
                .ok_or_else(|| DbError::Parser("index name required".into()))
                .map(|n| normalize_object_name(&n))??;
            let table = normalize_object_name(&table_name)?;
            if columns.len() != 1 {
                return Err(DbError::Parser(
                    "CREATE INDEX takes exactly one column".into(),
                ));
            }
            let column = map_index_column(columns.first())?;
            Ok(Command::CreateIndex(CreateIndexSql {
                index,
                table,
                column,
            }))
        }
        SqlStatement::Insert {
            table_name, source, ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source = source.ok_or_else(|| DbError::Parser("INSERT source missing".into()))?;
            let values = extract_values(*source)?;
            Ok(Command::Insert(InsertSql { table, values }))
        }
        SqlStatement::Query(query) => map_select(*query),
        SqlStatement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let table = table_name_from_with_joins(&table)?;
            if assignments.len() != 1 {
                return Err(DbError::Parser(
                    "UPDATE sets exactly one column".into(),
                ));
            }
            let assign = assignments.into_iter().next().unwrap();
            let field = assign
                .id
                .last()
                .map(normalize_ident)
                .ok_or_else(|| DbError::Parser("invalid assignment target".into()))?;
            let value = map_literal_expr(assign.value)?;
            let conditions = map_conditions(selection)?;
            Ok(Command::Update(UpdateSql {
                table,
                field,
                value,
                conditions,
            }))
        }
        SqlStatement::Delete {
            from, selection, ..
        } => {
            if from.len() != 1 {
                return Err(DbError::Parser("DELETE takes one table".into()));
            }
            let table = table_name_from_with_joins(&from[0])?;
            let conditions = map_conditions(selection)?;
            Ok(Command::Delete(DeleteSql { table, conditions }))
        }
        SqlStatement::Explain { statement, .. } => {
            let inner = map_statement(*statement)?;
            match inner {
                Command::Select(_)
                | Command::Insert(_)
                | Command::Update(_)
                | Command::Delete(_)
                | Command::Calc(_) => Ok(Command::Explain(Box::new(inner))),
                _ => Err(DbError::Parser("EXPLAIN expects a DML statement".into())),
            }
        }
        other => Err(DbError::Parser(format!(
            "unsupported statement: {other}"
        ))),
    }
}

fn map_select(query: sqlast::Query) -> DbResult<Command> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        _ => return Err(DbError::Parser("set operations not supported".into())),
    };

    let sqlast::Select {
        projection,
        from,
        selection,
        group_by,
        ..
    } = *select;

    // A FROM-less select is a pure calculation over literals.
    if from.is_empty() {
        let expressions = projection
            .into_iter()
            .map(|item| match item {
                sqlast::SelectItem::UnnamedExpr(expr) => map_calc_expr(expr),
                other => Err(DbError::Parser(format!(
                    "unsupported select item without FROM: {other}"
                ))),
            })
            .collect::<DbResult<Vec<_>>>()?;
        return Ok(Command::Calc(CalcSql { expressions }));
    }

    let relations = from
        .iter()
        .map(table_name_from_with_joins)
        .collect::<DbResult<Vec<_>>>()?;

    let attributes = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;

    let conditions = map_conditions(selection)?;

    let group_by = match group_by {
        sqlast::GroupByExpr::All => {
            return Err(DbError::Parser("GROUP BY ALL not supported".into()))
        }
        sqlast::GroupByExpr::Expressions(exprs) => exprs
            .into_iter()
            .map(map_attr_expr)
            .collect::<DbResult<Vec<_>>>()?,
    };

    let order_by = query
        .order_by
        .into_iter()
        .map(|o| {
            let attr = map_attr_expr(o.expr)?;
            Ok(OrderBySql {
                attr,
                asc: o.asc.unwrap_or(true),
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    Ok(Command::Select(SelectSql {
        attributes,
        relations,
        conditions,
        group_by,
        order_by,
    }))
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<RelAttr> {
    match item {
        sqlast::SelectItem::Wildcard(_) => Ok(RelAttr {
            table: None,
            name: "*".into(),
        }),
        sqlast::SelectItem::QualifiedWildcard(name, _) => Ok(RelAttr {
            table: Some(normalize_object_name(&name)?),
            name: "*".into(),
        }),
        sqlast::SelectItem::UnnamedExpr(expr) => map_attr_expr(expr),
        sqlast::SelectItem::ExprWithAlias { .. } => {
            Err(DbError::Parser("select aliases not supported".into()))
        }
    }
}

fn map_attr_expr(expr: sqlast::Expr) -> DbResult<RelAttr> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(RelAttr {
            table: None,
            name: normalize_ident(&ident),
        }),
        sqlast::Expr::CompoundIdentifier(parts) => {
            if parts.len() != 2 {
                return Err(DbError::Parser(
                    "attributes qualify as table.column only".into(),
                ));
            }
            Ok(RelAttr {
                table: Some(normalize_ident(&parts[0])),
                name: normalize_ident(&parts[1]),
            })
        }
        other => Err(DbError::Parser(format!("expected an attribute: {other}"))),
    }
}

/// Flatten an AND tree of comparisons into condition atoms.
fn map_conditions(selection: Option<sqlast::Expr>) -> DbResult<Vec<ConditionSql>> {
    let mut conditions = Vec::new();
    if let Some(expr) = selection {
        collect_conditions(expr, &mut conditions)?;
    }
    Ok(conditions)
}

fn collect_conditions(expr: sqlast::Expr, out: &mut Vec<ConditionSql>) -> DbResult<()> {
    match expr {
        sqlast::Expr::BinaryOp {
            left,
            op: sqlast::BinaryOperator::And,
            right,
        } => {
            collect_conditions(*left, out)?;
            collect_conditions(*right, out)?;
            Ok(())
        }
        sqlast::Expr::BinaryOp { left, op, right } => {
            let comp = map_comp_op(&op)?;
            out.push(ConditionSql {
                left: map_cond_operand(*left)?,
                comp,
                right: map_cond_operand(*right)?,
            });
            Ok(())
        }
        sqlast::Expr::Nested(inner) => collect_conditions(*inner, out),
        other => Err(DbError::Parser(format!(
            "unsupported WHERE condition: {other}"
        ))),
    }
}

fn map_cond_operand(expr: sqlast::Expr) -> DbResult<CondOperand> {
    match expr {
        sqlast::Expr::Identifier(_) | sqlast::Expr::CompoundIdentifier(_) => {
            Ok(CondOperand::Attr(map_attr_expr(expr)?))
        }
        other => Ok(CondOperand::Value(map_literal_expr(other)?)),
    }
}

fn map_calc_expr(expr: sqlast::Expr) -> DbResult<CalcAst> {
    match expr {
        sqlast::Expr::BinaryOp { left, op, right } => {
            let op = map_arith_op(&op)?;
            Ok(CalcAst::Arith {
                op,
                left: Box::new(map_calc_expr(*left)?),
                right: Box::new(map_calc_expr(*right)?),
            })
        }
        sqlast::Expr::Nested(inner) => map_calc_expr(*inner),
        other => Ok(CalcAst::Value(map_literal_expr(other)?)),
    }
}

fn map_literal_expr(expr: sqlast::Expr) -> DbResult<Value> {
    match expr {
        sqlast::Expr::Value(value) => map_value(value),
        sqlast::Expr::UnaryOp {
            op: sqlast::UnaryOperator::Minus,
            expr,
        } => match map_literal_expr(*expr)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(DbError::Parser(format!("cannot negate {other}"))),
        },
        other => Err(DbError::Parser(format!("expected a literal: {other}"))),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            if let Ok(parsed) = num.parse::<i32>() {
                return Ok(Value::Int(parsed));
            }
            num.parse::<f32>()
                .map(Value::Float)
                .map_err(|_| DbError::Parser(format!("invalid numeric literal: {num}")))
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => Ok(Value::Chars(s)),
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        other => Err(DbError::Parser(format!("unsupported literal: {other}"))),
    }
}

fn map_comp_op(op: &sqlast::BinaryOperator) -> DbResult<CompOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => CompOp::EqualTo,
        SqlBinary::NotEq => CompOp::NotEqual,
        SqlBinary::Lt => CompOp::LessThan,
        SqlBinary::LtEq => CompOp::LessEqual,
        SqlBinary::Gt => CompOp::GreatThan,
        SqlBinary::GtEq => CompOp::GreatEqual,
        other => {
            return Err(DbError::Parser(format!(
                "unsupported comparison operator: {other}"
            )))
        }
    })
}

fn map_arith_op(op: &sqlast::BinaryOperator) -> DbResult<ArithOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Plus => ArithOp::Add,
        SqlBinary::Minus => ArithOp::Sub,
        SqlBinary::Multiply => ArithOp::Mul,
        SqlBinary::Divide => ArithOp::Div,
        other => {
            return Err(DbError::Parser(format!(
                "unsupported arithmetic operator: {other}"
            )))
        }
    })
}

fn map_column_def(col: sqlast::ColumnDef) -> DbResult<ColumnDefSql> {
    use sqlast::DataType;

    let (attr_type, len) = match &col.data_type {
        DataType::Int(_) | DataType::Integer(_) => (AttrType::Ints, 4),
        DataType::Float(_) | DataType::Real | DataType::Double => (AttrType::Floats, 4),
        DataType::Boolean => (AttrType::Booleans, 1),
        DataType::Char(len) | DataType::Varchar(len) => {
            let n = match len {
                Some(sqlast::CharacterLength::IntegerLength { length, .. }) => *length as usize,
                Some(sqlast::CharacterLength::Max) | None => {
                    return Err(DbError::Parser(format!(
                        "column '{}' needs an explicit CHAR length",
                        col.name.value
                    )))
                }
            };
            (AttrType::Chars, n)
        }
        other => {
            return Err(DbError::Parser(format!(
                "unsupported column type: {other}"
            )))
        }
    };

    Ok(ColumnDefSql {
        name: normalize_ident(&col.name),
        attr_type,
        len,
    })
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Value>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            let mut rows = values.rows.into_iter();
            let row = rows
                .next()
                .ok_or_else(|| DbError::Parser("INSERT requires a VALUES row".into()))?;
            if rows.next().is_some() {
                return Err(DbError::Parser("multi-row INSERT not supported".into()));
            }
            row.into_iter().map(map_literal_expr).collect()
        }
        _ => Err(DbError::Parser("INSERT expects a VALUES list".into())),
    }
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| DbError::Parser("invalid object name".into()))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(DbError::Parser("DROP requires a target".into()));
    }
    normalize_object_name(&names.remove(0))
}

fn table_name_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(DbError::Parser(
            "JOIN syntax not supported; list tables in FROM".into(),
        ));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name),
        _ => Err(DbError::Parser("unsupported table factor".into())),
    }
}

fn map_index_column(column: Option<&sqlast::OrderByExpr>) -> DbResult<String> {
    let column = column.ok_or_else(|| DbError::Parser("index column required".into()))?;
    match &column.expr {
        sqlast::Expr::Identifier(ident) => Ok(normalize_ident(ident)),
        other => Err(DbError::Parser(format!(
            "unsupported index column: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_create_table() {
        let cmd = parse_command("CREATE TABLE t (id INT, name CHAR(8), score FLOAT);").unwrap();
        assert_eq!(
            cmd,
            Command::CreateTable(CreateTableSql {
                table: "t".into(),
                columns: vec![
                    ColumnDefSql { name: "id".into(), attr_type: AttrType::Ints, len: 4 },
                    ColumnDefSql { name: "name".into(), attr_type: AttrType::Chars, len: 8 },
                    ColumnDefSql { name: "score".into(), attr_type: AttrType::Floats, len: 4 },
                ],
            })
        );
    }

    #[test]
    fn parses_select_with_conditions() {
        let cmd = parse_command("SELECT id, name FROM t WHERE id = 2 AND name <> 'x';").unwrap();
        let Command::Select(select) = cmd else {
            panic!("expected select");
        };
        assert_eq!(select.relations, vec!["t".to_string()]);
        assert_eq!(select.attributes.len(), 2);
        assert_eq!(select.conditions.len(), 2);
        assert_eq!(select.conditions[0].comp, CompOp::EqualTo);
        assert_eq!(
            select.conditions[1].right,
            CondOperand::Value(Value::Chars("x".into()))
        );
    }

    #[test]
    fn parses_multi_table_select_with_qualified_attrs() {
        let cmd = parse_command("SELECT a.x, b.y FROM a, b WHERE a.x = b.y;").unwrap();
        let Command::Select(select) = cmd else {
            panic!("expected select");
        };
        assert_eq!(select.relations, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            select.attributes[0],
            RelAttr { table: Some("a".into()), name: "x".into() }
        );
        assert_eq!(
            select.conditions[0].left,
            CondOperand::Attr(RelAttr { table: Some("a".into()), name: "x".into() })
        );
    }

    #[test]
    fn parses_wildcards() {
        let cmd = parse_command("SELECT * FROM t;").unwrap();
        let Command::Select(select) = cmd else {
            panic!("expected select");
        };
        assert!(select.attributes[0].is_wildcard());

        let cmd = parse_command("SELECT t.* FROM t;").unwrap();
        let Command::Select(select) = cmd else {
            panic!("expected select");
        };
        assert_eq!(select.attributes[0].table.as_deref(), Some("t"));
        assert!(select.attributes[0].is_wildcard());
    }

    #[test]
    fn parses_insert_with_negative_and_float_literals() {
        let cmd = parse_command("INSERT INTO t VALUES (-3, 'ab', 1.5);").unwrap();
        assert_eq!(
            cmd,
            Command::Insert(InsertSql {
                table: "t".into(),
                values: vec![
                    Value::Int(-3),
                    Value::Chars("ab".into()),
                    Value::Float(1.5)
                ],
            })
        );
    }

    #[test]
    fn parses_update_single_assignment() {
        let cmd = parse_command("UPDATE t SET name = 'y' WHERE id = 1;").unwrap();
        let Command::Update(update) = cmd else {
            panic!("expected update");
        };
        assert_eq!(update.field, "name");
        assert_eq!(update.value, Value::Chars("y".into()));
        assert_eq!(update.conditions.len(), 1);
    }

    #[test]
    fn parses_delete_without_conditions() {
        let cmd = parse_command("DELETE FROM t;").unwrap();
        assert_eq!(
            cmd,
            Command::Delete(DeleteSql { table: "t".into(), conditions: vec![] })
        );
    }

    #[test]
    fn parses_explain_select() {
        let cmd = parse_command("EXPLAIN SELECT id FROM t WHERE id = 2;").unwrap();
        assert!(matches!(cmd, Command::Explain(inner) if matches!(*inner, Command::Select(_))));
    }

    #[test]
    fn parses_calc_select_without_from() {
        let cmd = parse_command("SELECT 1 + 2 * 3;").unwrap();
        let Command::Calc(calc) = cmd else {
            panic!("expected calc");
        };
        assert_eq!(calc.expressions.len(), 1);
    }

    #[test]
    fn parses_keyword_commands() {
        assert_eq!(parse_command("help").unwrap(), Command::Help);
        assert_eq!(parse_command("EXIT;").unwrap(), Command::Exit);
        assert_eq!(parse_command("begin").unwrap(), Command::Begin);
        assert_eq!(parse_command("COMMIT;").unwrap(), Command::Commit);
        assert_eq!(parse_command("show tables;").unwrap(), Command::ShowTables);
        assert_eq!(
            parse_command("DESC t;").unwrap(),
            Command::DescTable { table: "t".into() }
        );
        assert_eq!(
            parse_command("DROP INDEX idx ON t;").unwrap(),
            Command::DropIndex { index: "idx".into(), table: "t".into() }
        );
    }

    #[test]
    fn parses_load_data() {
        assert_eq!(
            parse_command("LOAD DATA INFILE '/tmp/rows.csv' INTO TABLE t;").unwrap(),
            Command::LoadData { file: "/tmp/rows.csv".into(), table: "t".into() }
        );
    }

    #[test]
    fn parses_create_and_drop_index() {
        assert_eq!(
            parse_command("CREATE INDEX idx ON t (id);").unwrap(),
            Command::CreateIndex(CreateIndexSql {
                index: "idx".into(),
                table: "t".into(),
                column: "id".into(),
            })
        );
        assert_eq!(
            parse_command("DROP TABLE t;").unwrap(),
            Command::DropTable { table: "t".into() }
        );
    }

    #[test]
    fn parses_order_and_group_by() {
        let cmd =
            parse_command("SELECT id FROM t GROUP BY id ORDER BY id DESC;").unwrap();
        let Command::Select(select) = cmd else {
            panic!("expected select");
        };
        assert_eq!(select.group_by.len(), 1);
        assert_eq!(select.order_by.len(), 1);
        assert!(!select.order_by[0].asc);
    }

    #[test]
    fn rejects_or_in_where() {
        // OR parses as a condition operator the flattener does not accept.
        assert!(parse_command("SELECT id FROM t WHERE id = 1 OR id = 2;").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_command("SELEC id FORM t").is_err());
        assert!(parse_command("").is_err());
    }
}
