use expr::{ArithOp, CompOp};
use types::{AttrType, Value};

/// A (possibly qualified) attribute reference as written in the SQL text.
///
/// `name == "*"` stands for a wildcard; with a table it means `t.*`.
#[derive(Clone, Debug, PartialEq)]
pub struct RelAttr {
    pub table: Option<String>,
    pub name: String,
}

impl RelAttr {
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

/// One side of a WHERE condition.
#[derive(Clone, Debug, PartialEq)]
pub enum CondOperand {
    Attr(RelAttr),
    Value(Value),
}

/// A single comparison; the WHERE clause is an AND-list of these.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionSql {
    pub left: CondOperand,
    pub comp: CompOp,
    pub right: CondOperand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBySql {
    pub attr: RelAttr,
    pub asc: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectSql {
    pub attributes: Vec<RelAttr>,
    pub relations: Vec<String>,
    pub conditions: Vec<ConditionSql>,
    pub group_by: Vec<RelAttr>,
    pub order_by: Vec<OrderBySql>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertSql {
    pub table: String,
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateSql {
    pub table: String,
    pub field: String,
    pub value: Value,
    pub conditions: Vec<ConditionSql>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteSql {
    pub table: String,
    pub conditions: Vec<ConditionSql>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDefSql {
    pub name: String,
    pub attr_type: AttrType,
    pub len: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTableSql {
    pub table: String,
    pub columns: Vec<ColumnDefSql>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateIndexSql {
    pub index: String,
    pub table: String,
    pub column: String,
}

/// Pure (field-free) expression tree, used by CALC-style selects.
#[derive(Clone, Debug, PartialEq)]
pub enum CalcAst {
    Value(Value),
    Arith {
        op: ArithOp,
        left: Box<CalcAst>,
        right: Box<CalcAst>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalcSql {
    pub expressions: Vec<CalcAst>,
}

/// One parsed command, ready for resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Select(SelectSql),
    Insert(InsertSql),
    Update(UpdateSql),
    Delete(DeleteSql),
    CreateTable(CreateTableSql),
    CreateIndex(CreateIndexSql),
    DropTable { table: String },
    DropIndex { index: String, table: String },
    ShowTables,
    DescTable { table: String },
    Help,
    Exit,
    Begin,
    Commit,
    Rollback,
    LoadData { file: String, table: String },
    Explain(Box<Command>),
    Calc(CalcSql),
}
