//! Expression trees and their evaluation.
//!
//! Any SQL element that produces a value is an [`Expression`]: reading a
//! field out of a tuple, a literal, an implicit cast, a comparison, a
//! conjunction of comparisons, or an arithmetic computation. Values are
//! usually only computable once an operator supplies a concrete tuple;
//! constant subtrees can be evaluated early through
//! [`Expression::try_get_value`], which the rewriter leans on for folding.

mod tuple;

pub use tuple::{
    JoinedTuple, ProjectTuple, RowTuple, Tuple, TupleCellSpec, TupleSchema, ValueListTuple,
};

use catalog::FieldMeta;
use common::{DbError, DbResult};
use std::fmt;
use types::{AttrType, Value};

/// Comparison operators, in the grammar's order.
///
/// Everything below `NoOp` is a plain binary comparison the scan layer can
/// take as a pushed-down predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum CompOp {
    EqualTo,
    LessEqual,
    NotEqual,
    LessThan,
    GreatEqual,
    GreatThan,
    NoOp,
}

impl CompOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompOp::EqualTo => "=",
            CompOp::LessEqual => "<=",
            CompOp::NotEqual => "<>",
            CompOp::LessThan => "<",
            CompOp::GreatEqual => ">=",
            CompOp::GreatThan => ">",
            CompOp::NoOp => "?",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConjunctionType {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// A bound reference to one field of one table.
///
/// The field meta is copied out of the catalog snapshot the statement was
/// resolved against, so the reference stays valid for the statement's
/// lifetime without borrowing the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    table_name: String,
    meta: FieldMeta,
}

impl FieldRef {
    pub fn new(table_name: &str, meta: FieldMeta) -> Self {
        Self {
            table_name: table_name.to_string(),
            meta,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn field_name(&self) -> &str {
        self.meta.name()
    }

    pub fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    pub fn attr_type(&self) -> AttrType {
        self.meta.attr_type()
    }
}

/// Sum type over every expression shape the planner and executor handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Field(FieldRef),
    Value(Value),
    Cast {
        child: Box<Expression>,
        target: AttrType,
    },
    Comparison {
        op: CompOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Conjunction {
        conj: ConjunctionType,
        children: Vec<Expression>,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Kind of the value this expression will produce.
    pub fn value_type(&self) -> AttrType {
        match self {
            Expression::Field(field) => field.attr_type(),
            Expression::Value(value) => value.attr_type(),
            Expression::Cast { target, .. } => *target,
            Expression::Comparison { .. } | Expression::Conjunction { .. } => AttrType::Booleans,
            Expression::Arithmetic { left, right, .. } => {
                if left.value_type() == AttrType::Floats || right.value_type() == AttrType::Floats {
                    AttrType::Floats
                } else {
                    AttrType::Ints
                }
            }
        }
    }

    /// Evaluate against a concrete tuple.
    pub fn get_value(&self, tuple: &Tuple) -> DbResult<Value> {
        match self {
            Expression::Field(field) => tuple.find_cell(&TupleCellSpec::new(
                field.table_name(),
                field.field_name(),
            )),
            Expression::Value(value) => Ok(value.clone()),
            Expression::Cast { child, target } => cast_value(child.get_value(tuple)?, *target),
            Expression::Comparison { op, left, right } => {
                let left = left.get_value(tuple)?;
                let right = right.get_value(tuple)?;
                compare_values(*op, &left, &right)
            }
            Expression::Conjunction { conj, children } => {
                eval_conjunction(*conj, children, Some(tuple))
            }
            Expression::Arithmetic { op, left, right } => {
                let left = left.get_value(tuple)?;
                let right = right.get_value(tuple)?;
                arithmetic(*op, &left, &right)
            }
        }
    }

    /// Evaluate without a tuple; succeeds iff the subtree is field-free.
    pub fn try_get_value(&self) -> DbResult<Value> {
        match self {
            Expression::Field(field) => Err(DbError::InvalidArgument(format!(
                "expression depends on field {}.{}",
                field.table_name(),
                field.field_name()
            ))),
            Expression::Value(value) => Ok(value.clone()),
            Expression::Cast { child, target } => cast_value(child.try_get_value()?, *target),
            Expression::Comparison { op, left, right } => {
                let left = left.try_get_value()?;
                let right = right.try_get_value()?;
                compare_values(*op, &left, &right)
            }
            Expression::Conjunction { conj, children } => eval_conjunction(*conj, children, None),
            Expression::Arithmetic { op, left, right } => {
                let left = left.try_get_value()?;
                let right = right.try_get_value()?;
                arithmetic(*op, &left, &right)
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Field(field) => {
                write!(f, "{}.{}", field.table_name(), field.field_name())
            }
            Expression::Value(value) => write!(f, "{value}"),
            Expression::Cast { child, target } => write!(f, "cast({child} as {target})"),
            Expression::Comparison { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::Conjunction { conj, children } => {
                let sep = match conj {
                    ConjunctionType::And => " and ",
                    ConjunctionType::Or => " or ",
                };
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                f.write_str(&parts.join(sep))
            }
            Expression::Arithmetic { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
        }
    }
}

fn cast_value(value: Value, target: AttrType) -> DbResult<Value> {
    if value.attr_type() == target {
        return Ok(value);
    }
    value.cast_to(target).ok_or_else(|| {
        DbError::Unsupported(format!(
            "cannot cast {} to {}",
            value.attr_type(),
            target
        ))
    })
}

fn compare_values(op: CompOp, left: &Value, right: &Value) -> DbResult<Value> {
    let ordering = left.compare(right).ok_or_else(|| {
        DbError::Unsupported(format!(
            "cannot compare {} with {}",
            left.attr_type(),
            right.attr_type()
        ))
    })?;
    let result = match op {
        CompOp::EqualTo => ordering.is_eq(),
        CompOp::LessEqual => ordering.is_le(),
        CompOp::NotEqual => ordering.is_ne(),
        CompOp::LessThan => ordering.is_lt(),
        CompOp::GreatEqual => ordering.is_ge(),
        CompOp::GreatThan => ordering.is_gt(),
        CompOp::NoOp => {
            return Err(DbError::Generic("comparison with no operator".into()));
        }
    };
    Ok(Value::Bool(result))
}

/// AND short-circuits on the first false (empty => true); OR on the first
/// true (empty => false). Evaluation order is left to right.
fn eval_conjunction(
    conj: ConjunctionType,
    children: &[Expression],
    tuple: Option<&Tuple>,
) -> DbResult<Value> {
    for child in children {
        let value = match tuple {
            Some(tuple) => child.get_value(tuple)?,
            None => child.try_get_value()?,
        };
        let truth = value.as_bool().ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "conjunction child produced {}, expected booleans",
                value.attr_type()
            ))
        })?;
        match conj {
            ConjunctionType::And if !truth => return Ok(Value::Bool(false)),
            ConjunctionType::Or if truth => return Ok(Value::Bool(true)),
            _ => {}
        }
    }
    Ok(Value::Bool(matches!(conj, ConjunctionType::And)))
}

fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> DbResult<Value> {
    let float_result = left.attr_type() == AttrType::Floats
        || right.attr_type() == AttrType::Floats;

    if float_result {
        let (l, r) = match (left.as_float(), right.as_float()) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(DbError::InvalidArgument(format!(
                    "arithmetic over {} and {}",
                    left.attr_type(),
                    right.attr_type()
                )))
            }
        };
        if matches!(op, ArithOp::Div) && r == 0.0 {
            return Err(DbError::Generic("division by zero".into()));
        }
        let out = match op {
            ArithOp::Add => l + r,
            ArithOp::Sub => l - r,
            ArithOp::Mul => l * r,
            ArithOp::Div => l / r,
        };
        return Ok(Value::Float(out));
    }

    let (l, r) = match (left.as_int(), right.as_int()) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(DbError::InvalidArgument(format!(
                "arithmetic over {} and {}",
                left.attr_type(),
                right.attr_type()
            )))
        }
    };
    if matches!(op, ArithOp::Div) && r == 0 {
        return Err(DbError::Generic("division by zero".into()));
    }
    let out = match op {
        ArithOp::Add => l.wrapping_add(r),
        ArithOp::Sub => l.wrapping_sub(r),
        ArithOp::Mul => l.wrapping_mul(r),
        ArithOp::Div => l / r,
    };
    Ok(Value::Int(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value(v: Value) -> Expression {
        Expression::Value(v)
    }

    fn cmp(op: CompOp, left: Expression, right: Expression) -> Expression {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn empty_tuple() -> Tuple {
        Tuple::ValueList(ValueListTuple::default())
    }

    #[test]
    fn literal_comparison_produces_bool() {
        let e = cmp(CompOp::LessThan, value(Value::Int(1)), value(Value::Int(2)));
        assert_eq!(e.value_type(), AttrType::Booleans);
        assert_eq!(e.get_value(&empty_tuple()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn comparison_widens_int_against_float() {
        let e = cmp(
            CompOp::EqualTo,
            value(Value::Int(2)),
            value(Value::Float(2.0)),
        );
        assert_eq!(e.try_get_value().unwrap(), Value::Bool(true));
    }

    #[test]
    fn comparison_of_incompatible_kinds_is_unsupported() {
        let e = cmp(
            CompOp::EqualTo,
            value(Value::Chars("a".into())),
            value(Value::Int(1)),
        );
        assert!(matches!(e.try_get_value(), Err(DbError::Unsupported(_))));
    }

    #[test]
    fn try_get_value_rejects_field_subtrees() {
        let field = FieldRef::new(
            "t",
            FieldMeta::new("id", AttrType::Ints, 0, 4, true),
        );
        let e = cmp(
            CompOp::EqualTo,
            Expression::Field(field),
            value(Value::Int(1)),
        );
        assert!(matches!(e.try_get_value(), Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn cast_follows_promotion_table() {
        let ok = Expression::Cast {
            child: Box::new(value(Value::Int(2))),
            target: AttrType::Floats,
        };
        assert_eq!(ok.try_get_value().unwrap(), Value::Float(2.0));

        let bad = Expression::Cast {
            child: Box::new(value(Value::Float(2.0))),
            target: AttrType::Ints,
        };
        assert!(matches!(bad.try_get_value(), Err(DbError::Unsupported(_))));
    }

    #[test]
    fn empty_conjunctions() {
        let and = Expression::Conjunction {
            conj: ConjunctionType::And,
            children: vec![],
        };
        let or = Expression::Conjunction {
            conj: ConjunctionType::Or,
            children: vec![],
        };
        assert_eq!(and.try_get_value().unwrap(), Value::Bool(true));
        assert_eq!(or.try_get_value().unwrap(), Value::Bool(false));
    }

    #[test]
    fn and_short_circuits_left_to_right() {
        // Second child would error (incomparable kinds); AND must not reach it.
        let and = Expression::Conjunction {
            conj: ConjunctionType::And,
            children: vec![
                value(Value::Bool(false)),
                cmp(
                    CompOp::EqualTo,
                    value(Value::Chars("a".into())),
                    value(Value::Int(1)),
                ),
            ],
        };
        assert_eq!(and.try_get_value().unwrap(), Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_on_first_true() {
        let or = Expression::Conjunction {
            conj: ConjunctionType::Or,
            children: vec![
                value(Value::Bool(true)),
                cmp(
                    CompOp::EqualTo,
                    value(Value::Chars("a".into())),
                    value(Value::Int(1)),
                ),
            ],
        };
        assert_eq!(or.try_get_value().unwrap(), Value::Bool(true));
    }

    #[test]
    fn arithmetic_promotes_and_divides() {
        let div = Expression::Arithmetic {
            op: ArithOp::Div,
            left: Box::new(value(Value::Int(7))),
            right: Box::new(value(Value::Float(2.0))),
        };
        assert_eq!(div.value_type(), AttrType::Floats);
        assert_eq!(div.try_get_value().unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_a_generic_error() {
        let div = Expression::Arithmetic {
            op: ArithOp::Div,
            left: Box::new(value(Value::Int(1))),
            right: Box::new(value(Value::Int(0))),
        };
        assert!(matches!(div.try_get_value(), Err(DbError::Generic(_))));
    }

    #[test]
    fn value_type_matches_produced_kind() {
        let exprs = vec![
            value(Value::Int(1)),
            value(Value::Chars("x".into())),
            cmp(CompOp::EqualTo, value(Value::Int(1)), value(Value::Int(1))),
            Expression::Arithmetic {
                op: ArithOp::Add,
                left: Box::new(value(Value::Int(1))),
                right: Box::new(value(Value::Int(2))),
            },
        ];
        for e in exprs {
            let produced = e.try_get_value().unwrap();
            assert_eq!(e.value_type(), produced.attr_type());
        }
    }
}
