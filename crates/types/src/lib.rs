use std::cmp::Ordering;
use std::fmt;

/// Attribute kind of a column or of a computed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttrType {
    Undefined,
    Chars,
    Ints,
    Floats,
    Booleans,
}

impl AttrType {
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::Undefined => "undefined",
            AttrType::Chars => "chars",
            AttrType::Ints => "ints",
            AttrType::Floats => "floats",
            AttrType::Booleans => "booleans",
        }
    }

    /// Byte width of a fixed-length field of this kind; Chars widths come
    /// from the column declaration instead.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            AttrType::Ints | AttrType::Floats => Some(4),
            AttrType::Booleans => Some(1),
            AttrType::Chars | AttrType::Undefined => None,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tagged scalar flowing through expressions, tuples and records.
///
/// Comparisons between Ints and Floats widen the Int side; Chars compare
/// byte-wise. Any other mixed-kind comparison is rejected (`None`).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Chars(String),
    Bool(bool),
    Undefined,
}

/// Cost of widening `from` into `to`; `None` means the cast is illegal.
///
/// The only non-identity promotion is Ints -> Floats.
pub fn implicit_cast_cost(from: AttrType, to: AttrType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (AttrType::Ints, AttrType::Floats) => Some(1),
        _ => None,
    }
}

impl Value {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Int(_) => AttrType::Ints,
            Value::Float(_) => AttrType::Floats,
            Value::Chars(_) => AttrType::Chars,
            Value::Bool(_) => AttrType::Booleans,
            Value::Undefined => AttrType::Undefined,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    /// Compare two values, widening Ints against Floats.
    ///
    /// Returns `None` when the kinds are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Int(a), Value::Float(b)) => Some((*a as f32).total_cmp(b)),
            (Value::Float(a), Value::Int(b)) => Some(a.total_cmp(&(*b as f32))),
            (Value::Chars(a), Value::Chars(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Apply an implicit cast; `None` when the promotion table forbids it.
    pub fn cast_to(&self, target: AttrType) -> Option<Value> {
        if self.attr_type() == target {
            return Some(self.clone());
        }
        match (self, target) {
            (Value::Int(i), AttrType::Floats) => Some(Value::Float(*i as f32)),
            _ => None,
        }
    }

    /// Encode into a fixed-width field image. Chars are zero-padded (or
    /// truncated) to `len`; numeric kinds ignore `len` beyond their width.
    pub fn to_bytes(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        match self {
            Value::Int(i) => {
                let bytes = i.to_le_bytes();
                let n = bytes.len().min(len);
                out[..n].copy_from_slice(&bytes[..n]);
            }
            Value::Float(f) => {
                let bytes = f.to_le_bytes();
                let n = bytes.len().min(len);
                out[..n].copy_from_slice(&bytes[..n]);
            }
            Value::Chars(s) => {
                let bytes = s.as_bytes();
                let n = bytes.len().min(len);
                out[..n].copy_from_slice(&bytes[..n]);
            }
            Value::Bool(b) => {
                if len > 0 {
                    out[0] = *b as u8;
                }
            }
            Value::Undefined => {}
        }
        out
    }

    /// Decode a fixed-width field image produced by [`Value::to_bytes`].
    pub fn from_bytes(attr_type: AttrType, bytes: &[u8]) -> Value {
        match attr_type {
            AttrType::Ints => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[..4]);
                Value::Int(i32::from_le_bytes(buf))
            }
            AttrType::Floats => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[..4]);
                Value::Float(f32::from_le_bytes(buf))
            }
            AttrType::Chars => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                Value::Chars(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            AttrType::Booleans => Value::Bool(bytes.first().is_some_and(|b| *b != 0)),
            AttrType::Undefined => Value::Undefined,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Chars(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Undefined => f.write_str("undefined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn compare_same_kind() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Less));
        assert_eq!(
            Value::Chars("ab".into()).compare(&Value::Chars("ab".into())),
            Some(Equal)
        );
        assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), Some(Greater));
    }

    #[test]
    fn compare_widens_int_to_float() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Less));
        assert_eq!(Value::Float(2.0).compare(&Value::Int(2)), Some(Equal));
        assert_eq!(Value::Float(2.5).compare(&Value::Int(2)), Some(Greater));
    }

    #[test]
    fn compare_rejects_mixed_kinds() {
        assert_eq!(Value::Int(1).compare(&Value::Chars("1".into())), None);
        assert_eq!(Value::Bool(true).compare(&Value::Int(1)), None);
        assert_eq!(Value::Undefined.compare(&Value::Undefined), None);
    }

    #[test]
    fn chars_compare_bytewise() {
        assert_eq!(
            Value::Chars("ab".into()).compare(&Value::Chars("b".into())),
            Some(Less)
        );
        assert_eq!(
            Value::Chars("abc".into()).compare(&Value::Chars("ab".into())),
            Some(Greater)
        );
    }

    #[test]
    fn cast_cost_table() {
        assert_eq!(implicit_cast_cost(AttrType::Ints, AttrType::Ints), Some(0));
        assert_eq!(implicit_cast_cost(AttrType::Ints, AttrType::Floats), Some(1));
        assert_eq!(implicit_cast_cost(AttrType::Floats, AttrType::Ints), None);
        assert_eq!(implicit_cast_cost(AttrType::Chars, AttrType::Ints), None);
    }

    #[test]
    fn cast_to_follows_cost_table() {
        assert_eq!(Value::Int(3).cast_to(AttrType::Floats), Some(Value::Float(3.0)));
        assert_eq!(Value::Float(3.0).cast_to(AttrType::Ints), None);
        assert_eq!(
            Value::Chars("x".into()).cast_to(AttrType::Chars),
            Some(Value::Chars("x".into()))
        );
    }

    #[test]
    fn chars_encoding_pads_and_trims() {
        let v = Value::Chars("ab".into());
        let bytes = v.to_bytes(8);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], b"ab");
        assert_eq!(Value::from_bytes(AttrType::Chars, &bytes), v);
    }

    #[test]
    fn chars_encoding_truncates_to_declared_len() {
        let bytes = Value::Chars("abcdef".into()).to_bytes(4);
        assert_eq!(
            Value::from_bytes(AttrType::Chars, &bytes),
            Value::Chars("abcd".into())
        );
    }

    #[test]
    fn serde_round_trip_stability() {
        let vals = vec![
            Value::Int(-42),
            Value::Chars("ada".into()),
            Value::Bool(true),
            Value::Undefined,
        ];

        let json = serde_json::to_string(&vals).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();

        assert_eq!(vals, back);
    }

    proptest! {
        #[test]
        fn int_order_is_antisymmetric(i in any::<i32>(), j in any::<i32>()) {
            let a = Value::Int(i);
            let b = Value::Int(j);
            let ord1 = a.compare(&b).unwrap();
            let ord2 = b.compare(&a).unwrap();
            prop_assert_eq!(ord1, ord2.reverse());
        }

        #[test]
        fn int_bytes_round_trip(i in any::<i32>()) {
            let v = Value::Int(i);
            prop_assert_eq!(Value::from_bytes(AttrType::Ints, &v.to_bytes(4)), v);
        }

        #[test]
        fn widening_agrees_with_float_compare(i in -1000i32..1000, f in -1000.0f32..1000.0) {
            let via_promotion = Value::Int(i).compare(&Value::Float(f)).unwrap();
            let direct = (i as f32).total_cmp(&f);
            prop_assert_eq!(via_promotion, direct);
        }
    }
}
