//! Runtime value representation with Cypher's three-valued logic.
//!
//! Comparisons and arithmetic lift `Null` through every operator: any
//! null operand yields null, and comparing values of unrelated types
//! yields null rather than an error. The tri-state result is lowered to
//! a plain boolean only at `Filter`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::storage::{EdgeId, PropertyValue, VertexId};

/// A path through the graph: `vertices.len() == edges.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Path {
    pub vertices: Vec<VertexId>,
    pub edges: Vec<EdgeId>,
}

impl Path {
    pub fn single(vertex: VertexId) -> Self {
        Self {
            vertices: vec![vertex],
            edges: Vec::new(),
        }
    }

    /// Number of edges in the path.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Value flowing through frames, expressions, and result rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<TypedValue>),
    Map(BTreeMap<String, TypedValue>),
    Vertex(VertexId),
    Edge(EdgeId),
    Path(Path),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "null",
            TypedValue::Bool(_) => "bool",
            TypedValue::Int(_) => "int",
            TypedValue::Double(_) => "double",
            TypedValue::String(_) => "string",
            TypedValue::List(_) => "list",
            TypedValue::Map(_) => "map",
            TypedValue::Vertex(_) => "vertex",
            TypedValue::Edge(_) => "edge",
            TypedValue::Path(_) => "path",
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            TypedValue::Int(v) => Some(*v as f64),
            TypedValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Three-valued equality.
    pub fn tri_eq(&self, other: &TypedValue) -> TypedValue {
        use TypedValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Bool(a), Bool(b)) => Bool(a == b),
            (Int(a), Int(b)) => Bool(a == b),
            (String(a), String(b)) => Bool(a == b),
            (Vertex(a), Vertex(b)) => Bool(a == b),
            (Edge(a), Edge(b)) => Bool(a == b),
            (Path(a), Path(b)) => Bool(a == b),
            (List(a), List(b)) => {
                if a.len() != b.len() {
                    return Bool(false);
                }
                let mut saw_null = false;
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.tri_eq(y) {
                        Bool(false) => return Bool(false),
                        Null => saw_null = true,
                        _ => {}
                    }
                }
                if saw_null {
                    Null
                } else {
                    Bool(true)
                }
            }
            (Map(a), Map(b)) => {
                if a.len() != b.len() || a.keys().ne(b.keys()) {
                    return Bool(false);
                }
                let mut saw_null = false;
                for (x, y) in a.values().zip(b.values()) {
                    match x.tri_eq(y) {
                        Bool(false) => return Bool(false),
                        Null => saw_null = true,
                        _ => {}
                    }
                }
                if saw_null {
                    Null
                } else {
                    Bool(true)
                }
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => Bool(a == b),
                _ => Null,
            },
        }
    }

    /// Three-valued ordering; `None` when the operands are incomparable
    /// or either is null.
    pub fn tri_cmp(&self, other: &TypedValue) -> Option<Ordering> {
        use TypedValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TypedValue::Null => 0,
            TypedValue::Bool(_) => 1,
            TypedValue::Int(_) | TypedValue::Double(_) => 2,
            TypedValue::String(_) => 3,
            TypedValue::List(_) => 4,
            TypedValue::Map(_) => 5,
            TypedValue::Vertex(_) => 6,
            TypedValue::Edge(_) => 7,
            TypedValue::Path(_) => 8,
        }
    }

    /// Total ordering used by `ORDER BY`: values of unrelated types sort
    /// by type, nulls handled by the sort keys themselves.
    pub fn total_cmp(&self, other: &TypedValue) -> Ordering {
        use TypedValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Int(a), Double(b)) => (*a as f64).total_cmp(b),
            (Double(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (List(a), List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Vertex(a), Vertex(b)) => a.cmp(b),
            (Edge(a), Edge(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Equality for grouping, `DISTINCT`, and uniqueness checks: null
    /// equals null, numbers compare across int/double.
    pub fn equals_grouping(&self, other: &TypedValue) -> bool {
        use TypedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (List(a), List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals_grouping(y))
            }
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals_grouping(vb))
            }
            _ => matches!(self.tri_eq(other), Bool(true)),
        }
    }
}

/// Hashable wrapper with equality consistent with
/// [`TypedValue::equals_grouping`].
#[derive(Debug, Clone)]
pub struct ValueKey(pub TypedValue);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.equals_grouping(&other.0)
    }
}

impl Eq for ValueKey {}

impl std::hash::Hash for ValueKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use TypedValue::*;
        match &self.0 {
            Null => state.write_u8(0),
            Bool(v) => {
                state.write_u8(1);
                state.write_u8(*v as u8);
            }
            // Ints hash through f64 so 1 and 1.0 land in one bucket.
            Int(v) => {
                state.write_u8(2);
                state.write_u64((*v as f64).to_bits());
            }
            Double(v) => {
                state.write_u8(2);
                state.write_u64(v.to_bits());
            }
            String(v) => {
                state.write_u8(3);
                state.write(v.as_bytes());
            }
            List(items) => {
                state.write_u8(4);
                for item in items {
                    ValueKey(item.clone()).hash(state);
                }
            }
            Map(entries) => {
                state.write_u8(5);
                for (key, value) in entries {
                    state.write(key.as_bytes());
                    ValueKey(value.clone()).hash(state);
                }
            }
            Vertex(id) => {
                state.write_u8(6);
                state.write_u64(id.0);
            }
            Edge(id) => {
                state.write_u8(7);
                state.write_u64(id.0);
            }
            Path(path) => {
                state.write_u8(8);
                for v in &path.vertices {
                    state.write_u64(v.0);
                }
                for e in &path.edges {
                    state.write_u64(e.0);
                }
            }
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => write!(f, "null"),
            TypedValue::Bool(v) => write!(f, "{v}"),
            TypedValue::Int(v) => write!(f, "{v}"),
            TypedValue::Double(v) => write!(f, "{v}"),
            TypedValue::String(v) => write!(f, "{v:?}"),
            TypedValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            TypedValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            TypedValue::Vertex(id) => write!(f, "(vertex {})", id.0),
            TypedValue::Edge(id) => write!(f, "[edge {}]", id.0),
            TypedValue::Path(path) => write!(f, "(path of {} edges)", path.len()),
        }
    }
}

impl From<PropertyValue> for TypedValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(v) => TypedValue::Bool(v),
            PropertyValue::Int(v) => TypedValue::Int(v),
            PropertyValue::Double(v) => TypedValue::Double(v),
            PropertyValue::String(v) => TypedValue::String(v),
            PropertyValue::List(items) => {
                TypedValue::List(items.into_iter().map(TypedValue::from).collect())
            }
        }
    }
}

impl TryFrom<TypedValue> for PropertyValue {
    type Error = QueryError;

    fn try_from(value: TypedValue) -> Result<Self> {
        match value {
            TypedValue::Bool(v) => Ok(PropertyValue::Bool(v)),
            TypedValue::Int(v) => Ok(PropertyValue::Int(v)),
            TypedValue::Double(v) => Ok(PropertyValue::Double(v)),
            TypedValue::String(v) => Ok(PropertyValue::String(v)),
            TypedValue::List(items) => Ok(PropertyValue::List(
                items
                    .into_iter()
                    .map(PropertyValue::try_from)
                    .collect::<Result<_>>()?,
            )),
            other => Err(QueryError::runtime(format!(
                "{} values cannot be stored as properties",
                other.type_name()
            ))),
        }
    }
}

// ---- arithmetic -----------------------------------------------------

fn numeric_op(
    a: &TypedValue,
    b: &TypedValue,
    int_op: impl Fn(i64, i64) -> Result<i64>,
    double_op: impl Fn(f64, f64) -> f64,
    op_name: &str,
) -> Result<TypedValue> {
    use TypedValue::*;
    match (a, b) {
        (Null, _) | (_, Null) => Ok(Null),
        (Int(x), Int(y)) => int_op(*x, *y).map(Int),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Double(double_op(x, y))),
            _ => Err(QueryError::runtime(format!(
                "cannot apply '{op_name}' to {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

impl TypedValue {
    pub fn add(&self, other: &TypedValue) -> Result<TypedValue> {
        use TypedValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => Ok(Null),
            (String(a), String(b)) => Ok(String(format!("{a}{b}"))),
            (List(a), List(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                Ok(List(items))
            }
            _ => numeric_op(
                self,
                other,
                |x, y| {
                    x.checked_add(y)
                        .ok_or_else(|| QueryError::runtime("integer overflow in addition"))
                },
                |x, y| x + y,
                "+",
            ),
        }
    }

    pub fn sub(&self, other: &TypedValue) -> Result<TypedValue> {
        numeric_op(
            self,
            other,
            |x, y| {
                x.checked_sub(y)
                    .ok_or_else(|| QueryError::runtime("integer overflow in subtraction"))
            },
            |x, y| x - y,
            "-",
        )
    }

    pub fn mul(&self, other: &TypedValue) -> Result<TypedValue> {
        numeric_op(
            self,
            other,
            |x, y| {
                x.checked_mul(y)
                    .ok_or_else(|| QueryError::runtime("integer overflow in multiplication"))
            },
            |x, y| x * y,
            "*",
        )
    }

    pub fn div(&self, other: &TypedValue) -> Result<TypedValue> {
        numeric_op(
            self,
            other,
            |x, y| {
                if y == 0 {
                    Err(QueryError::runtime("division by zero"))
                } else {
                    Ok(x / y)
                }
            },
            |x, y| x / y,
            "/",
        )
    }

    pub fn rem(&self, other: &TypedValue) -> Result<TypedValue> {
        numeric_op(
            self,
            other,
            |x, y| {
                if y == 0 {
                    Err(QueryError::runtime("modulo by zero"))
                } else {
                    Ok(x % y)
                }
            },
            |x, y| x % y,
            "%",
        )
    }

    pub fn neg(&self) -> Result<TypedValue> {
        match self {
            TypedValue::Null => Ok(TypedValue::Null),
            TypedValue::Int(v) => Ok(TypedValue::Int(-v)),
            TypedValue::Double(v) => Ok(TypedValue::Double(-v)),
            other => Err(QueryError::runtime(format!(
                "cannot negate a {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_poisons_equality_and_arithmetic() {
        assert!(TypedValue::Null.tri_eq(&TypedValue::Int(1)).is_null());
        assert!(TypedValue::Int(1)
            .add(&TypedValue::Null)
            .unwrap()
            .is_null());
    }

    #[test]
    fn unrelated_types_compare_to_null() {
        assert!(TypedValue::Int(1)
            .tri_eq(&TypedValue::String("1".into()))
            .is_null());
        assert!(TypedValue::Bool(true)
            .tri_cmp(&TypedValue::Int(1))
            .is_none());
    }

    #[test]
    fn numbers_compare_across_int_and_double() {
        assert!(matches!(
            TypedValue::Int(1).tri_eq(&TypedValue::Double(1.0)),
            TypedValue::Bool(true)
        ));
        assert_eq!(
            TypedValue::Int(2).tri_cmp(&TypedValue::Double(1.5)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn int_arithmetic_stays_integral() {
        let got = TypedValue::Int(7).div(&TypedValue::Int(2)).unwrap();
        assert!(matches!(got, TypedValue::Int(3)));
        assert!(TypedValue::Int(1).div(&TypedValue::Int(0)).is_err());
    }

    #[test]
    fn grouping_equality_merges_null_and_numeric_types() {
        assert!(TypedValue::Null.equals_grouping(&TypedValue::Null));
        assert!(TypedValue::Int(1).equals_grouping(&TypedValue::Double(1.0)));
        assert!(!TypedValue::Int(1).equals_grouping(&TypedValue::Int(2)));
    }

    #[test]
    fn list_equality_propagates_inner_null() {
        let a = TypedValue::List(vec![TypedValue::Int(1), TypedValue::Null]);
        let b = TypedValue::List(vec![TypedValue::Int(1), TypedValue::Int(2)]);
        assert!(a.tri_eq(&b).is_null());
        let c = TypedValue::List(vec![TypedValue::Int(3), TypedValue::Null]);
        assert!(matches!(a.tri_eq(&c), TypedValue::Bool(false)));
    }
}
