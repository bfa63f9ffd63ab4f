//! Typed value columns: the arrays the engine computes, caches and returns.
//!
//! A column holds one value per member of the target entity's population.
//! The variants mirror the storage dtypes a variable may declare; enumerated
//! variables store the index of the chosen category.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Bool,
    Int32,
    Float32,
    Float64,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot cast a {from:?} column to {to:?}")]
    UnsupportedCast { from: Dtype, to: Dtype },
    #[error("cannot combine columns of length {lhs} and {rhs}")]
    LengthMismatch { lhs: usize, rhs: usize },
    #[error("cannot combine a {lhs:?} column with a {rhs:?} column")]
    DtypeMismatch { lhs: Dtype, rhs: Dtype },
    #[error("{op} is not defined for {dtype:?} columns")]
    NonNumeric { op: &'static str, dtype: Dtype },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Array {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Enum(Vec<u8>),
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int(v) => v.len(),
            Array::Float(v) => v.len(),
            Array::Double(v) => v.len(),
            Array::Enum(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Array::Bool(_) => Dtype::Bool,
            Array::Int(_) => Dtype::Int32,
            Array::Float(_) => Dtype::Float32,
            Array::Double(_) => Dtype::Float64,
            Array::Enum(_) => Dtype::Enum,
        }
    }

    pub fn has_nan(&self) -> bool {
        match self {
            Array::Float(v) => v.iter().any(|x| x.is_nan()),
            Array::Double(v) => v.iter().any(|x| x.is_nan()),
            _ => false,
        }
    }

    pub fn nan_count(&self) -> usize {
        match self {
            Array::Float(v) => v.iter().filter(|x| x.is_nan()).count(),
            Array::Double(v) => v.iter().filter(|x| x.is_nan()).count(),
            _ => 0,
        }
    }

    /// Approximate heap footprint, for the memory-usage report.
    pub fn nb_bytes(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int(v) => v.len() * 4,
            Array::Float(v) => v.len() * 4,
            Array::Double(v) => v.len() * 8,
            Array::Enum(v) => v.len(),
        }
    }

    /// Converts this column to the given storage dtype.
    ///
    /// Numeric conversions follow the usual `as` semantics (truncation toward
    /// zero when narrowing to integers). Enum columns cannot be re-cast here;
    /// encoding raw values into an enum column is the engine's job since it
    /// needs the variable's category list.
    pub fn cast(&self, to: Dtype) -> Result<Array, ValueError> {
        if self.dtype() == to {
            return Ok(self.clone());
        }
        let unsupported = ValueError::UnsupportedCast { from: self.dtype(), to };
        Ok(match (self, to) {
            (Array::Bool(v), Dtype::Int32) => Array::Int(v.iter().map(|&b| b as i32).collect()),
            (Array::Bool(v), Dtype::Float32) => {
                Array::Float(v.iter().map(|&b| b as i32 as f32).collect())
            }
            (Array::Bool(v), Dtype::Float64) => {
                Array::Double(v.iter().map(|&b| b as i32 as f64).collect())
            }
            (Array::Int(v), Dtype::Bool) => Array::Bool(v.iter().map(|&x| x != 0).collect()),
            (Array::Int(v), Dtype::Float32) => Array::Float(v.iter().map(|&x| x as f32).collect()),
            (Array::Int(v), Dtype::Float64) => Array::Double(v.iter().map(|&x| x as f64).collect()),
            (Array::Float(v), Dtype::Bool) => Array::Bool(v.iter().map(|&x| x != 0.0).collect()),
            (Array::Float(v), Dtype::Int32) => Array::Int(v.iter().map(|&x| x as i32).collect()),
            (Array::Float(v), Dtype::Float64) => {
                Array::Double(v.iter().map(|&x| x as f64).collect())
            }
            (Array::Double(v), Dtype::Bool) => Array::Bool(v.iter().map(|&x| x != 0.0).collect()),
            (Array::Double(v), Dtype::Int32) => Array::Int(v.iter().map(|&x| x as i32).collect()),
            (Array::Double(v), Dtype::Float32) => {
                Array::Float(v.iter().map(|&x| x as f32).collect())
            }
            _ => return Err(unsupported),
        })
    }

    /// Elementwise sum of two columns of the same numeric dtype and length.
    pub fn checked_add(&self, other: &Array) -> Result<Array, ValueError> {
        if self.len() != other.len() {
            return Err(ValueError::LengthMismatch { lhs: self.len(), rhs: other.len() });
        }
        match (self, other) {
            (Array::Int(a), Array::Int(b)) => {
                Ok(Array::Int(a.iter().zip(b).map(|(x, y)| x + y).collect()))
            }
            (Array::Float(a), Array::Float(b)) => {
                Ok(Array::Float(a.iter().zip(b).map(|(x, y)| x + y).collect()))
            }
            (Array::Double(a), Array::Double(b)) => {
                Ok(Array::Double(a.iter().zip(b).map(|(x, y)| x + y).collect()))
            }
            (Array::Bool(_), _) | (_, Array::Bool(_)) => {
                Err(ValueError::NonNumeric { op: "sum", dtype: Dtype::Bool })
            }
            (Array::Enum(_), _) | (_, Array::Enum(_)) => {
                Err(ValueError::NonNumeric { op: "sum", dtype: Dtype::Enum })
            }
            _ => Err(ValueError::DtypeMismatch { lhs: self.dtype(), rhs: other.dtype() }),
        }
    }

    /// Elementwise division by a scalar. Integer columns widen to `f64`.
    pub fn divide_by(&self, divisor: f64) -> Result<Array, ValueError> {
        match self {
            Array::Int(v) => Ok(Array::Double(v.iter().map(|&x| x as f64 / divisor).collect())),
            Array::Float(v) => {
                Ok(Array::Float(v.iter().map(|&x| x / divisor as f32).collect()))
            }
            Array::Double(v) => Ok(Array::Double(v.iter().map(|&x| x / divisor).collect())),
            other => Err(ValueError::NonNumeric { op: "division", dtype: other.dtype() }),
        }
    }
}

/// The scalar default of a variable, broadcast to an entity-sized column
/// when neither a formula, a base function nor an input provides a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Enum(u8),
}

impl DefaultValue {
    pub fn broadcast(&self, count: usize) -> Array {
        match *self {
            DefaultValue::Bool(x) => Array::Bool(vec![x; count]),
            DefaultValue::Int(x) => Array::Int(vec![x; count]),
            DefaultValue::Float(x) => Array::Float(vec![x; count]),
            DefaultValue::Double(x) => Array::Double(vec![x; count]),
            DefaultValue::Enum(x) => Array::Enum(vec![x; count]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_between_numeric_dtypes() {
        let ints = Array::Int(vec![1, 2, 3]);
        assert_eq!(ints.cast(Dtype::Float32).unwrap(), Array::Float(vec![1.0, 2.0, 3.0]));
        assert_eq!(ints.cast(Dtype::Int32).unwrap(), ints);

        let doubles = Array::Double(vec![1.9, -0.5]);
        assert_eq!(doubles.cast(Dtype::Int32).unwrap(), Array::Int(vec![1, 0]));
    }

    #[test]
    fn test_cast_to_enum_is_refused() {
        let err = Array::Int(vec![0, 1]).cast(Dtype::Enum).unwrap_err();
        assert_eq!(err, ValueError::UnsupportedCast { from: Dtype::Int32, to: Dtype::Enum });
    }

    #[test]
    fn test_checked_add() {
        let a = Array::Double(vec![1.0, 2.0]);
        let b = Array::Double(vec![0.5, 0.5]);
        assert_eq!(a.checked_add(&b).unwrap(), Array::Double(vec![1.5, 2.5]));

        let short = Array::Double(vec![1.0]);
        assert!(matches!(a.checked_add(&short), Err(ValueError::LengthMismatch { .. })));

        let bools = Array::Bool(vec![true, false]);
        assert!(matches!(a.checked_add(&bools), Err(ValueError::NonNumeric { .. })));
    }

    #[test]
    fn test_divide_widens_integers() {
        let ints = Array::Int(vec![12, 6]);
        assert_eq!(ints.divide_by(12.0).unwrap(), Array::Double(vec![1.0, 0.5]));
        assert!(Array::Enum(vec![0]).divide_by(12.0).is_err());
    }

    #[test]
    fn test_nan_detection() {
        assert!(Array::Float(vec![1.0, f32::NAN]).has_nan());
        assert_eq!(Array::Double(vec![f64::NAN, f64::NAN, 0.0]).nan_count(), 2);
        assert!(!Array::Int(vec![1]).has_nan());
    }

    #[test]
    fn test_default_broadcast() {
        assert_eq!(DefaultValue::Float(0.0).broadcast(3), Array::Float(vec![0.0; 3]));
        assert_eq!(DefaultValue::Enum(1).broadcast(2), Array::Enum(vec![1, 1]));
    }
}
