//! Single values of any dtype.

use std::fmt;

use crate::dtype::{DType, Element, NumericClass};

/// A single array value.
///
/// The three numeric variants cover every dtype exactly: signed integers widen
/// to `I64`, unsigned to `U64`, floats to `F64`. Conversions between variants
/// are total and follow the engine-wide coercion rule:
///
/// - float → integer rounds to nearest (ties away from zero), then wraps;
///   NaN and ±inf become 0, out-of-range finite values saturate first
/// - integer → narrower integer wraps modulo 2^width
/// - anything → bool is `value != 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
}

impl Scalar {
    /// The dtype a bare literal of this variant would have.
    pub fn natural_dtype(&self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::I64(_) => DType::Int64,
            Scalar::U64(_) => DType::UInt64,
            Scalar::F64(_) => DType::Float64,
        }
    }

    pub fn class(&self) -> NumericClass {
        match self {
            Scalar::Bool(_) => NumericClass::Bool,
            Scalar::I64(_) => NumericClass::Int,
            Scalar::U64(_) => NumericClass::UInt,
            Scalar::F64(_) => NumericClass::Float,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Scalar::Bool(b) => b,
            Scalar::I64(v) => v != 0,
            Scalar::U64(v) => v != 0,
            Scalar::F64(v) => v != 0.0,
        }
    }

    /// Signed 64-bit view of the value. Unsigned values above `i64::MAX` wrap.
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(b) => b as i64,
            Scalar::I64(v) => v,
            Scalar::U64(v) => v as i64,
            Scalar::F64(v) => round_to_i64(v),
        }
    }

    /// Unsigned 64-bit view of the value. Negative values wrap.
    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Bool(b) => b as u64,
            Scalar::I64(v) => v as u64,
            Scalar::U64(v) => v,
            Scalar::F64(v) => {
                let r = v.round();
                if !r.is_finite() {
                    0
                } else if r < 0.0 {
                    round_to_i64(r) as u64
                } else {
                    // `as` saturates at u64::MAX.
                    r as u64
                }
            }
        }
    }

    /// Nearest `f64`. Wide integers beyond 2^53 lose their low bits.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(b) => b as u8 as f64,
            Scalar::I64(v) => v as f64,
            Scalar::U64(v) => v as f64,
            Scalar::F64(v) => v,
        }
    }

    /// Coerce into `dtype`, returning the stored value in widened form.
    ///
    /// `Scalar::I64(128).cast(DType::Int8)` is `Scalar::I64(-128)`.
    pub fn cast(self, dtype: DType) -> Scalar {
        crate::dtype::with_element!(dtype, T => T::from_scalar(self).to_scalar())
    }

    /// Coerce into a concrete element type.
    pub fn to<T: Element>(self) -> T {
        T::from_scalar(self)
    }
}

fn round_to_i64(v: f64) -> i64 {
    let r = v.round();
    if r.is_finite() {
        // `as` saturates at the i64 range.
        r as i64
    } else {
        0
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Scalar {
                #[inline]
                fn from(value: $t) -> Self {
                    value.to_scalar()
                }
            }
        )*
    };
}

impl_from_primitive!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        Scalar::U64(value as u64)
    }
}

impl From<isize> for Scalar {
    fn from(value: isize) -> Self {
        Scalar::I64(value as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_int_rounds_to_nearest() {
        assert_eq!(Scalar::F64(2.5).as_i64(), 3);
        assert_eq!(Scalar::F64(-2.5).as_i64(), -3);
        assert_eq!(Scalar::F64(2.4).as_i64(), 2);
        assert_eq!(Scalar::F64(-0.6).as_i64(), -1);
    }

    #[test]
    fn test_non_finite_to_int_is_zero() {
        assert_eq!(Scalar::F64(f64::NAN).as_i64(), 0);
        assert_eq!(Scalar::F64(f64::INFINITY).as_u64(), 0);
        assert_eq!(Scalar::F64(f64::NEG_INFINITY).as_i64(), 0);
    }

    #[test]
    fn test_out_of_range_floats_saturate() {
        assert_eq!(Scalar::F64(1e30).as_i64(), i64::MAX);
        assert_eq!(Scalar::F64(1e30).as_u64(), u64::MAX);
        assert_eq!(Scalar::F64(-1.0).as_u64(), u64::MAX);
    }

    #[test]
    fn test_cast_wraps_into_narrow_dtype() {
        assert_eq!(Scalar::I64(128).cast(DType::Int8), Scalar::I64(-128));
        assert_eq!(Scalar::I64(256).cast(DType::UInt8), Scalar::U64(0));
        assert_eq!(Scalar::F64(300.0).cast(DType::UInt8), Scalar::U64(44));
        assert_eq!(Scalar::F64(0.0).cast(DType::Bool), Scalar::Bool(false));
        assert_eq!(Scalar::Bool(true).cast(DType::Float32), Scalar::F64(1.0));
    }

    #[test]
    fn test_wide_integer_precision() {
        let big = (1u64 << 53) + 1;
        assert_eq!(Scalar::U64(big).as_u64(), big);
        assert_eq!(Scalar::U64(big).as_f64(), (1u64 << 53) as f64);
        assert_eq!(Scalar::U64(u64::MAX).cast(DType::UInt64), Scalar::U64(u64::MAX));
        assert_eq!(Scalar::I64(i64::MIN).cast(DType::Int64), Scalar::I64(i64::MIN));
    }

    #[test]
    fn test_from_primitives() {
        assert_eq!(Scalar::from(5i32), Scalar::I64(5));
        assert_eq!(Scalar::from(5u16), Scalar::U64(5));
        assert_eq!(Scalar::from(1.5f32), Scalar::F64(1.5));
        assert_eq!(Scalar::from(true).natural_dtype(), DType::Bool);
    }
}
