//! Dtype promotion and broadcast shape resolution.

use crate::dtype::{DType, NumericClass};
use crate::scalar::Scalar;
use crate::{NdError, Result};

use crate::dtype::DType::{
    Bool as B, Float32 as F32, Float64 as F64, Int16 as I16, Int32 as I32, Int64 as I64,
    Int8 as I8, UInt16 as U16, UInt32 as U32, UInt64 as U64, UInt8 as U8,
};

/// Result dtype of a binary operation between two arrays.
///
/// Indexed `[lhs as usize][rhs as usize]`; rows and columns follow
/// [`DType::ALL`] order. The table is symmetric.
///
/// - `bool` is absorbed by every other dtype
/// - same kind promotes to the wider width
/// - signed `S` with unsigned `U` is `S` when `S` is strictly wider, otherwise
///   the signed type of twice `U`'s width; `uint64` with any signed type is `float64`
/// - `float32` with an integer of at most 16 bits stays `float32`, with a
///   32/64-bit integer becomes `float64`
pub static PROMOTION_TABLE: [[DType; 11]; 11] = [
    //      B    I8   I16  I32  I64  U8   U16  U32  U64  F32  F64
    /* B   */ [B, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64],
    /* I8  */ [I8, I8, I16, I32, I64, I16, I32, I64, F64, F32, F64],
    /* I16 */ [I16, I16, I16, I32, I64, I16, I32, I64, F64, F32, F64],
    /* I32 */ [I32, I32, I32, I32, I64, I32, I32, I64, F64, F64, F64],
    /* I64 */ [I64, I64, I64, I64, I64, I64, I64, I64, F64, F64, F64],
    /* U8  */ [U8, I16, I16, I32, I64, U8, U16, U32, U64, F32, F64],
    /* U16 */ [U16, I32, I32, I32, I64, U16, U16, U32, U64, F32, F64],
    /* U32 */ [U32, I64, I64, I64, I64, U32, U32, U32, U64, F64, F64],
    /* U64 */ [U64, F64, F64, F64, F64, U64, U64, U64, U64, F64, F64],
    /* F32 */ [F32, F32, F32, F64, F64, F32, F32, F64, F64, F32, F64],
    /* F64 */ [F64, F64, F64, F64, F64, F64, F64, F64, F64, F64, F64],
];

/// Result dtype for two array operands.
#[inline]
pub fn result_type(lhs: DType, rhs: DType) -> DType {
    PROMOTION_TABLE[lhs as usize][rhs as usize]
}

/// Result dtype for an array operand combined with a scalar.
///
/// The scalar never widens the array within its own class: an `int32` array
/// plus `5` stays `int32`, a `float32` array times `0.5` stays `float32`. A
/// scalar of a higher class lifts the result to that class's 64-bit dtype.
pub fn result_type_with_scalar(array: DType, scalar: &Scalar) -> DType {
    match (array.class(), scalar.class()) {
        (NumericClass::Float, _) => array,
        (_, NumericClass::Float) => DType::Float64,
        (NumericClass::Bool, NumericClass::Int) => DType::Int64,
        (NumericClass::Bool, NumericClass::UInt) => DType::UInt64,
        _ => array,
    }
}

/// Compute the common broadcast shape of several shapes.
///
/// Shapes are right-aligned and shorter ones are left-padded with unit axes.
/// At each position all sizes other than 1 must agree; the error names the
/// first shape that established the size and the shape that contradicts it.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; rank];
    // Which input fixed each output position, for error reporting.
    let mut owner: Vec<Option<usize>> = vec![None; rank];

    for (which, shape) in shapes.iter().enumerate() {
        let pad = rank - shape.len();
        for (i, &n) in shape.iter().enumerate() {
            let d = pad + i;
            if n == 1 {
                continue;
            }
            match owner[d] {
                None => {
                    out[d] = n;
                    owner[d] = Some(which);
                }
                Some(_) if out[d] == n => {}
                Some(first) => {
                    return Err(NdError::ShapeMismatch {
                        lhs: shapes[first].to_vec(),
                        rhs: shape.to_vec(),
                    });
                }
            }
        }
    }

    Ok(out)
}

/// Strides that present `src_dims` as `target_dims` without copying.
///
/// Matching axes keep their stride; unit axes stretched to a larger size and
/// leading axes introduced by left-padding get stride 0.
pub(crate) fn broadcast_strides(
    target_dims: &[usize],
    src_dims: &[usize],
    src_strides: &[isize],
) -> Result<Vec<isize>> {
    let mismatch = || NdError::ShapeMismatch {
        lhs: src_dims.to_vec(),
        rhs: target_dims.to_vec(),
    };
    if src_dims.len() > target_dims.len() {
        return Err(mismatch());
    }

    let pad = target_dims.len() - src_dims.len();
    let mut out = vec![0isize; target_dims.len()];
    for (i, (&sdim, &stride)) in src_dims.iter().zip(src_strides).enumerate() {
        let tdim = target_dims[pad + i];
        if sdim == tdim {
            out[pad + i] = stride;
        } else if sdim != 1 {
            return Err(mismatch());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The promotion rules written out as code, to cross-check the table.
    fn promote_by_rule(a: DType, b: DType) -> DType {
        use NumericClass::*;
        let wa = a.itemsize();
        let wb = b.itemsize();
        match (a.class(), b.class()) {
            (Bool, _) => b,
            (_, Bool) => a,
            (x, y) if x == y => {
                if wa >= wb {
                    a
                } else {
                    b
                }
            }
            (Float, _) | (_, Float) => {
                let (f, i) = if a.is_float() { (a, b) } else { (b, a) };
                if f == DType::Float32 && i.itemsize() <= 2 {
                    DType::Float32
                } else {
                    DType::Float64
                }
            }
            _ => {
                let (s, u) = if a.class() == Int { (a, b) } else { (b, a) };
                if s.itemsize() > u.itemsize() {
                    s
                } else {
                    match u.itemsize() {
                        1 => DType::Int16,
                        2 => DType::Int32,
                        4 => DType::Int64,
                        _ => DType::Float64,
                    }
                }
            }
        }
    }

    #[test]
    fn test_table_matches_rules() {
        for a in DType::ALL {
            for b in DType::ALL {
                assert_eq!(result_type(a, b), promote_by_rule(a, b), "{a} with {b}");
            }
        }
    }

    #[test]
    fn test_table_is_symmetric() {
        for a in DType::ALL {
            for b in DType::ALL {
                assert_eq!(result_type(a, b), result_type(b, a));
            }
        }
    }

    #[test]
    fn test_known_pairs() {
        assert_eq!(result_type(DType::Int8, DType::UInt8), DType::Int16);
        assert_eq!(result_type(DType::Int32, DType::UInt32), DType::Int64);
        assert_eq!(result_type(DType::Int64, DType::UInt64), DType::Float64);
        assert_eq!(result_type(DType::Int16, DType::Float32), DType::Float32);
        assert_eq!(result_type(DType::Int32, DType::Float32), DType::Float64);
        assert_eq!(result_type(DType::Bool, DType::UInt16), DType::UInt16);
    }

    #[test]
    fn test_scalar_keeps_array_dtype() {
        assert_eq!(
            result_type_with_scalar(DType::Int32, &Scalar::I64(5)),
            DType::Int32
        );
        assert_eq!(
            result_type_with_scalar(DType::Int8, &Scalar::U64(1000)),
            DType::Int8
        );
        assert_eq!(
            result_type_with_scalar(DType::Float32, &Scalar::F64(0.5)),
            DType::Float32
        );
        assert_eq!(
            result_type_with_scalar(DType::Int16, &Scalar::Bool(true)),
            DType::Int16
        );
    }

    #[test]
    fn test_scalar_of_higher_class_promotes() {
        assert_eq!(
            result_type_with_scalar(DType::Int32, &Scalar::F64(0.5)),
            DType::Float64
        );
        assert_eq!(
            result_type_with_scalar(DType::Bool, &Scalar::I64(2)),
            DType::Int64
        );
        assert_eq!(
            result_type_with_scalar(DType::Bool, &Scalar::F64(2.0)),
            DType::Float64
        );
    }

    #[test]
    fn test_broadcast_shapes_basic() {
        assert_eq!(broadcast_shapes(&[&[2, 3], &[1, 3]]).unwrap(), vec![2, 3]);
        assert_eq!(broadcast_shapes(&[&[3, 1], &[1, 3]]).unwrap(), vec![3, 3]);
        assert_eq!(broadcast_shapes(&[&[4, 1, 5], &[3, 1]]).unwrap(), vec![4, 3, 5]);
        assert_eq!(broadcast_shapes(&[&[0], &[1]]).unwrap(), vec![0]);
        assert_eq!(broadcast_shapes(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_broadcast_shapes_names_colliding_shapes() {
        let err = broadcast_shapes(&[&[1, 4], &[3]]).unwrap_err();
        assert_eq!(err.to_string(), "shape mismatch: (1,4) vs (3,)");
    }

    #[test]
    fn test_broadcast_shapes_three_inputs() {
        let out = broadcast_shapes(&[&[5, 1, 1], &[1, 6, 1], &[7]]).unwrap();
        assert_eq!(out, vec![5, 6, 7]);
        let err = broadcast_shapes(&[&[2, 1], &[1, 3], &[4, 3]]).unwrap_err();
        assert_eq!(
            err,
            NdError::ShapeMismatch {
                lhs: vec![2, 1],
                rhs: vec![4, 3]
            }
        );
    }

    #[test]
    fn test_broadcast_strides() {
        let promoted = broadcast_strides(&[2, 3], &[1, 3], &[3, 1]).unwrap();
        assert_eq!(promoted, vec![0, 1]);
        let padded = broadcast_strides(&[4, 2, 3], &[3], &[2]).unwrap();
        assert_eq!(padded, vec![0, 0, 2]);
        assert!(broadcast_strides(&[3], &[2, 3], &[3, 1]).is_err());
        assert!(broadcast_strides(&[2, 4], &[2, 3], &[3, 1]).is_err());
    }
}
