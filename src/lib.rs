//! Strided N-dimensional numeric arrays with NumPy semantics.
//!
//! This crate is an in-memory array engine: typed contiguous storage, zero-copy
//! strided views, broadcasting, a textual slicing grammar, dtype promotion with
//! fixed-width wraparound, and axis reductions. It is the single array
//! representation shared by arithmetic, comparison, manipulation and I/O layers.
//!
//! # Core Types
//!
//! - [`NdArray`]: the public array handle. A view (shape, strides, offset) over a
//!   reference-counted [`Buffer`]. Slicing, transposing and broadcasting return new
//!   handles over the same buffer; mutation through any of them is visible through all.
//! - [`DType`]: the eleven element kinds (`bool`, `int8`..`int64`, `uint8`..`uint64`,
//!   `float32`, `float64`) and their static descriptor table [`DTYPE_TABLE`].
//! - [`Scalar`]: a single value of any dtype (`Bool | I64 | U64 | F64`), used at
//!   `get`/`set` boundaries and for full reductions.
//! - [`SliceSpec`]: one parsed `start:stop:step` token.
//!
//! # Example
//!
//! ```rust
//! use strided_nd::{DType, NdArray};
//!
//! let a = NdArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
//! assert_eq!(a.sum().unwrap().as_i64(), 21);
//!
//! let col_sums = a.sum_axis(0, false).unwrap();
//! assert_eq!(col_sums.to_vec::<i64>(), vec![5, 7, 9]);
//!
//! // Zero-copy view: reversed rows, second column onwards
//! let v = a.slice(&["::-1", "1:"]).unwrap();
//! assert_eq!(v.shape(), &[2, 2]);
//! assert_eq!(v.to_vec::<i32>(), vec![5, 6, 2, 3]);
//! assert!(v.shares_buffer(&a));
//!
//! // Broadcasting with wraparound in the array dtype
//! let b = NdArray::from_vec(vec![127i8], &[1]).unwrap();
//! let c = b.add(1).unwrap();
//! assert_eq!(c.dtype(), DType::Int8);
//! assert_eq!(c.to_vec::<i8>(), vec![-128]);
//! ```
//!
//! # Parallelism
//!
//! With the `parallel` feature, elementwise kernels and axis reductions whose
//! output exceeds [`MIN_PARALLEL_LEN`] elements are split across rayon workers.
//! Outputs are always freshly allocated, so workers never alias their inputs.

mod create;
mod dtype;
mod kernel;
mod manip;
mod ops;
mod promote;
mod reduce;
mod scalar;
mod slice;
mod storage;
#[cfg(feature = "parallel")]
mod threading;
mod view;

// ============================================================================
// DType registry and scalars
// ============================================================================
pub use dtype::{DType, DTypeInfo, Element, NumericClass, DTYPE_TABLE};
pub use scalar::Scalar;

// ============================================================================
// Buffer and view
// ============================================================================
pub use storage::{Buffer, BufferId, Storage};
pub use view::{col_major_strides, row_major_strides, ArrayFlags, NdArray};

// ============================================================================
// Construction
// ============================================================================
pub use create::NestedData;

// ============================================================================
// Broadcasting and promotion
// ============================================================================
pub use promote::{broadcast_shapes, result_type, result_type_with_scalar, PROMOTION_TABLE};

// ============================================================================
// Slicing
// ============================================================================
pub use slice::{NormalizedSlice, SliceSpec};

// ============================================================================
// Arithmetic and comparison
// ============================================================================
pub use ops::{Operand, Tolerance};

// ============================================================================
// Constants
// ============================================================================

/// Output element count above which kernels split work across threads.
///
/// Only consulted with the `parallel` feature. Matches Strided.jl's
/// `MINTHREADLENGTH = 1 << 15`.
pub const MIN_PARALLEL_LEN: usize = 1 << 15;

// ============================================================================
// Error types
// ============================================================================

/// Errors raised by array construction, views and operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NdError {
    /// Shapes cannot be broadcast or joined together.
    #[error("shape mismatch: {} vs {}", fmt_shape(.lhs), fmt_shape(.rhs))]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    /// Reshape target does not preserve the element count.
    #[error("cannot reshape array of shape {} into shape {to:?}", fmt_shape(.from))]
    ReshapeSize { from: Vec<usize>, to: Vec<isize> },

    /// Index out of bounds on a given axis.
    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    Index {
        axis: usize,
        index: isize,
        size: usize,
    },

    /// Wrong number of indices for the array rank.
    #[error("expected {expected} indices, found {found}")]
    IndexCount { expected: usize, found: usize },

    /// Axis argument outside `[-ndim, ndim)`.
    #[error("axis {axis} is out of bounds for array of dimension {ndim}")]
    Axis { axis: isize, ndim: usize },

    /// Axis repeated in a permutation.
    #[error("repeated axis {axis} in permutation")]
    DuplicateAxis { axis: usize },

    /// Operation not defined for this dtype pairing.
    #[error("unsupported operand dtypes for {op}: {lhs} and {rhs}")]
    UnsupportedPromotion {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },

    /// Operation not defined for this dtype.
    #[error("{op} is not supported for dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// `max`/`min`/`argmax`/`argmin` over zero elements.
    #[error("{op}: reduction of empty array")]
    EmptyReduction { op: &'static str },

    /// Malformed slice token.
    #[error("invalid slice token {token:?}: {reason}")]
    InvalidSlice { token: String, reason: String },

    /// Slice step of zero.
    #[error("slice step cannot be zero (axis {axis})")]
    ZeroStep { axis: usize },

    /// `squeeze` on an axis whose size is not one.
    #[error("cannot squeeze axis {axis} with size {size}")]
    CannotSqueeze { axis: usize, size: usize },

    /// Write through a read-only view.
    #[error("assignment destination is read-only")]
    ReadOnly,

    /// Operand rank differs from what the operation requires.
    #[error("rank mismatch: expected {expected}, found {found}")]
    RankMismatch { expected: usize, found: usize },

    /// Raw byte payload has the wrong length for dtype and shape.
    #[error("byte length mismatch: expected {expected}, found {found}")]
    ByteLength { expected: usize, found: usize },

    /// Unrecognized dtype name or descriptor.
    #[error("unknown dtype {0:?}")]
    UnknownDType(String),

    /// Operation needs at least one input array.
    #[error("{op}: need at least one array")]
    EmptyInput { op: &'static str },

    /// Argument outside the operation's domain.
    #[error("{op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },
}

/// Result type for array operations.
pub type Result<T> = std::result::Result<T, NdError>;

/// Render a shape in tuple notation, e.g. `(3,4)` or `(3,)`.
pub(crate) fn fmt_shape(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({single},)"),
        _ => {
            let parts: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = NdError::ShapeMismatch {
            lhs: vec![3, 4],
            rhs: vec![3],
        };
        assert_eq!(err.to_string(), "shape mismatch: (3,4) vs (3,)");
    }

    #[test]
    fn test_fmt_shape_empty() {
        assert_eq!(fmt_shape(&[]), "()");
        assert_eq!(fmt_shape(&[2, 1, 5]), "(2,1,5)");
    }

    #[test]
    fn test_index_error_names_axis() {
        let err = NdError::Index {
            axis: 1,
            index: 7,
            size: 3,
        };
        assert_eq!(
            err.to_string(),
            "index 7 is out of bounds for axis 1 with size 3"
        );
    }
}
