//! Broadcasting arithmetic, elementwise math and comparisons.
//!
//! Every binary operation follows the same path: resolve the common dtype,
//! convert both operands to it, broadcast their shapes, then run one
//! elementwise kernel into a fresh C-contiguous output.

use log::debug;

use crate::dtype::{with_element, DType, Element};
use crate::kernel::{self, Layout};
use crate::promote::{broadcast_shapes, broadcast_strides, result_type, result_type_with_scalar};
use crate::scalar::Scalar;
use crate::storage::typed;
use crate::view::NdArray;
use crate::{fmt_shape, NdError, Result};

/// Right-hand side of a binary operation: another array or a bare value.
#[derive(Debug, Clone)]
pub enum Operand {
    Array(NdArray),
    Scalar(Scalar),
}

impl From<NdArray> for Operand {
    fn from(value: NdArray) -> Self {
        Operand::Array(value)
    }
}

impl From<&NdArray> for Operand {
    fn from(value: &NdArray) -> Self {
        Operand::Array(value.clone())
    }
}

impl From<Scalar> for Operand {
    fn from(value: Scalar) -> Self {
        Operand::Scalar(value)
    }
}

macro_rules! impl_operand_from_primitive {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(value: $t) -> Self {
                    Operand::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

impl_operand_from_primitive!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Tolerances for [`NdArray::isclose`] and [`NdArray::allclose`].
///
/// Two values are close when `|a - b| <= atol + rtol * |b|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
    /// Treat two NaNs as equal.
    pub equal_nan: bool,
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance {
            rtol: 1e-5,
            atol: 1e-8,
            equal_nan: false,
        }
    }
}

/// Two operands converted to one dtype and broadcast to one shape.
struct Aligned {
    lhs: NdArray,
    rhs: NdArray,
    shape: Vec<usize>,
    lhs_strides: Vec<isize>,
    rhs_strides: Vec<isize>,
}

impl Aligned {
    fn new(lhs: &NdArray, rhs: &NdArray, dtype: DType) -> Result<Aligned> {
        let shape = broadcast_shapes(&[lhs.shape(), rhs.shape()])?;
        let lhs = lhs.as_dtype(dtype);
        let rhs = rhs.as_dtype(dtype);
        let lhs_strides = broadcast_strides(&shape, lhs.shape(), lhs.strides())?;
        let rhs_strides = broadcast_strides(&shape, rhs.shape(), rhs.strides())?;
        Ok(Aligned {
            lhs,
            rhs,
            shape,
            lhs_strides,
            rhs_strides,
        })
    }

    fn zip<T, O, F>(&self, f: F) -> NdArray
    where
        T: Element,
        O: Element,
        F: Fn(T, T) -> O + Sync,
    {
        // Both guards are recursive reads, so aliasing operands are fine.
        let a = self.lhs.buffer().read();
        let b = self.rhs.buffer().read();
        let la = Layout::new(&self.shape, &self.lhs_strides, self.lhs.offset());
        let lb = Layout::new(&self.shape, &self.rhs_strides, self.rhs.offset());
        let out: Vec<O> = kernel::map2(typed::<T>(&a), la, typed::<T>(&b), lb, f);
        NdArray::from_typed(out, self.shape.clone())
    }
}

/// Whether an integral scalar survives conversion to `dtype` unchanged.
fn holds_exactly(value: Scalar, dtype: DType) -> bool {
    let wide = |s: Scalar| match s {
        Scalar::Bool(b) => i128::from(b),
        Scalar::I64(v) => i128::from(v),
        Scalar::U64(v) => i128::from(v),
        Scalar::F64(v) => v as i128,
    };
    wide(value.cast(dtype)) == wide(value)
}

impl NdArray {
    /// Turn `rhs` into an array and pick the dtype the operation runs in.
    ///
    /// Arithmetic keeps the array dtype against a scalar of the same or lower
    /// class. Comparisons promote fully so that out-of-range literals compare
    /// by value instead of wrapping.
    fn resolve(&self, rhs: Operand, op: &'static str, by_value: bool) -> (NdArray, DType) {
        match rhs {
            Operand::Array(other) => {
                let dtype = result_type(self.dtype(), other.dtype());
                if self.dtype() != other.dtype() {
                    debug!(
                        "{op}: promoting {} {} with {} {} to {dtype}",
                        self.dtype(),
                        fmt_shape(self.shape()),
                        other.dtype(),
                        fmt_shape(other.shape()),
                    );
                }
                (other, dtype)
            }
            Operand::Scalar(value) => {
                let dtype = if by_value {
                    result_type(self.dtype(), value.natural_dtype())
                } else {
                    result_type_with_scalar(self.dtype(), &value)
                };
                (NdArray::full(&[1], value, Some(dtype)), dtype)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------------

    /// Elementwise sum. Integers wrap; on booleans this is logical or.
    pub fn add(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        let (rhs, dtype) = self.resolve(rhs.into(), "add", false);
        let aligned = Aligned::new(self, &rhs, dtype)?;
        Ok(with_element!(dtype, T => aligned.zip(|a: T, b: T| a.add_elem(b))))
    }

    /// Elementwise difference. Not defined for two boolean operands.
    pub fn subtract(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        let (rhs, dtype) = self.resolve(rhs.into(), "subtract", false);
        if dtype == DType::Bool {
            return Err(NdError::UnsupportedPromotion {
                op: "subtract",
                lhs: self.dtype(),
                rhs: rhs.dtype(),
            });
        }
        let aligned = Aligned::new(self, &rhs, dtype)?;
        Ok(with_element!(dtype, T => aligned.zip(|a: T, b: T| a.sub_elem(b))))
    }

    /// Elementwise product. Integers wrap; on booleans this is logical and.
    pub fn multiply(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        let (rhs, dtype) = self.resolve(rhs.into(), "multiply", false);
        let aligned = Aligned::new(self, &rhs, dtype)?;
        Ok(with_element!(dtype, T => aligned.zip(|a: T, b: T| a.mul_elem(b))))
    }

    /// True division.
    ///
    /// Runs in the promoted dtype when that is floating and in `float64`
    /// otherwise, so integer division by zero gives `inf` or `NaN`.
    pub fn divide(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        let true_dtype = |dtype: DType| {
            if dtype.is_float() {
                dtype
            } else {
                DType::Float64
            }
        };
        let rhs: Operand = rhs.into();
        let (rhs, dtype) = match rhs {
            // Division is not modular, so the scalar goes straight to the
            // float dtype instead of wrapping through the array dtype.
            Operand::Scalar(value) => {
                let dtype = true_dtype(result_type_with_scalar(self.dtype(), &value));
                (NdArray::full(&[1], value, Some(dtype)), dtype)
            }
            array => {
                let (rhs, dtype) = self.resolve(array, "divide", false);
                (rhs, true_dtype(dtype))
            }
        };
        let aligned = Aligned::new(self, &rhs, dtype)?;
        Ok(match dtype {
            DType::Float32 => aligned.zip(|a: f32, b: f32| a / b),
            _ => aligned.zip(|a: f64, b: f64| a / b),
        })
    }

    /// Elementwise power. Integer results wrap.
    ///
    /// Integer bases reject negative exponents, and an integer scalar
    /// exponent must fit the array dtype since wrapping it changes the result.
    pub fn power(&self, exponent: impl Into<Operand>) -> Result<NdArray> {
        let exponent: Operand = exponent.into();
        if let Operand::Scalar(value) = &exponent {
            let dtype = result_type_with_scalar(self.dtype(), value);
            if dtype.is_integer() && !holds_exactly(*value, dtype) {
                return Err(NdError::InvalidArgument {
                    op: "power",
                    reason: format!("exponent {value} does not fit in {dtype}"),
                });
            }
        }
        let (rhs, dtype) = self.resolve(exponent, "power", false);
        if dtype == DType::Bool {
            return Err(NdError::UnsupportedPromotion {
                op: "power",
                lhs: self.dtype(),
                rhs: rhs.dtype(),
            });
        }
        if dtype.is_integer() && dtype.is_signed() && rhs.less(0)?.any()?.as_bool() {
            return Err(NdError::InvalidArgument {
                op: "power",
                reason: "integers to negative integer powers are not allowed".to_string(),
            });
        }
        let aligned = Aligned::new(self, &rhs, dtype)?;
        Ok(with_element!(dtype, T => aligned.zip(|a: T, b: T| a.pow_elem(b))))
    }

    // ------------------------------------------------------------------------
    // Unary
    // ------------------------------------------------------------------------

    fn map_elements<T, O, F>(&self, f: F) -> NdArray
    where
        T: Element,
        O: Element,
        F: Fn(T) -> O + Sync,
    {
        let storage = self.buffer().read();
        let out: Vec<O> = kernel::map1(typed::<T>(&storage), self.layout(), f);
        NdArray::from_typed(out, self.shape().to_vec())
    }

    fn reject_bool(&self, op: &'static str) -> Result<()> {
        if self.dtype() == DType::Bool {
            return Err(NdError::UnsupportedDType {
                op,
                dtype: DType::Bool,
            });
        }
        Ok(())
    }

    /// Elementwise negation. Integers wrap, so the most negative value maps
    /// to itself and unsigned values map to `2^width - x`.
    pub fn negative(&self) -> Result<NdArray> {
        self.reject_bool("negative")?;
        Ok(with_element!(self.dtype(), T => self.map_elements(|x: T| x.neg_elem())))
    }

    /// Elementwise absolute value in the same dtype.
    pub fn absolute(&self) -> NdArray {
        with_element!(self.dtype(), T => self.map_elements(|x: T| x.abs_elem()))
    }

    /// `-1`, `0` or `1` per element in the same dtype. NaN stays NaN.
    pub fn sign(&self) -> NdArray {
        with_element!(self.dtype(), T => self.map_elements(|x: T| x.sign_elem()))
    }

    /// Square root: `float32` for `float32` input, `float64` otherwise.
    /// Negative values give NaN.
    pub fn sqrt(&self) -> NdArray {
        match self.dtype() {
            DType::Float32 => self.map_elements(|x: f32| x.sqrt()),
            dtype => with_element!(dtype, T => self.map_elements(|x: T| x.to_f64().sqrt())),
        }
    }

    /// `1 / x` in the same dtype. Integer reciprocals truncate toward zero
    /// and a zero element gives zero.
    pub fn reciprocal(&self) -> Result<NdArray> {
        self.reject_bool("reciprocal")?;
        Ok(with_element!(self.dtype(), T => self.map_elements(|x: T| T::one().div_elem(x))))
    }

    // ------------------------------------------------------------------------
    // Comparisons
    // ------------------------------------------------------------------------

    fn compare<F>(&self, rhs: Operand, op: &'static str, cmp: F) -> Result<NdArray>
    where
        F: Fn(std::cmp::Ordering) -> bool + Sync,
    {
        let (rhs, dtype) = self.resolve(rhs, op, true);
        let aligned = Aligned::new(self, &rhs, dtype)?;
        // NaN is unordered: every comparison except `not_equal` is false.
        Ok(with_element!(dtype, T => aligned.zip(|a: T, b: T| {
            a.partial_cmp(&b).map_or(op == "not_equal", &cmp)
        })))
    }

    pub fn greater(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "greater", |o| o.is_gt())
    }

    pub fn greater_equal(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "greater_equal", |o| o.is_ge())
    }

    pub fn less(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "less", |o| o.is_lt())
    }

    pub fn less_equal(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "less_equal", |o| o.is_le())
    }

    pub fn equal(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "equal", |o| o.is_eq())
    }

    pub fn not_equal(&self, rhs: impl Into<Operand>) -> Result<NdArray> {
        self.compare(rhs.into(), "not_equal", |o| o.is_ne())
    }

    /// Elementwise closeness test, evaluated in `float64`.
    ///
    /// Infinities are close only to themselves. NaNs are close to each other
    /// only with [`Tolerance::equal_nan`].
    pub fn isclose(&self, rhs: impl Into<Operand>, tol: Tolerance) -> Result<NdArray> {
        let (rhs, _) = self.resolve(rhs.into(), "isclose", true);
        let aligned = Aligned::new(self, &rhs, DType::Float64)?;
        Ok(aligned.zip(|a: f64, b: f64| {
            if a.is_nan() || b.is_nan() {
                return tol.equal_nan && a.is_nan() && b.is_nan();
            }
            if a.is_infinite() || b.is_infinite() {
                return a == b;
            }
            (a - b).abs() <= tol.atol + tol.rtol * b.abs()
        }))
    }

    /// Whether every pair of elements is close. Empty inputs are close.
    pub fn allclose(&self, rhs: impl Into<Operand>, tol: Tolerance) -> Result<bool> {
        let close = self.isclose(rhs, tol)?;
        Ok(close.to_vec::<bool>().into_iter().all(|c| c))
    }
}
