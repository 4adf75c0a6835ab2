//! Full and per-axis reductions.
//!
//! Full reductions fold every element in C order and return a [`Scalar`].
//! The `*_axis` variants fold along one axis and return a new array whose
//! shape drops that axis, or keeps it with size 1 under `keepdims`.

use log::trace;

use crate::dtype::{with_element, DType, Element, NumericClass};
use crate::kernel;
use crate::scalar::Scalar;
use crate::storage::typed;
use crate::view::{normalize_axis, NdArray};
use crate::{fmt_shape, NdError, Result};

/// Running count, sum and centered second moment.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: usize,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl Moments {
    #[inline]
    fn push(mut self, x: f64) -> Self {
        self.n += 1;
        self.sum += x;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
        self
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.sum / self.n as f64
        }
    }

    fn var(&self, ddof: usize) -> f64 {
        if self.n <= ddof {
            f64::NAN
        } else {
            self.m2 / (self.n - ddof) as f64
        }
    }
}

/// Dtype `sum` and `prod` accumulate in.
fn accumulator_dtype(dtype: DType) -> DType {
    match dtype.class() {
        NumericClass::Bool | NumericClass::Int => DType::Int64,
        NumericClass::UInt => DType::UInt64,
        NumericClass::Float => dtype,
    }
}

/// Dtype of `mean`, `var` and `std`.
fn stat_dtype(dtype: DType) -> DType {
    if dtype == DType::Float32 {
        DType::Float32
    } else {
        DType::Float64
    }
}

fn reduced_shape(shape: &[usize], axis: usize, keepdims: bool) -> Vec<usize> {
    let mut out = shape.to_vec();
    if keepdims {
        out[axis] = 1;
    } else {
        out.remove(axis);
    }
    out
}

/// Larger of two values; a NaN on either side wins.
#[inline]
fn nan_max<T: Element>(best: T, x: T) -> T {
    if best.is_nan() || (!x.is_nan() && x <= best) {
        best
    } else {
        x
    }
}

#[inline]
fn nan_min<T: Element>(best: T, x: T) -> T {
    if best.is_nan() || (!x.is_nan() && x >= best) {
        best
    } else {
        x
    }
}

/// Whether `x` replaces the current arg-extremum `best`: the first NaN sticks,
/// ties keep the earlier position.
#[inline]
fn arg_replaces<T: Element>(best: T, x: T, want_max: bool) -> bool {
    if best.is_nan() {
        return false;
    }
    if x.is_nan() {
        return true;
    }
    if want_max {
        x > best
    } else {
        x < best
    }
}

fn fold_scalar<T, S, F>(array: &NdArray, init: S, fold: F) -> S
where
    T: Element,
    F: FnMut(S, usize, T) -> S,
{
    let storage = array.buffer().read();
    kernel::fold_all(typed::<T>(&storage), array.layout(), init, fold)
}

fn fold_along<T, S, O, F, G>(
    array: &NdArray,
    axis: usize,
    keepdims: bool,
    init: S,
    fold: F,
    finish: G,
) -> NdArray
where
    T: Element,
    S: Clone + Sync,
    O: Element,
    F: Fn(S, usize, T) -> S + Sync,
    G: Fn(S, usize) -> O + Sync,
{
    let storage = array.buffer().read();
    let out: Vec<O> =
        kernel::fold_axis(typed::<T>(&storage), array.layout(), axis, init, fold, finish);
    NdArray::from_typed(out, reduced_shape(array.shape(), axis, keepdims))
}

impl NdArray {
    fn reduction_axis(&self, op: &'static str, axis: isize) -> Result<usize> {
        let axis = normalize_axis(axis, self.ndim())?;
        trace!("{op}: axis {axis} of {}", fmt_shape(self.shape()));
        Ok(axis)
    }

    fn nonempty_axis(&self, op: &'static str, axis: isize) -> Result<usize> {
        let axis = self.reduction_axis(op, axis)?;
        if self.shape()[axis] == 0 {
            return Err(NdError::EmptyReduction { op });
        }
        Ok(axis)
    }

    // ------------------------------------------------------------------------
    // Sum and product
    // ------------------------------------------------------------------------

    /// Sum of all elements. Integers accumulate in 64 bits and wrap.
    pub fn sum(&self) -> Result<Scalar> {
        let acc = accumulator_dtype(self.dtype());
        let src = self.as_dtype(acc);
        Ok(with_element!(acc, T => {
            fold_scalar(&src, T::zero(), |s: T, _, x: T| s.add_elem(x)).to_scalar()
        }))
    }

    pub fn sum_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.reduction_axis("sum", axis)?;
        let acc = accumulator_dtype(self.dtype());
        let src = self.as_dtype(acc);
        Ok(with_element!(acc, T => {
            fold_along(&src, axis, keepdims, T::zero(), |s: T, _, x: T| s.add_elem(x), |s, _| s)
        }))
    }

    /// Product of all elements; one for an empty array.
    pub fn prod(&self) -> Result<Scalar> {
        let acc = accumulator_dtype(self.dtype());
        let src = self.as_dtype(acc);
        Ok(with_element!(acc, T => {
            fold_scalar(&src, T::one(), |s: T, _, x: T| s.mul_elem(x)).to_scalar()
        }))
    }

    pub fn prod_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.reduction_axis("prod", axis)?;
        let acc = accumulator_dtype(self.dtype());
        let src = self.as_dtype(acc);
        Ok(with_element!(acc, T => {
            fold_along(&src, axis, keepdims, T::one(), |s: T, _, x: T| s.mul_elem(x), |s, _| s)
        }))
    }

    // ------------------------------------------------------------------------
    // Moments
    // ------------------------------------------------------------------------

    fn moments(&self) -> Moments {
        with_element!(self.dtype(), T => {
            fold_scalar(self, Moments::default(), |m, _, x: T| m.push(x.to_f64()))
        })
    }

    fn moments_axis<G>(&self, axis: usize, keepdims: bool, finish: G) -> NdArray
    where
        G: Fn(&Moments) -> f64 + Sync,
    {
        let out = with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                Moments::default(),
                |m, _, x: T| m.push(x.to_f64()),
                |m, _| finish(&m),
            )
        });
        out.as_dtype(stat_dtype(self.dtype()))
    }

    fn stat_scalar(&self, value: f64) -> Scalar {
        Scalar::F64(value).cast(stat_dtype(self.dtype()))
    }

    /// Arithmetic mean. `NaN` for an empty array.
    pub fn mean(&self) -> Result<Scalar> {
        Ok(self.stat_scalar(self.moments().mean()))
    }

    pub fn mean_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.reduction_axis("mean", axis)?;
        Ok(self.moments_axis(axis, keepdims, Moments::mean))
    }

    /// Variance with `ddof` delta degrees of freedom; `NaN` when
    /// `ddof >= size`.
    pub fn var(&self, ddof: usize) -> Result<Scalar> {
        Ok(self.stat_scalar(self.moments().var(ddof)))
    }

    pub fn var_axis(&self, axis: isize, keepdims: bool, ddof: usize) -> Result<NdArray> {
        let axis = self.reduction_axis("var", axis)?;
        Ok(self.moments_axis(axis, keepdims, |m| m.var(ddof)))
    }

    /// Standard deviation, the square root of [`var`](Self::var).
    pub fn std(&self, ddof: usize) -> Result<Scalar> {
        Ok(self.stat_scalar(self.moments().var(ddof).sqrt()))
    }

    pub fn std_axis(&self, axis: isize, keepdims: bool, ddof: usize) -> Result<NdArray> {
        let axis = self.reduction_axis("std", axis)?;
        Ok(self.moments_axis(axis, keepdims, |m| m.var(ddof).sqrt()))
    }

    // ------------------------------------------------------------------------
    // Extrema
    // ------------------------------------------------------------------------

    /// Largest element, in the array's dtype. NaN propagates.
    pub fn max(&self) -> Result<Scalar> {
        with_element!(self.dtype(), T => {
            fold_scalar(self, None, |best: Option<T>, _, x: T| {
                Some(best.map_or(x, |b| nan_max(b, x)))
            })
            .map(Element::to_scalar)
            .ok_or(NdError::EmptyReduction { op: "max" })
        })
    }

    pub fn max_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.nonempty_axis("max", axis)?;
        Ok(with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                None,
                |best: Option<T>, _, x: T| Some(best.map_or(x, |b| nan_max(b, x))),
                |best, _| best.unwrap_or_default(),
            )
        }))
    }

    /// Smallest element, in the array's dtype. NaN propagates.
    pub fn min(&self) -> Result<Scalar> {
        with_element!(self.dtype(), T => {
            fold_scalar(self, None, |best: Option<T>, _, x: T| {
                Some(best.map_or(x, |b| nan_min(b, x)))
            })
            .map(Element::to_scalar)
            .ok_or(NdError::EmptyReduction { op: "min" })
        })
    }

    pub fn min_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.nonempty_axis("min", axis)?;
        Ok(with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                None,
                |best: Option<T>, _, x: T| Some(best.map_or(x, |b| nan_min(b, x))),
                |best, _| best.unwrap_or_default(),
            )
        }))
    }

    fn arg_extremum(&self, op: &'static str, want_max: bool) -> Result<Scalar> {
        with_element!(self.dtype(), T => {
            fold_scalar(self, None, |best: Option<(usize, T)>, pos, x: T| match best {
                Some((_, b)) if !arg_replaces(b, x, want_max) => best,
                _ => Some((pos, x)),
            })
            .map(|(pos, _)| Scalar::I64(pos as i64))
            .ok_or(NdError::EmptyReduction { op })
        })
    }

    fn arg_extremum_axis(
        &self,
        op: &'static str,
        axis: isize,
        keepdims: bool,
        want_max: bool,
    ) -> Result<NdArray> {
        let axis = self.nonempty_axis(op, axis)?;
        Ok(with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                None,
                |best: Option<(usize, T)>, pos, x: T| match best {
                    Some((_, b)) if !arg_replaces(b, x, want_max) => best,
                    _ => Some((pos, x)),
                },
                |best, _| best.map_or(0i64, |(pos, _)| pos as i64),
            )
        }))
    }

    /// Flat C-order position of the largest element (the first NaN if any).
    pub fn argmax(&self) -> Result<Scalar> {
        self.arg_extremum("argmax", true)
    }

    pub fn argmax_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        self.arg_extremum_axis("argmax", axis, keepdims, true)
    }

    /// Flat C-order position of the smallest element (the first NaN if any).
    pub fn argmin(&self) -> Result<Scalar> {
        self.arg_extremum("argmin", false)
    }

    pub fn argmin_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        self.arg_extremum_axis("argmin", axis, keepdims, false)
    }

    // ------------------------------------------------------------------------
    // Truth tests
    // ------------------------------------------------------------------------

    /// Whether every element is non-zero. True for an empty array.
    pub fn all(&self) -> Result<Scalar> {
        Ok(with_element!(self.dtype(), T => {
            Scalar::Bool(fold_scalar(self, true, |acc, _, x: T| acc && x.is_truthy()))
        }))
    }

    pub fn all_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.reduction_axis("all", axis)?;
        Ok(with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                true,
                |acc, _, x: T| acc && x.is_truthy(),
                |acc, _| acc,
            )
        }))
    }

    /// Whether any element is non-zero. False for an empty array.
    pub fn any(&self) -> Result<Scalar> {
        Ok(with_element!(self.dtype(), T => {
            Scalar::Bool(fold_scalar(self, false, |acc, _, x: T| acc || x.is_truthy()))
        }))
    }

    pub fn any_axis(&self, axis: isize, keepdims: bool) -> Result<NdArray> {
        let axis = self.reduction_axis("any", axis)?;
        Ok(with_element!(self.dtype(), T => {
            fold_along(
                self,
                axis,
                keepdims,
                false,
                |acc, _, x: T| acc || x.is_truthy(),
                |acc, _| acc,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> NdArray {
        NdArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap()
    }

    #[test]
    fn test_sum_full_and_axes() {
        let a = grid();
        assert_eq!(a.sum().unwrap(), Scalar::I64(21));
        assert_eq!(a.sum_axis(0, false).unwrap().to_vec::<i64>(), vec![5, 7, 9]);
        assert_eq!(a.sum_axis(1, false).unwrap().to_vec::<i64>(), vec![6, 15]);
        assert_eq!(
            a.sum_axis(-1, false).unwrap().to_vec::<i64>(),
            a.sum_axis(1, false).unwrap().to_vec::<i64>()
        );
        assert_eq!(a.sum_axis(0, false).unwrap().dtype(), DType::Int64);
    }

    #[test]
    fn test_keepdims_shape() {
        let a = grid();
        assert_eq!(a.sum_axis(1, true).unwrap().shape(), &[2, 1]);
        assert_eq!(a.max_axis(0, true).unwrap().shape(), &[1, 3]);
    }

    #[test]
    fn test_reducing_1d_gives_single_element() {
        let v = NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let s = v.sum_axis(0, false).unwrap();
        assert_eq!(s.shape(), &[1]);
        assert_eq!(s.to_vec::<f64>(), vec![3.0]);
    }

    #[test]
    fn test_axis_out_of_range() {
        let err = grid().sum_axis(2, false).unwrap_err();
        assert_eq!(err, NdError::Axis { axis: 2, ndim: 2 });
        assert!(grid().mean_axis(-3, false).is_err());
    }

    #[test]
    fn test_sum_dtypes() {
        let b = NdArray::from_vec(vec![true, true, false], &[3]).unwrap();
        assert_eq!(b.sum().unwrap(), Scalar::I64(2));
        let u = NdArray::from_vec(vec![200u8, 100], &[2]).unwrap();
        assert_eq!(u.sum().unwrap(), Scalar::U64(300));
        let f = NdArray::from_vec(vec![0.5f32, 0.25], &[2]).unwrap();
        assert_eq!(f.sum_axis(0, false).unwrap().dtype(), DType::Float32);
    }

    #[test]
    fn test_prod() {
        let a = grid();
        assert_eq!(a.prod().unwrap(), Scalar::I64(720));
        assert_eq!(a.prod_axis(0, false).unwrap().to_vec::<i64>(), vec![4, 10, 18]);
        let empty = NdArray::zeros(&[0], DType::Int8);
        assert_eq!(empty.prod().unwrap(), Scalar::I64(1));
    }

    #[test]
    fn test_mean_var_std() {
        let a = grid();
        assert_eq!(a.mean().unwrap(), Scalar::F64(3.5));
        assert_eq!(a.mean_axis(0, false).unwrap().to_vec::<f64>(), vec![2.5, 3.5, 4.5]);
        assert_relative_eq!(a.var(0).unwrap().as_f64(), 35.0 / 12.0, max_relative = 1e-12);
        assert_relative_eq!(a.var(1).unwrap().as_f64(), 3.5, max_relative = 1e-12);
        assert_relative_eq!(
            a.std(0).unwrap().as_f64(),
            (35.0f64 / 12.0).sqrt(),
            max_relative = 1e-12
        );
        let v = a.var_axis(1, false, 0).unwrap().to_vec::<f64>();
        assert_relative_eq!(v[0], 2.0 / 3.0, max_relative = 1e-12);
        assert_relative_eq!(v[1], 2.0 / 3.0, max_relative = 1e-12);
        assert_eq!(a.std_axis(1, true, 0).unwrap().shape(), &[2, 1]);
    }

    #[test]
    fn test_stat_dtypes_and_degenerate_cases() {
        let f = NdArray::from_vec(vec![1.0f32, 2.0], &[2]).unwrap();
        assert_eq!(f.mean_axis(0, false).unwrap().dtype(), DType::Float32);
        assert!(f.var(2).unwrap().as_f64().is_nan());
        let empty = NdArray::zeros(&[0], DType::Float64);
        assert!(empty.mean().unwrap().as_f64().is_nan());
    }

    #[test]
    fn test_mean_with_infinity() {
        let a = NdArray::from_vec(vec![f64::INFINITY, 1.0], &[2]).unwrap();
        assert_eq!(a.mean().unwrap().as_f64(), f64::INFINITY);
    }

    #[test]
    fn test_max_min() {
        let a = grid();
        assert_eq!(a.max().unwrap(), Scalar::I64(6));
        assert_eq!(a.min().unwrap(), Scalar::I64(1));
        let m = a.min_axis(1, false).unwrap();
        assert_eq!(m.dtype(), DType::Int32);
        assert_eq!(m.to_vec::<i32>(), vec![1, 4]);
    }

    #[test]
    fn test_max_propagates_nan() {
        let a = NdArray::from_vec(vec![1.0, f64::NAN, 3.0], &[3]).unwrap();
        assert!(a.max().unwrap().as_f64().is_nan());
        assert!(a.min().unwrap().as_f64().is_nan());
    }

    #[test]
    fn test_empty_extrema_error() {
        let empty = NdArray::zeros(&[0, 3], DType::Float64);
        assert_eq!(empty.max().unwrap_err(), NdError::EmptyReduction { op: "max" });
        assert!(matches!(
            empty.min_axis(0, false),
            Err(NdError::EmptyReduction { op: "min" })
        ));
        assert!(empty.argmax().is_err());
        assert_eq!(empty.max_axis(1, false).unwrap().shape(), &[0]);
    }

    #[test]
    fn test_argmax_argmin() {
        let a = NdArray::from_vec(vec![3i64, 9, 9, 1, 0, 4], &[2, 3]).unwrap();
        assert_eq!(a.argmax().unwrap(), Scalar::I64(1));
        assert_eq!(a.argmin().unwrap(), Scalar::I64(4));
        let am = a.argmax_axis(1, false).unwrap();
        assert_eq!(am.dtype(), DType::Int64);
        assert_eq!(am.to_vec::<i64>(), vec![1, 2]);
        assert_eq!(a.argmin_axis(0, false).unwrap().to_vec::<i64>(), vec![1, 1, 1]);
    }

    #[test]
    fn test_argmax_first_nan() {
        let a = NdArray::from_vec(vec![1.0, f64::NAN, 5.0, f64::NAN], &[4]).unwrap();
        assert_eq!(a.argmax().unwrap(), Scalar::I64(1));
        assert_eq!(a.argmin().unwrap(), Scalar::I64(1));
    }

    #[test]
    fn test_all_any() {
        let a = NdArray::from_vec(vec![1, 0, 2, 3], &[2, 2]).unwrap();
        assert_eq!(a.all().unwrap(), Scalar::Bool(false));
        assert_eq!(a.any().unwrap(), Scalar::Bool(true));
        assert_eq!(a.all_axis(1, false).unwrap().to_vec::<bool>(), vec![false, true]);
        assert_eq!(a.any_axis(0, false).unwrap().to_vec::<bool>(), vec![true, true]);
        let empty = NdArray::zeros(&[0], DType::Int8);
        assert_eq!(empty.all().unwrap(), Scalar::Bool(true));
        assert_eq!(empty.any().unwrap(), Scalar::Bool(false));
    }

    #[test]
    fn test_reduce_strided_view() {
        let a = NdArray::arange(0, 12, 1, None).unwrap().reshape(&[3, 4]).unwrap();
        let t = a.transpose(None).unwrap();
        assert_eq!(t.sum_axis(1, false).unwrap().to_vec::<i64>(), vec![12, 15, 18, 21]);
        let rev = a.slice(&["::-1", "::2"]).unwrap();
        assert_eq!(rev.max().unwrap(), Scalar::I64(10));
        assert_eq!(rev.argmax().unwrap(), Scalar::I64(1));
    }
}
