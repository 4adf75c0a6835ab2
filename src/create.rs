//! Array constructors.
//!
//! Every constructor allocates a new buffer and returns an owning,
//! C-contiguous array. Values are coerced into the requested dtype with the
//! same rule `set` uses.

use crate::dtype::{with_element, DType, Element};
use crate::kernel::total_len;
use crate::promote::result_type;
use crate::scalar::Scalar;
use crate::storage::Storage;
use crate::view::NdArray;
use crate::{NdError, Result};

/// Rectangular nested data accepted by [`NdArray::from_nested`].
///
/// Implemented for the eleven element primitives and for `Vec`, arrays and
/// slices of nested data, so `vec![[1, 2], [3, 4]]` and
/// `vec![vec![1.0], vec![2.0]]` both work.
pub trait NestedData {
    /// Dtype of the innermost elements.
    fn element_dtype() -> DType
    where
        Self: Sized;

    /// Append the elements in C order and return the shape of this level.
    fn collect_into(&self, out: &mut Vec<Scalar>) -> Result<Vec<usize>>;
}

macro_rules! impl_nested_leaf {
    ($($t:ty),*) => {
        $(
            impl NestedData for $t {
                fn element_dtype() -> DType {
                    <$t as Element>::DTYPE
                }

                fn collect_into(&self, out: &mut Vec<Scalar>) -> Result<Vec<usize>> {
                    out.push(self.to_scalar());
                    Ok(Vec::new())
                }
            }
        )*
    };
}

impl_nested_leaf!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

fn collect_level<U: NestedData>(items: &[U], out: &mut Vec<Scalar>) -> Result<Vec<usize>> {
    let mut inner: Option<Vec<usize>> = None;
    for item in items {
        let shape = item.collect_into(out)?;
        match &inner {
            None => inner = Some(shape),
            Some(first) if *first != shape => {
                return Err(NdError::ShapeMismatch {
                    lhs: first.clone(),
                    rhs: shape,
                });
            }
            Some(_) => {}
        }
    }
    let mut shape = vec![items.len()];
    shape.extend(inner.unwrap_or_default());
    Ok(shape)
}

impl<U: NestedData> NestedData for Vec<U> {
    fn element_dtype() -> DType {
        U::element_dtype()
    }

    fn collect_into(&self, out: &mut Vec<Scalar>) -> Result<Vec<usize>> {
        collect_level(self, out)
    }
}

impl<U: NestedData, const N: usize> NestedData for [U; N] {
    fn element_dtype() -> DType {
        U::element_dtype()
    }

    fn collect_into(&self, out: &mut Vec<Scalar>) -> Result<Vec<usize>> {
        collect_level(self, out)
    }
}

impl<U: NestedData> NestedData for &[U] {
    fn element_dtype() -> DType {
        U::element_dtype()
    }

    fn collect_into(&self, out: &mut Vec<Scalar>) -> Result<Vec<usize>> {
        collect_level(self, out)
    }
}

fn storage_from_scalars(values: &[Scalar], dtype: DType) -> Storage {
    with_element!(dtype, T => {
        T::into_storage(values.iter().map(|&v| T::from_scalar(v)).collect())
    })
}

fn storage_from_fn(dtype: DType, len: usize, f: impl Fn(usize) -> Scalar) -> Storage {
    with_element!(dtype, T => {
        T::into_storage((0..len).map(|i| T::from_scalar(f(i))).collect())
    })
}

/// [`storage_from_fn`] for a length computed from user input, reporting an
/// unallocatable length instead of aborting.
fn try_storage_from_fn(
    op: &'static str,
    dtype: DType,
    len: usize,
    f: impl Fn(usize) -> Scalar,
) -> Result<Storage> {
    with_element!(dtype, T => {
        let mut data: Vec<T> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| NdError::InvalidArgument {
                op,
                reason: format!("cannot allocate {len} elements of {dtype}: {e}"),
            })?;
        data.extend((0..len).map(|i| T::from_scalar(f(i))));
        Ok(T::into_storage(data))
    })
}

/// Scalar holding an integer known to fit in 64 bits.
fn int_scalar(v: i128) -> Scalar {
    if v > i64::MAX as i128 {
        Scalar::U64(v as u64)
    } else {
        Scalar::I64(v as i64)
    }
}

fn integral(s: Scalar) -> Option<i128> {
    match s {
        Scalar::Bool(b) => Some(b as i128),
        Scalar::I64(v) => Some(v as i128),
        Scalar::U64(v) => Some(v as i128),
        Scalar::F64(_) => None,
    }
}

impl NdArray {
    // ------------------------------------------------------------------------
    // Filled arrays
    // ------------------------------------------------------------------------

    pub fn zeros(shape: &[usize], dtype: DType) -> NdArray {
        NdArray::owned(Storage::zeros(dtype, total_len(shape)), shape.to_vec())
    }

    pub fn ones(shape: &[usize], dtype: DType) -> NdArray {
        NdArray::full(shape, true, Some(dtype))
    }

    /// Allocate without a meaningful fill value. Contents are zero.
    pub fn empty(shape: &[usize], dtype: DType) -> NdArray {
        NdArray::zeros(shape, dtype)
    }

    /// Array filled with `value`, in `dtype` or the value's own dtype.
    pub fn full(shape: &[usize], value: impl Into<Scalar>, dtype: Option<DType>) -> NdArray {
        let value = value.into();
        let dtype = dtype.unwrap_or_else(|| value.natural_dtype());
        let len = total_len(shape);
        let storage = with_element!(dtype, T => T::into_storage(vec![T::from_scalar(value); len]));
        NdArray::owned(storage, shape.to_vec())
    }

    pub fn zeros_like(&self) -> NdArray {
        NdArray::zeros(self.shape(), self.dtype())
    }

    /// Same shape and dtype, contents zero like [`empty`](Self::empty).
    pub fn empty_like(&self) -> NdArray {
        NdArray::empty(self.shape(), self.dtype())
    }

    pub fn ones_like(&self) -> NdArray {
        NdArray::ones(self.shape(), self.dtype())
    }

    pub fn full_like(&self, value: impl Into<Scalar>) -> NdArray {
        NdArray::full(self.shape(), value, Some(self.dtype()))
    }

    // ------------------------------------------------------------------------
    // From data
    // ------------------------------------------------------------------------

    /// Wrap C-order data with the given shape.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<NdArray> {
        if data.len() != total_len(shape) {
            return Err(NdError::ReshapeSize {
                from: vec![data.len()],
                to: shape.iter().map(|&d| d as isize).collect(),
            });
        }
        Ok(NdArray::from_typed(data, shape.to_vec()))
    }

    /// Build from nested rectangular data, e.g. `vec![vec![1, 2], vec![3, 4]]`.
    ///
    /// Ragged input is a shape mismatch naming the two disagreeing row shapes.
    pub fn from_nested<D: NestedData>(data: &D, dtype: Option<DType>) -> Result<NdArray> {
        let mut values = Vec::new();
        let shape = data.collect_into(&mut values)?;
        let dtype = dtype.unwrap_or_else(D::element_dtype);
        Ok(NdArray::owned(storage_from_scalars(&values, dtype), shape))
    }

    /// Build from scalars in C order.
    ///
    /// Without an explicit dtype the result is the promotion of the scalars'
    /// natural dtypes (`float64` for no values).
    pub fn from_scalars(
        values: &[Scalar],
        shape: &[usize],
        dtype: Option<DType>,
    ) -> Result<NdArray> {
        if values.len() != total_len(shape) {
            return Err(NdError::ReshapeSize {
                from: vec![values.len()],
                to: shape.iter().map(|&d| d as isize).collect(),
            });
        }
        let dtype = dtype.unwrap_or_else(|| {
            values
                .iter()
                .map(Scalar::natural_dtype)
                .reduce(result_type)
                .unwrap_or(DType::Float64)
        });
        Ok(NdArray::owned(storage_from_scalars(values, dtype), shape.to_vec()))
    }

    /// Rebuild an array from native-endian C-order bytes.
    pub fn from_bytes(bytes: &[u8], dtype: DType, shape: &[usize]) -> Result<NdArray> {
        let expected = total_len(shape) * dtype.itemsize();
        if bytes.len() != expected {
            return Err(NdError::ByteLength {
                expected,
                found: bytes.len(),
            });
        }
        Ok(NdArray::owned(Storage::from_bytes(dtype, bytes)?, shape.to_vec()))
    }

    // ------------------------------------------------------------------------
    // Ranges
    // ------------------------------------------------------------------------

    /// Values `start, start + step, ...` up to but excluding `stop`.
    ///
    /// Integer arguments are stepped exactly in integer arithmetic and default
    /// to `int64`; any float argument switches to `float64`.
    pub fn arange(
        start: impl Into<Scalar>,
        stop: impl Into<Scalar>,
        step: impl Into<Scalar>,
        dtype: Option<DType>,
    ) -> Result<NdArray> {
        let (start, stop, step) = (start.into(), stop.into(), step.into());
        if !step.as_bool() {
            return Err(NdError::InvalidArgument {
                op: "arange",
                reason: "step must not be zero".to_string(),
            });
        }

        let too_long = |count: String| NdError::InvalidArgument {
            op: "arange",
            reason: format!("{count} elements do not fit in memory"),
        };

        if let (Some(a), Some(b), Some(s)) = (integral(start), integral(stop), integral(step)) {
            let span = if s > 0 { b - a } else { a - b };
            let count = if span > 0 {
                (span + s.abs() - 1) / s.abs()
            } else {
                0
            };
            let n = usize::try_from(count).map_err(|_| too_long(count.to_string()))?;
            let dtype = dtype.unwrap_or(DType::Int64);
            let storage =
                try_storage_from_fn("arange", dtype, n, |i| int_scalar(a + i as i128 * s))?;
            return Ok(NdArray::owned(storage, vec![n]));
        }

        let (a, b, s) = (start.as_f64(), stop.as_f64(), step.as_f64());
        let count = ((b - a) / s).ceil();
        if count.is_infinite() || count >= usize::MAX as f64 {
            return Err(too_long(count.to_string()));
        }
        // NaN and non-positive counts give an empty range.
        let n = if count > 0.0 { count as usize } else { 0 };
        let dtype = dtype.unwrap_or(DType::Float64);
        let storage = try_storage_from_fn("arange", dtype, n, |i| Scalar::F64(a + i as f64 * s))?;
        Ok(NdArray::owned(storage, vec![n]))
    }

    /// `num` evenly spaced values over `[start, stop]` (or `[start, stop)`).
    pub fn linspace(
        start: f64,
        stop: f64,
        num: usize,
        endpoint: bool,
        dtype: Option<DType>,
    ) -> NdArray {
        let values = linspace_values(start, stop, num, endpoint);
        let dtype = dtype.unwrap_or(DType::Float64);
        let storage = storage_from_fn(dtype, num, |i| Scalar::F64(values[i]));
        NdArray::owned(storage, vec![num])
    }

    /// `base` raised to `num` evenly spaced exponents.
    pub fn logspace(
        start: f64,
        stop: f64,
        num: usize,
        endpoint: bool,
        base: f64,
        dtype: Option<DType>,
    ) -> NdArray {
        let exponents = linspace_values(start, stop, num, endpoint);
        let dtype = dtype.unwrap_or(DType::Float64);
        let storage = storage_from_fn(dtype, num, |i| Scalar::F64(base.powf(exponents[i])));
        NdArray::owned(storage, vec![num])
    }

    /// `num` values in geometric progression from `start` to `stop`.
    ///
    /// Both endpoints must be non-zero and of the same sign.
    pub fn geomspace(
        start: f64,
        stop: f64,
        num: usize,
        endpoint: bool,
        dtype: Option<DType>,
    ) -> Result<NdArray> {
        let invalid = |reason: &str| NdError::InvalidArgument {
            op: "geomspace",
            reason: reason.to_string(),
        };
        if start == 0.0 || stop == 0.0 {
            return Err(invalid("endpoints must be non-zero"));
        }
        if start.is_sign_negative() != stop.is_sign_negative() {
            return Err(invalid("endpoints must have the same sign"));
        }
        let sign = start.signum();
        let exponents = linspace_values(start.abs().log10(), stop.abs().log10(), num, endpoint);
        let mut values: Vec<f64> = exponents.iter().map(|&e| sign * 10f64.powf(e)).collect();
        // Pin the endpoints exactly; the log round trip drifts.
        if let Some(first) = values.first_mut() {
            *first = start;
        }
        if endpoint && num > 1 {
            if let Some(last) = values.last_mut() {
                *last = stop;
            }
        }
        let dtype = dtype.unwrap_or(DType::Float64);
        let storage = storage_from_fn(dtype, num, |i| Scalar::F64(values[i]));
        Ok(NdArray::owned(storage, vec![num]))
    }

    // ------------------------------------------------------------------------
    // Matrices
    // ------------------------------------------------------------------------

    /// `n × m` array with ones on diagonal `k` (positive `k` is above the main
    /// diagonal).
    pub fn eye(n: usize, m: Option<usize>, k: isize, dtype: DType) -> NdArray {
        let m = m.unwrap_or(n);
        let storage = storage_from_fn(dtype, n * m, |i| {
            let (r, c) = ((i / m) as isize, (i % m) as isize);
            Scalar::Bool(c - r == k)
        });
        NdArray::owned(storage, vec![n, m])
    }

    /// Square identity matrix.
    pub fn identity(n: usize, dtype: DType) -> NdArray {
        NdArray::eye(n, None, 0, dtype)
    }
}

fn linspace_values(start: f64, stop: f64, num: usize, endpoint: bool) -> Vec<f64> {
    let div = if endpoint { num.saturating_sub(1) } else { num };
    let step = if div > 0 {
        (stop - start) / div as f64
    } else {
        0.0
    };
    let mut values: Vec<f64> = (0..num).map(|i| start + i as f64 * step).collect();
    if endpoint && num > 1 {
        values[num - 1] = stop;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zeros_ones_full() {
        let z = NdArray::zeros(&[2, 3], DType::Int16);
        assert_eq!(z.to_vec::<i16>(), vec![0; 6]);
        let o = NdArray::ones(&[2], DType::Float32);
        assert_eq!(o.to_vec::<f32>(), vec![1.0, 1.0]);
        let f = NdArray::full(&[3], 7, None);
        assert_eq!(f.dtype(), DType::Int64);
        assert_eq!(NdArray::full(&[2], 300, Some(DType::UInt8)).to_vec::<u8>(), vec![44, 44]);
        assert_eq!(NdArray::empty(&[2, 2], DType::Bool).to_vec::<bool>(), vec![false; 4]);
    }

    #[test]
    fn test_zero_dim_request_becomes_1d() {
        let z = NdArray::zeros(&[], DType::Float64);
        assert_eq!(z.shape(), &[1]);
        assert_eq!(z.size(), 1);
    }

    #[test]
    fn test_like_constructors() {
        let a = NdArray::zeros(&[2, 2], DType::UInt32);
        assert_eq!(a.ones_like().to_vec::<u32>(), vec![1; 4]);
        assert_eq!(a.full_like(-1).to_vec::<u32>(), vec![u32::MAX; 4]);
        assert_eq!(a.zeros_like().dtype(), DType::UInt32);
        let e = a.transpose(None).unwrap().empty_like();
        assert_eq!(e.shape(), &[2, 2]);
        assert_eq!(e.dtype(), DType::UInt32);
        assert!(e.flags().owns_data);
        assert!(!e.shares_buffer(&a));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(NdArray::from_vec(vec![1u8, 2, 3], &[3]).is_ok());
        assert!(matches!(
            NdArray::from_vec(vec![1u8, 2, 3], &[2, 2]),
            Err(NdError::ReshapeSize { .. })
        ));
    }

    #[test]
    fn test_from_nested() {
        let a = NdArray::from_nested(&vec![vec![1i32, 2, 3], vec![4, 5, 6]], None).unwrap();
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.dtype(), DType::Int32);
        let b = NdArray::from_nested(&[[1.5f64], [2.5]], Some(DType::Int8)).unwrap();
        assert_eq!(b.shape(), &[2, 1]);
        assert_eq!(b.to_vec::<i8>(), vec![2, 3]);
    }

    #[test]
    fn test_from_nested_ragged() {
        let err = NdArray::from_nested(&vec![vec![1i32, 2], vec![3]], None).unwrap_err();
        assert_eq!(
            err,
            NdError::ShapeMismatch {
                lhs: vec![2],
                rhs: vec![1]
            }
        );
    }

    #[test]
    fn test_from_scalars_promotes() {
        let vals = [Scalar::I64(1), Scalar::F64(2.5)];
        let a = NdArray::from_scalars(&vals, &[2], None).unwrap();
        assert_eq!(a.dtype(), DType::Float64);
        let b = NdArray::from_scalars(&[Scalar::Bool(true)], &[1], None).unwrap();
        assert_eq!(b.dtype(), DType::Bool);
    }

    #[test]
    fn test_from_bytes() {
        let a = NdArray::from_vec(vec![1i32, -2, 3, -4], &[2, 2]).unwrap();
        let b = NdArray::from_bytes(&a.to_bytes(), DType::Int32, &[2, 2]).unwrap();
        assert_eq!(b.to_vec::<i32>(), vec![1, -2, 3, -4]);
        assert_eq!(
            NdArray::from_bytes(&[0u8; 10], DType::Int32, &[2, 2]).unwrap_err(),
            NdError::ByteLength {
                expected: 16,
                found: 10
            }
        );
    }

    #[test]
    fn test_arange_integer() {
        let a = NdArray::arange(0, 10, 3, None).unwrap();
        assert_eq!(a.dtype(), DType::Int64);
        assert_eq!(a.to_vec::<i64>(), vec![0, 3, 6, 9]);
        let b = NdArray::arange(5, 0, -2, Some(DType::Int8)).unwrap();
        assert_eq!(b.to_vec::<i8>(), vec![5, 3, 1]);
        assert_eq!(NdArray::arange(3, 3, 1, None).unwrap().shape(), &[0]);
        assert!(matches!(
            NdArray::arange(0, 3, 0, None),
            Err(NdError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_arange_float() {
        let a = NdArray::arange(0.0, 1.0, 0.25, None).unwrap();
        assert_eq!(a.dtype(), DType::Float64);
        assert_eq!(a.to_vec::<f64>(), vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(NdArray::arange(0, 2.5, 1, None).unwrap().size(), 3);
    }

    #[test]
    fn test_arange_rejects_unallocatable_lengths() {
        for result in [
            NdArray::arange(0.0, 1e30, 1.0, None),
            NdArray::arange(0.0, f64::INFINITY, 1.0, None),
            NdArray::arange(i64::MIN, i64::MAX, 1, None),
        ] {
            assert!(matches!(
                result,
                Err(NdError::InvalidArgument { op: "arange", .. })
            ));
        }
        assert_eq!(NdArray::arange(0.0, f64::NAN, 1.0, None).unwrap().size(), 0);
    }

    #[test]
    fn test_linspace() {
        let a = NdArray::linspace(0.0, 1.0, 5, true, None);
        assert_eq!(a.to_vec::<f64>(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let b = NdArray::linspace(0.0, 1.0, 4, false, None);
        assert_eq!(b.to_vec::<f64>(), vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(NdArray::linspace(3.0, 9.0, 1, true, None).to_vec::<f64>(), vec![3.0]);
        assert_eq!(NdArray::linspace(0.0, 1.0, 0, true, None).size(), 0);
    }

    #[test]
    fn test_logspace_and_geomspace() {
        let a = NdArray::logspace(0.0, 3.0, 4, true, 10.0, None);
        let got = a.to_vec::<f64>();
        for (x, y) in got.iter().zip([1.0, 10.0, 100.0, 1000.0]) {
            assert_relative_eq!(*x, y, max_relative = 1e-12);
        }
        let g = NdArray::geomspace(-1.0, -1000.0, 4, true, None).unwrap();
        let got = g.to_vec::<f64>();
        assert_eq!(got[0], -1.0);
        assert_relative_eq!(got[1], -10.0, max_relative = 1e-12);
        assert_eq!(got[3], -1000.0);
        assert!(NdArray::geomspace(0.0, 1.0, 3, true, None).is_err());
        assert!(NdArray::geomspace(-1.0, 1.0, 3, true, None).is_err());
    }

    #[test]
    fn test_eye_and_identity() {
        let e = NdArray::eye(2, Some(3), 1, DType::Int32);
        assert_eq!(e.to_vec::<i32>(), vec![0, 1, 0, 0, 0, 1]);
        let i = NdArray::identity(3, DType::Bool);
        assert_eq!(
            i.to_vec::<bool>(),
            vec![true, false, false, false, true, false, false, false, true]
        );
    }
}
