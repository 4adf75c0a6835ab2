//! The public array handle: a strided view over a shared [`Buffer`].
//!
//! An [`NdArray`] is `(buffer, shape, strides, offset)` plus ownership flags.
//! Strides are in elements and may be zero (broadcast) or negative (reversed).
//! Cloning a handle is cheap and aliases the same buffer; [`NdArray::copy`]
//! makes an independent one.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::dtype::{with_element, DType, Element};
use crate::kernel::{self, Layout, OffsetWalker};
use crate::scalar::Scalar;
use crate::storage::{typed, typed_mut, Buffer, BufferId, Storage};
use crate::{fmt_shape, NdError, Result};

// ============================================================================
// Stride helpers
// ============================================================================

/// Check that every element reachable through the view lies in `[0, len)`.
fn validate_bounds(len: usize, dims: &[usize], strides: &[isize], offset: usize) -> Result<()> {
    let invalid = |reason: String| NdError::InvalidArgument {
        op: "view_of",
        reason,
    };
    if dims.len() != strides.len() {
        return Err(invalid(format!(
            "{} strides for {} axes",
            strides.len(),
            dims.len()
        )));
    }
    // Empty array - no access needed
    if dims.contains(&0) {
        return Ok(());
    }
    let overflow = || invalid("offset overflow".to_string());
    let mut min_offset = offset as isize;
    let mut max_offset = offset as isize;
    for (&dim, &stride) in dims.iter().zip(strides) {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or_else(overflow)?;
            if end >= 0 {
                max_offset = max_offset.checked_add(end).ok_or_else(overflow)?;
            } else {
                min_offset = min_offset.checked_add(end).ok_or_else(overflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset as usize >= len {
        return Err(invalid(format!(
            "elements {min_offset}..={max_offset} outside buffer of length {len}"
        )));
    }
    Ok(())
}

/// Column-major strides (first index varies fastest).
pub fn col_major_strides(dims: &[usize]) -> Vec<isize> {
    let rank = dims.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in 1..rank {
        strides[i] = strides[i - 1] * dims[i - 1] as isize;
    }
    strides
}

/// Row-major strides (last index varies fastest).
pub fn row_major_strides(dims: &[usize]) -> Vec<isize> {
    let rank = dims.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * dims[i + 1] as isize;
    }
    strides
}

fn is_f_contiguous(dims: &[usize], strides: &[isize]) -> bool {
    let rev_dims: Vec<usize> = dims.iter().rev().copied().collect();
    let rev_strides: Vec<isize> = strides.iter().rev().copied().collect();
    kernel::is_contiguous(&rev_dims, &rev_strides)
}

/// Resolve a possibly negative axis against `ndim`, wrapping once.
pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let n = ndim as isize;
    let resolved = if axis < 0 { axis + n } else { axis };
    if (0..n).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(NdError::Axis { axis, ndim })
    }
}

/// Resolve a possibly negative index against an axis of `size`, wrapping once.
pub(crate) fn normalize_index(index: isize, size: usize) -> Option<usize> {
    let n = size as isize;
    let resolved = if index < 0 { index + n } else { index };
    (0..n).contains(&resolved).then_some(resolved as usize)
}

// ============================================================================
// NdArray
// ============================================================================

/// Ownership and layout flags of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayFlags {
    /// The view was created together with its buffer.
    pub owns_data: bool,
    /// `set`/`fill` are allowed. Broadcast views are read-only.
    pub writeable: bool,
    pub c_contiguous: bool,
    pub f_contiguous: bool,
}

/// A strided N-dimensional array.
///
/// Never zero-dimensional: operations that would remove the last axis produce
/// shape `[1]` instead.
#[derive(Clone)]
pub struct NdArray {
    buffer: Arc<Buffer>,
    shape: Arc<[usize]>,
    strides: Arc<[isize]>,
    offset: usize,
    /// Root owning array of a derived view. Chains collapse to the root.
    base: Option<Arc<NdArray>>,
    owns_data: bool,
    writeable: bool,
}

impl NdArray {
    /// Owning C-contiguous array over freshly created storage.
    pub(crate) fn owned(storage: Storage, shape: Vec<usize>) -> NdArray {
        let shape = at_least_1d(shape);
        debug_assert_eq!(storage.len(), kernel::total_len(&shape));
        let strides = row_major_strides(&shape);
        NdArray {
            buffer: Buffer::new(storage),
            shape: shape.into(),
            strides: strides.into(),
            offset: 0,
            base: None,
            owns_data: true,
            writeable: true,
        }
    }

    pub(crate) fn from_typed<T: Element>(data: Vec<T>, shape: Vec<usize>) -> NdArray {
        NdArray::owned(T::into_storage(data), shape)
    }

    /// Non-owning view of an existing buffer.
    ///
    /// The strides and offset are checked so that every reachable element lies
    /// inside the buffer.
    pub fn view_of(
        buffer: Arc<Buffer>,
        shape: &[usize],
        strides: &[isize],
        offset: usize,
    ) -> Result<NdArray> {
        validate_bounds(buffer.len(), shape, strides, offset)?;
        if shape.is_empty() {
            return Err(NdError::InvalidArgument {
                op: "view_of",
                reason: "zero-dimensional views are not supported".to_string(),
            });
        }
        Ok(NdArray {
            buffer,
            shape: shape.into(),
            strides: strides.into(),
            offset,
            base: None,
            owns_data: false,
            writeable: true,
        })
    }

    /// New view over the same buffer. Callers guarantee the layout is in bounds.
    pub(crate) fn derive(&self, shape: Vec<usize>, strides: Vec<isize>, offset: usize) -> NdArray {
        let (shape, strides) = if shape.is_empty() {
            (vec![1], vec![1])
        } else {
            (shape, strides)
        };
        debug_assert!(validate_bounds(self.buffer.len(), &shape, &strides, offset).is_ok());
        NdArray {
            buffer: Arc::clone(&self.buffer),
            shape: shape.into(),
            strides: strides.into(),
            offset,
            base: self.root(),
            owns_data: false,
            writeable: self.writeable,
        }
    }

    /// Like [`derive`](Self::derive) but never writeable.
    pub(crate) fn derive_readonly(
        &self,
        shape: Vec<usize>,
        strides: Vec<isize>,
        offset: usize,
    ) -> NdArray {
        let mut view = self.derive(shape, strides, offset);
        view.writeable = false;
        view
    }

    /// Relabel a fresh owning C-contiguous array with another shape of the
    /// same size.
    pub(crate) fn with_c_shape(mut self, shape: Vec<usize>) -> NdArray {
        debug_assert!(self.owns_data && self.is_c_contiguous());
        let shape = at_least_1d(shape);
        debug_assert_eq!(kernel::total_len(&shape), self.size());
        self.strides = row_major_strides(&shape).into();
        self.shape = shape.into();
        self
    }

    fn root(&self) -> Option<Arc<NdArray>> {
        if self.owns_data {
            Some(Arc::new(self.clone()))
        } else {
            self.base.clone()
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Strides in elements.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Position of the first element within the buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        kernel::total_len(&self.shape)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[inline]
    pub fn itemsize(&self) -> usize {
        self.dtype().itemsize()
    }

    /// Bytes spanned by the elements of this view (not the whole buffer).
    #[inline]
    pub fn nbytes(&self) -> usize {
        self.size() * self.itemsize()
    }

    pub fn flags(&self) -> ArrayFlags {
        ArrayFlags {
            owns_data: self.owns_data,
            writeable: self.writeable,
            c_contiguous: self.is_c_contiguous(),
            f_contiguous: is_f_contiguous(&self.shape, &self.strides),
        }
    }

    #[inline]
    pub fn is_c_contiguous(&self) -> bool {
        kernel::is_contiguous(&self.shape, &self.strides)
    }

    /// The owning array this view was derived from, if any.
    pub fn base(&self) -> Option<&NdArray> {
        self.base.as_deref()
    }

    /// The underlying buffer.
    #[inline]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    #[inline]
    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Whether both arrays read from the same buffer.
    pub fn shares_buffer(&self, other: &NdArray) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    #[inline]
    pub(crate) fn layout(&self) -> Layout<'_> {
        Layout::new(&self.shape, &self.strides, self.offset)
    }

    pub(crate) fn ensure_writeable(&self) -> Result<()> {
        if self.writeable {
            Ok(())
        } else {
            Err(NdError::ReadOnly)
        }
    }

    // ------------------------------------------------------------------------
    // Element access
    // ------------------------------------------------------------------------

    fn element_offset(&self, indices: &[isize]) -> Result<usize> {
        if indices.len() != self.ndim() {
            return Err(NdError::IndexCount {
                expected: self.ndim(),
                found: indices.len(),
            });
        }
        let mut pos = self.offset as isize;
        for (axis, ((&index, &size), &stride)) in indices
            .iter()
            .zip(self.shape.iter())
            .zip(self.strides.iter())
            .enumerate()
        {
            let i = normalize_index(index, size).ok_or(NdError::Index { axis, index, size })?;
            pos += i as isize * stride;
        }
        Ok(pos as usize)
    }

    /// Read one element. Negative indices count from the end of their axis.
    pub fn get(&self, indices: &[isize]) -> Result<Scalar> {
        let pos = self.element_offset(indices)?;
        Ok(self.buffer.read().get(pos))
    }

    /// Write one element, coercing `value` into the array's dtype.
    ///
    /// The write is visible through every view of the same buffer.
    pub fn set(&self, indices: &[isize], value: impl Into<Scalar>) -> Result<()> {
        self.ensure_writeable()?;
        let pos = self.element_offset(indices)?;
        self.buffer.write().set(pos, value.into());
        Ok(())
    }

    /// Write `value` into every element of the view.
    pub fn fill(&self, value: impl Into<Scalar>) -> Result<()> {
        self.ensure_writeable()?;
        let value = value.into();
        let mut storage = self.buffer.write();
        with_element!(self.dtype(), T => {
            let v = T::from_scalar(value);
            let data = typed_mut::<T>(&mut storage);
            for [pos] in OffsetWalker::new(&self.shape, [&self.strides[..]], [self.offset]) {
                data[pos] = v;
            }
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Copies and conversion
    // ------------------------------------------------------------------------

    /// Owning C-contiguous copy. Always allocates, even for contiguous input.
    pub fn materialize(&self) -> NdArray {
        debug!(
            "materialize: shape={} dtype={} from buffer {}",
            fmt_shape(&self.shape),
            self.dtype(),
            self.buffer.id()
        );
        let storage = self.buffer.read();
        with_element!(self.dtype(), T => {
            let data: Vec<T> = kernel::map1(typed::<T>(&storage), self.layout(), |x| x);
            NdArray::from_typed(data, self.shape.to_vec())
        })
    }

    /// Independent copy; same as [`materialize`](Self::materialize).
    pub fn copy(&self) -> NdArray {
        self.materialize()
    }

    /// Owning copy converted to `dtype` with the engine-wide coercion rule.
    pub fn astype(&self, dtype: DType) -> NdArray {
        if dtype == self.dtype() {
            return self.materialize();
        }
        debug!(
            "astype: {} -> {} shape={}",
            self.dtype(),
            dtype,
            fmt_shape(&self.shape)
        );
        let storage = self.buffer.read();
        with_element!(self.dtype(), S => {
            let src = typed::<S>(&storage);
            with_element!(dtype, D => {
                let data: Vec<D> =
                    kernel::map1(src, self.layout(), |x: S| D::from_scalar(x.to_scalar()));
                NdArray::from_typed(data, self.shape.to_vec())
            })
        })
    }

    /// This array when it already has `dtype`, otherwise a converted copy.
    pub(crate) fn as_dtype(&self, dtype: DType) -> NdArray {
        if self.dtype() == dtype {
            self.clone()
        } else {
            self.astype(dtype)
        }
    }

    /// Elements in C order, coerced to `T`.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        let storage = self.buffer.read();
        with_element!(self.dtype(), S => {
            kernel::map1(typed::<S>(&storage), self.layout(), |x: S| {
                T::from_scalar(x.to_scalar())
            })
        })
    }

    /// Elements in C order as scalars.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        let storage = self.buffer.read();
        with_element!(self.dtype(), S => {
            let values: Vec<S> = kernel::map1(typed::<S>(&storage), self.layout(), |x| x);
            values.into_iter().map(Element::to_scalar).collect()
        })
    }

    /// Native-endian bytes of the elements in C order.
    ///
    /// Together with [`DType::descr`] and [`shape`](Self::shape) this is what a
    /// serializer needs to write the array.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_c_contiguous() {
            let width = self.itemsize();
            let start = self.offset * width;
            let storage = self.buffer.read();
            return storage.as_bytes()[start..start + self.nbytes()].to_vec();
        }
        self.materialize().to_bytes()
    }
}

/// Replace a zero-dimensional shape with `[1]`.
pub(crate) fn at_least_1d(shape: Vec<usize>) -> Vec<usize> {
    if shape.is_empty() {
        vec![1]
    } else {
        shape
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("dtype", &self.dtype())
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("buffer", &self.buffer.id())
            .field("owns_data", &self.owns_data)
            .field("writeable", &self.writeable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange_i32(shape: &[usize]) -> NdArray {
        let n: usize = shape.iter().product();
        NdArray::from_typed((0..n as i32).collect::<Vec<_>>(), shape.to_vec())
    }

    #[test]
    fn test_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(col_major_strides(&[2, 3, 4]), vec![1, 2, 6]);
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(6, &[2, 3], &[3, 1], 0).is_ok());
        assert!(validate_bounds(6, &[2, 3], &[3, 1], 1).is_err());
        assert!(validate_bounds(4, &[4], &[-1], 3).is_ok());
        assert!(validate_bounds(4, &[4], &[-1], 2).is_err());
        assert!(validate_bounds(0, &[0, 5], &[5, 1], 0).is_ok());
    }

    #[test]
    fn test_normalize_axis() {
        assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
        assert_eq!(normalize_axis(0, 3).unwrap(), 0);
        assert_eq!(
            normalize_axis(3, 3).unwrap_err(),
            NdError::Axis { axis: 3, ndim: 3 }
        );
        assert!(normalize_axis(-4, 3).is_err());
    }

    #[test]
    fn test_owned_properties() {
        let a = arange_i32(&[2, 3]);
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.strides(), &[3, 1]);
        assert_eq!(a.ndim(), 2);
        assert_eq!(a.size(), 6);
        assert_eq!(a.nbytes(), 24);
        let flags = a.flags();
        assert!(flags.owns_data && flags.writeable && flags.c_contiguous);
        assert!(!flags.f_contiguous);
        assert!(a.base().is_none());
    }

    #[test]
    fn test_get_negative_and_out_of_bounds() {
        let a = arange_i32(&[2, 3]);
        assert_eq!(a.get(&[1, -1]).unwrap(), Scalar::I64(5));
        assert_eq!(
            a.get(&[0, 3]).unwrap_err(),
            NdError::Index {
                axis: 1,
                index: 3,
                size: 3
            }
        );
        assert_eq!(
            a.get(&[0]).unwrap_err(),
            NdError::IndexCount {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_set_wraps_and_rounds() {
        let a = NdArray::from_typed(vec![0i8; 3], vec![3]);
        a.set(&[0], 128).unwrap();
        a.set(&[1], 2.5).unwrap();
        a.set(&[-1], -0.4).unwrap();
        assert_eq!(a.to_vec::<i8>(), vec![-128, 3, 0]);
    }

    #[test]
    fn test_derived_view_aliases_root() {
        let a = arange_i32(&[2, 3]);
        // Second column as a strided view.
        let col = a.derive(vec![2], vec![3], 1);
        let col_of_col = col.derive(vec![1], vec![3], 4);
        assert!(col.shares_buffer(&a));
        assert!(!col.flags().owns_data);
        let root = col_of_col.base().unwrap();
        assert_eq!(root.shape(), a.shape());
        assert!(root.base().is_none());

        col.set(&[1], 40).unwrap();
        assert_eq!(a.get(&[1, 1]).unwrap(), Scalar::I64(40));
    }

    #[test]
    fn test_fill_strided() {
        let a = arange_i32(&[2, 3]);
        let col = a.derive(vec![2], vec![3], 2);
        col.fill(-1).unwrap();
        assert_eq!(a.to_vec::<i32>(), vec![0, 1, -1, 3, 4, -1]);
    }

    #[test]
    fn test_readonly_view_rejects_writes() {
        let a = arange_i32(&[3]);
        let b = a.derive_readonly(vec![2, 3], vec![0, 1], 0);
        assert_eq!(b.set(&[0, 0], 1).unwrap_err(), NdError::ReadOnly);
        assert_eq!(b.fill(1).unwrap_err(), NdError::ReadOnly);
        assert!(!b.flags().writeable);
    }

    #[test]
    fn test_materialize_always_allocates() {
        let a = arange_i32(&[2, 2]);
        let m = a.materialize();
        assert!(!m.shares_buffer(&a));
        assert!(m.flags().owns_data);
        assert_eq!(m.to_vec::<i32>(), a.to_vec::<i32>());
    }

    #[test]
    fn test_materialize_transposed() {
        let a = arange_i32(&[2, 3]);
        let t = a.derive(vec![3, 2], vec![1, 3], 0);
        assert!(t.flags().f_contiguous);
        let m = t.materialize();
        assert_eq!(m.strides(), &[2, 1]);
        assert_eq!(m.to_vec::<i32>(), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_astype() {
        let a = NdArray::from_typed(vec![1.5f64, -2.5, 300.0], vec![3]);
        let b = a.astype(DType::UInt8);
        assert_eq!(b.dtype(), DType::UInt8);
        assert_eq!(b.to_vec::<u8>(), vec![2, 253, 44]);
        assert_eq!(a.astype(DType::Bool).to_vec::<bool>(), vec![true; 3]);
    }

    #[test]
    fn test_to_scalars_and_bytes() {
        let a = NdArray::from_typed(vec![1u16, 2, 3, 4], vec![2, 2]);
        assert_eq!(a.to_scalars()[3], Scalar::U64(4));
        let t = a.derive(vec![2, 2], vec![1, 2], 0);
        let bytes = t.to_bytes();
        let back: Vec<u16> = bytes
            .chunks(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(back, vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_view_of_checks_bounds() {
        let buf = Buffer::from_vec(vec![1.0f32, 2.0, 3.0, 4.0]);
        let v = NdArray::view_of(Arc::clone(&buf), &[2], &[2], 1).unwrap();
        assert_eq!(v.to_vec::<f32>(), vec![2.0, 4.0]);
        assert!(!v.flags().owns_data);
        assert!(NdArray::view_of(buf, &[3], &[2], 0).is_err());
    }
}
