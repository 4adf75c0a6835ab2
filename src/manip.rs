//! Shape manipulation: reshape, transpose, squeeze, broadcast, join.
//!
//! Everything except `flatten`, the joins and the repeats returns a view over
//! the source buffer when the layout allows it.

use log::debug;

use crate::dtype::with_element;
use crate::kernel::{self, Layout};
use crate::promote::{broadcast_shapes, broadcast_strides, result_type};
use crate::storage::{typed, typed_mut, Storage};
use crate::view::{normalize_axis, row_major_strides, NdArray};
use crate::{fmt_shape, NdError, Result};

impl NdArray {
    /// Give the array a new shape with the same number of elements.
    ///
    /// At most one dimension may be `-1`; its size is inferred. A C-contiguous
    /// source yields a view, anything else is copied first.
    pub fn reshape(&self, dims: &[isize]) -> Result<NdArray> {
        let shape = self.resolve_reshape(dims)?;
        if self.is_c_contiguous() {
            let strides = row_major_strides(&shape);
            return Ok(self.derive(shape, strides, self.offset()));
        }
        debug!(
            "reshape: copying non-contiguous {} into {}",
            fmt_shape(self.shape()),
            fmt_shape(&shape)
        );
        Ok(self.materialize().with_c_shape(shape))
    }

    fn resolve_reshape(&self, dims: &[isize]) -> Result<Vec<usize>> {
        let size = self.size();
        let err = || NdError::ReshapeSize {
            from: self.shape().to_vec(),
            to: dims.to_vec(),
        };

        let mut inferred = None;
        let mut known = 1usize;
        for (i, &d) in dims.iter().enumerate() {
            match d {
                -1 if inferred.is_none() => inferred = Some(i),
                d if d >= 0 => known = known.checked_mul(d as usize).ok_or_else(err)?,
                _ => return Err(err()),
            }
        }

        let mut shape: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        match inferred {
            Some(i) => {
                if known == 0 || size % known != 0 {
                    return Err(err());
                }
                shape[i] = size / known;
            }
            None if known != size => return Err(err()),
            None => {}
        }
        if shape.is_empty() && size != 1 {
            return Err(err());
        }
        Ok(shape)
    }

    /// Permute the axes. `None` reverses them.
    pub fn transpose(&self, axes: Option<&[isize]>) -> Result<NdArray> {
        let ndim = self.ndim();
        let perm: Vec<usize> = match axes {
            None => (0..ndim).rev().collect(),
            Some(axes) => {
                if axes.len() != ndim {
                    return Err(NdError::RankMismatch {
                        expected: ndim,
                        found: axes.len(),
                    });
                }
                let mut seen = vec![false; ndim];
                let mut perm = Vec::with_capacity(ndim);
                for &a in axes {
                    let p = normalize_axis(a, ndim)?;
                    if seen[p] {
                        return Err(NdError::DuplicateAxis { axis: p });
                    }
                    seen[p] = true;
                    perm.push(p);
                }
                perm
            }
        };
        let shape = perm.iter().map(|&p| self.shape()[p]).collect();
        let strides = perm.iter().map(|&p| self.strides()[p]).collect();
        Ok(self.derive(shape, strides, self.offset()))
    }

    /// Exchange two axes.
    pub fn swapaxes(&self, axis1: isize, axis2: isize) -> Result<NdArray> {
        let a = normalize_axis(axis1, self.ndim())?;
        let b = normalize_axis(axis2, self.ndim())?;
        let mut shape = self.shape().to_vec();
        let mut strides = self.strides().to_vec();
        shape.swap(a, b);
        strides.swap(a, b);
        Ok(self.derive(shape, strides, self.offset()))
    }

    /// Remove unit axes: the given one, or all of them.
    ///
    /// Squeezing every axis away leaves shape `[1]`.
    pub fn squeeze(&self, axis: Option<isize>) -> Result<NdArray> {
        let drop: Vec<bool> = match axis {
            None => self.shape().iter().map(|&n| n == 1).collect(),
            Some(axis) => {
                let axis = normalize_axis(axis, self.ndim())?;
                let size = self.shape()[axis];
                if size != 1 {
                    return Err(NdError::CannotSqueeze { axis, size });
                }
                (0..self.ndim()).map(|d| d == axis).collect()
            }
        };
        let (shape, strides) = self
            .shape()
            .iter()
            .zip(self.strides())
            .zip(&drop)
            .filter(|(_, &dropped)| !dropped)
            .map(|((&n, &s), _)| (n, s))
            .unzip();
        Ok(self.derive(shape, strides, self.offset()))
    }

    /// Insert a unit axis at `axis`, counted in the result's dimensions.
    pub fn expand_dims(&self, axis: isize) -> Result<NdArray> {
        let axis = normalize_axis(axis, self.ndim() + 1)?;
        let mut shape = self.shape().to_vec();
        let mut strides = self.strides().to_vec();
        let stride = if axis < self.ndim() {
            strides[axis] * shape[axis] as isize
        } else {
            1
        };
        shape.insert(axis, 1);
        strides.insert(axis, stride);
        Ok(self.derive(shape, strides, self.offset()))
    }

    /// One-dimensional view when C-contiguous, otherwise a copy.
    pub fn ravel(&self) -> NdArray {
        if self.is_c_contiguous() {
            return self.derive(vec![self.size()], vec![1], self.offset());
        }
        self.flatten()
    }

    /// One-dimensional C-order copy. Always allocates.
    pub fn flatten(&self) -> NdArray {
        let size = self.size();
        self.materialize().with_c_shape(vec![size])
    }

    /// Read-only view with the given broadcast shape.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<NdArray> {
        let target = broadcast_shapes(&[self.shape(), shape])?;
        if target != shape {
            return Err(NdError::ShapeMismatch {
                lhs: self.shape().to_vec(),
                rhs: shape.to_vec(),
            });
        }
        let strides = broadcast_strides(shape, self.shape(), self.strides())?;
        Ok(self.derive_readonly(shape.to_vec(), strides, self.offset()))
    }

    /// Broadcast several arrays against each other.
    pub fn broadcast_arrays(arrays: &[&NdArray]) -> Result<Vec<NdArray>> {
        let shapes: Vec<&[usize]> = arrays.iter().map(|a| a.shape()).collect();
        let target = broadcast_shapes(&shapes)?;
        arrays.iter().map(|a| a.broadcast_to(&target)).collect()
    }

    /// Join arrays along an existing axis into a new array.
    ///
    /// The result dtype is the promotion of all input dtypes.
    pub fn concatenate(arrays: &[&NdArray], axis: isize) -> Result<NdArray> {
        let first = arrays.first().ok_or(NdError::EmptyInput { op: "concatenate" })?;
        let ndim = first.ndim();
        let axis = normalize_axis(axis, ndim)?;

        let mut shape = first.shape().to_vec();
        shape[axis] = 0;
        let mut dtype = first.dtype();
        for a in arrays {
            if a.ndim() != ndim {
                return Err(NdError::RankMismatch {
                    expected: ndim,
                    found: a.ndim(),
                });
            }
            let agrees = a
                .shape()
                .iter()
                .zip(first.shape())
                .enumerate()
                .all(|(d, (x, y))| d == axis || x == y);
            if !agrees {
                return Err(NdError::ShapeMismatch {
                    lhs: first.shape().to_vec(),
                    rhs: a.shape().to_vec(),
                });
            }
            shape[axis] += a.shape()[axis];
            dtype = result_type(dtype, a.dtype());
        }
        debug!(
            "concatenate: {} arrays along axis {axis} into {} {dtype}",
            arrays.len(),
            fmt_shape(&shape)
        );

        let out_strides = row_major_strides(&shape);
        let mut storage = Storage::zeros(dtype, kernel::total_len(&shape));
        let mut start = 0usize;
        for a in arrays {
            let part = if a.dtype() == dtype {
                (*a).clone()
            } else {
                a.astype(dtype)
            };
            let dst_layout = Layout::new(
                part.shape(),
                &out_strides,
                start * out_strides[axis] as usize,
            );
            let src = part.buffer().read();
            with_element!(dtype, T => {
                kernel::copy_into(
                    typed_mut::<T>(&mut storage),
                    dst_layout,
                    typed::<T>(&src),
                    part.layout(),
                )?;
            });
            start += a.shape()[axis];
        }
        Ok(NdArray::owned(storage, shape))
    }

    /// Join same-shaped arrays along a new axis.
    pub fn stack(arrays: &[&NdArray], axis: isize) -> Result<NdArray> {
        let first = arrays.first().ok_or(NdError::EmptyInput { op: "stack" })?;
        for a in arrays {
            if a.shape() != first.shape() {
                return Err(NdError::ShapeMismatch {
                    lhs: first.shape().to_vec(),
                    rhs: a.shape().to_vec(),
                });
            }
        }
        let expanded = arrays
            .iter()
            .map(|a| a.expand_dims(axis))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&NdArray> = expanded.iter().collect();
        NdArray::concatenate(&refs, axis)
    }

    /// Stack row-wise: one-dimensional inputs become rows, everything else
    /// is joined along axis 0.
    pub fn vstack(arrays: &[&NdArray]) -> Result<NdArray> {
        let rows = arrays
            .iter()
            .map(|a| {
                if a.ndim() == 1 {
                    a.expand_dims(0)
                } else {
                    Ok((*a).clone())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&NdArray> = rows.iter().collect();
        NdArray::concatenate(&refs, 0)
    }

    /// Stack column-wise: along axis 0 when every input is one-dimensional,
    /// along axis 1 otherwise.
    pub fn hstack(arrays: &[&NdArray]) -> Result<NdArray> {
        let axis = if arrays.iter().all(|a| a.ndim() == 1) {
            0
        } else {
            1
        };
        NdArray::concatenate(arrays, axis)
    }

    /// Repeat the whole array `reps[i]` times along axis `i`.
    ///
    /// Shorter of the array rank and `reps` is padded with leading ones.
    pub fn tile(&self, reps: &[usize]) -> Result<NdArray> {
        let ndim = self.ndim().max(reps.len());
        let pad = |values: &[usize]| {
            let mut padded = vec![1; ndim - values.len()];
            padded.extend_from_slice(values);
            padded
        };
        let shape = pad(self.shape());
        let reps = pad(reps);
        let mut strides = vec![0; ndim - self.ndim()];
        strides.extend_from_slice(self.strides());

        // Interleave a zero-stride copy axis in front of every source axis.
        let mut view_shape = Vec::with_capacity(2 * ndim);
        let mut view_strides = Vec::with_capacity(2 * ndim);
        for ((&n, &s), &r) in shape.iter().zip(&strides).zip(&reps) {
            view_shape.extend([r, n]);
            view_strides.extend([0, s]);
        }
        let out_shape = shape
            .iter()
            .zip(&reps)
            .map(|(&n, &r)| n.checked_mul(r))
            .collect::<Option<Vec<_>>>()
            .filter(|dims| checked_len(dims).is_some())
            .ok_or_else(|| NdError::InvalidArgument {
                op: "tile",
                reason: format!("{} tiled by {reps:?} overflows", fmt_shape(self.shape())),
            })?;
        debug!("tile: {} by {reps:?}", fmt_shape(self.shape()));
        let view = self.derive_readonly(view_shape, view_strides, self.offset());
        Ok(view.materialize().with_c_shape(out_shape))
    }

    /// Repeat each element `repeats` times along `axis`, or over the
    /// flattened array when `axis` is `None`.
    pub fn repeat(&self, repeats: usize, axis: Option<isize>) -> Result<NdArray> {
        let (source, axis) = match axis {
            None => (self.ravel(), 0),
            Some(axis) => (self.clone(), normalize_axis(axis, self.ndim())?),
        };
        let mut view_shape = source.shape().to_vec();
        let mut view_strides = source.strides().to_vec();
        view_shape.insert(axis + 1, repeats);
        view_strides.insert(axis + 1, 0);

        let mut out_shape = source.shape().to_vec();
        out_shape[axis] = out_shape[axis]
            .checked_mul(repeats)
            .filter(|_| checked_len(&view_shape).is_some())
            .ok_or_else(|| NdError::InvalidArgument {
                op: "repeat",
                reason: format!("{} repeated {repeats} times overflows", fmt_shape(self.shape())),
            })?;
        let view = source.derive_readonly(view_shape, view_strides, source.offset());
        Ok(view.materialize().with_c_shape(out_shape))
    }
}

/// Element count, or `None` when it does not fit in `usize`.
fn checked_len(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}
