//! Strided traversal kernels.
//!
//! Every elementwise operation and reduction funnels through the functions in
//! this module. They work on typed slices plus a [`Layout`] and know nothing
//! about dtypes or buffers; callers dispatch on dtype, take the read locks and
//! hand in the borrowed storage.
//!
//! Output is always produced in C order into a freshly allocated `Vec`. With the
//! `parallel` feature, outputs longer than [`MIN_PARALLEL_LEN`](crate::MIN_PARALLEL_LEN)
//! are split into chunks, and each chunk restarts its walk from the linear index
//! of its first element.

use log::trace;

use crate::{NdError, Result};

/// Shape, strides and starting offset of one operand, all in elements.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout<'a> {
    pub shape: &'a [usize],
    pub strides: &'a [isize],
    pub offset: usize,
}

impl<'a> Layout<'a> {
    #[inline]
    pub fn new(shape: &'a [usize], strides: &'a [isize], offset: usize) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        Self {
            shape,
            strides,
            offset,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        total_len(self.shape)
    }

    #[inline]
    pub fn is_c_contiguous(&self) -> bool {
        is_contiguous(self.shape, self.strides)
    }
}

// ============================================================================
// Offset walker
// ============================================================================

/// C-order odometer over `shape`, yielding one buffer offset per operand.
///
/// `K` operands share the shape but carry their own strides and base offsets,
/// so broadcast (stride-0) and reversed (negative stride) axes need no special
/// casing.
pub(crate) struct OffsetWalker<'a, const K: usize> {
    shape: &'a [usize],
    strides: [&'a [isize]; K],
    base: [isize; K],
    index: Vec<usize>,
    current: [isize; K],
    remaining: usize,
}

impl<'a, const K: usize> OffsetWalker<'a, K> {
    pub fn new(shape: &'a [usize], strides: [&'a [isize]; K], offsets: [usize; K]) -> Self {
        let base = offsets.map(|o| o as isize);
        Self {
            shape,
            strides,
            base,
            index: vec![0; shape.len()],
            current: base,
            remaining: total_len(shape),
        }
    }

    /// Skip ahead so the next item is the element at C-order position `linear`.
    pub fn starting_at(mut self, linear: usize) -> Self {
        let total = total_len(self.shape);
        if linear >= total {
            self.remaining = 0;
            return self;
        }
        self.index = unravel_index(linear, self.shape);
        for k in 0..K {
            let delta: isize = self
                .index
                .iter()
                .zip(self.strides[k])
                .map(|(&i, &s)| i as isize * s)
                .sum();
            self.current[k] = self.base[k] + delta;
        }
        self.remaining = total - linear;
        self
    }

    #[inline]
    fn advance(&mut self) {
        for axis in (0..self.shape.len()).rev() {
            self.index[axis] += 1;
            for k in 0..K {
                self.current[k] += self.strides[k][axis];
            }
            if self.index[axis] < self.shape[axis] {
                return;
            }
            let extent = self.shape[axis] as isize;
            for k in 0..K {
                self.current[k] -= self.strides[k][axis] * extent;
            }
            self.index[axis] = 0;
        }
    }
}

impl<const K: usize> Iterator for OffsetWalker<'_, K> {
    type Item = [usize; K];

    #[inline]
    fn next(&mut self) -> Option<[usize; K]> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.current.map(|c| c as usize);
        self.remaining -= 1;
        if self.remaining > 0 {
            self.advance();
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const K: usize> ExactSizeIterator for OffsetWalker<'_, K> {}

/// Multi-index of C-order position `linear` within `shape`.
pub(crate) fn unravel_index(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for axis in (0..shape.len()).rev() {
        let n = shape[axis];
        if n > 0 {
            index[axis] = linear % n;
            linear /= n;
        }
    }
    index
}

// ============================================================================
// Elementwise kernels
// ============================================================================

/// Fill `out` by calling `f(first, chunk)` over chunks of it.
///
/// Sequential (one call covering everything) unless the `parallel` feature is
/// on and the output is long enough to split.
pub(crate) fn fill_chunked<O, F>(out: &mut [O], f: F)
where
    O: Send,
    F: Fn(usize, &mut [O]) + Sync,
{
    #[cfg(feature = "parallel")]
    {
        if out.len() > crate::MIN_PARALLEL_LEN {
            crate::threading::fill_parallel(out, &f);
            return;
        }
    }
    f(0, out);
}

/// Apply `f` to every element of one operand, in C order.
pub(crate) fn map1<A, O, F>(src: &[A], layout: Layout<'_>, f: F) -> Vec<O>
where
    A: Copy + Sync,
    O: Copy + Default + Send,
    F: Fn(A) -> O + Sync,
{
    let n = layout.len();
    if n == 0 {
        return Vec::new();
    }
    if layout.is_c_contiguous() && use_sequential_fast_path(n) {
        trace!("map1: contiguous fast path, len={n}");
        let start = layout.offset;
        return src[start..start + n].iter().map(|&x| f(x)).collect();
    }

    let mut out = vec![O::default(); n];
    fill_chunked(&mut out, |first, chunk| {
        let walker =
            OffsetWalker::new(layout.shape, [layout.strides], [layout.offset]).starting_at(first);
        for (slot, [o]) in chunk.iter_mut().zip(walker) {
            *slot = f(src[o]);
        }
    });
    out
}

/// Apply `f` pairwise over two operands already broadcast to one shape.
pub(crate) fn map2<A, B, O, F>(a: &[A], la: Layout<'_>, b: &[B], lb: Layout<'_>, f: F) -> Vec<O>
where
    A: Copy + Sync,
    B: Copy + Sync,
    O: Copy + Default + Send,
    F: Fn(A, B) -> O + Sync,
{
    debug_assert_eq!(la.shape, lb.shape);
    let n = la.len();
    if n == 0 {
        return Vec::new();
    }
    if la.is_c_contiguous() && lb.is_c_contiguous() && use_sequential_fast_path(n) {
        trace!("map2: contiguous fast path, len={n}");
        let xs = &a[la.offset..la.offset + n];
        let ys = &b[lb.offset..lb.offset + n];
        return xs.iter().zip(ys).map(|(&x, &y)| f(x, y)).collect();
    }

    let mut out = vec![O::default(); n];
    fill_chunked(&mut out, |first, chunk| {
        let walker = OffsetWalker::new(la.shape, [la.strides, lb.strides], [la.offset, lb.offset])
            .starting_at(first);
        for (slot, [oa, ob]) in chunk.iter_mut().zip(walker) {
            *slot = f(a[oa], b[ob]);
        }
    });
    out
}

/// Copy `src` element by element into a same-shaped strided region of `dst`.
pub(crate) fn copy_into<T: Copy>(
    dst: &mut [T],
    dst_layout: Layout<'_>,
    src: &[T],
    src_layout: Layout<'_>,
) -> Result<()> {
    ensure_same_shape(dst_layout.shape, src_layout.shape)?;
    let walker = OffsetWalker::new(
        src_layout.shape,
        [dst_layout.strides, src_layout.strides],
        [dst_layout.offset, src_layout.offset],
    );
    for [od, os] in walker {
        dst[od] = src[os];
    }
    Ok(())
}

// ============================================================================
// Reduction kernels
// ============================================================================

/// Fold every element in C order. `fold` receives the flat position.
pub(crate) fn fold_all<T, S, F>(src: &[T], layout: Layout<'_>, init: S, mut fold: F) -> S
where
    T: Copy,
    F: FnMut(S, usize, T) -> S,
{
    let n = layout.len();
    if n == 0 {
        return init;
    }
    if layout.is_c_contiguous() {
        let start = layout.offset;
        return src[start..start + n]
            .iter()
            .enumerate()
            .fold(init, |acc, (pos, &x)| fold(acc, pos, x));
    }
    OffsetWalker::new(layout.shape, [layout.strides], [layout.offset])
        .enumerate()
        .fold(init, |acc, (pos, [o])| fold(acc, pos, src[o]))
}

/// Fold along one axis, producing one value per remaining position.
///
/// The result is laid out in C order over the shape with `axis` removed.
/// `fold` receives the position along the reduced axis; `finish` turns the
/// final state into the output value given the axis length.
pub(crate) fn fold_axis<T, S, O, F, G>(
    src: &[T],
    layout: Layout<'_>,
    axis: usize,
    init: S,
    fold: F,
    finish: G,
) -> Vec<O>
where
    T: Copy + Sync,
    S: Clone + Sync,
    O: Copy + Default + Send,
    F: Fn(S, usize, T) -> S + Sync,
    G: Fn(S, usize) -> O + Sync,
{
    let axis_len = layout.shape[axis];
    let axis_stride = layout.strides[axis];
    let outer_shape: Vec<usize> = layout
        .shape
        .iter()
        .enumerate()
        .filter_map(|(d, &n)| (d != axis).then_some(n))
        .collect();
    let outer_strides: Vec<isize> = layout
        .strides
        .iter()
        .enumerate()
        .filter_map(|(d, &s)| (d != axis).then_some(s))
        .collect();

    let n = total_len(&outer_shape);
    if n == 0 {
        return Vec::new();
    }
    trace!("fold_axis: axis={axis} axis_len={axis_len} outputs={n}");

    let mut out = vec![O::default(); n];
    fill_chunked(&mut out, |first, chunk| {
        let walker = OffsetWalker::new(&outer_shape, [outer_strides.as_slice()], [layout.offset])
            .starting_at(first);
        for (slot, [base]) in chunk.iter_mut().zip(walker) {
            let mut acc = init.clone();
            let mut pos = base as isize;
            for i in 0..axis_len {
                acc = fold(acc, i, src[pos as usize]);
                pos += axis_stride;
            }
            *slot = finish(acc, axis_len);
        }
    });
    out
}

// ============================================================================
// Layout helpers
// ============================================================================

pub(crate) fn ensure_same_shape(a: &[usize], b: &[usize]) -> Result<()> {
    if a.len() != b.len() {
        return Err(NdError::RankMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }
    if a != b {
        return Err(NdError::ShapeMismatch {
            lhs: a.to_vec(),
            rhs: b.to_vec(),
        });
    }
    Ok(())
}

/// Row-major contiguity. Unit axes are ignored and empty arrays are contiguous.
pub(crate) fn is_contiguous(dims: &[usize], strides: &[isize]) -> bool {
    if dims.len() != strides.len() {
        return false;
    }
    if dims.contains(&0) {
        return true;
    }
    let mut expected = 1isize;
    for (&dim, &stride) in dims.iter().rev().zip(strides.iter().rev()) {
        if dim <= 1 {
            continue;
        }
        if stride != expected {
            return false;
        }
        expected = expected.saturating_mul(dim as isize);
    }
    true
}

/// Number of elements; the empty shape has one.
pub(crate) fn total_len(dims: &[usize]) -> usize {
    if dims.is_empty() {
        return 1;
    }
    dims.iter().product()
}

/// Whether the sequential contiguous fast path should be used.
///
/// With the `parallel` feature, large outputs must skip it so the chunked
/// path can split them across workers.
#[inline]
pub(crate) fn use_sequential_fast_path(total: usize) -> bool {
    #[cfg(feature = "parallel")]
    {
        total <= crate::MIN_PARALLEL_LEN
    }
    #[cfg(not(feature = "parallel"))]
    {
        let _ = total;
        true
    }
}
