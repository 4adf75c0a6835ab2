//! Textual slicing: `start:stop:step` tokens turned into strided views.

use std::fmt;
use std::str::FromStr;

use log::trace;

use crate::view::{normalize_index, NdArray};
use crate::{NdError, Result};

/// One parsed per-axis slice token.
///
/// Omitted components are `None` and resolve against the axis size during
/// [`normalize`](SliceSpec::normalize). A bare integer token sets `is_index`
/// and removes the axis from the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceSpec {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
    pub is_index: bool,
}

/// A slice resolved against a concrete axis size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedSlice {
    /// Select one position and drop the axis.
    Index(usize),
    /// Keep `len` positions starting at `start`, `step` apart.
    Range { start: usize, len: usize, step: isize },
}

impl SliceSpec {
    /// `:`, the whole axis.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn index(index: isize) -> Self {
        Self {
            start: Some(index),
            stop: None,
            step: None,
            is_index: true,
        }
    }

    pub fn range(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Self {
            start,
            stop,
            step,
            is_index: false,
        }
    }

    /// Resolve against an axis of `size` elements.
    ///
    /// Out-of-range bounds are clamped the way Python clamps slice bounds; an
    /// out-of-range index is an error naming `axis`.
    pub fn normalize(&self, axis: usize, size: usize) -> Result<NormalizedSlice> {
        if self.is_index {
            let index = self.start.unwrap_or(0);
            return normalize_index(index, size)
                .map(NormalizedSlice::Index)
                .ok_or(NdError::Index { axis, index, size });
        }

        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(NdError::ZeroStep { axis });
        }
        let n = size as isize;
        let clamp = |bound: isize| -> isize {
            if bound < 0 {
                let wrapped = bound + n;
                if wrapped < 0 {
                    if step < 0 {
                        -1
                    } else {
                        0
                    }
                } else {
                    wrapped
                }
            } else if bound >= n {
                if step < 0 {
                    n - 1
                } else {
                    n
                }
            } else {
                bound
            }
        };
        let (default_start, default_stop) = if step > 0 { (0, n) } else { (n - 1, -1) };
        let start = self.start.map_or(default_start, clamp);
        let stop = self.stop.map_or(default_stop, clamp);

        // `unsigned_abs` keeps `isize::MIN` steps representable.
        let stride = step.unsigned_abs();
        let len = if step > 0 && start < stop {
            (stop - start - 1) as usize / stride + 1
        } else if step < 0 && stop < start {
            (start - stop - 1) as usize / stride + 1
        } else {
            0
        };

        Ok(NormalizedSlice::Range {
            // An empty range never dereferences its start.
            start: if len > 0 { start as usize } else { 0 },
            len,
            step,
        })
    }
}

fn parse_bound(token: &str, part: &str) -> Result<Option<isize>> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }
    part.parse::<isize>()
        .map(Some)
        .map_err(|e| NdError::InvalidSlice {
            token: token.to_string(),
            reason: format!("{part:?} is not an integer ({e})"),
        })
}

impl FromStr for SliceSpec {
    type Err = NdError;

    fn from_str(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split(':').collect();
        match parts.as_slice() {
            [single] => match parse_bound(token, single)? {
                Some(index) => Ok(SliceSpec::index(index)),
                None => Err(NdError::InvalidSlice {
                    token: token.to_string(),
                    reason: "empty token".to_string(),
                }),
            },
            [start, stop] => Ok(SliceSpec::range(
                parse_bound(token, start)?,
                parse_bound(token, stop)?,
                None,
            )),
            [start, stop, step] => Ok(SliceSpec::range(
                parse_bound(token, start)?,
                parse_bound(token, stop)?,
                parse_bound(token, step)?,
            )),
            _ => Err(NdError::InvalidSlice {
                token: token.to_string(),
                reason: "more than two ':' separators".to_string(),
            }),
        }
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<isize>| v.map(|v| v.to_string()).unwrap_or_default();
        if self.is_index {
            return write!(f, "{}", part(self.start));
        }
        write!(f, "{}:{}", part(self.start), part(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

impl NdArray {
    /// Slice with one textual token per leading axis.
    ///
    /// Missing trailing tokens select the whole axis. The result is a view
    /// over the same buffer.
    ///
    /// ```rust
    /// use strided_nd::NdArray;
    ///
    /// let a = NdArray::arange(0.0, 12.0, 1.0, None).unwrap().reshape(&[3, 4]).unwrap();
    /// let v = a.slice(&["1:", "::-2"]).unwrap();
    /// assert_eq!(v.shape(), &[2, 2]);
    /// assert_eq!(v.to_vec::<f64>(), vec![7.0, 5.0, 11.0, 9.0]);
    /// ```
    pub fn slice(&self, tokens: &[&str]) -> Result<NdArray> {
        let specs = tokens
            .iter()
            .map(|t| t.parse::<SliceSpec>())
            .collect::<Result<Vec<_>>>()?;
        self.slice_with(&specs)
    }

    /// Slice with already parsed specs.
    pub fn slice_with(&self, specs: &[SliceSpec]) -> Result<NdArray> {
        if specs.len() > self.ndim() {
            return Err(NdError::IndexCount {
                expected: self.ndim(),
                found: specs.len(),
            });
        }

        let full = SliceSpec::full();
        let mut offset = self.offset() as isize;
        let mut shape = Vec::with_capacity(self.ndim());
        let mut strides = Vec::with_capacity(self.ndim());
        for (axis, (&size, &stride)) in self.shape().iter().zip(self.strides()).enumerate() {
            let spec = specs.get(axis).unwrap_or(&full);
            match spec.normalize(axis, size)? {
                NormalizedSlice::Index(i) => {
                    offset += i as isize * stride;
                }
                NormalizedSlice::Range { start, len, step } => {
                    if len > 0 {
                        offset += start as isize * stride;
                    }
                    // A single position never steps, so its stride is free.
                    let stepped = if len <= 1 {
                        stride
                    } else {
                        stride.checked_mul(step).ok_or_else(|| NdError::InvalidSlice {
                            token: spec.to_string(),
                            reason: format!("step {step} overflows the stride on axis {axis}"),
                        })?
                    };
                    shape.push(len);
                    strides.push(stepped);
                }
            }
        }

        trace!(
            "slice: {:?} -> shape={:?} strides={:?} offset={}",
            self.shape(),
            shape,
            strides,
            offset
        );
        // An empty view keeps the source offset, which is always in bounds.
        let offset = if shape.contains(&0) {
            self.offset()
        } else {
            offset as usize
        };
        Ok(self.derive(shape, strides, offset))
    }

    fn ensure_2d(&self) -> Result<()> {
        if self.ndim() != 2 {
            return Err(NdError::RankMismatch {
                expected: 2,
                found: self.ndim(),
            });
        }
        Ok(())
    }

    /// Row `i` of a 2-D array.
    pub fn row(&self, i: isize) -> Result<NdArray> {
        self.ensure_2d()?;
        self.slice_with(&[SliceSpec::index(i)])
    }

    /// Column `j` of a 2-D array.
    pub fn col(&self, j: isize) -> Result<NdArray> {
        self.ensure_2d()?;
        self.slice_with(&[SliceSpec::full(), SliceSpec::index(j)])
    }

    /// Rows `start..stop` of a 2-D array.
    pub fn rows(&self, start: isize, stop: isize) -> Result<NdArray> {
        self.ensure_2d()?;
        self.slice_with(&[SliceSpec::range(Some(start), Some(stop), None)])
    }

    /// Columns `start..stop` of a 2-D array.
    pub fn cols(&self, start: isize, stop: isize) -> Result<NdArray> {
        self.ensure_2d()?;
        self.slice_with(&[
            SliceSpec::full(),
            SliceSpec::range(Some(start), Some(stop), None),
        ])
    }
}
