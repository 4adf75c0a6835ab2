//! Rayon work splitting for kernels with freshly allocated outputs.
//!
//! Every output element is written exactly once by exactly one worker, and the
//! output never aliases an input buffer, so no synchronization beyond the
//! shared read locks on the inputs is needed.

use log::trace;
use rayon::prelude::*;

use crate::MIN_PARALLEL_LEN;

/// Fill `out` in parallel, calling `f(first, chunk)` for disjoint chunks.
///
/// `first` is the linear C-order index of `chunk[0]` within `out`. Chunks are
/// never shorter than [`MIN_PARALLEL_LEN`] / 4, so tiny outputs are not split.
pub(crate) fn fill_parallel<O, F>(out: &mut [O], f: &F)
where
    O: Send,
    F: Fn(usize, &mut [O]) + Sync,
{
    let nthreads = rayon::current_num_threads().max(1);
    // Four chunks per worker leaves room for work stealing.
    let chunk = out
        .len()
        .div_ceil(nthreads * 4)
        .max(MIN_PARALLEL_LEN / 4);
    trace!(
        "parallel fill: len={} chunk={} threads={}",
        out.len(),
        chunk,
        nthreads
    );
    out.par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(i, part)| f(i * chunk, part));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_slot_written_once() {
        let n = MIN_PARALLEL_LEN * 3 + 17;
        let mut out = vec![usize::MAX; n];
        fill_parallel(&mut out, &|first, part: &mut [usize]| {
            for (i, slot) in part.iter_mut().enumerate() {
                *slot = first + i;
            }
        });
        assert!(out.iter().enumerate().all(|(i, &v)| v == i));
    }
}
