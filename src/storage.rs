//! Typed, uniquely identified backing storage.
//!
//! A [`Buffer`] owns one contiguous [`Storage`] block. Its dtype and length are
//! fixed at creation; its contents are mutable through any view that aliases it.
//! Buffers are shared through `Arc` and freed when the last view drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::{with_element, DType, Element};
use crate::scalar::Scalar;
use crate::{NdError, Result};

/// Process-unique buffer identifier.
pub type BufferId = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Contiguous typed storage, one variant per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl Storage {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Storage {
        with_element!(dtype, T => T::into_storage(vec![T::zero(); len]))
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::Bool(_) => DType::Bool,
            Storage::Int8(_) => DType::Int8,
            Storage::Int16(_) => DType::Int16,
            Storage::Int32(_) => DType::Int32,
            Storage::Int64(_) => DType::Int64,
            Storage::UInt8(_) => DType::UInt8,
            Storage::UInt16(_) => DType::UInt16,
            Storage::UInt32(_) => DType::UInt32,
            Storage::UInt64(_) => DType::UInt64,
            Storage::Float32(_) => DType::Float32,
            Storage::Float64(_) => DType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_element!(self.dtype(), T => typed::<T>(self).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get(&self, index: usize) -> Scalar {
        with_element!(self.dtype(), T => typed::<T>(self)[index].to_scalar())
    }

    pub(crate) fn set(&mut self, index: usize, value: Scalar) {
        with_element!(self.dtype(), T => typed_mut::<T>(self)[index] = T::from_scalar(value))
    }

    /// Native-endian bytes of the whole block. `bool` is one byte, 0 or 1.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Storage::Bool(v) => {
                // SAFETY: `bool` is one byte with bit pattern 0 or 1, so every
                // element is a valid `u8`; the slice covers exactly `v.len()` bytes.
                unsafe { std::slice::from_raw_parts(v.as_ptr().cast::<u8>(), v.len()) }
            }
            Storage::Int8(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::Int16(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::Int32(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::Int64(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::UInt8(v) => v.as_slice(),
            Storage::UInt16(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::UInt32(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::UInt64(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::Float32(v) => bytemuck::cast_slice(v.as_slice()),
            Storage::Float64(v) => bytemuck::cast_slice(v.as_slice()),
        }
    }

    /// Rebuild storage from native-endian bytes.
    ///
    /// `bytes.len()` must be a multiple of the item size; any non-zero byte
    /// decodes as `true` for `bool`.
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Result<Storage> {
        let width = dtype.itemsize();
        if bytes.len() % width != 0 {
            return Err(NdError::ByteLength {
                expected: bytes.len() - bytes.len() % width,
                found: bytes.len(),
            });
        }
        // `pod_collect_to_vec` copies, so unaligned input is fine.
        let storage = match dtype {
            DType::Bool => Storage::Bool(bytes.iter().map(|&b| b != 0).collect()),
            DType::Int8 => Storage::Int8(bytemuck::pod_collect_to_vec(bytes)),
            DType::Int16 => Storage::Int16(bytemuck::pod_collect_to_vec(bytes)),
            DType::Int32 => Storage::Int32(bytemuck::pod_collect_to_vec(bytes)),
            DType::Int64 => Storage::Int64(bytemuck::pod_collect_to_vec(bytes)),
            DType::UInt8 => Storage::UInt8(bytes.to_vec()),
            DType::UInt16 => Storage::UInt16(bytemuck::pod_collect_to_vec(bytes)),
            DType::UInt32 => Storage::UInt32(bytemuck::pod_collect_to_vec(bytes)),
            DType::UInt64 => Storage::UInt64(bytemuck::pod_collect_to_vec(bytes)),
            DType::Float32 => Storage::Float32(bytemuck::pod_collect_to_vec(bytes)),
            DType::Float64 => Storage::Float64(bytemuck::pod_collect_to_vec(bytes)),
        };
        Ok(storage)
    }
}

/// Borrow the typed slice of a storage block.
///
/// # Panics
/// Panics if `T` is not the storage's element type. Views always carry their
/// buffer's dtype, so reaching this is an engine bug.
#[inline]
pub(crate) fn typed<T: Element>(storage: &Storage) -> &[T] {
    match T::slice(storage) {
        Some(slice) => slice,
        None => panic!(
            "buffer dtype {} does not match element type {}",
            storage.dtype(),
            T::DTYPE
        ),
    }
}

#[inline]
pub(crate) fn typed_mut<T: Element>(storage: &mut Storage) -> &mut [T] {
    let dtype = storage.dtype();
    match T::slice_mut(storage) {
        Some(slice) => slice,
        None => panic!(
            "buffer dtype {} does not match element type {}",
            dtype,
            T::DTYPE
        ),
    }
}

/// A block of typed storage shared by one or more views.
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    dtype: DType,
    len: usize,
    storage: RwLock<Storage>,
}

impl Buffer {
    /// Wrap storage in a new shared buffer with a fresh id.
    pub fn new(storage: Storage) -> Arc<Buffer> {
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        let dtype = storage.dtype();
        let len = storage.len();
        debug!("allocate buffer id={id} dtype={dtype} len={len}");
        Arc::new(Buffer {
            id,
            dtype,
            len,
            storage: RwLock::new(storage),
        })
    }

    pub fn zeros(dtype: DType, len: usize) -> Arc<Buffer> {
        Buffer::new(Storage::zeros(dtype, len))
    }

    pub fn from_vec<T: Element>(data: Vec<T>) -> Arc<Buffer> {
        Buffer::new(T::into_storage(data))
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shared access to the storage.
    ///
    /// Recursive, so one operation may read the same buffer through several
    /// aliasing views without deadlocking against a queued writer.
    pub fn read(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read_recursive()
    }

    /// Exclusive access to the storage.
    pub fn write(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write()
    }

    /// Copy of the whole block as native-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.read().as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Buffer::zeros(DType::Float64, 4);
        let b = Buffer::zeros(DType::Float64, 4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_zeros_dtype_and_len() {
        let buf = Buffer::zeros(DType::UInt16, 5);
        assert_eq!(buf.dtype(), DType::UInt16);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.read().get(3), Scalar::U64(0));
    }

    #[test]
    fn test_set_coerces_per_dtype() {
        let buf = Buffer::zeros(DType::Int8, 2);
        buf.write().set(0, Scalar::I64(128));
        buf.write().set(1, Scalar::F64(-1.5));
        assert_eq!(buf.read().get(0), Scalar::I64(-128));
        assert_eq!(buf.read().get(1), Scalar::I64(-2));
    }

    #[test]
    fn test_recursive_reads() {
        let buf = Buffer::from_vec(vec![1i32, 2, 3]);
        let first = buf.read();
        let second = buf.read();
        assert_eq!(typed::<i32>(&first), typed::<i32>(&second));
    }

    #[test]
    fn test_bytes_round_trip() {
        let buf = Buffer::from_vec(vec![1.5f32, -2.0, 3.25]);
        let bytes = buf.to_bytes();
        assert_eq!(bytes.len(), 12);
        let back = Storage::from_bytes(DType::Float32, &bytes).unwrap();
        assert_eq!(back, Storage::Float32(vec![1.5, -2.0, 3.25]));
    }

    #[test]
    fn test_bool_bytes() {
        let buf = Buffer::from_vec(vec![true, false, true]);
        assert_eq!(buf.to_bytes(), vec![1, 0, 1]);
        let back = Storage::from_bytes(DType::Bool, &[0, 2, 1]).unwrap();
        assert_eq!(back, Storage::Bool(vec![false, true, true]));
    }

    #[test]
    fn test_from_bytes_rejects_partial_items() {
        let err = Storage::from_bytes(DType::Int32, &[0u8; 7]).unwrap_err();
        assert_eq!(
            err,
            NdError::ByteLength {
                expected: 4,
                found: 7
            }
        );
    }

    #[test]
    #[should_panic(expected = "does not match element type")]
    fn test_typed_rejects_wrong_element() {
        let storage = Storage::zeros(DType::Float64, 1);
        let _ = typed::<f32>(&storage);
    }
}
