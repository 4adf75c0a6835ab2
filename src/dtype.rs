//! Element kinds and the static dtype registry.
//!
//! Every array carries one of eleven [`DType`]s. Their fixed properties live in
//! [`DTYPE_TABLE`], an immutable table indexed by the enum discriminant. The
//! [`Element`] trait ties each dtype to the Rust primitive that stores it.

use std::fmt;
use std::str::FromStr;

use num_traits::{CheckedDiv, Float, WrappingAdd, WrappingMul, WrappingNeg, WrappingSub};

use crate::scalar::Scalar;
use crate::storage::Storage;
use crate::{NdError, Result};

/// Element kind of an array.
///
/// The discriminant doubles as the row/column index into [`DTYPE_TABLE`] and
/// [`PROMOTION_TABLE`](crate::PROMOTION_TABLE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float32 = 9,
    Float64 = 10,
}

/// Numeric class of a dtype, ordered by promotion strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericClass {
    Bool,
    UInt,
    Int,
    Float,
}

/// Fixed properties of a dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DTypeInfo {
    pub dtype: DType,
    pub name: &'static str,
    pub byte_width: usize,
    pub class: NumericClass,
    /// 64-bit integer kinds, stored as `i64`/`u64` rather than through `f64`.
    pub wide: bool,
    /// Total order used when one dtype must dominate another of a different class.
    pub promotion_rank: u8,
    /// NumPy array-interface kind character (`b`, `i`, `u`, `f`).
    pub kind: char,
}

const fn info(
    dtype: DType,
    name: &'static str,
    byte_width: usize,
    class: NumericClass,
    promotion_rank: u8,
    kind: char,
) -> DTypeInfo {
    DTypeInfo {
        dtype,
        name,
        byte_width,
        class,
        wide: byte_width == 8 && !matches!(class, NumericClass::Float),
        promotion_rank,
        kind,
    }
}

/// The dtype registry, indexed by `DType as usize`.
pub static DTYPE_TABLE: [DTypeInfo; 11] = [
    info(DType::Bool, "bool", 1, NumericClass::Bool, 0, 'b'),
    info(DType::Int8, "int8", 1, NumericClass::Int, 2, 'i'),
    info(DType::Int16, "int16", 2, NumericClass::Int, 4, 'i'),
    info(DType::Int32, "int32", 4, NumericClass::Int, 6, 'i'),
    info(DType::Int64, "int64", 8, NumericClass::Int, 8, 'i'),
    info(DType::UInt8, "uint8", 1, NumericClass::UInt, 1, 'u'),
    info(DType::UInt16, "uint16", 2, NumericClass::UInt, 3, 'u'),
    info(DType::UInt32, "uint32", 4, NumericClass::UInt, 5, 'u'),
    info(DType::UInt64, "uint64", 8, NumericClass::UInt, 7, 'u'),
    info(DType::Float32, "float32", 4, NumericClass::Float, 9, 'f'),
    info(DType::Float64, "float64", 8, NumericClass::Float, 10, 'f'),
];

impl DType {
    /// All dtypes in table order.
    pub const ALL: [DType; 11] = [
        DType::Bool,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::UInt8,
        DType::UInt16,
        DType::UInt32,
        DType::UInt64,
        DType::Float32,
        DType::Float64,
    ];

    #[inline]
    pub fn info(self) -> &'static DTypeInfo {
        &DTYPE_TABLE[self as usize]
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn itemsize(self) -> usize {
        self.info().byte_width
    }

    #[inline]
    pub fn class(self) -> NumericClass {
        self.info().class
    }

    #[inline]
    pub fn is_wide(self) -> bool {
        self.info().wide
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        self == DType::Bool
    }

    #[inline]
    pub fn is_float(self) -> bool {
        self.class() == NumericClass::Float
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(self.class(), NumericClass::Int | NumericClass::UInt)
    }

    #[inline]
    pub fn is_signed(self) -> bool {
        matches!(self.class(), NumericClass::Int | NumericClass::Float)
    }

    /// NumPy array-interface descriptor with native byte order, e.g. `"<i4"`.
    ///
    /// Single-byte types use the `|` (not applicable) order mark.
    pub fn descr(self) -> String {
        let info = self.info();
        let order = if info.byte_width == 1 {
            '|'
        } else if cfg!(target_endian = "little") {
            '<'
        } else {
            '>'
        };
        format!("{order}{}{}", info.kind, info.byte_width)
    }

    /// Parse a descriptor produced by [`DType::descr`].
    ///
    /// The byte-order mark must be `|`, `=` or the native one; foreign-endian
    /// payloads are the I/O layer's job to swap before handing bytes over.
    pub fn from_descr(descr: &str) -> Result<DType> {
        let unknown = || NdError::UnknownDType(descr.to_string());
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unknown)?;
        let native = if cfg!(target_endian = "little") { '<' } else { '>' };
        if order != '|' && order != '=' && order != native {
            return Err(unknown());
        }
        let kind = chars.next().ok_or_else(unknown)?;
        let width: usize = chars.as_str().parse().map_err(|_| unknown())?;
        DTYPE_TABLE
            .iter()
            .find(|info| info.kind == kind && info.byte_width == width)
            .map(|info| info.dtype)
            .ok_or_else(unknown)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = NdError;

    fn from_str(s: &str) -> Result<Self> {
        let dtype = match s {
            "bool" | "bool_" => DType::Bool,
            "int8" | "i1" => DType::Int8,
            "int16" | "i2" => DType::Int16,
            "int32" | "i4" => DType::Int32,
            "int64" | "i8" => DType::Int64,
            "uint8" | "u1" => DType::UInt8,
            "uint16" | "u2" => DType::UInt16,
            "uint32" | "u4" => DType::UInt32,
            "uint64" | "u8" => DType::UInt64,
            "float32" | "f4" => DType::Float32,
            "float64" | "f8" => DType::Float64,
            other => return Err(NdError::UnknownDType(other.to_string())),
        };
        Ok(dtype)
    }
}

mod private {
    pub trait Sealed {}
}

/// Rust primitive that stores one dtype.
///
/// Implemented for `bool`, `i8`..`i64`, `u8`..`u64`, `f32` and `f64` only.
/// Integer arithmetic wraps modulo 2^width; floats follow IEEE 754.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + private::Sealed
{
    const DTYPE: DType;

    fn zero() -> Self;
    fn one() -> Self;

    /// Widen into the scalar sum type without loss.
    fn to_scalar(self) -> Scalar;

    /// Coerce a scalar into this dtype (rounding float to int, wrapping).
    fn from_scalar(value: Scalar) -> Self;

    /// Nearest `f64`; wide integers above 2^53 round.
    fn to_f64(self) -> f64;

    fn add_elem(self, rhs: Self) -> Self;
    fn sub_elem(self, rhs: Self) -> Self;
    fn mul_elem(self, rhs: Self) -> Self;
    /// Division; integer division by zero yields zero.
    fn div_elem(self, rhs: Self) -> Self;
    /// `rhs`-th power. Integers wrap; a negative integer exponent is not
    /// meaningful and callers reject it first.
    fn pow_elem(self, rhs: Self) -> Self;

    fn neg_elem(self) -> Self;
    fn abs_elem(self) -> Self;
    /// `-1`, `0` or `1`; NaN stays NaN.
    fn sign_elem(self) -> Self;

    fn is_nan(self) -> bool;

    /// `value != 0`; NaN counts as true.
    fn is_truthy(self) -> bool;

    /// Borrow the typed slice out of a storage of the same dtype.
    fn slice(storage: &Storage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]>;
    fn into_storage(data: Vec<Self>) -> Storage;
}

impl private::Sealed for bool {}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn zero() -> Self {
        false
    }
    #[inline]
    fn one() -> Self {
        true
    }
    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }
    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        value.as_bool()
    }
    #[inline]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
    // Logical or/and, as NumPy does for boolean add/multiply.
    #[inline]
    fn add_elem(self, rhs: Self) -> Self {
        self || rhs
    }
    #[inline]
    fn sub_elem(self, rhs: Self) -> Self {
        self ^ rhs
    }
    #[inline]
    fn mul_elem(self, rhs: Self) -> Self {
        self && rhs
    }
    #[inline]
    fn div_elem(self, rhs: Self) -> Self {
        self && rhs
    }
    #[inline]
    fn pow_elem(self, rhs: Self) -> Self {
        self || !rhs
    }
    // Negation modulo 2 is the identity.
    #[inline]
    fn neg_elem(self) -> Self {
        self
    }
    #[inline]
    fn abs_elem(self) -> Self {
        self
    }
    #[inline]
    fn sign_elem(self) -> Self {
        self
    }
    #[inline]
    fn is_nan(self) -> bool {
        false
    }
    #[inline]
    fn is_truthy(self) -> bool {
        self
    }
    fn slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::Bool(v) => Some(v.as_slice()),
            _ => None,
        }
    }
    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
        match storage {
            Storage::Bool(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }
    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::Bool(data)
    }
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:ident, $scalar:ident, $wide:ty, $from:ident) => {
        impl private::Sealed for $t {}

        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn zero() -> Self {
                0
            }
            #[inline]
            fn one() -> Self {
                1
            }
            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$scalar(self as $wide)
            }
            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                // Truncating cast from the 64-bit form wraps modulo 2^width.
                value.$from() as $t
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn add_elem(self, rhs: Self) -> Self {
                WrappingAdd::wrapping_add(&self, &rhs)
            }
            #[inline]
            fn sub_elem(self, rhs: Self) -> Self {
                WrappingSub::wrapping_sub(&self, &rhs)
            }
            #[inline]
            fn mul_elem(self, rhs: Self) -> Self {
                WrappingMul::wrapping_mul(&self, &rhs)
            }
            #[inline]
            fn div_elem(self, rhs: Self) -> Self {
                CheckedDiv::checked_div(&self, &rhs).unwrap_or(0)
            }
            #[inline]
            fn pow_elem(self, rhs: Self) -> Self {
                // Square and multiply over the exponent bits.
                let mut exp = rhs as u64;
                let mut base = self;
                let mut acc: $t = 1;
                while exp > 0 {
                    if exp & 1 == 1 {
                        acc = acc.wrapping_mul(base);
                    }
                    base = base.wrapping_mul(base);
                    exp >>= 1;
                }
                acc
            }
            #[inline]
            fn neg_elem(self) -> Self {
                WrappingNeg::wrapping_neg(&self)
            }
            #[inline]
            fn abs_elem(self) -> Self {
                if self < Self::zero() {
                    WrappingNeg::wrapping_neg(&self)
                } else {
                    self
                }
            }
            #[inline]
            fn sign_elem(self) -> Self {
                if self > Self::zero() {
                    1
                } else if self < Self::zero() {
                    WrappingNeg::wrapping_neg(&Self::one())
                } else {
                    0
                }
            }
            #[inline]
            fn is_nan(self) -> bool {
                false
            }
            #[inline]
            fn is_truthy(self) -> bool {
                self != 0
            }
            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$dtype(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
            fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
                match storage {
                    Storage::$dtype(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
            fn into_storage(data: Vec<Self>) -> Storage {
                Storage::$dtype(data)
            }
        }
    };
}

impl_int_element!(i8, Int8, I64, i64, as_i64);
impl_int_element!(i16, Int16, I64, i64, as_i64);
impl_int_element!(i32, Int32, I64, i64, as_i64);
impl_int_element!(i64, Int64, I64, i64, as_i64);
impl_int_element!(u8, UInt8, U64, u64, as_u64);
impl_int_element!(u16, UInt16, U64, u64, as_u64);
impl_int_element!(u32, UInt32, U64, u64, as_u64);
impl_int_element!(u64, UInt64, U64, u64, as_u64);

macro_rules! impl_float_element {
    ($t:ty, $dtype:ident) => {
        impl private::Sealed for $t {}

        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn zero() -> Self {
                0.0
            }
            #[inline]
            fn one() -> Self {
                1.0
            }
            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::F64(self as f64)
            }
            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                // Direct casts from the integer variants round once, not twice.
                match value {
                    Scalar::Bool(b) => b as u8 as $t,
                    Scalar::I64(v) => v as $t,
                    Scalar::U64(v) => v as $t,
                    Scalar::F64(v) => v as $t,
                }
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn add_elem(self, rhs: Self) -> Self {
                self + rhs
            }
            #[inline]
            fn sub_elem(self, rhs: Self) -> Self {
                self - rhs
            }
            #[inline]
            fn mul_elem(self, rhs: Self) -> Self {
                self * rhs
            }
            #[inline]
            fn div_elem(self, rhs: Self) -> Self {
                self / rhs
            }
            #[inline]
            fn pow_elem(self, rhs: Self) -> Self {
                Float::powf(self, rhs)
            }
            #[inline]
            fn neg_elem(self) -> Self {
                -self
            }
            #[inline]
            fn abs_elem(self) -> Self {
                Float::abs(self)
            }
            #[inline]
            fn sign_elem(self) -> Self {
                if self > 0.0 {
                    1.0
                } else if self < 0.0 {
                    -1.0
                } else {
                    self
                }
            }
            #[inline]
            fn is_nan(self) -> bool {
                Float::is_nan(self)
            }
            #[inline]
            fn is_truthy(self) -> bool {
                self != 0.0
            }
            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$dtype(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
            fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
                match storage {
                    Storage::$dtype(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
            fn into_storage(data: Vec<Self>) -> Storage {
                Storage::$dtype(data)
            }
        }
    };
}

impl_float_element!(f32, Float32);
impl_float_element!(f64, Float64);

/// Run `$body` with `$t` bound to the Rust element type of `$dtype`.
///
/// This is the single dispatch point from a runtime dtype to a monomorphized
/// kernel; hot loops inside `$body` are fully static.
macro_rules! with_element {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DType::Bool => {
                type $t = bool;
                $body
            }
            $crate::DType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::DType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::DType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::DType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::DType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::DType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::DType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::DType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::DType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::DType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use with_element;
