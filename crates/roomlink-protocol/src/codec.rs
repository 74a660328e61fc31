//! Fixed-layout binary codec.
//!
//! Every type that travels on the wire implements [`WireType`]. The trait
//! carries the encoded size as an associated constant, so the size of a
//! message is known at compile time and buffers can be allocated up front.
//! There are no length prefixes and no variable-length tails: a composite
//! is simply its fields laid end to end in declaration order.
//!
//! ## Layout rules
//!
//! - Integers are big-endian; `bool` is one byte.
//! - [`FixedString<N>`] is UTF-8, left-justified and NUL-padded to `N` bytes.
//! - [`FixedBytes<N>`] is exactly `N` raw bytes.
//! - [`FixedVec<T, N>`] is exactly `N` consecutive `T`s.
//! - Enums encode as their declared integer width (see [`wire_enum!`]).
//!
//! Composites are declared with [`wire_struct!`], which generates the
//! schema (ordered `(name, size)` list), the size constant, and the
//! encode/decode bodies as plain iteration over the fields.
//!
//! [`wire_enum!`]: crate::wire_enum
//! [`wire_struct!`]: crate::wire_struct

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::CodecError;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One entry in a composite type's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as declared.
    pub name: &'static str,
    /// Encoded size of the field in bytes.
    pub size: usize,
}

/// A type with a fixed, statically known binary layout.
pub trait WireType: Sized {
    /// Encoded size in bytes. Identical for every value of the type.
    const SIZE: usize;

    /// Ordered field list. Leaf types have an empty schema.
    fn schema() -> &'static [FieldSpec] {
        &[]
    }

    /// Appends exactly `Self::SIZE` bytes to `buf`.
    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError>;

    /// Consumes exactly `Self::SIZE` bytes from `buf`.
    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError>;
}

/// Returns the encoded size of `T`.
pub fn encoded_size<T: WireType>() -> usize {
    T::SIZE
}

/// Encodes a value into a freshly allocated buffer of exactly `T::SIZE` bytes.
///
/// # Errors
/// Returns [`CodecError::StringTooLong`] or
/// [`CodecError::ArrayLengthMismatch`] when a field violates its fixed size.
pub fn encode<T: WireType>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = BytesMut::with_capacity(T::SIZE);
    encode_into(value, &mut buf)?;
    Ok(buf.to_vec())
}

/// Appends the encoding of `value` to an existing buffer.
///
/// Used to build a header and a body in a single allocation.
pub fn encode_into<T: WireType>(
    value: &T,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let start = buf.len();
    value.write_to(buf)?;
    debug_assert_eq!(buf.len() - start, T::SIZE, "layout drifted from SIZE");
    Ok(())
}

/// Decodes a value from a buffer that must be exactly `T::SIZE` bytes long.
///
/// # Errors
/// - [`CodecError::SizeMismatch`] if `bytes.len() != T::SIZE`
/// - [`CodecError::DecodeError`] on invalid UTF-8 in a string field
/// - [`CodecError::InvalidEnumValue`] on an unknown enum discriminant
pub fn decode<T: WireType>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() != T::SIZE {
        return Err(CodecError::SizeMismatch {
            expected: T::SIZE,
            actual: bytes.len(),
        });
    }
    let mut buf = bytes;
    T::read_from(&mut buf)
}

/// Fails unless `buf` still holds at least `needed` bytes.
///
/// `Buf` accessors panic on a short buffer, so every leaf read goes
/// through this first.
pub fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::SizeMismatch {
            expected: needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

macro_rules! impl_wire_primitive {
    ($($ty:ty => $put:ident, $get:ident);* $(;)?) => {
        $(
            impl WireType for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_to(
                    &self,
                    buf: &mut impl BufMut,
                ) -> Result<(), CodecError> {
                    buf.$put(*self);
                    Ok(())
                }

                fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
                    ensure_remaining(&*buf, Self::SIZE)?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

impl_wire_primitive! {
    u8 => put_u8, get_u8;
    u16 => put_u16, get_u16;
    u32 => put_u32, get_u32;
    u64 => put_u64, get_u64;
    i8 => put_i8, get_i8;
    i16 => put_i16, get_i16;
    i32 => put_i32, get_i32;
    i64 => put_i64, get_i64;
}

impl WireType for bool {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        ensure_remaining(&*buf, 1)?;
        Ok(buf.get_u8() != 0)
    }
}

// ---------------------------------------------------------------------------
// FixedString
// ---------------------------------------------------------------------------

/// A UTF-8 string stored in exactly `N` bytes on the wire.
///
/// Construction never fails; the length check happens on encode, where a
/// payload longer than `N` bytes is rejected with
/// [`CodecError::StringTooLong`]. Use [`FixedString::try_new`] to validate
/// early (e.g. before any I/O).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize>(String);

impl<const N: usize> FixedString<N> {
    /// Wraps a string and checks that it fits in `N` bytes.
    pub fn try_new(value: impl Into<String>) -> Result<Self, CodecError> {
        let value = value.into();
        if value.len() > N {
            return Err(CodecError::StringTooLong {
                max: N,
                actual: value.len(),
            });
        }
        Ok(Self(value))
    }

    /// Returns the string contents.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// The fixed capacity in bytes.
    pub const fn capacity() -> usize {
        N
    }
}

impl<const N: usize> From<&str> for FixedString<N> {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<const N: usize> From<String> for FixedString<N> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<const N: usize> fmt::Display for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const N: usize> WireType for FixedString<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        let bytes = self.0.as_bytes();
        if bytes.len() > N {
            return Err(CodecError::StringTooLong {
                max: N,
                actual: bytes.len(),
            });
        }
        buf.put_slice(bytes);
        buf.put_bytes(0, N - bytes.len());
        Ok(())
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        ensure_remaining(&*buf, N)?;
        let mut raw = vec![0u8; N];
        buf.copy_to_slice(&mut raw);
        // Everything after the first NUL is padding, even if it isn't zero.
        let end = raw.iter().position(|&b| b == 0).unwrap_or(N);
        let text = std::str::from_utf8(&raw[..end])
            .map_err(|e| CodecError::DecodeError(e.to_string()))?;
        Ok(Self(text.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// FixedBytes
// ---------------------------------------------------------------------------

/// Exactly `N` opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// Copies `data` into a zero-padded array.
    ///
    /// # Errors
    /// Returns [`CodecError::ArrayLengthMismatch`] if `data` is longer
    /// than `N`.
    pub fn from_slice(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > N {
            return Err(CodecError::ArrayLengthMismatch {
                expected: N,
                actual: data.len(),
            });
        }
        let mut out = [0u8; N];
        out[..data.len()].copy_from_slice(data);
        Ok(Self(out))
    }

    /// Returns the bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> WireType for FixedBytes<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        buf.put_slice(&self.0);
        Ok(())
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        ensure_remaining(&*buf, N)?;
        let mut out = [0u8; N];
        buf.copy_to_slice(&mut out);
        Ok(Self(out))
    }
}

// ---------------------------------------------------------------------------
// FixedVec
// ---------------------------------------------------------------------------

/// A fixed-length array of `N` elements.
///
/// Backed by a `Vec` so that it can be built incrementally, but the length
/// is checked on encode: anything other than exactly `N` elements fails
/// with [`CodecError::ArrayLengthMismatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedVec<T, const N: usize>(Vec<T>);

impl<T, const N: usize> FixedVec<T, N> {
    /// Wraps a vector as-is. The length is not checked until encode.
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }

    /// Wraps `items` and pads with `T::default()` up to `N` elements.
    ///
    /// Longer inputs are kept as-is and will fail on encode.
    pub fn padded(mut items: Vec<T>) -> Self
    where
        T: Default,
    {
        while items.len() < N {
            items.push(T::default());
        }
        Self(items)
    }

    /// Returns the elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Consumes the wrapper, returning the elements.
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }

    /// The fixed element count.
    pub const fn capacity() -> usize {
        N
    }
}

/// `N` default elements, so a defaulted message still encodes.
impl<T: Default, const N: usize> Default for FixedVec<T, N> {
    fn default() -> Self {
        Self::padded(Vec::new())
    }
}

impl<T: WireType, const N: usize> WireType for FixedVec<T, N> {
    const SIZE: usize = N * T::SIZE;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        if self.0.len() != N {
            return Err(CodecError::ArrayLengthMismatch {
                expected: N,
                actual: self.0.len(),
            });
        }
        for item in &self.0 {
            item.write_to(buf)?;
        }
        Ok(())
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::read_from(buf)?);
        }
        Ok(Self(items))
    }
}

// ---------------------------------------------------------------------------
// Declaration macros
// ---------------------------------------------------------------------------

/// Declares a composite wire struct.
///
/// Fields are encoded in declaration order. The macro emits the struct
/// itself plus a [`WireType`] implementation whose `SIZE` is the sum of the
/// field sizes and whose schema lists every field.
///
/// ```rust
/// use roomlink_protocol::{wire_struct, FixedString, WireType};
///
/// wire_struct! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Greeting {
///         pub id: u16,
///         pub name: FixedString<8>,
///     }
/// }
///
/// assert_eq!(Greeting::SIZE, 10);
/// assert_eq!(Greeting::schema()[1].name, "name");
/// ```
#[macro_export]
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::WireType for $name {
            const SIZE: usize = 0 $( + <$ty as $crate::WireType>::SIZE )*;

            fn schema() -> &'static [$crate::FieldSpec] {
                const FIELDS: &[$crate::FieldSpec] = &[
                    $(
                        $crate::FieldSpec {
                            name: stringify!($field),
                            size: <$ty as $crate::WireType>::SIZE,
                        },
                    )*
                ];
                FIELDS
            }

            #[allow(unused_variables)]
            fn write_to(
                &self,
                buf: &mut impl $crate::BufMut,
            ) -> ::std::result::Result<(), $crate::CodecError> {
                $( $crate::WireType::write_to(&self.$field, buf)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn read_from(
                buf: &mut impl $crate::Buf,
            ) -> ::std::result::Result<Self, $crate::CodecError> {
                Ok(Self {
                    $( $field: <$ty as $crate::WireType>::read_from(buf)?, )*
                })
            }
        }
    };
}

/// Declares a C-like enum that encodes as its integer representation.
///
/// Decoding an unknown discriminant fails with
/// [`CodecError::InvalidEnumValue`].
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )*
        }

        impl ::std::convert::TryFrom<$repr> for $name {
            type Error = $crate::CodecError;

            fn try_from(
                value: $repr,
            ) -> ::std::result::Result<Self, Self::Error> {
                $(
                    if value == $name::$variant as $repr {
                        return Ok($name::$variant);
                    }
                )*
                Err($crate::CodecError::InvalidEnumValue {
                    type_name: stringify!($name),
                    value: value as u64,
                })
            }
        }

        impl $crate::WireType for $name {
            const SIZE: usize = <$repr as $crate::WireType>::SIZE;

            fn write_to(
                &self,
                buf: &mut impl $crate::BufMut,
            ) -> ::std::result::Result<(), $crate::CodecError> {
                $crate::WireType::write_to(&(*self as $repr), buf)
            }

            fn read_from(
                buf: &mut impl $crate::Buf,
            ) -> ::std::result::Result<Self, $crate::CodecError> {
                let raw = <$repr as $crate::WireType>::read_from(buf)?;
                <$name as ::std::convert::TryFrom<$repr>>::try_from(raw)
            }
        }
    };
}
