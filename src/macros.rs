//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in bigring.
//!
//! ## reader_accessors! / writer_accessors!
//!
//! Generate the fixed-width cursor accessors on `ByteReader` and `ByteWriter`
//! for a list of primitive types, in both endiannesses.
//!
//! ### Usage
//!
//! ```ignore
//! impl<'a> ByteReader<'a> {
//!     reader_accessors! { u16, u32, u64 }
//! }
//!
//! // Generates:
//! // pub fn get_u16_le(&mut self) -> Result<u16> { ... }
//! // pub fn get_u16_be(&mut self) -> Result<u16> { ... }
//! // pub fn get_u32_le(&mut self) -> Result<u32> { ... }
//! // ...
//! ```
//!
//! The generated readers advance the cursor by the width of the type and fail
//! with an out-of-bounds error when the region is exhausted.

/// Generates `get_<ty>_le` / `get_<ty>_be` cursor readers.
macro_rules! reader_accessors {
    ($($ty:ident),* $(,)?) => {
        ::paste::paste! {
            $(
                #[inline]
                pub fn [<get_ $ty _le>](&mut self) -> Result<$ty> {
                    const N: usize = ::core::mem::size_of::<$ty>();
                    let bytes = self.take(N)?;
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }

                #[inline]
                pub fn [<get_ $ty _be>](&mut self) -> Result<$ty> {
                    const N: usize = ::core::mem::size_of::<$ty>();
                    let bytes = self.take(N)?;
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_be_bytes(raw))
                }
            )*
        }
    };
}

/// Generates `put_<ty>_le` / `put_<ty>_be` cursor writers.
macro_rules! writer_accessors {
    ($($ty:ident),* $(,)?) => {
        ::paste::paste! {
            $(
                #[inline]
                pub fn [<put_ $ty _le>](&mut self, value: $ty) -> Result<()> {
                    self.put_bytes(&value.to_le_bytes())
                }

                #[inline]
                pub fn [<put_ $ty _be>](&mut self, value: $ty) -> Result<()> {
                    self.put_bytes(&value.to_be_bytes())
                }
            )*
        }
    };
}
