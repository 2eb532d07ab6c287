//! Key encoding
//!
//! Record keys are stored as raw bytes, and the engine orders them
//! lexicographically. Encodings are chosen so that byte order matches the
//! natural order of the key type:
//!
//! ```text
//! str / String / [u8] / Vec<u8>   verbatim
//! u16 / u32 / u64                 big-endian, fixed width
//! usize                           big-endian, 8 bytes
//! i8 .. i64 / isize               big-endian with the sign bit flipped
//!   -1i16 → [0x7F, 0xFF]
//!    0i16 → [0x80, 0x00]
//!    1i16 → [0x80, 0x01]
//! Vec<T> / [T] of integers        elements back to back
//! ```
//!
//! Types that know how to encode themselves (such as `Id`) implement
//! `EncodeKey`/`DecodeKey` directly. A type with no implementation can't be
//! used as a key at all.

use crate::error::{Error, Result};
use crate::id::Id;

/// Appends the byte form of a key
pub trait EncodeKey {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Encode into a new buffer
    fn to_key_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_key(&mut out)?;
        Ok(out)
    }
}

/// Decodes a key in place
///
/// Implementations overwrite `self` entirely. Buffers (`String`, `Vec`) keep
/// their allocation when it is large enough.
pub trait DecodeKey {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()>;

    /// Encoded key for a record minted `id`
    ///
    /// Must decode into `Self`. Raw `Id` bytes by default.
    fn mint_key(id: &Id) -> Vec<u8>
    where
        Self: Sized,
    {
        id.as_bytes().to_vec()
    }
}

impl<T: EncodeKey + ?Sized> EncodeKey for &T {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        (**self).encode_key(out)
    }
}

// =============================================================================
// Bytes and text
// =============================================================================

impl EncodeKey for [u8] {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> EncodeKey for [u8; N] {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl EncodeKey for Vec<u8> {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl DecodeKey for Vec<u8> {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
        self.clear();
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl EncodeKey for str {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl EncodeKey for String {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl DecodeKey for String {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::key_type::<String>(format!("invalid UTF-8: {}", e)))?;
        self.clear();
        self.push_str(text);
        Ok(())
    }

    /// The text form, so minted keys stay valid UTF-8
    fn mint_key(id: &Id) -> Vec<u8> {
        id.to_string().into_bytes()
    }
}

/// The key of a record without a key field: always empty
impl EncodeKey for () {
    fn encode_key(&self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

impl DecodeKey for () {
    fn decode_key(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Integers
// =============================================================================

fn width_mismatch<T: ?Sized>(found: usize, expected: usize) -> Error {
    Error::key_type::<T>(format!("expected {} bytes, found {}", expected, found))
}

macro_rules! unsigned_key {
    ($($t:ty),*) => {$(
        impl EncodeKey for $t {
            fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
                out.extend_from_slice(&self.to_be_bytes());
                Ok(())
            }
        }

        impl DecodeKey for $t {
            fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
                const WIDTH: usize = std::mem::size_of::<$t>();
                let raw: [u8; WIDTH] = bytes
                    .try_into()
                    .map_err(|_| width_mismatch::<$t>(bytes.len(), WIDTH))?;
                *self = <$t>::from_be_bytes(raw);
                Ok(())
            }
        }
    )*};
}

macro_rules! signed_key {
    ($($t:ty => $u:ty),*) => {$(
        impl EncodeKey for $t {
            fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
                let flipped = (*self as $u) ^ (1 << (<$u>::BITS - 1));
                out.extend_from_slice(&flipped.to_be_bytes());
                Ok(())
            }
        }

        impl DecodeKey for $t {
            fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
                const WIDTH: usize = std::mem::size_of::<$t>();
                let raw: [u8; WIDTH] = bytes
                    .try_into()
                    .map_err(|_| width_mismatch::<$t>(bytes.len(), WIDTH))?;
                *self = (<$u>::from_be_bytes(raw) ^ (1 << (<$u>::BITS - 1))) as $t;
                Ok(())
            }
        }
    )*};
}

unsigned_key!(u8, u16, u32, u64);
signed_key!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

// Pointer-sized integers always take 8 bytes so keys don't depend on the
// platform that wrote them.

impl EncodeKey for usize {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        (*self as u64).encode_key(out)
    }
}

impl DecodeKey for usize {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
        let mut wide = 0u64;
        wide.decode_key(bytes)?;
        *self = usize::try_from(wide)
            .map_err(|_| Error::key_type::<usize>(format!("{} does not fit", wide)))?;
        Ok(())
    }
}

impl EncodeKey for isize {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        (*self as i64).encode_key(out)
    }
}

impl DecodeKey for isize {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
        let mut wide = 0i64;
        wide.decode_key(bytes)?;
        *self = isize::try_from(wide)
            .map_err(|_| Error::key_type::<isize>(format!("{} does not fit", wide)))?;
        Ok(())
    }
}

// =============================================================================
// Integer sequences
// =============================================================================

// `[u8]` and `Vec<u8>` are covered by the verbatim impls above; one byte per
// element is the same encoding.
macro_rules! int_seq_key {
    ($($t:ty => $width:expr),*) => {$(
        impl EncodeKey for [$t] {
            fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
                out.reserve(self.len() * $width);
                for value in self {
                    value.encode_key(out)?;
                }
                Ok(())
            }
        }

        impl EncodeKey for Vec<$t> {
            fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
                self.as_slice().encode_key(out)
            }
        }

        impl DecodeKey for Vec<$t> {
            fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
                if bytes.len() % $width != 0 {
                    return Err(Error::key_type::<Vec<$t>>(format!(
                        "{} bytes is not a multiple of {}",
                        bytes.len(),
                        $width
                    )));
                }
                self.clear();
                self.reserve(bytes.len() / $width);
                for chunk in bytes.chunks_exact($width) {
                    let mut value: $t = 0;
                    value.decode_key(chunk)?;
                    self.push(value);
                }
                Ok(())
            }
        }
    )*};
}

int_seq_key!(
    u16 => 2, u32 => 4, u64 => 8, usize => 8,
    i8 => 1, i16 => 2, i32 => 4, i64 => 8, isize => 8
);
