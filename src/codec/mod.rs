//! Value codecs
//!
//! A codec turns whole records into the bytes stored under their key and
//! back. The codec is chosen once per database and used for every bucket, so
//! bucket logic never depends on a particular format. `Db::open` picks one of
//! the built-in codecs from `Config::format`; `Db::open_with_codec` takes any
//! `Codec` implementation.
//!
//! | Format   | Codec         | Encoding            |
//! |----------|---------------|---------------------|
//! | `Json`   | `JsonCodec`   | serde_json          |
//! | `Binary` | `BinaryCodec` | bincode (compact)   |

mod binary;
mod json;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// Data interchange format of a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Compact binary encoding (bincode)
    Binary,
    /// Human-readable JSON
    #[default]
    Json,
}

/// Marshals and unmarshals values
///
/// Iterators and subscriptions carry their own clone of the database codec.
pub trait Codec: Clone {
    /// Encode `value`
    fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode `data` into a new value
    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;

    /// Decode `data` over an existing value
    fn unmarshal_into<T: DeserializeOwned>(&self, data: &[u8], out: &mut T) -> Result<()> {
        *out = self.unmarshal(data)?;
        Ok(())
    }
}

/// The codec selected by a database's `Format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    Binary(BinaryCodec),
    Json(JsonCodec),
}

impl From<Format> for ValueCodec {
    fn from(format: Format) -> Self {
        match format {
            Format::Binary => ValueCodec::Binary(BinaryCodec),
            Format::Json => ValueCodec::Json(JsonCodec),
        }
    }
}

impl Codec for ValueCodec {
    fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            ValueCodec::Binary(c) => c.marshal(value),
            ValueCodec::Json(c) => c.marshal(value),
        }
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            ValueCodec::Binary(c) => c.unmarshal(data),
            ValueCodec::Json(c) => c.unmarshal(data),
        }
    }
}
