//! Record mapping
//!
//! A record is any serde type stored in a bucket. It has zero or one key
//! field; the `Record` impl says which, and gives access to it. The binding
//! is fixed at compile time, so there is nothing to look up or cache when
//! records are read or written.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Arrow {
//!     id: String,
//!     length: u32,
//! }
//! record!(Arrow, key = id: String);
//!
//! #[derive(Serialize, Deserialize)]
//! struct Event {
//!     message: String,
//! }
//! record!(Event); // no key field: every put mints a new `Id`
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::key::{DecodeKey, EncodeKey};

/// A value that can be stored in a bucket
pub trait Record: Serialize + DeserializeOwned {
    /// Type of the key field, `()` when there is none
    type Key: EncodeKey + DecodeKey;

    /// Name of the key field
    const KEY_FIELD: Option<&'static str>;

    fn key(&self) -> Option<&Self::Key>;

    fn key_mut(&mut self) -> Option<&mut Self::Key>;
}

/// Implement `Record` for a struct
///
/// `record!(Type, key = field: KeyType)` binds `field` as the key;
/// `record!(Type)` declares a record without a key field.
#[macro_export]
macro_rules! record {
    ($ty:ty, key = $field:ident : $key:ty) => {
        impl $crate::Record for $ty {
            type Key = $key;

            const KEY_FIELD: Option<&'static str> = Some(stringify!($field));

            fn key(&self) -> Option<&$key> {
                Some(&self.$field)
            }

            fn key_mut(&mut self) -> Option<&mut $key> {
                Some(&mut self.$field)
            }
        }
    };
    ($ty:ty) => {
        impl $crate::Record for $ty {
            type Key = ();

            const KEY_FIELD: Option<&'static str> = None;

            fn key(&self) -> Option<&()> {
                None
            }

            fn key_mut(&mut self) -> Option<&mut ()> {
                None
            }
        }
    };
}

/// Encoded key of `record`; empty when it has no key field or the key is
/// empty (empty string, nil `Id`).
pub fn extract_key<R: Record>(record: &R) -> Result<Vec<u8>> {
    match record.key() {
        Some(key) => key.to_key_bytes(),
        None => Ok(Vec::new()),
    }
}

/// Decode `key` into the key field of `record`
///
/// Empty input leaves the field as it is.
pub fn inject_key<R: Record>(record: &mut R, key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Ok(());
    }
    match record.key_mut() {
        Some(field) => field.decode_key(key),
        None => Ok(()),
    }
}
