//! Binary codec (bincode)
//!
//! bincode is not self-describing: records must be decoded with the same
//! shape they were encoded with.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

use super::Codec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(data)?)
    }
}
