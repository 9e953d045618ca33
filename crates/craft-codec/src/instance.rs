use std::fmt;

use bytes::Bytes;
use craft_content::{FieldValues, Key};

/// A live custom object: its key plus logical field values.
///
/// The surrogate is not stored; it is re-resolved from `key` under whatever
/// snapshot is current when the object is encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInstance {
    pub key: Key,
    pub values: FieldValues,
}

impl ObjectInstance {
    pub fn new(key: Key, values: FieldValues) -> Self {
        Self { key, values }
    }
}

/// Encoded surrogate record as the host persists or transmits it.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct SurrogateBytes(Bytes);

impl SurrogateBytes {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for SurrogateBytes {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for SurrogateBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for SurrogateBytes {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

impl fmt::Debug for SurrogateBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurrogateBytes({} bytes)", self.0.len())
    }
}
