use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "craft";
pub const HOST_NAMESPACE: &str = "minecraft";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("empty key")]
    Empty,
    #[error("key '{raw}' has an empty namespace or path")]
    EmptyPart { raw: String },
    #[error("key '{raw}' contains invalid character {ch:?}")]
    InvalidChar { raw: String, ch: char },
}

/// Stable namespaced identifier, `namespace:path`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key {
    raw: String,
    split: usize,
}

impl Key {
    /// Parses `raw`, falling back to `default_ns` when no namespace is given.
    pub fn parse_with_default(raw: &str, default_ns: &str) -> Result<Key, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        let (ns, path) = match raw.split_once(':') {
            Some((ns, path)) => (ns, path),
            None => (default_ns, raw),
        };
        if ns.is_empty() || path.is_empty() {
            return Err(KeyError::EmptyPart { raw: raw.into() });
        }
        for ch in ns.chars() {
            if !matches!(ch, 'a'..='z' | '0'..='9' | '_' | '-' | '.') {
                return Err(KeyError::InvalidChar { raw: raw.into(), ch });
            }
        }
        for ch in path.chars() {
            if !matches!(ch, 'a'..='z' | '0'..='9' | '_' | '-' | '.' | '/') {
                return Err(KeyError::InvalidChar { raw: raw.into(), ch });
            }
        }
        Ok(Key {
            raw: format!("{ns}:{path}"),
            split: ns.len(),
        })
    }

    /// Host-native key such as `minecraft:bedrock`.
    pub fn host(path: &str) -> Result<Key, KeyError> {
        Self::parse_with_default(path, HOST_NAMESPACE)
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.raw[..self.split]
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::parse_with_default(s, DEFAULT_NAMESPACE)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(value: Key) -> Self {
        value.raw
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.raw)
    }
}
