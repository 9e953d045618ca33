use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported host version '{0}'")]
pub struct UnknownVersion(pub String);

/// Supported host releases. Everything version-specific hangs off this tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HostVersion {
    V1_20_1,
    V1_20_4,
    V1_20_6,
    V1_21_1,
    V1_21_4,
}

impl HostVersion {
    pub const ALL: [HostVersion; 5] = [
        HostVersion::V1_20_1,
        HostVersion::V1_20_4,
        HostVersion::V1_20_6,
        HostVersion::V1_21_1,
        HostVersion::V1_21_4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HostVersion::V1_20_1 => "1.20.1",
            HostVersion::V1_20_4 => "1.20.4",
            HostVersion::V1_20_6 => "1.20.6",
            HostVersion::V1_21_1 => "1.21.1",
            HostVersion::V1_21_4 => "1.21.4",
        }
    }

    /// Item appearances switched from numeric model data to model ids in 1.21.4.
    pub fn has_item_model_component(self) -> bool {
        self >= HostVersion::V1_21_4
    }
}

impl FromStr for HostVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVersion(s.to_string()))
    }
}

impl TryFrom<String> for HostVersion {
    type Error = UnknownVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HostVersion> for String {
    fn from(value: HostVersion) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
