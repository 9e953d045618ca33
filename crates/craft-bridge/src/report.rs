use craft_content::Key;

use crate::pos::BlockPos;

/// One object that degraded instead of failing its bulk operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectFailure {
    pub pos: BlockPos,
    pub key: Option<Key>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub native: usize,
    pub custom: usize,
    pub placeholders: Vec<ObjectFailure>,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.native + self.custom + self.placeholders.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub native: usize,
    pub custom: usize,
    /// Placeholders written back with their original bytes.
    pub preserved: usize,
    /// Custom objects that could not be encoded onto a surrogate and were
    /// written under the fallback native instead.
    pub detached: Vec<ObjectFailure>,
}

impl SaveReport {
    pub fn total(&self) -> usize {
        self.native + self.custom + self.preserved + self.detached.len()
    }
}
