use std::sync::Arc;

use parking_lot::RwLock;

/// Shared pointer to an immutable snapshot, replaced wholesale.
///
/// Readers clone the `Arc` under a read lock held only for the clone, so a
/// reader sees exactly one snapshot for as long as it holds the handle.
/// Writers build the replacement outside the lock and only swap the pointer.
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Installs `next` and returns the snapshot it replaced.
    pub fn store(&self, next: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SnapshotCell").field(&*self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_snapshots_survive_a_store() {
        let cell = SnapshotCell::new(vec![1, 2]);
        let before = cell.load();
        let old = cell.store(Arc::new(vec![3]));
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*cell.load(), vec![3]);
    }
}
