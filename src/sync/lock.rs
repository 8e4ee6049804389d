//! Scoped reader/writer lock wrapper.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer lock with scoped acquisition helpers.
#[derive(Debug, Default)]
pub struct ScopedRwLock<T> {
    inner: RwLock<T>,
}

impl<T> ScopedRwLock<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquire shared access.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read())
    }

    /// Run `f` under the write lock.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }

    /// Look up under the read lock; on a miss, upgrade to the write lock,
    /// look up again and only then insert.
    ///
    /// Two racing writers cannot both insert: the second one finds the
    /// first one's value on the re-check.
    pub fn get_or_insert_with<R>(
        &self,
        lookup: impl Fn(&T) -> Option<R>,
        insert: impl FnOnce(&mut T) -> R,
    ) -> R {
        if let Some(found) = lookup(&self.read()) {
            return found;
        }

        let mut guard = self.write();
        match lookup(&guard) {
            Some(found) => found,
            None => insert(&mut guard),
        }
    }
}
