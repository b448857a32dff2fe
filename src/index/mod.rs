pub mod bm25;
pub mod dense;
pub mod manager;

pub use bm25::Bm25Index;
pub use dense::DenseIndex;
pub use manager::{IndexManager, IndexStatus};

use std::sync::{Arc, RwLock};

/// Swap-on-load handle to a frozen index.
///
/// A load atomically replaces the inner `Arc`; in-flight readers keep the
/// clone they already obtained and finish on the previous index, so no
/// ranking ever observes a half-swapped view.
pub struct SharedIndex<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> SharedIndex<T> {
    /// Create an empty (not ready) handle.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Return true if an index is installed.
    pub fn is_ready(&self) -> bool {
        self.inner.read().unwrap().is_some()
    }

    /// Clone the current index handle, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.inner.read().unwrap().clone()
    }

    /// Install a new index, replacing any previous one.
    pub fn install(&self, index: T) {
        *self.inner.write().unwrap() = Some(Arc::new(index));
    }

    /// Drop the installed index (handle becomes not ready).
    pub fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }
}

impl<T> Default for SharedIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_starts_empty() {
        let handle: SharedIndex<u32> = SharedIndex::new();
        assert!(!handle.is_ready());
        assert!(handle.get().is_none());
    }

    #[test]
    fn test_install_and_clear() {
        let handle: SharedIndex<u32> = SharedIndex::new();
        handle.install(7);
        assert!(handle.is_ready());
        assert_eq!(*handle.get().unwrap(), 7);

        handle.clear();
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_readers_keep_previous_handle_across_swap() {
        let handle: SharedIndex<u32> = SharedIndex::new();
        handle.install(1);

        let held = handle.get().unwrap();
        handle.install(2);

        // The reader that grabbed the handle before the swap still sees the
        // old index; new readers see the replacement.
        assert_eq!(*held, 1);
        assert_eq!(*handle.get().unwrap(), 2);
    }
}
