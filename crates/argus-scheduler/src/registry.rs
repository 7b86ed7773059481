//! Sync-context registry.
//!
//! One cancellation scope per in-flight integration sync, keyed by
//! integration id. Registering a key that is already present cancels the
//! old scope first: the superseded run observes the trip at its next page
//! boundary. Entries carry a generation so a finished run never removes a
//! replacement registered after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
struct Entry {
    generation: u64,
    token: CancellationToken,
}

/// Registry of in-flight sync scopes.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

impl SyncRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope for an integration, cancelling any scope already
    /// registered under the same id.
    #[must_use]
    pub fn register(&self, id: &str) -> SyncGuard {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut entries = self.inner.entries.lock();
        if let Some(previous) = entries.insert(
            id.to_string(),
            Entry {
                generation,
                token: token.clone(),
            },
        ) {
            info!(integration_id = id, "replacing in-flight sync scope");
            previous.token.cancel();
        }

        SyncGuard {
            registry: self.clone(),
            id: id.to_string(),
            generation,
            token,
        }
    }

    /// Cancel and remove the scope for an id. No-op for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.remove(id) {
            info!(integration_id = id, "cancelling sync");
            entry.token.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every registered scope.
    pub fn cancel_all(&self) {
        let mut entries = self.inner.entries.lock();
        for (id, entry) in entries.drain() {
            info!(integration_id = %id, "cancelling sync on shutdown");
            entry.token.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deregister(&self, id: &str, generation: u64) {
        let mut entries = self.inner.entries.lock();
        if entries.get(id).is_some_and(|e| e.generation == generation) {
            entries.remove(id);
        }
    }
}

/// Scope handle held for the duration of one integration sync. Dropping it
/// removes the registry entry, unless a newer scope took the key over.
#[derive(Debug)]
pub struct SyncGuard {
    registry: SyncRegistry,
    id: String,
    generation: u64,
    token: CancellationToken,
}

impl SyncGuard {
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_trips_the_scope_and_removes_it() {
        let registry = SyncRegistry::new();
        let guard = registry.register("int-1");
        assert_eq!(registry.len(), 1);

        assert!(registry.cancel("int-1"));
        assert!(guard.token().is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_of_unknown_id_is_a_no_op() {
        let registry = SyncRegistry::new();
        assert!(!registry.cancel("missing"));
    }

    #[test]
    fn reregistration_cancels_the_old_scope() {
        let registry = SyncRegistry::new();
        let old = registry.register("int-1");
        let new = registry.register("int-1");

        assert!(old.token().is_cancelled());
        assert!(!new.token().is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_guard_drop_does_not_remove_replacement() {
        let registry = SyncRegistry::new();
        let old = registry.register("int-1");
        let new = registry.register("int-1");

        drop(old);
        assert_eq!(registry.len(), 1, "replacement must survive the old drop");
        drop(new);
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_all_trips_every_scope() {
        let registry = SyncRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");

        registry.cancel_all();
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert!(registry.is_empty());
    }
}
