//! Process-local connection registry.
//!
//! Maps a [`ConnectionId`] to the live, send-capable handle for that
//! connection. The registry is the single owner of handles: other
//! components look a handle up per operation and drop it afterwards.
//! Locks are never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ids::ConnectionId;

/// Connection id → handle table.
pub struct ConnectionRegistry<H> {
    entries: RwLock<HashMap<ConnectionId, Arc<H>>>,
}

impl<H> ConnectionRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handle, replacing any entry already held for `id`.
    ///
    /// Returns the replaced handle: a reused id is a fresh connection.
    pub fn register(&self, id: ConnectionId, handle: Arc<H>) -> Option<Arc<H>> {
        self.entries.write().insert(id, handle)
    }

    /// Look up the handle for `id`.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<H>> {
        self.entries.read().get(id).cloned()
    }

    /// Remove the entry for `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<H>> {
        self.entries.write().remove(id)
    }

    /// Remove the entry for `id` only if it still holds `handle`.
    ///
    /// A closing socket must not evict the entry of a newer connection
    /// that reused its id.
    pub fn remove_if_same(&self, id: &ConnectionId, handle: &Arc<H>) -> bool {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                let _ = entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every entry (process shutdown). Returns how many were held.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
