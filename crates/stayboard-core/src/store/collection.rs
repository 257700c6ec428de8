// ── Generic reactive entity collection ──
//
// Insertion-ordered storage with O(1) lookups and push-based change
// notification via `watch` channels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use indexmap::map::Entry;
use tokio::sync::watch;

use crate::model::{Entity, EntityId};

/// Ordered, observable set of entities keyed by id.
///
/// Insert order is preserved and an update keeps the entity's position.
/// Every effective mutation bumps a version counter and rebuilds the
/// snapshot that subscribers receive; writes that change nothing are
/// not broadcast.
pub struct ReactiveCollection<T: Entity> {
    entries: Mutex<IndexMap<EntityId, Arc<T>>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Entity> Default for ReactiveCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> ReactiveCollection<T> {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            entries: Mutex::new(IndexMap::new()),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity by its id. Returns `true` if the id
    /// was new.
    pub fn upsert(&self, entity: T) -> bool {
        let mut entries = self.lock();
        let id = entity.id().clone();

        let is_new = match entries.entry(id) {
            Entry::Occupied(mut slot) => {
                if **slot.get() == entity {
                    return false;
                }
                slot.insert(Arc::new(entity));
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(entity));
                true
            }
        };

        self.publish(&entries);
        is_new
    }

    /// Remove an entity by id. Returns the removed entity if it existed.
    pub fn remove(&self, id: &EntityId) -> Option<Arc<T>> {
        let mut entries = self.lock();
        let removed = entries.shift_remove(id);
        if removed.is_some() {
            self.publish(&entries);
        }
        removed
    }

    /// Replace the whole contents, keeping the relative order of ids
    /// that survive. Used for initial loads and resyncs.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        let mut entries = self.lock();
        let mut next: IndexMap<EntityId, Arc<T>> = items
            .into_iter()
            .map(|e| (e.id().clone(), Arc::new(e)))
            .collect();

        let mut ordered = IndexMap::with_capacity(next.len());
        for id in entries.keys() {
            if let Some((id, entity)) = next.shift_remove_entry(id) {
                ordered.insert(id, entity);
            }
        }
        ordered.extend(next);

        let unchanged = ordered.len() == entries.len()
            && ordered
                .iter()
                .zip(entries.iter())
                .all(|((a_id, a), (b_id, b))| a_id == b_id && a == b);
        if unchanged {
            return;
        }

        *entries = ordered;
        self.publish(&entries);
    }

    /// Drop every entity for which `keep` returns `false`. Returns how
    /// many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entity| keep(entity));
        let removed = before - entries.len();
        if removed > 0 {
            self.publish(&entries);
        }
        removed
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<T>> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.lock().contains_key(id)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn all(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids in display order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.lock().keys().cloned().collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, IndexMap<EntityId, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the snapshot from `entries` and broadcast it. Called with
    /// the lock held so snapshots are published in mutation order.
    fn publish(&self, entries: &IndexMap<EntityId, Arc<T>>) {
        let values: Vec<Arc<T>> = entries.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
