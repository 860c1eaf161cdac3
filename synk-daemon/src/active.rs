//! The active set: task ids that currently own an execution unit.
//!
//! Membership is claimed through [`ActiveSet::try_activate`], which hands out
//! an [`ActiveGuard`]. Dropping the guard (normal completion, error or
//! panic unwind) releases the id. Each activation carries a generation so a
//! stale guard never releases a newer activation of the same id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use synk_core::TaskId;

#[derive(Debug, Default)]
struct Inner {
    ids: HashMap<TaskId, u64>,
    next_generation: u64,
}

#[derive(Debug, Default)]
pub struct ActiveSet {
    inner: Mutex<Inner>,
}

impl ActiveSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `id`; `None` if it is already active.
    pub fn try_activate(self: &Arc<Self>, id: &TaskId) -> Option<ActiveGuard> {
        let mut inner = self.lock();
        if inner.ids.contains_key(id) {
            return None;
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.ids.insert(id.clone(), generation);
        Some(ActiveGuard {
            set: Arc::clone(self),
            id: id.clone(),
            generation,
        })
    }

    /// Forget `id` regardless of who holds it.
    pub fn discard(&self, id: &TaskId) -> bool {
        self.lock().ids.remove(id).is_some()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.lock().ids.contains_key(id)
    }

    /// Sorted snapshot of active ids.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().ids.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn release(&self, id: &TaskId, generation: u64) {
        let mut inner = self.lock();
        if inner.ids.get(id) == Some(&generation) {
            inner.ids.remove(id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of membership in the active set.
#[derive(Debug)]
pub struct ActiveGuard {
    set: Arc<ActiveSet>,
    id: TaskId,
    generation: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.set.release(&self.id, self.generation);
    }
}
