//! Per-route bookkeeping.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Instant,
};

use super::{PoolEntry, PoolError, PoolStats, SessionRequest, future::LeaseHandle};

/// A connect attempt and the lease waiting on it.
pub(crate) struct PendingConnect<R, S, C, T> {
    pub(crate) request: SessionRequest<S>,
    pub(crate) lease: LeaseHandle<PoolEntry<R, C, T>>,
    pub(crate) state: Option<T>,
}

/// Connections of a single route.
///
/// Every allocated connection is exactly one of leased, available or
/// pending. Available entries are ordered most recently released first.
pub(crate) struct RoutePool<R, S, C, T> {
    leased: HashSet<u64>,
    available: VecDeque<PoolEntry<R, C, T>>,
    pending: HashMap<u64, PendingConnect<R, S, C, T>>,
}

impl<R, S, C, T> RoutePool<R, S, C, T> {
    pub(crate) fn new() -> Self {
        Self {
            leased: HashSet::new(),
            available: VecDeque::new(),
            pending: HashMap::new(),
        }
    }

    pub(crate) fn allocated(&self) -> usize { self.leased.len() + self.available.len() + self.pending.len() }

    pub(crate) fn leased_count(&self) -> usize { self.leased.len() }

    pub(crate) fn available_count(&self) -> usize { self.available.len() }

    pub(crate) fn pending_count(&self) -> usize { self.pending.len() }

    pub(crate) fn stats(&self, max: usize) -> PoolStats {
        PoolStats::new(self.available.len(), self.leased.len(), self.pending.len(), max)
    }

    pub(crate) fn add_pending(&mut self, pending: PendingConnect<R, S, C, T>) {
        self.pending.insert(pending.request.id(), pending);
    }

    /// Stop tracking a connect attempt. `None` if it was already settled.
    pub(crate) fn take_pending(&mut self, id: u64) -> Option<PendingConnect<R, S, C, T>> { self.pending.remove(&id) }

    pub(crate) fn mark_leased(&mut self, id: u64) { self.leased.insert(id); }

    /// Drop entry `id` from whichever set holds it.
    ///
    /// Returns `true` if it was present. An available entry is dropped along
    /// with its connection, so callers remove leased or pending entries.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        if self.leased.remove(&id) || self.pending.remove(&id).is_some() {
            return true;
        }
        let before = self.available.len();
        self.available.retain(|entry| entry.id() != id);
        self.available.len() != before
    }

    /// Lease the most recently released entry whose state equals `state`.
    pub(crate) fn take_free(&mut self, state: Option<&T>) -> Option<PoolEntry<R, C, T>>
    where
        T: PartialEq,
    {
        let index = self.available.iter().position(|entry| entry.state() == state)?;
        let entry = self.available.remove(index)?;
        self.leased.insert(entry.id());
        Some(entry)
    }

    /// Give back a leased entry, keeping it for reuse when `keep` is set.
    ///
    /// Returns the entry's connection when it must be closed.
    pub(crate) fn free(&mut self, entry: PoolEntry<R, C, T>, keep: bool) -> Result<Option<C>, PoolError> {
        if !self.leased.remove(&entry.id()) {
            return Err(PoolError::InvalidState("entry is not leased from this pool"));
        }
        if keep {
            self.available.push_front(entry);
            return Ok(None);
        }
        Ok(Some(entry.into_connection()))
    }

    /// Remove the least recently released entry.
    pub(crate) fn evict_lru(&mut self) -> Option<PoolEntry<R, C, T>> { self.available.pop_back() }

    /// When the least recently released entry was last updated.
    pub(crate) fn lru_updated(&self) -> Option<Instant> { self.available.back().map(PoolEntry::updated) }

    /// Remove every available entry matching `pred`.
    pub(crate) fn remove_available(&mut self, mut pred: impl FnMut(&PoolEntry<R, C, T>) -> bool) -> Vec<PoolEntry<R, C, T>> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.available.len());
        for entry in self.available.drain(..) {
            if pred(&entry) {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.available = kept;
        removed
    }

    /// Forget everything, returning what the caller must close or cancel.
    pub(crate) fn shutdown(&mut self) -> (Vec<PoolEntry<R, C, T>>, Vec<PendingConnect<R, S, C, T>>) {
        self.leased.clear();
        let available = self.available.drain(..).collect();
        let pending = self.pending.drain().map(|(_, pending)| pending).collect();
        (available, pending)
    }
}
