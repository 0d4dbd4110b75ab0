//! Pooled connections and their expiry bookkeeping.

use std::time::{Duration, Instant};

/// One physical connection owned by the pool, tied to a route and an
/// optional state token.
///
/// An entry handed out by a lease belongs to the caller until it is given
/// back with [`ConnPool::release`](super::ConnPool::release).
#[derive(Debug)]
pub struct PoolEntry<R, C, T> {
    id: u64,
    route: R,
    connection: C,
    state: Option<T>,
    created: Instant,
    updated: Instant,
    valid_until: Option<Instant>,
    expiry: Option<Instant>,
}

impl<R, C, T> PoolEntry<R, C, T> {
    pub(crate) fn new(id: u64, route: R, connection: C, state: Option<T>, time_to_live: Option<Duration>) -> Self {
        let created = Instant::now();
        let valid_until = time_to_live.and_then(|ttl| created.checked_add(ttl));
        Self {
            id,
            route,
            connection,
            state,
            created,
            updated: created,
            valid_until,
            expiry: valid_until,
        }
    }

    /// Pool-unique identifier.
    #[must_use]
    pub fn id(&self) -> u64 { self.id }

    /// Route this connection serves.
    #[must_use]
    pub fn route(&self) -> &R { &self.route }

    /// The pooled connection.
    #[must_use]
    pub fn connection(&self) -> &C { &self.connection }

    /// Mutable access to the pooled connection.
    pub fn connection_mut(&mut self) -> &mut C { &mut self.connection }

    /// State token used to match compatible leases.
    #[must_use]
    pub fn state(&self) -> Option<&T> { self.state.as_ref() }

    /// Replace the state token, for example once the connection has been
    /// authenticated.
    pub fn set_state(&mut self, state: Option<T>) { self.state = state; }

    /// When the entry was created.
    #[must_use]
    pub fn created(&self) -> Instant { self.created }

    /// When the expiry was last updated; the entry's idle clock starts here.
    #[must_use]
    pub fn updated(&self) -> Instant { self.updated }

    /// Deadline after which the entry is discarded instead of reused.
    #[must_use]
    pub fn expiry(&self) -> Option<Instant> { self.expiry }

    /// Keep the connection reusable for `keep_alive` from now, never beyond
    /// its time to live. `None` keeps it until the time to live runs out.
    ///
    /// Call this while the entry is leased, just before releasing it.
    pub fn update_expiry(&mut self, keep_alive: Option<Duration>) {
        let now = Instant::now();
        self.updated = now;
        let requested = keep_alive.and_then(|d| now.checked_add(d));
        self.expiry = match (requested, self.valid_until) {
            (Some(requested), Some(limit)) => Some(requested.min(limit)),
            (requested, limit) => requested.or(limit),
        };
    }

    /// Returns `true` once `now` is at or past the expiry deadline.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool { self.expiry.is_some_and(|deadline| now >= deadline) }

    pub(crate) fn into_connection(self) -> C { self.connection }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_capped_by_time_to_live() {
        let mut entry = PoolEntry::<&str, (), ()>::new(1, "a", (), None, Some(Duration::from_millis(10)));
        entry.update_expiry(Some(Duration::from_secs(60)));
        let expiry = entry.expiry().expect("bounded expiry");
        assert!(expiry <= entry.created() + Duration::from_millis(10));
    }

    #[test]
    fn unbounded_entry_never_expires() {
        let mut entry = PoolEntry::<&str, (), ()>::new(1, "a", (), None, None);
        entry.update_expiry(None);
        assert!(!entry.is_expired(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn short_keep_alive_expires() {
        let mut entry = PoolEntry::<&str, (), ()>::new(1, "a", (), None, None);
        entry.update_expiry(Some(Duration::from_millis(1)));
        assert!(entry.is_expired(Instant::now() + Duration::from_millis(2)));
    }
}
