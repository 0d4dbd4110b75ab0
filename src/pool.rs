//! Route-aware pool of persistent connections.
//!
//! [`ConnPool`] leases connections grouped by route under a per-route and a
//! total limit. A lease is served from an idle connection with a matching
//! state token when one exists, by a new connect attempt when capacity
//! allows, and otherwise waits in a FIFO queue. Idle connections are evicted
//! to make room for routes that need capacity; leased connections never are.
//!
//! All bookkeeping sits behind one mutex. Connects, connection closes and
//! lease completions run after it is released, so user hooks may call back
//! into the pool.

use std::{
    cmp::Reverse,
    collections::{HashMap, VecDeque},
    fmt,
    hash::Hash,
    io,
    mem,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};

mod config;
mod connector;
mod entry;
mod error;
mod future;
mod request;
mod route;
mod stats;

pub use config::{DEFAULT_MAX_PER_ROUTE, DEFAULT_MAX_TOTAL, PoolConfig, PoolConfigBuilder};
pub use connector::{Connector, EntryFactory, RouteResolver};
pub use entry::PoolEntry;
pub use error::PoolError;
pub use future::{FutureCallback, LeaseFuture};
pub use request::SessionRequest;
pub use stats::PoolStats;

use self::{
    future::{LeaseHandle, lease_pair},
    request::{ConnectOutcome, RequestListener},
    route::{PendingConnect, RoutePool},
};
use crate::metrics::{Outcome, inc_connects, inc_evictions};

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Callback type accepted by [`ConnPool::lease`].
pub type LeaseCallback<R, C, T> = Box<dyn FutureCallback<PoolEntry<R, C, T>>>;

struct LeaseRequest<R, C, T> {
    route: R,
    state: Option<T>,
    deadline: Option<Instant>,
    connect_timeout: Option<Duration>,
    lease: LeaseHandle<PoolEntry<R, C, T>>,
}

/// Work deferred until the pool lock is released.
enum Action<R, S, C, T> {
    Deliver {
        lease: LeaseHandle<PoolEntry<R, C, T>>,
        entry: PoolEntry<R, C, T>,
        fresh: bool,
    },
    Fail {
        lease: LeaseHandle<PoolEntry<R, C, T>>,
        error: PoolError,
    },
    Connect(SessionRequest<S>),
    Cancel(SessionRequest<S>),
    Close(C),
}

struct State<R, S, C, T> {
    config: PoolConfig<R>,
    routes: HashMap<R, RoutePool<R, S, C, T>>,
    pending_routes: HashMap<u64, R>,
    queue: VecDeque<LeaseRequest<R, C, T>>,
    shutdown: bool,
}

struct Inner<R, S, C, T> {
    me: Weak<Self>,
    state: Mutex<State<R, S, C, T>>,
    next_id: AtomicU64,
    resolver: Arc<dyn RouteResolver<R>>,
    connector: Arc<dyn Connector<S>>,
    factory: Arc<dyn EntryFactory<R, S, C>>,
}

/// Pool of connections keyed by route `R`.
///
/// `S` is the session type produced by the [`Connector`], `C` the connection
/// type built from it by the [`EntryFactory`], and `T` the state token used
/// to match reusable connections. Cloning the pool yields another handle to
/// the same pool.
pub struct ConnPool<R, S, C, T> {
    inner: Arc<Inner<R, S, C, T>>,
}

impl<R, S, C, T> Clone for ConnPool<R, S, C, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, S, C, T> fmt::Debug for ConnPool<R, S, C, T>
where
    R: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    S: Send + 'static,
    C: Send + 'static,
    T: PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnPool")
            .field("stats", &self.total_stats())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<R, S, C, T> ConnPool<R, S, C, T>
where
    R: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    S: Send + 'static,
    C: Send + 'static,
    T: PartialEq + Send + Sync + 'static,
{
    /// Create a pool using the given collaborators.
    #[must_use]
    pub fn new(
        config: PoolConfig<R>,
        resolver: Arc<dyn RouteResolver<R>>,
        connector: Arc<dyn Connector<S>>,
        factory: Arc<dyn EntryFactory<R, S, C>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            state: Mutex::new(State {
                config,
                routes: HashMap::new(),
                pending_routes: HashMap::new(),
                queue: VecDeque::new(),
                shutdown: false,
            }),
            next_id: AtomicU64::new(1),
            resolver,
            connector,
            factory,
        });
        Self { inner }
    }

    /// Lease a connection for `route` whose state token equals `state`.
    ///
    /// `timeout` bounds how long the lease may wait, falling back to the
    /// configured default lease timeout; it is also handed to the connector
    /// as the connect timeout. The returned future fails with
    /// [`PoolError::Shutdown`] once the pool is shut down.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn demo(pool: wireline::pool::ConnPool<&'static str, (), (), ()>) {
    /// let mut entry = pool.lease("backend", None, None, None).await.unwrap();
    /// // ... use entry.connection_mut() ...
    /// entry.update_expiry(Some(std::time::Duration::from_secs(30)));
    /// pool.release(entry, true).unwrap();
    /// # }
    /// ```
    pub fn lease(
        &self,
        route: R,
        state: Option<T>,
        timeout: Option<Duration>,
        callback: Option<LeaseCallback<R, C, T>>,
    ) -> LeaseFuture<PoolEntry<R, C, T>> {
        self.inner.lease(route, state, timeout, callback)
    }

    /// Return a leased entry to the pool.
    ///
    /// Reusable entries that are still open become available to later
    /// leases; others are closed. Queued leases are then served in FIFO
    /// order. After shutdown the entry is closed.
    ///
    /// # Errors
    /// [`PoolError::InvalidArgument`] if the entry's route has no pool, and
    /// [`PoolError::InvalidState`] if the entry is not leased from this pool.
    pub fn release(&self, entry: PoolEntry<R, C, T>, reusable: bool) -> Result<(), PoolError> {
        self.inner.release(entry, reusable)
    }

    /// Settle a connect attempt that produced a session.
    ///
    /// The session is carried by the request, so only an attempt already
    /// resolved through [`SessionRequest::completed`] is settled. A pending
    /// attempt is left untouched. Settling the same attempt twice has no
    /// effect.
    pub fn request_completed(&self, request: &SessionRequest<S>) {
        if request.is_done() {
            self.inner.settle(request);
        }
    }

    /// Fail a connect attempt.
    ///
    /// An attempt that was already resolved is settled with its recorded
    /// outcome instead.
    pub fn request_failed(&self, request: &SessionRequest<S>) {
        if !request.failed(io::Error::other("connect failed")) {
            self.inner.settle(request);
        }
    }

    /// Cancel a connect attempt. A session delivered afterwards is handed
    /// back to the connector.
    pub fn request_cancelled(&self, request: &SessionRequest<S>) {
        if !request.cancel() {
            self.inner.settle(request);
        }
    }

    /// Time out a connect attempt.
    pub fn request_timeout(&self, request: &SessionRequest<S>) {
        if !request.timeout() {
            self.inner.settle(request);
        }
    }

    /// Close idle connections whose expiry has passed.
    pub fn close_expired(&self) {
        let now = Instant::now();
        self.inner.close_available(|entry| entry.is_expired(now));
    }

    /// Close connections idle for longer than `idle`.
    ///
    /// [`Duration::ZERO`] closes every idle connection.
    pub fn close_idle(&self, idle: Duration) {
        let cutoff = Instant::now().checked_sub(idle);
        self.inner
            .close_available(|entry| cutoff.is_some_and(|cutoff| entry.updated() <= cutoff));
    }

    /// Fail queued leases whose deadline has passed and drop cancelled ones.
    pub fn validate_pending_requests(&self) { self.inner.validate_pending_requests(); }

    /// Set the limit for one route.
    pub fn set_max_per_route(&self, route: R, max: usize) {
        self.inner.update_config(|config| config.set_max_per_route(route, max));
    }

    /// Set the limit across all routes.
    pub fn set_max_total(&self, max: usize) { self.inner.update_config(|config| config.set_max_total(max)); }

    /// Set the limit for routes without an override.
    pub fn set_default_max_per_route(&self, max: usize) {
        self.inner
            .update_config(|config| config.set_default_max_per_route(max));
    }

    /// Effective limit for `route`.
    #[must_use]
    pub fn max_per_route(&self, route: &R) -> usize { lock(&self.inner.state).config.max_for(route) }

    /// Limit across all routes.
    #[must_use]
    pub fn max_total(&self) -> usize { lock(&self.inner.state).config.max_total() }

    /// Limit for routes without an override.
    #[must_use]
    pub fn default_max_per_route(&self) -> usize { lock(&self.inner.state).config.default_max_per_route() }

    /// Occupancy of one route.
    #[must_use]
    pub fn stats(&self, route: &R) -> PoolStats {
        let st = lock(&self.inner.state);
        let max = st.config.max_for(route);
        st.routes
            .get(route)
            .map_or(PoolStats::new(0, 0, 0, max), |pool| pool.stats(max))
    }

    /// Occupancy of the whole pool.
    #[must_use]
    pub fn total_stats(&self) -> PoolStats {
        let st = lock(&self.inner.state);
        let (available, leased, pending) = st.routes.values().fold((0, 0, 0), |(a, l, p), pool| {
            (
                a + pool.available_count(),
                l + pool.leased_count(),
                p + pool.pending_count(),
            )
        });
        PoolStats::new(available, leased, pending, st.config.max_total())
    }

    /// Routes the pool has seen.
    #[must_use]
    pub fn routes(&self) -> Vec<R> { lock(&self.inner.state).routes.keys().cloned().collect() }

    /// Lease requests queued for capacity.
    #[must_use]
    pub fn pending_count(&self) -> usize { lock(&self.inner.state).queue.len() }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool { lock(&self.inner.state).shutdown }

    /// Shut the pool down.
    ///
    /// Queued leases fail, connect attempts are cancelled, idle connections
    /// are closed and the connector is given `grace` to stop. Leased
    /// connections are closed when released. Later calls do nothing.
    pub fn shutdown(&self, grace: Duration) { self.inner.shutdown(grace); }

    /// Periodically close expired connections and time out queued leases.
    ///
    /// The task holds only a weak reference and ends once the pool is shut
    /// down or dropped. Must be called within a tokio runtime.
    pub fn spawn_maintenance(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let pool = ConnPool { inner };
                if pool.is_shutdown() {
                    break;
                }
                pool.close_expired();
                pool.validate_pending_requests();
            }
            debug!("pool maintenance stopped");
        })
    }
}

impl<R, S, C, T> Inner<R, S, C, T>
where
    R: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    S: Send + 'static,
    C: Send + 'static,
    T: PartialEq + Send + Sync + 'static,
{
    fn lease(
        &self,
        route: R,
        state: Option<T>,
        timeout: Option<Duration>,
        callback: Option<LeaseCallback<R, C, T>>,
    ) -> LeaseFuture<PoolEntry<R, C, T>> {
        let (future, lease) = lease_pair(callback);
        let pool = self.me.clone();
        lease.set_reclaim(Box::new(move |entry| {
            if let Some(inner) = pool.upgrade()
                && let Err(e) = inner.release(entry, false)
            {
                warn!("failed to reclaim abandoned lease: error={e}");
            }
        }));

        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            if st.shutdown {
                drop(st);
                lease.fail(PoolError::Shutdown);
                return future;
            }
            let timeout = timeout.or(st.config.default_lease_timeout());
            let request = LeaseRequest {
                route,
                state,
                deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
                connect_timeout: timeout.or(st.config.default_connect_timeout()),
                lease,
            };
            if let Some(request) = self.process(&mut st, request, &mut actions) {
                debug!("lease queued: route={:?}", request.route);
                st.queue.push_back(request);
            }
        }
        self.run(actions);
        future
    }

    /// Try to serve `request`; hands it back if it has to wait.
    fn process(
        &self,
        st: &mut State<R, S, C, T>,
        request: LeaseRequest<R, C, T>,
        actions: &mut Vec<Action<R, S, C, T>>,
    ) -> Option<LeaseRequest<R, C, T>> {
        if request.lease.is_done() {
            return None;
        }
        let now = Instant::now();
        if request.deadline.is_some_and(|deadline| now >= deadline) {
            actions.push(Action::Fail {
                lease: request.lease,
                error: PoolError::Timeout,
            });
            return None;
        }
        let max_per_route = st.config.max_for(&request.route);
        let max_total = st.config.max_total();

        {
            let pool = st.routes.entry(request.route.clone()).or_insert_with(RoutePool::new);
            while let Some(entry) = pool.take_free(request.state.as_ref()) {
                if entry.is_expired(now) || self.factory.is_closed(entry.connection()) {
                    debug!("discarding stale connection: route={:?}, id={}", request.route, entry.id());
                    pool.remove(entry.id());
                    actions.push(Action::Close(entry.into_connection()));
                    continue;
                }
                actions.push(Action::Deliver {
                    lease: request.lease,
                    entry,
                    fresh: false,
                });
                return None;
            }

            let excess = (pool.allocated() + 1).saturating_sub(max_per_route);
            for _ in 0..excess {
                let Some(entry) = pool.evict_lru() else { break };
                evict(&request.route, entry, actions);
            }
            if pool.allocated() >= max_per_route {
                return Some(request);
            }
        }

        let (used, idle) = st.routes.values().fold((0, 0), |(used, idle), pool| {
            (
                used + pool.leased_count() + pool.pending_count(),
                idle + pool.available_count(),
            )
        });
        let free_capacity = max_total.saturating_sub(used);
        if free_capacity == 0 {
            return Some(request);
        }
        if idle > free_capacity - 1
            && let Some((route, pool)) = st
                .routes
                .iter_mut()
                .filter(|(_, pool)| pool.available_count() > 0)
                .max_by_key(|(_, pool)| (pool.available_count(), Reverse(pool.lru_updated())))
            && let Some(entry) = pool.evict_lru()
        {
            evict(route, entry, actions);
        }

        let addresses = self
            .resolver
            .resolve_remote(&request.route)
            .and_then(|remote| Ok((remote, self.resolver.resolve_local(&request.route)?)));
        let (remote, local) = match addresses {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("route resolution failed: route={:?}, error={e}", request.route);
                actions.push(Action::Fail {
                    lease: request.lease,
                    error: PoolError::Resolve(Arc::new(e)),
                });
                return None;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Weak<dyn RequestListener<S>> = self.me.clone();
        let session_request = SessionRequest::new(id, remote, local, request.connect_timeout, listener);
        debug!("connecting: route={:?}, remote={remote}, id={id}", request.route);
        st.pending_routes.insert(id, request.route.clone());
        st.routes
            .entry(request.route)
            .or_insert_with(RoutePool::new)
            .add_pending(PendingConnect {
                request: session_request.clone(),
                lease: request.lease,
                state: request.state,
            });
        actions.push(Action::Connect(session_request));
        None
    }

    fn drain_queue(&self, st: &mut State<R, S, C, T>, actions: &mut Vec<Action<R, S, C, T>>) {
        for request in mem::take(&mut st.queue) {
            if let Some(request) = self.process(st, request, actions) {
                st.queue.push_back(request);
            }
        }
    }

    fn run(&self, actions: Vec<Action<R, S, C, T>>) {
        for action in actions {
            match action {
                Action::Deliver { lease, entry, fresh } => {
                    if let Err(entry) = lease.deliver(entry) {
                        debug!(
                            "lease no longer waiting: route={:?}, id={}",
                            entry.route(),
                            entry.id()
                        );
                        if let Err(e) = self.release(entry, !fresh) {
                            warn!("failed to return undelivered connection: error={e}");
                        }
                    }
                }
                Action::Fail { lease, error } => {
                    lease.fail(error);
                }
                Action::Connect(request) => {
                    self.connector
                        .connect(request.remote_address(), request.local_address(), request);
                }
                Action::Cancel(request) => {
                    request.cancel();
                }
                Action::Close(connection) => self.factory.close(connection),
            }
        }
    }

    fn release(&self, entry: PoolEntry<R, C, T>, reusable: bool) -> Result<(), PoolError> {
        let mut actions = Vec::new();
        let result = {
            let mut st = lock(&self.state);
            if st.shutdown {
                actions.push(Action::Close(entry.into_connection()));
                Ok(())
            } else {
                let keep = reusable && !self.factory.is_closed(entry.connection());
                let result = match st.routes.get_mut(entry.route()) {
                    None => Err(PoolError::InvalidArgument("entry route has no pool")),
                    Some(pool) => pool.free(entry, keep).map(|closed| {
                        if let Some(connection) = closed {
                            actions.push(Action::Close(connection));
                        }
                    }),
                };
                if result.is_ok() {
                    self.drain_queue(&mut st, &mut actions);
                }
                result
            }
        };
        self.run(actions);
        result
    }

    fn settle(&self, request: &SessionRequest<S>) {
        let Some(outcome) = request.outcome() else {
            return;
        };
        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            let Some(route) = st.pending_routes.remove(&request.id()) else {
                return;
            };
            if st.shutdown {
                drop(st);
                if let Some(session) = request.take_session() {
                    debug!("closing connection completed after shutdown: route={route:?}");
                    self.factory.close(self.factory.create(&route, session));
                }
                return;
            }
            let time_to_live = st.config.time_to_live();
            let pending = st
                .routes
                .get_mut(&route)
                .and_then(|pool| pool.take_pending(request.id()));
            if let Some(pending) = pending {
                let action = self.settle_pending(&mut st, route, request, pending, outcome, time_to_live);
                actions.push(action);
            }
            self.drain_queue(&mut st, &mut actions);
        }
        self.run(actions);
    }

    fn settle_pending(
        &self,
        st: &mut State<R, S, C, T>,
        route: R,
        request: &SessionRequest<S>,
        pending: PendingConnect<R, S, C, T>,
        outcome: ConnectOutcome,
        time_to_live: Option<Duration>,
    ) -> Action<R, S, C, T> {
        let lease = pending.lease;
        let error = match outcome {
            ConnectOutcome::Completed => {
                let Some(session) = request.take_session() else {
                    return Action::Fail {
                        lease,
                        error: PoolError::InvalidState("connect completed without a session"),
                    };
                };
                inc_connects(Outcome::Completed);
                let connection = self.factory.create(&route, session);
                let entry = PoolEntry::new(request.id(), route.clone(), connection, pending.state, time_to_live);
                st.routes.entry(route).or_insert_with(RoutePool::new).mark_leased(entry.id());
                return Action::Deliver {
                    lease,
                    entry,
                    fresh: true,
                };
            }
            ConnectOutcome::Failed => {
                inc_connects(Outcome::Failed);
                let error = request
                    .error()
                    .unwrap_or_else(|| Arc::new(io::Error::other("connect failed")));
                warn!("connect failed: route={route:?}, error={error}");
                PoolError::Connect(error)
            }
            ConnectOutcome::Cancelled => {
                inc_connects(Outcome::Cancelled);
                debug!("connect cancelled: route={route:?}");
                PoolError::Cancelled
            }
            ConnectOutcome::TimedOut => {
                inc_connects(Outcome::Timeout);
                warn!("connect timed out: route={route:?}");
                PoolError::Timeout
            }
        };
        Action::Fail { lease, error }
    }

    fn close_available(&self, mut pred: impl FnMut(&PoolEntry<R, C, T>) -> bool) {
        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            if st.shutdown {
                return;
            }
            for pool in st.routes.values_mut() {
                for entry in pool.remove_available(&mut pred) {
                    debug!("closing idle connection: route={:?}, id={}", entry.route(), entry.id());
                    actions.push(Action::Close(entry.into_connection()));
                }
            }
            self.drain_queue(&mut st, &mut actions);
        }
        self.run(actions);
    }

    fn validate_pending_requests(&self) {
        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            let now = Instant::now();
            let queued = mem::take(&mut st.queue);
            for request in queued {
                if request.lease.is_done() {
                    continue;
                }
                if request.deadline.is_some_and(|deadline| now >= deadline) {
                    debug!("queued lease timed out: route={:?}", request.route);
                    actions.push(Action::Fail {
                        lease: request.lease,
                        error: PoolError::Timeout,
                    });
                    continue;
                }
                st.queue.push_back(request);
            }
        }
        self.run(actions);
    }

    fn update_config(&self, update: impl FnOnce(&mut PoolConfig<R>)) {
        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            update(&mut st.config);
            if !st.shutdown {
                self.drain_queue(&mut st, &mut actions);
            }
        }
        self.run(actions);
    }

    fn shutdown(&self, grace: Duration) {
        let mut actions = Vec::new();
        {
            let mut st = lock(&self.state);
            if st.shutdown {
                return;
            }
            st.shutdown = true;
            info!("shutting down connection pool: grace={grace:?}");
            for request in st.queue.drain(..) {
                actions.push(Action::Fail {
                    lease: request.lease,
                    error: PoolError::Shutdown,
                });
            }
            for (_, mut pool) in st.routes.drain() {
                let (available, pending) = pool.shutdown();
                for entry in available {
                    actions.push(Action::Close(entry.into_connection()));
                }
                for pending in pending {
                    actions.push(Action::Fail {
                        lease: pending.lease,
                        error: PoolError::Shutdown,
                    });
                    actions.push(Action::Cancel(pending.request));
                }
            }
        }
        self.run(actions);
        self.connector.shutdown(grace);
    }
}

impl<R, S, C, T> RequestListener<S> for Inner<R, S, C, T>
where
    R: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    S: Send + 'static,
    C: Send + 'static,
    T: PartialEq + Send + Sync + 'static,
{
    fn request_settled(&self, request: &SessionRequest<S>) { self.settle(request); }
}

fn evict<R: fmt::Debug, S, C, T>(route: &R, entry: PoolEntry<R, C, T>, actions: &mut Vec<Action<R, S, C, T>>) {
    debug!("evicting idle connection: route={route:?}, id={}", entry.id());
    inc_evictions();
    actions.push(Action::Close(entry.into_connection()));
}
