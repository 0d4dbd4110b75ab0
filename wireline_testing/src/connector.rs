//! In-memory pool collaborators.
//!
//! The pool asks its [`Connector`] to establish sessions asynchronously.
//! [`RecordingConnector`] only remembers those requests, leaving the test in
//! control of when and how each one is settled.

use std::{
    collections::HashSet,
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use wireline::pool::{ConnPool, Connector, EntryFactory, PoolConfig, RouteResolver, SessionRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Connector that records every request without connecting.
#[derive(Debug, Default)]
pub struct RecordingConnector {
    requests: Mutex<Vec<SessionRequest<u64>>>,
    shutdown: Mutex<Option<Duration>>,
}

impl RecordingConnector {
    /// Create a connector with no recorded requests.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Requests received and not yet taken.
    #[must_use]
    pub fn pending(&self) -> usize { lock(&self.requests).len() }

    /// Take every recorded request.
    #[must_use]
    pub fn take(&self) -> Vec<SessionRequest<u64>> { std::mem::take(&mut *lock(&self.requests)) }

    /// Take the oldest recorded request.
    #[must_use]
    pub fn next(&self) -> Option<SessionRequest<u64>> {
        let mut requests = lock(&self.requests);
        (!requests.is_empty()).then(|| requests.remove(0))
    }

    /// Complete every recorded request, using its id as the session.
    ///
    /// Returns how many requests accepted their session.
    pub fn complete_all(&self) -> usize {
        self.take()
            .into_iter()
            .filter(|request| request.completed(request.id()).is_ok())
            .count()
    }

    /// Grace period passed to [`Connector::shutdown`], if it was called.
    #[must_use]
    pub fn shutdown_grace(&self) -> Option<Duration> { *lock(&self.shutdown) }
}

impl Connector<u64> for RecordingConnector {
    fn connect(&self, _remote: SocketAddr, _local: Option<SocketAddr>, request: SessionRequest<u64>) {
        lock(&self.requests).push(request);
    }

    fn shutdown(&self, grace: Duration) { *lock(&self.shutdown) = Some(grace); }
}

/// Resolver mapping every route to a loopback address.
#[derive(Debug, Default)]
pub struct StaticResolver {
    unresolvable: HashSet<&'static str>,
}

impl StaticResolver {
    /// Create a resolver that resolves every route.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Make `route` fail to resolve.
    #[must_use]
    pub fn unresolvable(mut self, route: &'static str) -> Self {
        self.unresolvable.insert(route);
        self
    }
}

impl RouteResolver<&'static str> for StaticResolver {
    fn resolve_remote(&self, route: &&'static str) -> io::Result<SocketAddr> {
        if self.unresolvable.contains(route) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("unknown host {route}")));
        }
        Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)))
    }
}

/// Connection handed out by [`ClosingFactory`].
#[derive(Clone, Debug)]
pub struct TestConnection {
    session: u64,
    route: &'static str,
    broken: Arc<AtomicBool>,
}

impl TestConnection {
    /// Session the connection was built from.
    #[must_use]
    pub fn session(&self) -> u64 { self.session }

    /// Route the connection belongs to.
    #[must_use]
    pub fn route(&self) -> &'static str { self.route }

    /// Simulate the peer closing the connection.
    pub fn break_connection(&self) { self.broken.store(true, Ordering::SeqCst); }
}

/// Factory recording which connections were created and closed.
#[derive(Debug, Default)]
pub struct ClosingFactory {
    created: Mutex<Vec<u64>>,
    closed: Mutex<Vec<u64>>,
}

impl ClosingFactory {
    /// Create an empty factory.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Sessions wrapped so far.
    #[must_use]
    pub fn created(&self) -> Vec<u64> { lock(&self.created).clone() }

    /// Sessions closed so far.
    #[must_use]
    pub fn closed(&self) -> Vec<u64> { lock(&self.closed).clone() }
}

impl EntryFactory<&'static str, u64, TestConnection> for ClosingFactory {
    fn create(&self, route: &&'static str, session: u64) -> TestConnection {
        lock(&self.created).push(session);
        TestConnection {
            session,
            route: *route,
            broken: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_closed(&self, connection: &TestConnection) -> bool { connection.broken.load(Ordering::SeqCst) }

    fn close(&self, connection: TestConnection) { lock(&self.closed).push(connection.session); }
}

/// Pool wired to fresh test collaborators.
pub type TestPool = ConnPool<&'static str, u64, TestConnection, &'static str>;

/// Build a pool over a [`RecordingConnector`] and a [`ClosingFactory`].
#[must_use]
pub fn test_pool(
    config: PoolConfig<&'static str>,
    resolver: StaticResolver,
) -> (TestPool, Arc<RecordingConnector>, Arc<ClosingFactory>) {
    let connector = Arc::new(RecordingConnector::new());
    let factory = Arc::new(ClosingFactory::new());
    let pool = ConnPool::new(
        config,
        Arc::new(resolver),
        Arc::clone(&connector) as Arc<dyn Connector<u64>>,
        Arc::clone(&factory) as Arc<dyn EntryFactory<&'static str, u64, TestConnection>>,
    );
    (pool, connector, factory)
}
