//! Capabilities the pool needs from its surroundings.
//!
//! The pool never opens sockets itself. A [`RouteResolver`] turns a route
//! into addresses, a [`Connector`] establishes sessions asynchronously, and
//! an [`EntryFactory`] wraps sessions into the connections callers lease.

use std::{io, net::SocketAddr, time::Duration};

use super::SessionRequest;

/// Maps routes to socket addresses.
pub trait RouteResolver<R>: Send + Sync {
    /// Address to connect to for `route`.
    ///
    /// # Errors
    /// Returns an error when the route cannot be resolved; the waiting lease
    /// fails with [`PoolError::Resolve`](super::PoolError::Resolve).
    fn resolve_remote(&self, route: &R) -> io::Result<SocketAddr>;

    /// Local address to bind for `route`, if any.
    ///
    /// # Errors
    /// Returns an error when the route cannot be resolved.
    fn resolve_local(&self, _route: &R) -> io::Result<Option<SocketAddr>> { Ok(None) }
}

/// Establishes sessions without blocking the caller.
pub trait Connector<S>: Send + Sync {
    /// Start connecting to `remote` and resolve `request` when done.
    ///
    /// Called without any pool lock held, so the request may be resolved
    /// before this returns.
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, request: SessionRequest<S>);

    /// Stop connecting, allowing up to `grace` for in-flight work.
    fn shutdown(&self, _grace: Duration) {}
}

/// Builds and disposes of pooled connections.
pub trait EntryFactory<R, S, C>: Send + Sync {
    /// Wrap a freshly established `session` for `route`.
    fn create(&self, route: &R, session: S) -> C;

    /// Returns `true` if `connection` can no longer be used.
    fn is_closed(&self, _connection: &C) -> bool { false }

    /// Close `connection`.
    fn close(&self, connection: C);
}
