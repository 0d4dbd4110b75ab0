//! In-flight connect attempts.

use std::{
    fmt,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use super::lock;

/// Told once a [`SessionRequest`] has been resolved.
pub(crate) trait RequestListener<S>: Send + Sync {
    fn request_settled(&self, request: &SessionRequest<S>);
}

/// How a resolved attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConnectOutcome {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

enum Outcome<S> {
    Pending,
    Completed(Option<S>),
    Failed(Arc<io::Error>),
    Cancelled,
    TimedOut,
}

struct Inner<S> {
    id: u64,
    remote: SocketAddr,
    local: Option<SocketAddr>,
    connect_timeout: Mutex<Option<Duration>>,
    outcome: Mutex<Outcome<S>>,
    listener: Weak<dyn RequestListener<S>>,
}

/// A connect attempt handed to a [`Connector`](super::Connector).
///
/// The connector resolves it exactly once with [`completed`](Self::completed),
/// [`failed`](Self::failed) or [`timeout`](Self::timeout); the pool may
/// [`cancel`](Self::cancel) it. Later resolutions are ignored. Clones share
/// the same attempt.
pub struct SessionRequest<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SessionRequest<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for SessionRequest<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("id", &self.inner.id)
            .field("remote", &self.inner.remote)
            .field("local", &self.inner.local)
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

impl<S> SessionRequest<S> {
    pub(crate) fn new(
        id: u64,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        connect_timeout: Option<Duration>,
        listener: Weak<dyn RequestListener<S>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                remote,
                local,
                connect_timeout: Mutex::new(connect_timeout),
                outcome: Mutex::new(Outcome::Pending),
                listener,
            }),
        }
    }

    /// Identifier shared with the entry this attempt produces.
    #[must_use]
    pub fn id(&self) -> u64 { self.inner.id }

    /// Address to connect to.
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr { self.inner.remote }

    /// Local address to bind, if any.
    #[must_use]
    pub fn local_address(&self) -> Option<SocketAddr> { self.inner.local }

    /// How long the connector should wait before calling
    /// [`timeout`](Self::timeout).
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> { *lock(&self.inner.connect_timeout) }

    /// Change the connect timeout.
    pub fn set_connect_timeout(&self, timeout: Option<Duration>) { *lock(&self.inner.connect_timeout) = timeout; }

    /// Returns `true` once the attempt has been resolved.
    #[must_use]
    pub fn is_done(&self) -> bool { !matches!(*lock(&self.inner.outcome), Outcome::Pending) }

    /// Returns `true` if the attempt was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(*lock(&self.inner.outcome), Outcome::Cancelled) }

    /// The connect failure, if the attempt failed.
    #[must_use]
    pub fn error(&self) -> Option<Arc<io::Error>> {
        match &*lock(&self.inner.outcome) {
            Outcome::Failed(error) => Some(Arc::clone(error)),
            _ => None,
        }
    }

    /// Resolve the attempt with an established session.
    ///
    /// # Errors
    /// Hands `session` back if the attempt was already resolved, for example
    /// because the pool cancelled it; the caller should close it.
    pub fn completed(&self, session: S) -> Result<(), S> {
        {
            let mut current = lock(&self.inner.outcome);
            if !matches!(*current, Outcome::Pending) {
                return Err(session);
            }
            *current = Outcome::Completed(Some(session));
        }
        self.notify();
        Ok(())
    }

    /// Resolve the attempt with a connect failure. Returns `false` if it was
    /// already resolved.
    pub fn failed(&self, error: io::Error) -> bool {
        if !self.resolve(Outcome::Failed(Arc::new(error))) {
            return false;
        }
        self.notify();
        true
    }

    /// Resolve the attempt as timed out. Returns `false` if it was already
    /// resolved.
    pub fn timeout(&self) -> bool {
        if !self.resolve(Outcome::TimedOut) {
            return false;
        }
        self.notify();
        true
    }

    /// Cancel the attempt. Returns `false` if it was already resolved.
    pub fn cancel(&self) -> bool {
        if !self.resolve(Outcome::Cancelled) {
            return false;
        }
        self.notify();
        true
    }

    pub(crate) fn outcome(&self) -> Option<ConnectOutcome> {
        match &*lock(&self.inner.outcome) {
            Outcome::Pending => None,
            Outcome::Completed(_) => Some(ConnectOutcome::Completed),
            Outcome::Failed(_) => Some(ConnectOutcome::Failed),
            Outcome::Cancelled => Some(ConnectOutcome::Cancelled),
            Outcome::TimedOut => Some(ConnectOutcome::TimedOut),
        }
    }

    pub(crate) fn take_session(&self) -> Option<S> {
        match &mut *lock(&self.inner.outcome) {
            Outcome::Completed(session) => session.take(),
            _ => None,
        }
    }

    fn resolve(&self, outcome: Outcome<S>) -> bool {
        let mut current = lock(&self.inner.outcome);
        if !matches!(*current, Outcome::Pending) {
            return false;
        }
        *current = outcome;
        true
    }

    fn notify(&self) {
        if let Some(listener) = self.inner.listener.upgrade() {
            listener.request_settled(self);
        }
    }
}
