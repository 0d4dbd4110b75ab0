//! Single-assignment lease futures.

use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use futures::task::AtomicWaker;

use super::{PoolError, lock};
use crate::metrics::{Outcome, inc_leases};

/// Notification hooks fired once when a lease resolves.
///
/// The value itself stays in the [`LeaseFuture`]; callbacks only observe it.
/// They run on whichever thread resolves the lease and never while the pool
/// lock is held.
pub trait FutureCallback<E>: Send {
    /// The lease produced a value.
    fn completed(&mut self, value: &E);

    /// The lease failed.
    fn failed(&mut self, error: &PoolError);

    /// The lease was cancelled.
    fn cancelled(&mut self);
}

type Reclaim<E> = Box<dyn FnOnce(E) + Send>;

enum Slot<E> {
    Waiting,
    Ready(Result<E, PoolError>),
    Taken,
    Abandoned,
}

struct Shared<E> {
    done: AtomicBool,
    slot: Mutex<Slot<E>>,
    waker: AtomicWaker,
    callback: Mutex<Option<Box<dyn FutureCallback<E>>>>,
    reclaim: Mutex<Option<Reclaim<E>>>,
}

impl<E> Shared<E> {
    /// Claim the single assignment and publish `result`.
    ///
    /// Hands `result` back when the lease was already resolved or its future
    /// dropped.
    fn resolve(&self, result: Result<E, PoolError>) -> Result<(), Result<E, PoolError>> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Err(result);
        }
        inc_leases(match &result {
            Ok(_) => Outcome::Completed,
            Err(PoolError::Cancelled) => Outcome::Cancelled,
            Err(PoolError::Timeout) => Outcome::Timeout,
            Err(_) => Outcome::Failed,
        });
        let callback = lock(&self.callback).take();
        if let Some(mut callback) = callback {
            match &result {
                Ok(value) => callback.completed(value),
                Err(PoolError::Cancelled) => callback.cancelled(),
                Err(error) => callback.failed(error),
            }
        }
        {
            let mut slot = lock(&self.slot);
            if matches!(*slot, Slot::Abandoned) {
                return Err(result);
            }
            *slot = Slot::Ready(result);
        }
        self.waker.wake();
        Ok(())
    }

    fn take_ready(&self) -> Option<Result<E, PoolError>> {
        let mut slot = lock(&self.slot);
        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => Some(result),
            Slot::Taken => Some(Err(PoolError::InvalidState("lease result already taken"))),
            previous @ (Slot::Waiting | Slot::Abandoned) => {
                *slot = previous;
                None
            }
        }
    }
}

/// Future resolving to a leased entry.
///
/// Completed at most once with a value, an error or a cancellation.
/// Dropping an unresolved future cancels it. Dropping a future whose value
/// was never taken hands the entry back to the pool, which closes it.
#[must_use = "dropping a lease future cancels the lease"]
pub struct LeaseFuture<E> {
    shared: Arc<Shared<E>>,
}

/// Pool-side handle used to resolve a [`LeaseFuture`].
pub(crate) struct LeaseHandle<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for LeaseHandle<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for LeaseHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseHandle").field("done", &self.is_done()).finish()
    }
}

impl<E> fmt::Debug for LeaseFuture<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseFuture").field("done", &self.is_done()).finish()
    }
}

/// Create a connected future/handle pair.
pub(crate) fn lease_pair<E>(callback: Option<Box<dyn FutureCallback<E>>>) -> (LeaseFuture<E>, LeaseHandle<E>) {
    let shared = Arc::new(Shared {
        done: AtomicBool::new(false),
        slot: Mutex::new(Slot::Waiting),
        waker: AtomicWaker::new(),
        callback: Mutex::new(callback),
        reclaim: Mutex::new(None),
    });
    (
        LeaseFuture {
            shared: Arc::clone(&shared),
        },
        LeaseHandle { shared },
    )
}

impl<E> LeaseHandle<E> {
    /// Deliver `value`, or get it back if the lease can no longer take it.
    pub(crate) fn deliver(&self, value: E) -> Result<(), E> {
        match self.shared.resolve(Ok(value)) {
            Err(Ok(value)) => Err(value),
            Ok(()) | Err(Err(_)) => Ok(()),
        }
    }

    /// Fail the lease; returns `false` if it was already resolved.
    pub(crate) fn fail(&self, error: PoolError) -> bool { self.shared.resolve(Err(error)).is_ok() }

    /// Route untaken values of a dropped future through `reclaim`.
    pub(crate) fn set_reclaim(&self, reclaim: Reclaim<E>) { *lock(&self.shared.reclaim) = Some(reclaim); }

    pub(crate) fn is_done(&self) -> bool { self.shared.done.load(Ordering::Acquire) }
}

impl<E> LeaseFuture<E> {
    /// Cancel the lease. Returns `false` if it had already resolved.
    pub fn cancel(&self) -> bool { self.shared.resolve(Err(PoolError::Cancelled)).is_ok() }

    /// Returns `true` once the lease has resolved in any way.
    #[must_use]
    pub fn is_done(&self) -> bool { self.shared.done.load(Ordering::Acquire) }

    /// Take the outcome without waiting, if it is available.
    pub fn try_take(&mut self) -> Option<Result<E, PoolError>> { self.shared.take_ready() }
}

impl<E> Future for LeaseFuture<E> {
    type Output = Result<E, PoolError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.shared.take_ready() {
            return Poll::Ready(result);
        }
        self.shared.waker.register(cx.waker());
        match self.shared.take_ready() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<E> Drop for LeaseFuture<E> {
    fn drop(&mut self) {
        let previous = mem::replace(&mut *lock(&self.shared.slot), Slot::Abandoned);
        match previous {
            Slot::Ready(Ok(value)) => {
                let reclaim = lock(&self.shared.reclaim).take();
                if let Some(reclaim) = reclaim {
                    reclaim(value);
                }
            }
            Slot::Waiting => {
                // Resolving after this point finds the slot abandoned and
                // hands its value back to the caller.
                let _ = self.shared.resolve(Err(PoolError::Cancelled));
            }
            Slot::Ready(Err(_)) | Slot::Taken | Slot::Abandoned => {}
        }
    }
}
