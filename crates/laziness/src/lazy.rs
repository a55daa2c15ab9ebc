//! Lazy values: memoizing computations that run only when demanded.
//!
//! A [`LazyValue`] moves through three states:
//!
//! - `Unforced`: holds the compute procedure, nothing has run.
//! - `Pending`: compute has been taken and invoked, the outcome is not in yet.
//! - `Settled`: the final value or error, never replaced afterwards.
//!
//! All state changes go through `Inner::transition`, under one mutex, so the
//! compute procedure runs at most once even when several threads force the
//! same value. Compute itself always runs outside the lock, which makes it
//! safe for a computation to force (or chain on) other lazy values, or itself.
//!
//! Compute procedures run through the thread's work queue (see
//! `crate::queue`), as does releasing one that was never forced. Neither
//! forcing nor dropping a long chain of values grows the stack.

use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;

use crate::error::Error;
use crate::promise::{lock, Promise};
use crate::queue;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// What a compute procedure produced.
#[derive(Debug)]
pub enum Computed<T> {
    /// The final value, available right away.
    Immediate(T),
    /// A promise that will settle with the final value.
    Deferred(Promise<T>),
}

impl<T> From<Promise<T>> for Computed<T> {
    fn from(promise: Promise<T>) -> Self {
        Computed::Deferred(promise)
    }
}

type Compute<T> = Box<dyn FnOnce() -> Result<Computed<T>, Error> + Send>;

enum State<T> {
    Unforced(Compute<T>),
    Pending(Promise<T>),
    Settled(Result<T, Error>),
}

enum Event<T> {
    /// Start evaluation; the promise will carry the outcome.
    Force(Promise<T>),
    /// The promise started by `Force` settled.
    Settle(Promise<T>, Result<T, Error>),
}

/// Observable evaluation state of a [`LazyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unforced,
    Pending,
    Fulfilled,
    Rejected,
}

struct Inner<T> {
    id: u64,
    state: Mutex<State<T>>,
    /// Releases a compute procedure that was never run.
    discard: fn(Compute<T>),
}

impl<T> Inner<T> {
    fn phase(&self) -> Phase {
        match &*lock(&self.state) {
            State::Unforced(_) => Phase::Unforced,
            State::Pending(_) => Phase::Pending,
            State::Settled(Ok(_)) => Phase::Fulfilled,
            State::Settled(Err(_)) => Phase::Rejected,
        }
    }

    /// Apply `event` to the state machine.
    ///
    /// Returns the compute procedure when `Force` moved the value out of
    /// `Unforced`; the caller is then responsible for running it.
    fn transition(&self, event: Event<T>) -> Option<Compute<T>> {
        let mut state = lock(&self.state);
        match event {
            Event::Force(promise) => {
                if !matches!(*state, State::Unforced(_)) {
                    return None;
                }
                match std::mem::replace(&mut *state, State::Pending(promise)) {
                    State::Unforced(compute) => Some(compute),
                    _ => None,
                }
            }
            Event::Settle(source, outcome) => {
                if let State::Pending(current) = &*state {
                    if current.ptr_eq(&source) {
                        tracing::debug!(
                            lazy = self.id,
                            fulfilled = outcome.is_ok(),
                            "lazy value settled"
                        );
                        *state = State::Settled(outcome);
                    }
                }
                None
            }
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(state, State::Settled(Err(Error::Dropped)));
        if let State::Unforced(compute) = previous {
            (self.discard)(compute);
        }
    }
}

/// A deferred computation that runs at most once, on demand.
///
/// Cloning the handle shares the computation; forcing any clone forces all.
pub struct LazyValue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for LazyValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> LazyValue<T>
where
    T: Clone + Send + 'static,
{
    /// Create an inert lazy value around `compute`.
    pub fn new<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<Computed<T>, Error> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(State::Unforced(Box::new(compute))),
                // The compute may own the only handles to other unforced
                // values; dropping it on the queue keeps teardown flat.
                discard: |compute| queue::defer(move || drop(compute)),
            }),
        }
    }

    /// A lazy value whose computation simply yields `value`.
    pub fn from_value(value: T) -> Self {
        Self::new(move || Ok(Computed::Immediate(value)))
    }

    /// A lazy value that settles with `promise` once forced.
    pub fn from_promise(promise: Promise<T>) -> Self {
        Self::new(move || Ok(Computed::Deferred(promise)))
    }

    /// Start evaluation, if it has not started yet.
    ///
    /// Called from outside any computation, a graph that only involves plain
    /// values (or fails outright) settles before this returns; deferred work
    /// stays pending until its promise settles. Called from inside another
    /// computation, the compute is queued behind the current one and the
    /// value is `Pending` on return.
    ///
    /// Returns the settled error if the value is rejected, and `Ok(())`
    /// otherwise.
    pub fn force(&self) -> Result<(), Error> {
        if self.phase() == Phase::Unforced {
            let (promise, resolver) = Promise::pending();
            let weak = Arc::downgrade(&self.inner);
            let source = promise.clone();
            promise.subscribe(move |outcome| {
                if let Some(inner) = weak.upgrade() {
                    inner.transition(Event::Settle(source, outcome));
                }
            });

            if let Some(compute) = self.inner.transition(Event::Force(promise)) {
                let id = self.inner.id;
                queue::defer(move || {
                    tracing::trace!(lazy = id, "forcing lazy value");
                    resolver.settle_computed(compute());
                });
            }
        }

        match &*lock(&self.inner.state) {
            State::Settled(Err(e)) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    /// The current evaluation state.
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// Whether the final value is available. Same as [`is_fulfilled`].
    ///
    /// [`is_fulfilled`]: LazyValue::is_fulfilled
    pub fn is_ready(&self) -> bool {
        self.is_fulfilled()
    }

    /// Whether the computation settled successfully.
    pub fn is_fulfilled(&self) -> bool {
        self.phase() == Phase::Fulfilled
    }

    /// Whether the computation settled, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase(), Phase::Fulfilled | Phase::Rejected)
    }

    /// The final value.
    ///
    /// Returns [`Error::NotReady`] before the value settles, and the settled
    /// error if the computation failed.
    pub fn get(&self) -> Result<T, Error> {
        match &*lock(&self.inner.state) {
            State::Settled(outcome) => outcome.clone(),
            State::Unforced(_) | State::Pending(_) => Err(Error::NotReady),
        }
    }

    /// Force the value and return a promise of its outcome.
    pub fn promise(&self) -> Promise<T> {
        // A failure is recorded as the settled outcome and surfaces below.
        let _ = self.force();
        match &*lock(&self.inner.state) {
            State::Pending(promise) => promise.clone(),
            State::Settled(outcome) => Promise::settled(outcome.clone()),
            State::Unforced(_) => Promise::rejected(Error::NotReady),
        }
    }

    /// Force the value and attach success and error handlers.
    ///
    /// Handlers are delivered on a spawned Tokio task, after the current
    /// call returns, even if the value has already settled. A computation
    /// that failed while starting is routed to `on_error`.
    ///
    /// Outside a Tokio runtime nothing is forced, neither handler runs, and
    /// the returned promise is rejected with [`Error::NoRuntime`].
    pub fn then<U, F, E>(&self, on_success: F, on_error: E) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
        E: FnOnce(Error) -> Result<U, Error> + Send + 'static,
    {
        if Handle::try_current().is_err() {
            tracing::warn!(lazy = self.inner.id, "then() called outside a Tokio runtime");
            return Promise::rejected(Error::NoRuntime);
        }
        self.promise().then(on_success, on_error)
    }
}

impl<T> IntoFuture for LazyValue<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, Error>;
    type IntoFuture = Promise<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.promise()
    }
}

impl<T> IntoFuture for &LazyValue<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, Error>;
    type IntoFuture = Promise<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.promise()
    }
}

impl<T> fmt::Debug for LazyValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("id", &self.inner.id)
            .field("phase", &self.inner.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    fn counted(runs: &Arc<AtomicUsize>, value: i32) -> LazyValue<i32> {
        let runs = Arc::clone(runs);
        LazyValue::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Computed::Immediate(value))
        })
    }

    #[test]
    fn test_new_value_is_inert() {
        let runs = Arc::new(AtomicUsize::new(0));
        let lv = counted(&runs, 42);

        assert_eq!(lv.phase(), Phase::Unforced);
        assert!(!lv.is_ready());
        assert_eq!(lv.get(), Err(Error::NotReady));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_force_runs_compute_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let lv = counted(&runs, 42);

        lv.force().unwrap();
        lv.force().unwrap();
        lv.clone().force().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(lv.is_ready());
        assert_eq!(lv.get(), Ok(42));
        assert_eq!(lv.get(), Ok(42));
    }

    #[test]
    fn test_failed_compute_settles_rejected() {
        let lv: LazyValue<i32> = LazyValue::new(|| Err(Error::msg("construction failed")));

        assert_eq!(lv.force(), Err(Error::msg("construction failed")));
        assert_eq!(lv.force(), Err(Error::msg("construction failed")));
        assert_eq!(lv.phase(), Phase::Rejected);
        assert!(lv.is_settled());
        assert!(!lv.is_fulfilled());
        assert!(!lv.is_ready());
        assert_eq!(lv.get(), Err(Error::msg("construction failed")));
    }

    #[test]
    fn test_deferred_compute_stays_pending() {
        let (promise, resolver) = Promise::pending();
        let lv = LazyValue::from_promise(promise);

        lv.force().unwrap();
        assert_eq!(lv.phase(), Phase::Pending);
        assert!(!lv.is_ready());
        assert!(!lv.is_settled());

        resolver.fulfill("late".to_string());
        assert!(lv.is_ready());
        assert_eq!(lv.get(), Ok("late".to_string()));
    }

    #[test]
    fn test_deferred_rejection_is_not_ready() {
        let (promise, resolver) = Promise::<i32>::pending();
        let lv = LazyValue::from_promise(promise);
        lv.force().unwrap();

        resolver.reject(Error::msg("async failure"));
        assert!(lv.is_settled());
        assert!(!lv.is_ready());
        assert_eq!(lv.force(), Err(Error::msg("async failure")));
    }

    #[test]
    fn test_panicking_compute_settles_dropped() {
        let lv: LazyValue<i32> = LazyValue::new(|| panic!("compute blew up"));
        let forced = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| lv.force()));

        assert!(forced.is_err());
        assert_eq!(lv.get(), Err(Error::Dropped));
    }

    #[test]
    fn test_reentrant_force_does_not_rerun() {
        let runs = Arc::new(AtomicUsize::new(0));
        let slot: Arc<OnceLock<LazyValue<i32>>> = Arc::new(OnceLock::new());

        let lv = {
            let runs = Arc::clone(&runs);
            let slot = Arc::clone(&slot);
            LazyValue::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.get() {
                    me.force()?;
                    assert_eq!(me.phase(), Phase::Pending);
                }
                Ok(Computed::Immediate(1))
            })
        };
        let _ = slot.set(lv.clone());

        lv.force().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(lv.get(), Ok(1));
    }

    #[test]
    fn test_concurrent_force_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let lv = counted(&runs, 7);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let lv = lv.clone();
                scope.spawn(move || lv.force().unwrap());
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(lv.get(), Ok(7));
    }

    #[test]
    fn test_dropping_pending_value_is_harmless() {
        let (promise, resolver) = Promise::pending();
        let lv = LazyValue::from_promise(promise.clone());
        lv.force().unwrap();
        drop(lv);

        resolver.fulfill(3);
        assert_eq!(promise.peek(), Some(Ok(3)));
    }

    /// `len` values, each adding one to the previous.
    fn counting_chain(len: u64) -> LazyValue<u64> {
        let mut lv = LazyValue::from_value(0u64);
        for _ in 0..len {
            let prev = lv;
            lv = LazyValue::new(move || {
                let next = prev.promise().chain(|n| Ok(Computed::Immediate(n + 1)));
                Ok(Computed::Deferred(next))
            });
        }
        lv
    }

    #[test]
    fn test_force_long_chain() {
        let lv = counting_chain(100_000);
        lv.force().unwrap();
        assert_eq!(lv.get(), Ok(100_000));
    }

    #[test]
    fn test_drop_long_unforced_chain() {
        let lv = counting_chain(100_000);
        assert_eq!(lv.phase(), Phase::Unforced);
        drop(lv);
    }

    #[test]
    fn test_force_inside_computation_is_queued() {
        let inner = LazyValue::from_value(1);
        let seen = Arc::new(Mutex::new(None));

        let outer = {
            let inner = inner.clone();
            let seen = Arc::clone(&seen);
            LazyValue::new(move || {
                inner.force()?;
                *seen.lock().unwrap() = Some(inner.phase());
                Ok(Computed::Deferred(inner.promise()))
            })
        };

        outer.force().unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Phase::Pending));
        assert_eq!(outer.get(), Ok(1));
        assert_eq!(inner.phase(), Phase::Fulfilled);
    }

    #[test]
    fn test_values_need_not_be_sync() {
        let lv = LazyValue::from_value(Cell::new(5));
        let forced = lv.clone();
        std::thread::spawn(move || forced.force()).join().unwrap().unwrap();
        assert_eq!(lv.get().map(Cell::into_inner), Ok(5));
    }

    #[test]
    fn test_then_outside_runtime_does_not_force() {
        let runs = Arc::new(AtomicUsize::new(0));
        let lv = counted(&runs, 1);

        let next = lv.then(Ok, Err);
        assert_eq!(next.peek(), Some(Err(Error::NoRuntime)));
        assert_eq!(lv.phase(), Phase::Unforced);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_then_forces_and_delivers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let lv = counted(&runs, 41);

        let next = lv.then(|n| Ok(n + 1), Err);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(next.await, Ok(42));

        let again = lv.then(|n| Ok(n * 2), Err);
        assert_eq!(again.await, Ok(82));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_then_routes_compute_failure_to_error_handler() {
        let lv: LazyValue<i32> = LazyValue::new(|| Err(Error::msg("thrown early")));
        let handled = lv.then(|_| Ok(String::new()), |e| Ok(format!("caught: {}", e)));
        assert_eq!(handled.await, Ok("caught: thrown early".to_string()));
    }

    #[tokio::test]
    async fn test_await_lazy_value() {
        let lv = LazyValue::from_value(5);
        assert_eq!((&lv).await, Ok(5));
        assert_eq!(lv.await, Ok(5));
    }
}
