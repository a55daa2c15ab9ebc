//! The promise primitive lazy values are built on.
//!
//! A [`Promise`] settles at most once, either fulfilled with a value or
//! rejected with an [`Error`]. It is settled through the [`Resolver`] handed
//! out by [`Promise::pending`], which is consumed by settling so a second
//! settlement cannot be expressed.
//!
//! ## Delivery
//!
//! - [`Promise::then`] delivers handlers on a spawned Tokio task, never
//!   inside the caller's frame, even when the promise has already settled.
//! - [`Promise::chain`] and [`Promise::all`] run their continuations on the
//!   thread that settles the promise, through that thread's work queue. They
//!   are the plumbing between lazy values and need no runtime: a graph of
//!   plain values settles before the outermost call that forced it returns.
//! - `Promise<T>` implements [`Future`], so `promise.await` yields the
//!   outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tokio::runtime::Handle;

use crate::error::Error;
use crate::lazy::Computed;
use crate::queue;

type Subscriber<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// No code in this crate runs user callbacks while holding a lock, so a
/// poisoned guard still protects consistent state.
pub(crate) fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum State<T> {
    Pending {
        subscribers: Vec<Subscriber<T>>,
        wakers: Vec<Waker>,
    },
    Settled(Result<T, Error>),
}

impl<T> State<T> {
    fn pending() -> Self {
        State::Pending {
            subscribers: Vec::new(),
            wakers: Vec::new(),
        }
    }
}

/// A value that will be available at some point, or an error explaining why
/// it will not.
pub struct Promise<T> {
    shared: Arc<Mutex<State<T>>>,
}

/// The settling side of a pending [`Promise`].
///
/// Dropping a resolver that has not settled rejects its promise with
/// [`Error::Dropped`], so awaiting code is never left hanging.
pub struct Resolver<T>
where
    T: Clone + Send + 'static,
{
    shared: Option<Arc<Mutex<State<T>>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> fmt::Debug for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("used", &self.shared.is_none())
            .finish()
    }
}

impl<T> Promise<T> {
    /// Whether the promise has settled, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(*lock(&self.shared), State::Settled(_))
    }

    /// Whether both handles refer to the same promise.
    pub(crate) fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Create an unsettled promise together with its resolver.
    pub fn pending() -> (Promise<T>, Resolver<T>) {
        let shared = Arc::new(Mutex::new(State::pending()));
        let resolver = Resolver {
            shared: Some(Arc::clone(&shared)),
        };
        (Promise { shared }, resolver)
    }

    /// Create a promise that is already fulfilled.
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// Create a promise that is already rejected.
    pub fn rejected(error: Error) -> Self {
        Self::settled(Err(error))
    }

    /// Create a promise that is already settled with `outcome`.
    pub fn settled(outcome: Result<T, Error>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(State::Settled(outcome))),
        }
    }

    /// Run `future` on the current Tokio runtime and settle with its output.
    ///
    /// Outside a runtime the promise is rejected with [`Error::NoRuntime`].
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (promise, resolver) = Promise::pending();
        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(future);
                handle.spawn(async move {
                    let outcome = match task.await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(Error::Task(e.to_string())),
                    };
                    resolver.settle(outcome);
                });
            }
            Err(_) => {
                tracing::warn!("Promise::spawn called outside a Tokio runtime");
                resolver.reject(Error::NoRuntime);
            }
        }
        promise
    }

    /// Wait for every promise, fulfilling with their values in input order.
    ///
    /// The first rejection rejects the result; later outcomes are ignored.
    pub fn all<I>(promises: I) -> Promise<Vec<T>>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        if promises.is_empty() {
            return Promise::resolved(Vec::new());
        }

        let (all, resolver) = Promise::pending();
        let gather = Arc::new(Mutex::new(Gather {
            slots: vec![None; promises.len()],
            remaining: promises.len(),
            resolver: Some(resolver),
        }));

        for (index, promise) in promises.iter().enumerate() {
            let gather = Arc::clone(&gather);
            promise.subscribe(move |outcome| {
                let finished = lock(&gather).record(index, outcome);
                if let Some((resolver, result)) = finished {
                    resolver.settle(result);
                }
            });
        }

        all
    }

    /// The outcome, if the promise has settled.
    pub fn peek(&self) -> Option<Result<T, Error>> {
        match &*lock(&self.shared) {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Attach success and error handlers.
    ///
    /// The matching handler runs on a spawned Tokio task once this promise
    /// settles; the returned promise settles with the handler's result.
    /// Outside a runtime the returned promise is rejected with
    /// [`Error::NoRuntime`] and neither handler runs.
    pub fn then<U, F, E>(&self, on_fulfilled: F, on_rejected: E) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
        E: FnOnce(Error) -> Result<U, Error> + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("then() called outside a Tokio runtime; continuation dropped");
            return Promise::rejected(Error::NoRuntime);
        };

        let (next, resolver) = Promise::pending();
        self.subscribe(move |outcome| {
            handle.spawn(async move {
                let result = match outcome {
                    Ok(value) => on_fulfilled(value),
                    Err(e) => on_rejected(e),
                };
                resolver.settle(result);
            });
        });
        next
    }

    /// Continue with `f` once this promise fulfils.
    ///
    /// `f` runs on the settling thread's work queue. A [`Computed::Deferred`]
    /// result is followed until it settles. Rejections skip `f` and pass
    /// through.
    pub fn chain<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Computed<U>, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        self.subscribe(move |outcome| match outcome {
            Ok(value) => resolver.settle_computed(f(value)),
            Err(e) => resolver.reject(e),
        });
        next
    }

    /// Register a callback for the outcome.
    ///
    /// The callback goes through the current thread's work queue if the
    /// promise has already settled, otherwise through the queue of whichever
    /// thread settles it.
    pub(crate) fn subscribe<F>(&self, f: F)
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        let outcome = {
            let mut state = lock(&self.shared);
            match &mut *state {
                State::Pending { subscribers, .. } => {
                    subscribers.push(Box::new(f));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        queue::defer(move || f(outcome));
    }
}

impl<T> Future for Promise<T>
where
    T: Clone,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = lock(&self.shared);
        match &mut *state {
            State::Settled(outcome) => Poll::Ready(outcome.clone()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    /// Fulfil the promise with `value`.
    pub fn fulfill(self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject the promise with `error`.
    pub fn reject(self, error: Error) {
        self.settle(Err(error));
    }

    /// Settle the promise with `outcome`.
    pub fn settle(mut self, outcome: Result<T, Error>) {
        if let Some(shared) = self.shared.take() {
            settle_shared(&shared, outcome);
        }
    }

    /// Settle with the same outcome as `promise`, whenever it settles.
    pub fn follow(self, promise: &Promise<T>) {
        promise.subscribe(move |outcome| self.settle(outcome));
    }

    /// Settle from a compute result, following deferred values.
    pub(crate) fn settle_computed(self, computed: Result<Computed<T>, Error>) {
        match computed {
            Ok(Computed::Immediate(value)) => self.fulfill(value),
            Ok(Computed::Deferred(promise)) => self.follow(&promise),
            Err(e) => self.reject(e),
        }
    }
}

impl<T> Drop for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            settle_shared(&shared, Err(Error::Dropped));
        }
    }
}

/// Store `outcome` and hand it to the subscribers.
///
/// Subscribers run through the work queue rather than on this stack, so a
/// chain of promises waiting on each other settles in constant stack depth.
fn settle_shared<T>(shared: &Mutex<State<T>>, outcome: Result<T, Error>)
where
    T: Clone + Send + 'static,
{
    let (subscribers, wakers) = {
        let mut state = lock(shared);
        let State::Pending {
            subscribers,
            wakers,
        } = &mut *state
        else {
            return;
        };
        let taken = (std::mem::take(subscribers), std::mem::take(wakers));
        *state = State::Settled(outcome.clone());
        taken
    };

    for waker in wakers {
        waker.wake();
    }
    if !subscribers.is_empty() {
        queue::defer(move || {
            for subscriber in subscribers {
                subscriber(outcome.clone());
            }
        });
    }
}

/// Fan-in bookkeeping for [`Promise::all`].
struct Gather<T>
where
    T: Clone + Send + 'static,
{
    slots: Vec<Option<T>>,
    remaining: usize,
    resolver: Option<Resolver<Vec<T>>>,
}

impl<T> Gather<T>
where
    T: Clone + Send + 'static,
{
    /// Record one outcome; returns the resolver and final result once the
    /// gather is decided.
    fn record(
        &mut self,
        index: usize,
        outcome: Result<T, Error>,
    ) -> Option<(Resolver<Vec<T>>, Result<Vec<T>, Error>)> {
        self.resolver.as_ref()?;
        match outcome {
            Ok(value) => {
                self.slots[index] = Some(value);
                self.remaining -= 1;
                if self.remaining > 0 {
                    return None;
                }
                let values = std::mem::take(&mut self.slots)
                    .into_iter()
                    .flatten()
                    .collect();
                self.resolver.take().map(|resolver| (resolver, Ok(values)))
            }
            Err(e) => self.resolver.take().map(|resolver| (resolver, Err(e))),
        }
    }
}
