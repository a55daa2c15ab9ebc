//! Combinators that lift ordinary functions, callback-style functions and
//! conditionals into lazy values.
//!
//! None of these evaluate anything when called. They return a new
//! [`LazyValue`] whose computation resolves its inputs when it is forced.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::lazy::{Computed, LazyValue};
use crate::promise::{Promise, Resolver};
use crate::truthy::Truthy;
use crate::value::Value;

/// An input to a lifted function or conditional.
#[derive(Debug)]
pub enum Arg<T> {
    /// A plain value.
    Value(T),
    /// A lazy value, forced when the consuming computation is forced.
    Lazy(LazyValue<T>),
    /// A promise, waited on when the consuming computation is forced.
    Promise(Promise<T>),
}

impl<T> Arg<T>
where
    T: Clone + Send + 'static,
{
    /// Resolve this argument, forcing it if it is lazy.
    pub(crate) fn into_promise(self) -> Promise<T> {
        match self {
            Arg::Value(value) => Promise::resolved(value),
            Arg::Lazy(lazy) => lazy.promise(),
            Arg::Promise(promise) => promise,
        }
    }
}

impl<T> From<LazyValue<T>> for Arg<T> {
    fn from(lazy: LazyValue<T>) -> Self {
        Arg::Lazy(lazy)
    }
}

impl<T> From<&LazyValue<T>> for Arg<T> {
    fn from(lazy: &LazyValue<T>) -> Self {
        Arg::Lazy(lazy.clone())
    }
}

impl<T> From<Promise<T>> for Arg<T> {
    fn from(promise: Promise<T>) -> Self {
        Arg::Promise(promise)
    }
}

impl<T> From<&Promise<T>> for Arg<T> {
    fn from(promise: &Promise<T>) -> Self {
        Arg::Promise(promise.clone())
    }
}

macro_rules! impl_plain_arg {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Arg<$t> {
                fn from(value: $t) -> Self {
                    Arg::Value(value)
                }
            }
        )*
    };
}

impl_plain_arg!(Value, bool, i32, i64, u32, u64, usize, f64, String);

impl From<&str> for Arg<String> {
    fn from(value: &str) -> Self {
        Arg::Value(value.to_string())
    }
}

impl From<&str> for Arg<Value> {
    fn from(value: &str) -> Self {
        Arg::Value(Value::from(value))
    }
}

type Body<A, R> = dyn Fn(Vec<A>) -> Result<Computed<R>, Error> + Send + Sync;

/// A function lifted into the lazy world.
///
/// Takes arguments of type `A` and produces an `R`. Calling it builds a new
/// [`LazyValue`]; the wrapped body runs when that value is forced, once
/// every argument has resolved.
pub struct Lifted<A, R> {
    body: Arc<Body<A, R>>,
}

impl<A, R> Clone for Lifted<A, R> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, R> Lifted<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn new<F>(body: F) -> Self
    where
        F: Fn(Vec<A>) -> Result<Computed<R>, Error> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    /// Build a lazy application of the body to `args`.
    ///
    /// Arguments resolve concurrently when the result is forced. The body
    /// sees them in positional order. If any argument rejects, the result
    /// rejects with that error and the body does not run.
    pub fn call<I, X>(&self, args: I) -> LazyValue<R>
    where
        I: IntoIterator<Item = X>,
        X: Into<Arg<A>>,
    {
        let args: Vec<Arg<A>> = args.into_iter().map(Into::into).collect();
        let body = Arc::clone(&self.body);

        if args.is_empty() {
            return LazyValue::new(move || body(Vec::new()));
        }

        LazyValue::new(move || {
            tracing::trace!(count = args.len(), "resolving arguments");
            let resolved = Promise::all(args.into_iter().map(Arg::into_promise));
            Ok(Computed::Deferred(resolved.chain(move |values| body(values))))
        })
    }

    /// Build a lazy application of the body to no arguments.
    pub fn call0(&self) -> LazyValue<R> {
        self.call(Vec::<Arg<A>>::new())
    }
}

impl<A, R> fmt::Debug for Lifted<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifted").finish_non_exhaustive()
    }
}

/// Lift a function returning a plain value.
pub fn func<A, R, F>(body: F) -> Lifted<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<A>) -> Result<R, Error> + Send + Sync + 'static,
{
    Lifted::new(move |args| body(args).map(Computed::Immediate))
}

/// Lift a function that may answer right away or with a promise.
pub fn func_promise<A, R, F>(body: F) -> Lifted<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<A>) -> Result<Computed<R>, Error> + Send + Sync + 'static,
{
    Lifted::new(body)
}

/// Lift an async function. Its future is spawned on the Tokio runtime when
/// the lazy value is forced.
pub fn func_async<A, R, F, Fut>(body: F) -> Lifted<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    Lifted::new(move |args| Ok(Computed::Deferred(Promise::spawn(body(args)))))
}

/// Completion callback handed to callback-style functions lifted by
/// [`nfunc`].
///
/// Consumed when called, so a computation completes at most once. Dropping
/// it without calling rejects the computation with [`Error::Dropped`].
#[derive(Debug)]
pub struct Callback<R>
where
    R: Clone + Send + 'static,
{
    resolver: Resolver<R>,
}

impl<R> Callback<R>
where
    R: Clone + Send + 'static,
{
    /// Complete with an error or a result.
    pub fn call(self, result: Result<R, Error>) {
        self.resolver.settle(result);
    }

    /// Complete successfully.
    pub fn ok(self, value: R) {
        self.resolver.fulfill(value);
    }

    /// Complete with an error.
    pub fn err(self, error: Error) {
        self.resolver.reject(error);
    }
}

/// Lift a function that reports completion through a callback.
///
/// When the lazy value is forced, `body` is invoked once with the resolved
/// arguments and a fresh [`Callback`]. The callback may be completed later,
/// from any thread.
pub fn nfunc<A, R, F>(body: F) -> Lifted<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<A>, Callback<R>) + Send + Sync + 'static,
{
    Lifted::new(move |args| {
        let (promise, resolver) = Promise::pending();
        body(args, Callback { resolver });
        Ok(Computed::Deferred(promise))
    })
}

/// Lazy conditional over pre-built branches.
///
/// When forced, resolves `cond` and settles with whichever branch its
/// truthiness selects. The other branch is never forced by this node.
pub fn lazy_if<C, T, A>(
    cond: A,
    if_true: LazyValue<T>,
    if_false: LazyValue<T>,
) -> LazyValue<T>
where
    C: Truthy + Clone + Send + 'static,
    T: Clone + Send + 'static,
    A: Into<Arg<C>>,
{
    let cond: Arg<C> = cond.into();
    LazyValue::new(move || {
        let chosen = cond.into_promise().chain(move |c| {
            let branch = if c.is_truthy() { if_true } else { if_false };
            Ok(Computed::Deferred(branch.promise()))
        });
        Ok(Computed::Deferred(chosen))
    })
}

/// Lazy conditional over branch computations.
///
/// Like [`lazy_if`], but only the selected computation is ever wrapped into
/// a lazy value; the other one is dropped without being called.
pub fn lazy_iff<C, T, A, F, G>(cond: A, if_true: F, if_false: G) -> LazyValue<T>
where
    C: Truthy + Clone + Send + 'static,
    T: Clone + Send + 'static,
    A: Into<Arg<C>>,
    F: FnOnce() -> Result<Computed<T>, Error> + Send + 'static,
    G: FnOnce() -> Result<Computed<T>, Error> + Send + 'static,
{
    let cond: Arg<C> = cond.into();
    LazyValue::new(move || {
        let chosen = cond.into_promise().chain(move |c| {
            let branch = if c.is_truthy() {
                LazyValue::new(if_true)
            } else {
                LazyValue::new(if_false)
            };
            Ok(Computed::Deferred(branch.promise()))
        });
        Ok(Computed::Deferred(chosen))
    })
}
