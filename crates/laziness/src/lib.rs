//! Lazy values that build a computation graph without running it.
//!
//! Wrapping functions with [`func`], [`nfunc`] and friends lets ordinary
//! looking code assemble a graph of [`LazyValue`] nodes. Nothing executes
//! until a node is forced, awaited or chained with [`LazyValue::then`]; at
//! that point its inputs are resolved (forcing them in turn), the wrapped
//! function runs once, and the result is memoized.
//!
//! ```no_run
//! use laziness::{func, lazy_if, Arg, LazyValue};
//!
//! # async fn demo() -> laziness::Result<()> {
//! let add = func(|args: Vec<i32>| Ok(args[0] + args[1]));
//! let sum = add.call([Arg::Lazy(LazyValue::from_value(40)), Arg::Value(2)]);
//! let pick = lazy_if(true, sum, LazyValue::from_value(0));
//! assert_eq!(pick.await?, 42);
//! # Ok(())
//! # }
//! ```

mod combinators;
mod error;
mod lazy;
mod promise;
mod queue;
mod truthy;
mod value;

pub use combinators::{
    func, func_async, func_promise, lazy_if, lazy_iff, nfunc, Arg, Callback, Lifted,
};
pub use error::Error;
pub use lazy::{Computed, LazyValue, Phase};
pub use promise::{Promise, Resolver};
pub use truthy::Truthy;
pub use value::Value;

/// Result type for lazy computations.
pub type Result<T> = std::result::Result<T, Error>;
