//! Per-thread work queue that keeps evaluation off the call stack.
//!
//! Forcing a node forces its inputs, and settling a promise settles
//! whatever waits on it. Done with plain calls, a long dependency chain
//! needs one stack frame per node. Instead every such step is handed to
//! [`defer`], which runs it through a queue owned by the current thread.
//!
//! The first `defer` on a thread becomes the drain loop and runs jobs until
//! the queue is empty; any `defer` made while a job runs only appends. Work
//! started from the outside therefore finishes before that outermost call
//! returns, and stack depth stays constant however deep the graph is.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

type Job = Box<dyn FnOnce()>;

thread_local! {
    /// `Some` while a drain loop is active on this thread.
    static QUEUE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Run `job` on this thread's queue.
///
/// Runs it right away (together with anything it defers) when no drain is
/// active, otherwise queues it behind the current job.
pub(crate) fn defer<F>(job: F)
where
    F: FnOnce() + 'static,
{
    let queued = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        match queue.as_mut() {
            Some(jobs) => {
                jobs.push_back(Box::new(job));
                true
            }
            None => {
                *queue = Some(VecDeque::from([Box::new(job) as Job]));
                false
            }
        }
    });

    if !queued {
        drain();
    }
}

/// Run queued jobs until none are left.
///
/// A panicking job does not stop the loop: the remaining jobs still run so
/// every promise they settle stays consistent, and the first panic resumes
/// once the queue is empty.
fn drain() {
    let mut panicked = None;
    while let Some(job) = QUEUE.with(|queue| queue.borrow_mut().as_mut()?.pop_front()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            panicked.get_or_insert(payload);
        }
    }
    QUEUE.with(|queue| *queue.borrow_mut() = None);

    if let Some(payload) = panicked {
        panic::resume_unwind(payload);
    }
}
