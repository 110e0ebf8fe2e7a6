//! The event loop: scheduling, timers, cancellation policy, and the
//! free functions usable from inside a task.

use crate::context;

// Public API
mod builder;
pub use builder::Builder;

pub(crate) mod event_loop;
pub use event_loop::EventLoop;

// Internals
mod timer;

#[cfg(test)]
mod tests;

/// Errors raised by the scheduler itself, as opposed to failures of an
/// individual task.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    /// No task is ready, no timer is pending, and the awaited task has not
    /// completed: nothing can ever make progress again.
    #[error("deadlock: no runnable task, no pending timer, and the awaited task is not complete")]
    Deadlock,

    /// A second loop tried to run on a thread that already has one.
    #[error("an event loop is already running on this thread")]
    NestedLoop,
}

/// Run `future` as a subtask and suspend the current task until it
/// completes; returns the subtask's value.
///
/// A failure of the subtask is re-raised in the caller: a panic resumes
/// unwinding here, and a cancellation of the *subtask* raises
/// [`Cancelled`](crate::task::Cancelled) in the caller as if the caller
/// itself had been cancelled at this suspension point.
///
/// # Panics
///
/// Panics if called from outside a task.
///
/// ```
/// use looplet::EventLoop;
/// use looplet::runtime::yield_to;
///
/// let event_loop = EventLoop::new();
/// let handle = event_loop.call_soon(async { yield_to(async { 7 }).await });
/// assert_eq!(event_loop.run_until_complete(handle).unwrap(), 7);
/// ```
pub async fn yield_to<F>(future: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    let handle = context::current().call_soon(future);
    match handle.await {
        Ok(value) => value,
        Err(err) => err.unwind(),
    }
}
