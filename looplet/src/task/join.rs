use crate::context;
use crate::task::{Id, JoinError, Task};
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A shared, typed handle to a task scheduled on an [`EventLoop`].
///
/// The handle observes completion, retrieves the result (at most once), and
/// requests cancellation. It can also be awaited from inside another task,
/// resolving to `Result<T, JoinError>` when the target completes.
///
/// Dropping a `TaskHandle` detaches the task: it keeps running under its
/// loop, its result is simply no longer retrievable.
///
/// This `struct` is created by [`EventLoop::call_soon`].
///
/// [`EventLoop`]: crate::runtime::EventLoop
/// [`EventLoop::call_soon`]: crate::runtime::EventLoop::call_soon
pub struct TaskHandle<T> {
    task: Rc<Task>,
    _marker: PhantomData<T>,
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn new(task: Rc<Task>) -> Self {
        Self {
            task,
            _marker: PhantomData,
        }
    }

    /// The task's unique id.
    pub fn id(&self) -> Id {
        self.task.id()
    }

    /// Whether the task's future has returned, normally or by failure.
    pub fn is_complete(&self) -> bool {
        self.task.is_complete()
    }

    /// Retrieve the task's result.
    ///
    /// Succeeds at most once: the first call after completion consumes the
    /// stored value. Errors: [`JoinError`] for a task that was cancelled or
    /// panicked, a not-ready error before completion, and a consumed error
    /// on any retrieval after the first.
    pub fn get_result(&self) -> Result<T, JoinError> {
        if !self.task.is_complete() {
            return Err(JoinError::not_ready(self.task.id()));
        }
        self.task.take_output::<T>()
    }

    /// Request cancellation of the task.
    ///
    /// Delivery is deferred: the task is made runnable if it was blocked and
    /// a [`Cancelled`](crate::task::Cancelled) failure is raised inside it at
    /// its next suspension point. Idempotent; a no-op on completed tasks.
    pub fn cancel(&self) {
        if let Some(event_loop) = self.task.event_loop() {
            event_loop.request_cancel(&self.task);
        }
    }

    pub(crate) fn task(&self) -> &Rc<Task> {
        &self.task
    }
}

// Handles are shared: clones observe and cancel the same task. The result
// stays readable at most once across all clones (the slot is consumed by the
// first successful `get_result`).
impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Rc::clone(&self.task),
            _marker: PhantomData,
        }
    }
}

impl<T> Unpin for TaskHandle<T> {}

impl<T: 'static> Future for TaskHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let current = context::current_task();
        current.deliver_pending_cancel();

        if self.task.is_complete() {
            return Poll::Ready(self.get_result());
        }

        // Wait for the target's completion to fire our wake token.
        let handler = current.wait_handler();
        self.task.add_completion_waiter(handler);
        current.incr_wait_count();

        Poll::Pending
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.id())
            .field("complete", &self.task.is_complete())
            .finish()
    }
}
