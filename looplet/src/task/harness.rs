use crate::context;
use crate::task::{JoinError, Task};
use pin_project::pin_project;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// Wraps the user future so its output lands in the owning task's result
/// slot, erasing the output type from the loop's point of view.
#[pin_project]
pub(crate) struct TaskFuture<F: Future> {
    #[pin]
    inner: F,
    task: Weak<Task>,
}

impl<F: Future> TaskFuture<F> {
    pub(crate) fn new(inner: F, task: Weak<Task>) -> Self {
        Self { inner, task }
    }
}

impl<F> Future for TaskFuture<F>
where
    F: Future,
    F::Output: 'static,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.inner.poll(cx) {
            Poll::Ready(output) => {
                if let Some(task) = this.task.upgrade() {
                    task.store_output(output);
                }
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Resume a ready task: poll it once, with panic containment and the ambient
/// current-task context installed.
///
/// On return the task has either suspended again or completed, with its
/// result slot populated on completion. A cancellation requested before the
/// first poll completes the task as cancelled without ever running user code
/// (the entry barrier of task construction).
pub(crate) fn run(task: &Rc<Task>) {
    if task.cancel_pending() && !task.has_started() {
        task.note_cancel_delivered();
        task.store_failure(JoinError::cancelled(task.id()));
        task.finish();
        return;
    }

    task.mark_started();
    let _guard = context::TaskGuard::enter(task);

    // The loop re-polls tasks through the wait/wake protocol, never through
    // the std waker, so a noop waker is sufficient. A foreign future that
    // returns Pending without registering a wait handler leaves the task's
    // wait count at zero and the loop treats it as a cooperative yield.
    let waker = futures::task::noop_waker_ref();
    let mut cx = Context::from_waker(waker);

    let poll = panic::catch_unwind(AssertUnwindSafe(|| task.poll_future(&mut cx)));

    match poll {
        Ok(Poll::Pending) => {}
        Ok(Poll::Ready(())) => {
            // The wrapper future already stored the output.
            task.finish();
        }
        Err(payload) => {
            let err = JoinError::from_unwind(task.id(), payload);
            task.store_failure(err);
            task.finish();
        }
    }
}
