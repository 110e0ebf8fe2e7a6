use crate::context;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yield control back to the loop, re-enqueueing the current task at the
/// tail of the ready queue.
///
/// The yielder resumes strictly after every task that is ready at the moment
/// of the yield. The wait count is untouched: this is a cooperative pause,
/// not a wait.
///
/// Long computations should yield periodically so they do not starve the
/// other tasks on the loop:
///
/// ```no_run
/// # async fn doc() {
/// for i in 0..1_000_000 {
///     // heavy computation...
///
///     if i % 100 == 0 {
///         looplet::yield_now().await;
///     }
/// }
/// # }
/// ```
///
/// # Panics
///
/// Panics if awaited from outside a task.
pub fn yield_now() -> YieldNow {
    YieldNow {
        awaiting_first_poll: true,
    }
}

/// Future returned by [`yield_now`].
#[derive(Debug, Clone, Copy)]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = context::current_task();
        task.deliver_pending_cancel();

        // Only yield on first poll; suspending with a zero wait count sends
        // the task to the back of the ready queue.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as looplet;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[looplet::test]
    async fn test_yield_runs_other_ready_tasks_first() -> Result<()> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let event_loop = crate::context::current();

        let other_log = Rc::clone(&log);
        let other = event_loop.call_soon(async move {
            other_log.borrow_mut().push("other");
        });

        log.borrow_mut().push("before-yield");
        yield_now().await;
        log.borrow_mut().push("after-yield");

        assert!(other.is_complete());
        assert_eq!(*log.borrow(), ["before-yield", "other", "after-yield"]);
        Ok(())
    }

    #[looplet::test]
    async fn test_interleaved_yields_alternate() -> Result<()> {
        let log: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let event_loop = crate::context::current();

        for id in 0..2u32 {
            let log = Rc::clone(&log);
            event_loop.call_soon(async move {
                for _ in 0..3 {
                    log.borrow_mut().push(id);
                    yield_now().await;
                }
            });
        }

        // Let both workers drain.
        for _ in 0..8 {
            yield_now().await;
        }

        assert_eq!(*log.borrow(), [0, 1, 0, 1, 0, 1]);
        Ok(())
    }
}
