use crate::context;
use crate::task::WaitHandler;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A wait/notify primitive: a FIFO list of wake tokens.
///
/// No internal mutex is needed — under single-threaded cooperative execution
/// the code between suspension points is already mutually exclusive. One
/// `notify_one` wakes exactly one waiter and no spurious wakes are produced,
/// so waiters only need to re-test their predicate if their own protocol
/// demands it.
///
/// Clones share the same wake list.
///
/// ```
/// use looplet::{CondVar, EventLoop};
///
/// let event_loop = EventLoop::new();
/// let condvar = CondVar::new();
///
/// let waiter = condvar.clone();
/// let handle = event_loop.call_soon(async move {
///     waiter.wait().await;
///     "woken"
/// });
///
/// let notifier = condvar.clone();
/// event_loop.call_soon(async move {
///     notifier.notify_one();
/// });
///
/// assert_eq!(event_loop.run_until_complete(handle).unwrap(), "woken");
/// ```
#[derive(Clone, Default)]
pub struct CondVar {
    waiters: Rc<RefCell<VecDeque<Rc<WaitHandler>>>>,
}

impl CondVar {
    pub fn new() -> Self {
        Self {
            waiters: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Suspend the current task until a notification arrives.
    ///
    /// # Panics
    ///
    /// Panics if awaited from outside a task.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            condvar: self,
            handler: None,
        }
    }

    /// Wake the first live waiter; a no-op if none is waiting.
    ///
    /// Waiters that were cancelled out of their wait no longer count: the
    /// notification goes to the first waiter that still accepts it.
    pub fn notify_one(&self) {
        let mut waiters = self.waiters.borrow_mut();
        while let Some(handler) = waiters.pop_front() {
            if handler.wake() {
                break;
            }
        }
    }

    /// Wake every current waiter, in the order they started waiting.
    pub fn notify_all(&self) {
        let drained: Vec<_> = self.waiters.borrow_mut().drain(..).collect();
        for handler in drained {
            handler.wake();
        }
    }

    /// Number of registered waiters, stale entries included.
    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.borrow().len()
    }
}

impl fmt::Debug for CondVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondVar")
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// Future returned by [`CondVar::wait`].
pub struct Wait<'a> {
    condvar: &'a CondVar,
    handler: Option<Rc<WaitHandler>>,
}

impl Unpin for Wait<'_> {}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let task = context::current_task();
        task.deliver_pending_cancel();

        match this.handler.take() {
            None => {
                let handler = task.wait_handler();
                this.condvar.waiters.borrow_mut().push_back(handler.clone());
                this.handler = Some(handler);
                task.incr_wait_count();
                Poll::Pending
            }
            // The loop only re-polls once our notification was delivered.
            Some(_) => Poll::Ready(()),
        }
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        // Abandoned after a notification was delivered to us: pass it on to
        // the next waiter instead of dropping it on the floor.
        if let Some(handler) = self.handler.take() {
            if handler.is_woken() {
                self.condvar.notify_one();
            }
        }
    }
}

impl fmt::Debug for Wait<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait").finish_non_exhaustive()
    }
}
