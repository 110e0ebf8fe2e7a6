use crate::runtime::event_loop::LoopShared;
use crate::task::state::{State, TaskFlags};
use crate::task::wait::WaitHandler;
use crate::task::{Cancelled, Id, JoinError, slot::ResultSlot};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::panic;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// A user future running as an independently suspendable task under the loop.
///
/// The loop's registry holds an `Rc` for every live task; the corresponding
/// [`TaskHandle`](crate::task::TaskHandle) holds another so the result stays
/// readable after the task is released. Everything that might wake the task
/// goes through its current [`WaitHandler`], which holds only a `Weak`
/// back-reference.
pub(crate) struct Task {
    id: Id,

    /// Self-reference handed to freshly minted wait handlers.
    weak_self: Weak<Task>,

    state: State,

    /// The wrapped user future; `None` once the task has completed (or was
    /// cancelled before it ever started).
    future: RefCell<Option<Pin<Box<dyn Future<Output = ()>>>>>,

    /// Value-or-failure cell, written once from the task's top frame.
    slot: RefCell<ResultSlot>,

    /// The task's current wake token, re-armed on each new suspension.
    handler: RefCell<Rc<WaitHandler>>,

    /// Handlers to fire, in registration order, when this task completes.
    /// Feeds task join and `yield_to`.
    completion_waiters: RefCell<SmallVec<[Rc<WaitHandler>; 2]>>,

    /// Back-reference used to re-enqueue on wake. Dead once the loop is gone,
    /// at which point scheduling becomes a no-op.
    event_loop: Weak<LoopShared>,
}

impl Task {
    pub(crate) fn new(id: Id, event_loop: Weak<LoopShared>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Task>| Self {
            id,
            weak_self: weak.clone(),
            state: State::new(),
            future: RefCell::new(None),
            slot: RefCell::new(ResultSlot::new()),
            handler: RefCell::new(WaitHandler::new(weak.clone())),
            completion_waiters: RefCell::new(SmallVec::new()),
            event_loop,
        })
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    /// Install the wrapped future. Called exactly once, right after creation.
    pub(crate) fn bind<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        *self.future.borrow_mut() = Some(Box::pin(future));
    }

    // --- lifecycle flags ---

    pub(crate) fn is_complete(&self) -> bool {
        self.state.contains(TaskFlags::COMPLETE)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.contains(TaskFlags::ACTIVE)
    }

    pub(crate) fn set_active(&self) {
        self.state.insert(TaskFlags::ACTIVE);
    }

    pub(crate) fn clear_active(&self) {
        self.state.remove(TaskFlags::ACTIVE);
    }

    pub(crate) fn has_started(&self) -> bool {
        self.state.contains(TaskFlags::STARTED)
    }

    pub(crate) fn mark_started(&self) {
        self.state.insert(TaskFlags::STARTED);
    }

    pub(crate) fn cancel_pending(&self) -> bool {
        self.state.contains(TaskFlags::CANCEL_PENDING)
    }

    pub(crate) fn set_cancel_pending(&self) {
        self.state.insert(TaskFlags::CANCEL_PENDING);
    }

    // --- wait/wake protocol ---

    pub(crate) fn wait_count(&self) -> u32 {
        self.state.wait_count()
    }

    pub(crate) fn incr_wait_count(&self) {
        self.state.incr_wait_count();
    }

    pub(crate) fn decr_wait_count(&self) {
        self.state.decr_wait_count();
    }

    pub(crate) fn reset_wait_count(&self) {
        self.state.reset_wait_count();
    }

    /// The wake token for this task's next suspension.
    ///
    /// Reuses the current handler when the task holds the only reference;
    /// otherwise stale clones are still sitting in some wait list or timer
    /// heap, so a fresh handler is minted and the stragglers die inert.
    pub(crate) fn wait_handler(&self) -> Rc<WaitHandler> {
        let mut current = self.handler.borrow_mut();
        if Rc::strong_count(&current) == 1 {
            current.rearm();
        } else {
            *current = WaitHandler::new(self.weak_self.clone());
        }
        current.clone()
    }

    /// Abandon the current suspension's wake token (cancellation forced the
    /// task runnable; whatever would have woken it must no longer do so).
    pub(crate) fn revoke_wait_handler(&self) {
        self.handler.borrow().revoke();
    }

    /// Put this task at the tail of its loop's ready queue.
    pub(crate) fn schedule(&self) {
        let Some(event_loop) = self.event_loop.upgrade() else {
            return;
        };
        if let Some(task) = self.weak_self.upgrade() {
            event_loop.schedule(task);
        }
    }

    pub(crate) fn event_loop(&self) -> Option<Rc<LoopShared>> {
        self.event_loop.upgrade()
    }

    /// Deliver a pending cancellation by raising [`Cancelled`] in the task.
    ///
    /// This is the sole delivery point; every suspension-point future calls
    /// it when polled. Delivery clears the pending flag, so user code that
    /// catches the unwind will not see it again unless cancellation is
    /// requested anew.
    pub(crate) fn deliver_pending_cancel(&self) {
        if self.state.contains(TaskFlags::CANCEL_PENDING) {
            self.state.remove(TaskFlags::CANCEL_PENDING);
            self.state.insert(TaskFlags::CANCELLED);
            tracing::trace!(task = %self.id, "delivering cancellation");
            panic::resume_unwind(Box::new(Cancelled));
        }
    }

    /// Mark a cancellation delivered without unwinding. Used when the task is
    /// cancelled before its first poll and user code never runs.
    pub(crate) fn note_cancel_delivered(&self) {
        self.state.remove(TaskFlags::CANCEL_PENDING);
        self.state.insert(TaskFlags::CANCELLED);
    }

    // --- completion ---

    pub(crate) fn add_completion_waiter(&self, handler: Rc<WaitHandler>) {
        self.completion_waiters.borrow_mut().push(handler);
    }

    pub(crate) fn poll_future(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut future = self.future.borrow_mut();
        match future.as_mut() {
            Some(future) => future.as_mut().poll(cx),
            None => Poll::Ready(()),
        }
    }

    pub(crate) fn drop_future(&self) {
        *self.future.borrow_mut() = None;
    }

    pub(crate) fn store_output<T: 'static>(&self, value: T) {
        self.slot.borrow_mut().store(value);
    }

    pub(crate) fn store_failure(&self, err: JoinError) {
        self.slot.borrow_mut().store_failure(err);
    }

    pub(crate) fn take_output<T: 'static>(&self) -> Result<T, JoinError> {
        self.slot.borrow_mut().take::<T>(self.id)
    }

    /// Transition to complete: drop the future, wake joiners in registration
    /// order, and release the loop's ownership. The result slot must already
    /// be populated.
    pub(crate) fn finish(&self) {
        self.state.insert(TaskFlags::COMPLETE);
        self.drop_future();

        let waiters = std::mem::take(&mut *self.completion_waiters.borrow_mut());
        for handler in waiters {
            handler.wake();
        }

        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.release(self.id);
        }
        tracing::trace!(task = %self.id, "task complete");
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
