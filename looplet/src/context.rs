//! Per-thread ambient state: the loop currently driving this thread and the
//! task it is currently resuming.
//!
//! Free functions (`yield_now`, `sleep`, `yield_to`) and the suspension-point
//! futures consult this to find their loop and task. Exactly one loop may be
//! current per thread; [`enter_loop`] fails fast on nesting.

use crate::runtime::{EventLoop, RuntimeError};
use crate::task::{Id, Task};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CONTEXT: LoopContext = LoopContext {
        event_loop: RefCell::new(None),
        task: RefCell::new(None),
    };
}

struct LoopContext {
    event_loop: RefCell<Option<EventLoop>>,
    task: RefCell<Option<Rc<Task>>>,
}

/// The loop currently driving this thread, if any.
pub(crate) fn try_current() -> Option<EventLoop> {
    CONTEXT.with(|cx| cx.event_loop.borrow().clone())
}

/// The loop currently driving this thread.
///
/// # Panics
///
/// Panics if no loop is running on this thread.
pub(crate) fn current() -> EventLoop {
    try_current().expect("no event loop is running on this thread")
}

/// The task the current loop is resuming, if any.
pub(crate) fn try_current_task() -> Option<Rc<Task>> {
    CONTEXT.with(|cx| cx.task.borrow().clone())
}

/// The task the current loop is resuming.
///
/// # Panics
///
/// Panics when called from outside a task; suspension points only make sense
/// inside one.
pub(crate) fn current_task() -> Rc<Task> {
    try_current_task().expect("suspension points must be reached from inside a looplet task")
}

pub(crate) fn current_task_id() -> Option<Id> {
    CONTEXT.with(|cx| cx.task.borrow().as_ref().map(|task| task.id()))
}

/// Install `event_loop` as the thread's current loop for the lifetime of the
/// returned guard. Fails fast if a loop is already current on this thread.
pub(crate) fn enter_loop(event_loop: &EventLoop) -> Result<LoopGuard, RuntimeError> {
    CONTEXT.with(|cx| {
        let mut slot = cx.event_loop.borrow_mut();
        if slot.is_some() {
            return Err(RuntimeError::NestedLoop);
        }
        *slot = Some(event_loop.clone());
        Ok(LoopGuard { _priv: () })
    })
}

/// Uninstalls the current loop on drop, on every exit path of
/// `run_until_complete` (normal, error, or unwind).
pub(crate) struct LoopGuard {
    _priv: (),
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        CONTEXT.with(|cx| {
            cx.event_loop.borrow_mut().take();
            cx.task.borrow_mut().take();
        });
    }
}

/// Sets the current task while the loop resumes it; restores the previous
/// value on drop, including when the poll unwinds.
pub(crate) struct TaskGuard {
    prev: Option<Rc<Task>>,
}

impl TaskGuard {
    pub(crate) fn enter(task: &Rc<Task>) -> Self {
        let prev = CONTEXT.with(|cx| cx.task.borrow_mut().replace(task.clone()));
        TaskGuard { prev }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CONTEXT.with(|cx| *cx.task.borrow_mut() = prev);
    }
}
