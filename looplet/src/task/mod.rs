//! Tasks: independently suspendable units of execution owned by the loop.

use crate::runtime::event_loop::LoopShared;
use std::rc::{Rc, Weak};

// Public API
mod error;
pub use self::error::{Cancelled, JoinError};

mod join;
pub use self::join::TaskHandle;

pub mod id;
pub use self::id::{Id, id, try_id};

// Internals
mod harness;
pub(crate) use self::harness::run;

mod slot;

mod state;

#[allow(clippy::module_inception)]
mod task;
pub(crate) use self::task::Task;

mod wait;
pub(crate) use self::wait::WaitHandler;

/// Construct a task primed to run `future` under the given loop. Two
/// references come back: one for the loop's registry and ready queue, one
/// wrapped in the user-facing handle.
///
/// Construction runs no user code; the future is not polled until the loop
/// first resumes the task.
pub(crate) fn new_task<F>(
    future: F,
    event_loop: Weak<LoopShared>,
) -> (Rc<Task>, TaskHandle<F::Output>)
where
    F: Future + 'static,
    F::Output: 'static,
{
    let task = Task::new(Id::next(), event_loop);
    task.bind(harness::TaskFuture::new(future, Rc::downgrade(&task)));
    (task.clone(), TaskHandle::new(task))
}
