use crate::context;
use crate::runtime::RuntimeError;
use crate::runtime::builder::{Builder, Config};
use crate::runtime::timer::TimerQueue;
use crate::task::{self, Task, TaskHandle, WaitHandler};
use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic;
use std::rc::Rc;
use std::thread;
use std::time::Instant;

/// The single-threaded cooperative scheduler.
///
/// An `EventLoop` owns every task scheduled on it, resumes ready tasks in
/// FIFO order, services timers, and drives suspension and wake-up through
/// each task's wait handler. Exactly one task runs at a time; scheduling
/// happens only at suspension points.
///
/// `EventLoop` is cheap to clone (a shared reference to the loop state) and
/// deliberately `!Send`: all task state lives on the thread that runs the
/// loop.
///
/// ```
/// use looplet::EventLoop;
///
/// let event_loop = EventLoop::new();
/// let handle = event_loop.call_soon(async {
///     looplet::yield_now().await;
///     21 * 2
/// });
/// assert_eq!(event_loop.run_until_complete(handle).unwrap(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct EventLoop {
    shared: Rc<LoopShared>,
}

#[derive(Debug)]
pub(crate) struct LoopShared {
    /// FIFO of tasks with `wait_count == 0` awaiting resumption. A task is in
    /// here iff its ACTIVE flag is set.
    ready: RefCell<VecDeque<Rc<Task>>>,

    /// Every task the loop owns, live until completion.
    tasks: RefCell<HashMap<task::Id, Rc<Task>>>,

    /// Pending timers keyed by absolute deadline.
    timers: RefCell<TimerQueue>,
}

impl EventLoop {
    /// Creates a loop with default configuration. See
    /// [`Builder`](crate::runtime::Builder) for knobs.
    pub fn new() -> EventLoop {
        Builder::new().build()
    }

    pub(crate) fn from_config(config: Config) -> EventLoop {
        EventLoop {
            shared: Rc::new(LoopShared {
                ready: RefCell::new(VecDeque::with_capacity(config.ready_capacity)),
                tasks: RefCell::new(HashMap::with_capacity(config.ready_capacity)),
                timers: RefCell::new(TimerQueue::with_capacity(config.timer_capacity)),
            }),
        }
    }

    /// Schedule `future` as a new task at the tail of the ready queue.
    ///
    /// The future does not run yet; user code first executes when the loop
    /// resumes the task. The returned handle observes the result and can
    /// cancel the task.
    pub fn call_soon<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (task, handle) = task::new_task(future, Rc::downgrade(&self.shared));
        tracing::trace!(task = %task.id(), "task scheduled");

        self.shared.tasks.borrow_mut().insert(task.id(), task.clone());
        self.shared.schedule(task);

        handle
    }

    /// Drive the scheduler until the referenced task completes, then return
    /// its result.
    ///
    /// While running, this loop is installed as the thread's current loop and
    /// uninstalled on every exit path. Failure surface:
    ///
    /// - [`RuntimeError::NestedLoop`] if a loop is already current on this
    ///   thread;
    /// - [`RuntimeError::Deadlock`] if no task is ready, no timer is pending,
    ///   and the awaited task has not completed;
    /// - the task's own failure, re-raised: a panic resumes unwinding in the
    ///   caller, a cancellation surfaces as a [`JoinError`] error value.
    ///
    /// [`JoinError`]: crate::task::JoinError
    pub fn run_until_complete<T: 'static>(&self, handle: TaskHandle<T>) -> Result<T> {
        let _guard = context::enter_loop(self)?;

        loop {
            // Timer expiries are processed before picking the next task.
            self.shared.service_timers();

            if handle.is_complete() {
                break;
            }

            if let Some(task) = self.shared.pop_ready() {
                task::run(&task);

                // A task that suspended with no pending wakes yielded
                // cooperatively: it goes back to the tail, strictly after
                // everything that is ready right now.
                if !task.is_complete() && task.wait_count() == 0 && !task.is_active() {
                    self.shared.schedule(task);
                }
            } else if let Some(deadline) = self.shared.next_timer_deadline() {
                // Nothing to run until the earliest timer: block on the clock.
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            } else {
                tracing::error!("deadlock: no ready task and no pending timer");
                return Err(RuntimeError::Deadlock.into());
            }
        }

        match handle.get_result() {
            Ok(value) => Ok(value),
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(err) => Err(err.into()),
        }
    }

    /// [`call_soon`](EventLoop::call_soon) followed by
    /// [`run_until_complete`](EventLoop::run_until_complete).
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let handle = self.call_soon(future);
        self.run_until_complete(handle)
    }

    /// Request cancellation of the task behind `handle`; equivalent to
    /// [`TaskHandle::cancel`].
    pub fn request_task_cancel<T: 'static>(&self, handle: &TaskHandle<T>) {
        self.shared.request_cancel(handle.task());
    }

    pub(crate) fn register_timer(&self, deadline: Instant, handler: Rc<WaitHandler>) {
        self.shared.timers.borrow_mut().insert(deadline, handler);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopShared {
    /// Enqueue a task at the tail of the ready queue. No-op for completed
    /// tasks and for tasks already queued, preserving the invariant that a
    /// task is queued iff its ACTIVE flag is set.
    pub(crate) fn schedule(&self, task: Rc<Task>) {
        if task.is_complete() || task.is_active() {
            return;
        }
        task.set_active();
        self.ready.borrow_mut().push_back(task);
    }

    /// Mark `task` cancel-pending and, if it is blocked, force it runnable so
    /// delivery happens on its next resume. Idempotent; a no-op once the task
    /// completed.
    pub(crate) fn request_cancel(&self, task: &Rc<Task>) {
        if task.is_complete() || task.cancel_pending() {
            return;
        }

        tracing::debug!(task = %task.id(), "cancellation requested");
        task.set_cancel_pending();

        if task.wait_count() > 0 {
            // Whatever the task was waiting on must no longer wake it.
            task.revoke_wait_handler();
            task.reset_wait_count();
            task.schedule();
        }
    }

    /// Drop ownership of a completed task. Outstanding handles keep the task
    /// alive for result retrieval.
    pub(crate) fn release(&self, id: task::Id) {
        self.tasks.borrow_mut().remove(&id);
    }

    fn pop_ready(&self) -> Option<Rc<Task>> {
        let task = self.ready.borrow_mut().pop_front()?;
        task.clear_active();
        Some(task)
    }

    fn service_timers(&self) {
        let now = Instant::now();
        loop {
            let expired = self.timers.borrow_mut().pop_expired(now);
            match expired {
                // A refused wake here means the timer's owner is gone or was
                // cancelled out of the sleep; either way the expiry is spent.
                Some(handler) => {
                    handler.wake();
                }
                None => break,
            }
        }
    }

    fn next_timer_deadline(&self) -> Option<Instant> {
        let timers = self.timers.borrow();
        if timers.is_empty() {
            None
        } else {
            timers.next_deadline()
        }
    }
}
