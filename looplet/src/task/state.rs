use bitflags::bitflags;
use std::cell::Cell;

bitflags! {
    /// Lifecycle flags of a task.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct TaskFlags: u8 {
        /// User code has been polled at least once.
        const STARTED = 1;

        /// The task currently sits in the loop's ready queue.
        const ACTIVE = 1 << 1;

        /// Cancellation was requested and has not been delivered yet.
        const CANCEL_PENDING = 1 << 2;

        /// Cancellation has been delivered at least once.
        const CANCELLED = 1 << 3;

        /// The task's future has returned (normally or by failure).
        const COMPLETE = 1 << 4;
    }
}

/// Single-threaded task state: lifecycle flags plus the wait count.
///
/// The wait count is the number of wake events the task must still receive
/// before it is eligible to resume; it is zero whenever the task is runnable.
#[derive(Debug)]
pub(crate) struct State {
    flags: Cell<TaskFlags>,
    wait_count: Cell<u32>,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            flags: Cell::new(TaskFlags::empty()),
            wait_count: Cell::new(0),
        }
    }

    pub(crate) fn contains(&self, flags: TaskFlags) -> bool {
        self.flags.get().contains(flags)
    }

    pub(crate) fn insert(&self, flags: TaskFlags) {
        let mut current = self.flags.get();
        current.insert(flags);
        self.flags.set(current);
    }

    pub(crate) fn remove(&self, flags: TaskFlags) {
        let mut current = self.flags.get();
        current.remove(flags);
        self.flags.set(current);
    }

    pub(crate) fn wait_count(&self) -> u32 {
        self.wait_count.get()
    }

    pub(crate) fn incr_wait_count(&self) {
        self.wait_count.set(self.wait_count.get() + 1);
    }

    /// Decrement the wait count. An underflow is a runtime bug: fatal in
    /// debug builds, reported and ignored in release builds.
    pub(crate) fn decr_wait_count(&self) {
        let count = self.wait_count.get();
        debug_assert!(count > 0, "task wait_count underflow");
        if count == 0 {
            tracing::error!("invariant violated: task wait_count underflow");
            return;
        }
        self.wait_count.set(count - 1);
    }

    pub(crate) fn reset_wait_count(&self) {
        self.wait_count.set(0);
    }
}
