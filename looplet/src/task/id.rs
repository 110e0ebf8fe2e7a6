use crate::context;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque id that uniquely identifies a task for the lifetime of the
/// process.
///
/// Ids are allocated from a monotonically increasing counter and are never
/// reused, so they also reflect spawn order.
///
/// The id of the currently running task can be obtained from inside the task
/// via [`task::id()`](crate::task::id()) and [`task::try_id()`](crate::task::try_id()),
/// and from outside via [`TaskHandle::id()`](crate::task::TaskHandle::id).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Wrapping a u64 would take centuries of continuous spawning; treat
        // it as unrecoverable if it ever happens.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    /// The id as a plain integer.
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    /// A tracing id for correlating task lifecycle events with spans.
    #[allow(dead_code)]
    pub(crate) fn as_tracing_id(&self) -> tracing::Id {
        tracing::Id::from_non_zero_u64(self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// Panics if called from outside a task.
pub fn id() -> Id {
    context::current_task_id().expect("can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}
