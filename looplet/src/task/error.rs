use crate::task::Id;
use std::any::Any;
use std::fmt;
use std::panic;

/// The unwind payload of a delivered cancellation.
///
/// When a cancelled task next resumes at a suspension point, the runtime
/// raises this marker through [`std::panic::resume_unwind`]. User code that
/// needs to run cleanup beyond what `Drop` provides may intercept it with
/// [`std::panic::catch_unwind`] and inspect the payload:
///
/// ```no_run
/// use looplet::Cancelled;
/// use std::panic::{self, AssertUnwindSafe};
///
/// # async fn doc(queue: looplet::Queue<i32>) {
/// let result = panic::catch_unwind(AssertUnwindSafe(|| {
///     // a suspension point that may deliver cancellation
/// }));
/// if let Err(payload) = result {
///     if payload.is::<Cancelled>() {
///         // cleanup, then either swallow or re-raise
///         panic::resume_unwind(payload);
///     }
/// }
/// # }
/// ```
///
/// `resume_unwind` is used instead of `panic!` so the process panic hook is
/// not invoked for routine cancellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task was cancelled")
    }
}

/// Error returned when retrieving the result of a task fails.
///
/// Produced by [`TaskHandle::get_result`], by awaiting a [`TaskHandle`], and
/// re-raised by [`EventLoop::run_until_complete`] for a failed root task.
///
/// [`TaskHandle`]: crate::task::TaskHandle
/// [`TaskHandle::get_result`]: crate::task::TaskHandle::get_result
/// [`EventLoop::run_until_complete`]: crate::runtime::EventLoop::run_until_complete
pub struct JoinError {
    repr: Repr,
    id: Id,
}

enum Repr {
    /// Cancellation was delivered and reached the task's top frame.
    Cancelled,
    /// The task panicked; the payload is preserved for re-raising.
    Panic(SyncWrapper<Box<dyn Any + Send + 'static>>),
    /// The task has not completed yet.
    NotReady,
    /// The result was already taken; a task's result is readable once.
    Consumed,
}

impl JoinError {
    pub(crate) fn cancelled(id: Id) -> JoinError {
        JoinError {
            repr: Repr::Cancelled,
            id,
        }
    }

    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> JoinError {
        JoinError {
            repr: Repr::Panic(SyncWrapper::new(payload)),
            id,
        }
    }

    pub(crate) fn not_ready(id: Id) -> JoinError {
        JoinError {
            repr: Repr::NotReady,
            id,
        }
    }

    pub(crate) fn consumed(id: Id) -> JoinError {
        JoinError {
            repr: Repr::Consumed,
            id,
        }
    }

    /// Classify an unwind payload caught while polling a task: a [`Cancelled`]
    /// marker means cancellation reached the top frame, anything else is a
    /// genuine panic.
    pub(crate) fn from_unwind(id: Id, payload: Box<dyn Any + Send + 'static>) -> JoinError {
        if payload.is::<Cancelled>() {
            JoinError::cancelled(id)
        } else {
            JoinError::panic(id, payload)
        }
    }

    /// Returns true if the error was caused by the task being cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.repr, Repr::Cancelled)
    }

    /// Returns true if the error was caused by the task panicking.
    pub fn is_panic(&self) -> bool {
        matches!(self.repr, Repr::Panic(_))
    }

    /// Returns true if the task had not completed when the result was read.
    pub fn is_not_ready(&self) -> bool {
        matches!(self.repr, Repr::NotReady)
    }

    /// The id of the task this error refers to.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Consumes the error, returning the panic payload.
    ///
    /// # Panics
    ///
    /// Panics if the error is not a panic error (check [`is_panic`] first).
    ///
    /// [`is_panic`]: JoinError::is_panic
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.try_into_panic()
            .expect("`JoinError` is not a panic error")
    }

    /// Consumes the error, returning the panic payload if the task panicked,
    /// or the error itself otherwise.
    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, JoinError> {
        match self.repr {
            Repr::Panic(payload) => Ok(payload.into_inner()),
            _ => Err(self),
        }
    }

    /// Re-raise this failure in the calling task, as if it had occurred there.
    ///
    /// Used by `yield_to` to propagate a subtask failure into its parent.
    pub(crate) fn unwind(self) -> ! {
        match self.repr {
            Repr::Cancelled => panic::resume_unwind(Box::new(Cancelled)),
            Repr::Panic(payload) => panic::resume_unwind(payload.into_inner()),
            Repr::NotReady | Repr::Consumed => {
                unreachable!("only completed-task failures can be re-raised")
            }
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(f, "task {} was cancelled", self.id),
            Repr::Panic(p) => match p.downcast_str() {
                Some(msg) => write!(f, "task {} panicked with message {:?}", self.id, msg),
                None => write!(f, "task {} panicked", self.id),
            },
            Repr::NotReady => write!(f, "task {} has not completed yet", self.id),
            Repr::Consumed => write!(f, "task {} result was already taken", self.id),
        }
    }
}

impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(f, "JoinError::Cancelled({:?})", self.id),
            Repr::Panic(_) => write!(f, "JoinError::Panic({:?}, ...)", self.id),
            Repr::NotReady => write!(f, "JoinError::NotReady({:?})", self.id),
            Repr::Consumed => write!(f, "JoinError::Consumed({:?})", self.id),
        }
    }
}

impl std::error::Error for JoinError {}

/// Makes the panic payload `Sync` so `JoinError` can travel through
/// `anyhow::Error`. Sound because the payload is only reachable by value.
struct SyncWrapper<T> {
    value: T,
}

unsafe impl<T: Send> Sync for SyncWrapper<T> {}

impl<T> SyncWrapper<T> {
    fn new(value: T) -> Self {
        Self { value }
    }

    fn into_inner(self) -> T {
        self.value
    }
}

impl SyncWrapper<Box<dyn Any + Send + 'static>> {
    /// Best-effort view of the payload as a panic message.
    fn downcast_str(&self) -> Option<&str> {
        if let Some(s) = self.value.downcast_ref::<&'static str>() {
            Some(s)
        } else if let Some(s) = self.value.downcast_ref::<String>() {
            Some(s)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // `JoinError` must flow through `anyhow::Error`.
    assert_impl_all!(JoinError: Send, Sync, std::error::Error);

    #[test]
    fn test_from_unwind_classifies_cancellation() {
        let id = Id::next();
        let err = JoinError::from_unwind(id, Box::new(Cancelled));
        assert!(err.is_cancelled());
        assert!(!err.is_panic());
        assert_eq!(err.id(), id);
    }

    #[test]
    fn test_from_unwind_classifies_panic() {
        let err = JoinError::from_unwind(Id::next(), Box::new("boom"));
        assert!(err.is_panic());
        assert!(!err.is_cancelled());

        let payload = err.into_panic();
        assert_eq!(*payload.downcast::<&str>().unwrap(), "boom");
    }

    #[test]
    fn test_try_into_panic_returns_self_for_cancelled() {
        let err = JoinError::cancelled(Id::next());
        let err = err.try_into_panic().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_display_includes_panic_message() {
        let err = JoinError::panic(Id::next(), Box::new(String::from("oh no")));
        assert!(err.to_string().contains("oh no"));
    }
}
