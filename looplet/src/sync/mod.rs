//! Coordination primitives built on the wait/wake protocol.
//!
//! Each primitive keeps its own FIFO wait list of
//! [`WaitHandler`](crate::task) tokens; no primitive needs internal locking
//! because the loop is single-threaded and user code between suspension
//! points runs atomically with respect to other tasks.

mod condvar;
pub use condvar::{CondVar, Wait};

mod lock;
pub use lock::{Acquire, Lock, LockGuard};

mod queue;
pub use queue::{Pop, Push, Queue};
