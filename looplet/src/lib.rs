//! A single-threaded cooperative task runtime.
//!
//! User futures run as independently suspendable tasks multiplexed onto one
//! OS thread by an [`EventLoop`]. A task may yield, sleep, wait for another
//! task, block on a [`Queue`], [`CondVar`] or [`Lock`], or be cancelled;
//! every scheduling point is explicit and there is no preemption.
//!
//! ```
//! use looplet::{EventLoop, Queue};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let queue: Queue<i32> = Queue::new();
//!
//! let producer = queue.clone();
//! event_loop.call_soon(async move {
//!     looplet::sleep(Duration::from_millis(10)).await;
//!     producer.push(42).await;
//! });
//!
//! let consumer = queue.clone();
//! let handle = event_loop.call_soon(async move { consumer.pop().await });
//!
//! assert_eq!(event_loop.run_until_complete(handle).unwrap(), 42);
//! ```

#[doc(inline)]
pub use looplet_macros::main;

#[doc(inline)]
pub use looplet_macros::test;

pub(crate) mod context;

pub mod runtime;
pub use runtime::{Builder, EventLoop, RuntimeError, yield_to};

pub mod sync;
pub use sync::{CondVar, Lock, LockGuard, Queue};

pub mod task;
pub use task::{Cancelled, Id, JoinError, TaskHandle};

pub mod time;
pub use time::{Sleep, YieldNow, sleep, yield_now};
