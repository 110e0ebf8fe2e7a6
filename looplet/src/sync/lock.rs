use crate::context;
use crate::task::WaitHandler;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A cooperative mutex for critical sections that span suspension points.
///
/// Plain data shared between tasks needs no lock on a single-threaded loop —
/// code between suspension points already runs atomically. `Lock` is for the
/// cases where a task must hold exclusive access *across* an `.await`.
///
/// `acquire` suspends while the lock is held; release (dropping the
/// [`LockGuard`]) hands the lock directly to the longest-waiting live task,
/// so waiters acquire in FIFO order and cannot be overtaken.
///
/// Clones share the same lock.
///
/// ```
/// use looplet::{EventLoop, Lock};
///
/// let event_loop = EventLoop::new();
/// let lock = Lock::new();
///
/// let contender = lock.clone();
/// event_loop.call_soon(async move {
///     let _guard = contender.acquire().await;
///     looplet::yield_now().await;
/// });
///
/// let handle = event_loop.call_soon(async move {
///     let _guard = lock.acquire().await;
///     "acquired"
/// });
/// # assert_eq!(event_loop.run_until_complete(handle).unwrap(), "acquired");
/// ```
#[derive(Clone, Default)]
pub struct Lock {
    core: Rc<RefCell<LockCore>>,
}

#[derive(Default)]
struct LockCore {
    locked: bool,

    /// Tasks blocked in `acquire`, in arrival order.
    waiters: VecDeque<Rc<WaitHandler>>,
}

impl Lock {
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(LockCore::default())),
        }
    }

    /// Take the lock, suspending the current task while it is held.
    ///
    /// The returned guard releases the lock when dropped, on every exit path
    /// including cancellation unwinds.
    ///
    /// # Panics
    ///
    /// Panics if awaited from outside a task while the lock is held.
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            lock: self,
            handler: None,
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.core.borrow().locked
    }

    /// Release the lock: hand it to the first live waiter, or unlock if no
    /// waiter is left. Direct hand-off keeps `locked` set, so no task can
    /// barge in between release and the waiter's resume.
    fn unlock(&self) {
        let mut core = self.core.borrow_mut();
        while let Some(handler) = core.waiters.pop_front() {
            if handler.wake() {
                return;
            }
        }
        core.locked = false;
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Lock")
            .field("locked", &core.locked)
            .field("waiters", &core.waiters.len())
            .finish()
    }
}

/// Future returned by [`Lock::acquire`].
pub struct Acquire<'a> {
    lock: &'a Lock,
    /// Our place in the waiter queue, until the lock is handed to us.
    handler: Option<Rc<WaitHandler>>,
}

impl Unpin for Acquire<'_> {}

impl Future for Acquire<'_> {
    type Output = LockGuard;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let task = context::current_task();
        task.deliver_pending_cancel();

        match this.handler.take() {
            None => {
                let mut core = this.lock.core.borrow_mut();
                if !core.locked {
                    core.locked = true;
                    Poll::Ready(LockGuard {
                        lock: this.lock.clone(),
                    })
                } else {
                    let handler = task.wait_handler();
                    core.waiters.push_back(handler.clone());
                    this.handler = Some(handler);
                    task.incr_wait_count();
                    Poll::Pending
                }
            }
            // Woken by a release: ownership was handed to us directly.
            Some(_) => Poll::Ready(LockGuard {
                lock: this.lock.clone(),
            }),
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        // Cancelled after the hand-off reached us: we own the lock without
        // ever returning a guard, so release it on the spot.
        if let Some(handler) = self.handler.take() {
            if handler.is_woken() {
                self.lock.unlock();
            }
        }
    }
}

impl fmt::Debug for Acquire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire").finish_non_exhaustive()
    }
}

/// Holds the lock; releases it when dropped.
pub struct LockGuard {
    lock: Lock,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as looplet;
    use crate::time::{sleep, yield_now};
    use anyhow::Result;
    use std::cell::RefCell;
    use std::time::Duration;

    #[looplet::test]
    async fn test_uncontended_acquire_is_immediate() -> Result<()> {
        let lock = Lock::new();
        assert!(!lock.is_locked());

        let guard = lock.acquire().await;
        assert!(lock.is_locked());

        drop(guard);
        assert!(!lock.is_locked());
        Ok(())
    }

    #[looplet::test]
    async fn test_critical_section_spans_suspension_points() -> Result<()> {
        let lock = Lock::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let event_loop = crate::context::current();

        for id in 0..2u32 {
            let lock = lock.clone();
            let log = Rc::clone(&log);
            event_loop.call_soon(async move {
                let _guard = lock.acquire().await;
                log.borrow_mut().push((id, "enter"));
                // Suspend inside the critical section; the other task must
                // not get in.
                yield_now().await;
                sleep(Duration::from_millis(2)).await;
                log.borrow_mut().push((id, "exit"));
            });
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *log.borrow(),
            [(0, "enter"), (0, "exit"), (1, "enter"), (1, "exit")]
        );
        Ok(())
    }

    #[looplet::test]
    async fn test_waiters_acquire_in_fifo_order() -> Result<()> {
        let lock = Lock::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let event_loop = crate::context::current();

        let guard = lock.acquire().await;

        for id in 0..3u32 {
            let lock = lock.clone();
            let order = Rc::clone(&order);
            event_loop.call_soon(async move {
                let _guard = lock.acquire().await;
                order.borrow_mut().push(id);
            });
        }

        // Let all three queue up behind us, then release.
        sleep(Duration::from_millis(5)).await;
        drop(guard);
        sleep(Duration::from_millis(5)).await;

        assert_eq!(*order.borrow(), [0, 1, 2]);
        assert!(!lock.is_locked());
        Ok(())
    }

    #[looplet::test]
    async fn test_cancelled_waiter_does_not_steal_the_lock() -> Result<()> {
        let lock = Lock::new();
        let event_loop = crate::context::current();

        let guard = lock.acquire().await;

        let doomed = lock.clone();
        let doomed_task = event_loop.call_soon(async move {
            let _guard = doomed.acquire().await;
        });

        let survivor = lock.clone();
        let survivor_task = event_loop.call_soon(async move {
            let _guard = survivor.acquire().await;
            "held"
        });

        sleep(Duration::from_millis(5)).await;
        doomed_task.cancel();
        drop(guard);

        assert_eq!(survivor_task.await.expect("survivor failed"), "held");
        assert!(doomed_task.get_result().unwrap_err().is_cancelled());
        assert!(!lock.is_locked());
        Ok(())
    }
}
