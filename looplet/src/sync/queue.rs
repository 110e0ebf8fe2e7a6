use crate::context;
use crate::task::WaitHandler;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A FIFO channel between tasks, optionally bounded.
///
/// `push` and `pop` suspend the calling task when the queue is full or empty
/// respectively; [`try_push`] and [`try_pop`] never suspend. Waiters are
/// served in FIFO order, one per event: every successful push wakes one
/// blocked consumer, every successful pop wakes one blocked producer.
///
/// Clones share the same queue.
///
/// ```
/// use looplet::{EventLoop, Queue};
///
/// let event_loop = EventLoop::new();
/// let queue: Queue<i32> = Queue::new();
///
/// let producer = queue.clone();
/// event_loop.call_soon(async move {
///     producer.push(42).await;
/// });
///
/// let consumer = queue.clone();
/// let handle = event_loop.call_soon(async move { consumer.pop().await });
/// assert_eq!(event_loop.run_until_complete(handle).unwrap(), 42);
/// ```
///
/// [`try_push`]: Queue::try_push
/// [`try_pop`]: Queue::try_pop
pub struct Queue<T> {
    core: Rc<RefCell<QueueCore<T>>>,
}

struct QueueCore<T> {
    items: VecDeque<T>,

    /// Maximum number of items; 0 means unbounded.
    capacity: usize,

    /// Consumers blocked in `pop`, in arrival order.
    not_empty: VecDeque<Rc<WaitHandler>>,

    /// Producers blocked in `push`, in arrival order.
    not_full: VecDeque<Rc<WaitHandler>>,
}

impl<T> QueueCore<T> {
    fn has_space(&self) -> bool {
        self.capacity == 0 || self.items.len() < self.capacity
    }

    /// Fire the first waiter that still accepts its wake; consumed and
    /// stale (cancelled) waiters are skipped so an event is never lost on
    /// a waiter that no longer exists.
    fn wake_one(waiters: &mut VecDeque<Rc<WaitHandler>>) -> bool {
        while let Some(handler) = waiters.pop_front() {
            if handler.wake() {
                return true;
            }
        }
        false
    }
}

impl<T> Queue<T> {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::bounded(0)
    }

    /// A queue holding at most `capacity` items; 0 means unbounded.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            core: Rc::new(RefCell::new(QueueCore {
                items: VecDeque::new(),
                capacity,
                not_empty: VecDeque::new(),
                not_full: VecDeque::new(),
            })),
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.core.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.borrow().items.is_empty()
    }

    /// The configured capacity; 0 means unbounded.
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity
    }

    /// Append without suspending. Returns `false` iff the queue is bounded
    /// and full.
    pub fn try_push(&self, value: T) -> bool {
        let mut core = self.core.borrow_mut();
        if !core.has_space() {
            return false;
        }
        core.items.push_back(value);
        QueueCore::<T>::wake_one(&mut core.not_empty);
        true
    }

    /// Remove the head without suspending. Returns `None` iff the queue is
    /// empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut core = self.core.borrow_mut();
        let value = core.items.pop_front()?;
        QueueCore::<T>::wake_one(&mut core.not_full);
        Some(value)
    }

    /// Append `value`, suspending the current task while the queue is full.
    ///
    /// # Panics
    ///
    /// Panics if awaited from outside a task while the queue is full.
    pub fn push(&self, value: T) -> Push<'_, T> {
        Push {
            queue: self,
            value: Some(value),
            handler: None,
        }
    }

    /// Remove and return the head, suspending the current task while the
    /// queue is empty.
    ///
    /// # Panics
    ///
    /// Panics if awaited from outside a task while the queue is empty.
    pub fn pop(&self) -> Pop<'_, T> {
        Pop {
            queue: self,
            handler: None,
        }
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Queue")
            .field("len", &core.items.len())
            .field("capacity", &core.capacity)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`Queue::push`].
pub struct Push<'a, T> {
    queue: &'a Queue<T>,
    value: Option<T>,
    /// Our registration on the not-full list, until the push lands.
    handler: Option<Rc<WaitHandler>>,
}

impl<T> Unpin for Push<'_, T> {}

impl<T> Future for Push<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let task = context::current_task();
        task.deliver_pending_cancel();

        let mut core = this.queue.core.borrow_mut();
        if core.has_space() {
            let value = this.value.take().expect("push future polled after completion");
            core.items.push_back(value);
            QueueCore::<T>::wake_one(&mut core.not_empty);
            this.handler = None;
            Poll::Ready(())
        } else {
            // Full: register for the next freed slot and retry on resume.
            let handler = task.wait_handler();
            core.not_full.push_back(handler.clone());
            this.handler = Some(handler);
            task.incr_wait_count();
            Poll::Pending
        }
    }
}

impl<T> Drop for Push<'_, T> {
    fn drop(&mut self) {
        // Abandoned after a producer wake was delivered to us: pass the freed
        // slot on so it is not silently lost.
        if let Some(handler) = self.handler.take() {
            if handler.is_woken() {
                let mut core = self.queue.core.borrow_mut();
                if core.has_space() {
                    QueueCore::<T>::wake_one(&mut core.not_full);
                }
            }
        }
    }
}

impl<T> fmt::Debug for Push<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push").finish_non_exhaustive()
    }
}

/// Future returned by [`Queue::pop`].
pub struct Pop<'a, T> {
    queue: &'a Queue<T>,
    /// Our registration on the not-empty list, until an item arrives.
    handler: Option<Rc<WaitHandler>>,
}

impl<T> Unpin for Pop<'_, T> {}

impl<T> Future for Pop<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let task = context::current_task();
        task.deliver_pending_cancel();

        let mut core = this.queue.core.borrow_mut();
        if let Some(value) = core.items.pop_front() {
            QueueCore::<T>::wake_one(&mut core.not_full);
            this.handler = None;
            Poll::Ready(value)
        } else {
            // Empty: register for the next pushed item and retry on resume.
            let handler = task.wait_handler();
            core.not_empty.push_back(handler.clone());
            this.handler = Some(handler);
            task.incr_wait_count();
            Poll::Pending
        }
    }
}

impl<T> Drop for Pop<'_, T> {
    fn drop(&mut self) {
        // Abandoned after an item wake was delivered to us: hand the item's
        // arrival on to the next blocked consumer.
        if let Some(handler) = self.handler.take() {
            if handler.is_woken() {
                let mut core = self.queue.core.borrow_mut();
                if !core.items.is_empty() {
                    QueueCore::<T>::wake_one(&mut core.not_empty);
                }
            }
        }
    }
}

impl<T> fmt::Debug for Pop<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop").finish_non_exhaustive()
    }
}
