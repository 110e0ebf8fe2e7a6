use crate::task::WaitHandler;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Instant;

/// Pending timers, ordered by absolute deadline; equal deadlines fire in
/// insertion order.
#[derive(Debug)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

#[derive(Debug)]
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    handler: Rc<WaitHandler>,
}

impl TimerQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn insert(&mut self, deadline: Instant, handler: Rc<WaitHandler>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            handler,
        });
    }

    /// The earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Remove and return the handler of the next timer with `deadline <= now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<Rc<WaitHandler>> {
        if self.heap.peek()?.deadline > now {
            return None;
        }
        self.heap.pop().map(|entry| entry.handler)
    }
}

// BinaryHeap is a max-heap; invert the ordering to pop the earliest deadline
// first, breaking ties by insertion sequence.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, id::Id};
    use std::rc::Weak;
    use std::time::Duration;

    fn handler() -> Rc<WaitHandler> {
        let task = Task::new(Id::next(), Weak::new());
        task.wait_handler()
    }

    #[test]
    fn test_pop_expired_respects_deadlines() {
        let now = Instant::now();
        let mut timers = TimerQueue::with_capacity(4);

        timers.insert(now + Duration::from_millis(10), handler());
        timers.insert(now, handler());

        assert!(timers.pop_expired(now).is_some());
        // The later timer has not expired yet.
        assert!(timers.pop_expired(now).is_none());
        assert!(!timers.is_empty());
        assert!(
            timers
                .pop_expired(now + Duration::from_millis(10))
                .is_some()
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let now = Instant::now();
        let mut timers = TimerQueue::with_capacity(4);

        let first = handler();
        let second = handler();
        timers.insert(now, first.clone());
        timers.insert(now, second.clone());

        let popped = timers.pop_expired(now).unwrap();
        assert!(Rc::ptr_eq(&popped, &first));
        let popped = timers.pop_expired(now).unwrap();
        assert!(Rc::ptr_eq(&popped, &second));
    }

    #[test]
    fn test_next_deadline_is_earliest() {
        let now = Instant::now();
        let mut timers = TimerQueue::with_capacity(4);
        assert_eq!(timers.next_deadline(), None);

        timers.insert(now + Duration::from_millis(30), handler());
        timers.insert(now + Duration::from_millis(5), handler());

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(5)));
    }
}
