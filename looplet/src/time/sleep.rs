use crate::context;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Suspend the current task for at least `duration`.
///
/// The task's wake token is registered on the loop's timer queue; the loop
/// wakes it at the first scheduler iteration whose clock reading is past the
/// deadline, so the actual sleep is never shorter than `duration` and may be
/// slightly longer under load.
///
/// # Panics
///
/// Panics if awaited from outside a task.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        duration,
        state: SleepState::Init,
    }
}

/// Future returned by [`sleep`].
#[derive(Debug)]
pub struct Sleep {
    duration: Duration,
    state: SleepState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SleepState {
    Init,
    Waiting,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = context::current_task();
        task.deliver_pending_cancel();

        match self.state {
            SleepState::Init => {
                let handler = task.wait_handler();
                let deadline = Instant::now() + self.duration;
                context::current().register_timer(deadline, handler);

                task.incr_wait_count();
                self.state = SleepState::Waiting;
                Poll::Pending
            }
            // The loop only re-polls once the timer fired.
            SleepState::Waiting => Poll::Ready(()),
        }
    }
}
