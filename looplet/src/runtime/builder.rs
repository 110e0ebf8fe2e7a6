use crate::runtime::EventLoop;

/// Initial capacity of the ready queue.
const READY_CAPACITY: usize = 64;

/// Initial capacity of the timer heap.
const TIMER_CAPACITY: usize = 16;

/// Configures and creates an [`EventLoop`].
///
/// ```
/// use looplet::runtime::Builder;
///
/// let event_loop = Builder::new().ready_capacity(128).build();
/// let handle = event_loop.call_soon(async { 2 + 2 });
/// assert_eq!(event_loop.run_until_complete(handle).unwrap(), 4);
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Pre-allocated slots in the ready queue.
    ready_capacity: usize,

    /// Pre-allocated slots in the timer heap.
    timer_capacity: usize,
}

impl Builder {
    /// Returns a new builder with default capacities.
    pub fn new() -> Builder {
        Builder {
            ready_capacity: READY_CAPACITY,
            timer_capacity: TIMER_CAPACITY,
        }
    }

    /// Sets the initial capacity of the ready queue.
    pub fn ready_capacity(mut self, val: usize) -> Self {
        self.ready_capacity = val;
        self
    }

    /// Sets the initial capacity of the timer heap.
    pub fn timer_capacity(mut self, val: usize) -> Self {
        self.timer_capacity = val;
        self
    }

    /// Creates the configured `EventLoop`.
    ///
    /// Building never fails; whether a loop may *run* on this thread is
    /// checked by [`EventLoop::run_until_complete`], which reports
    /// [`RuntimeError::NestedLoop`](crate::runtime::RuntimeError::NestedLoop)
    /// if another loop is already current.
    pub fn build(self) -> EventLoop {
        EventLoop::from_config(self.into())
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder output consumed by the loop.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) ready_capacity: usize,
    pub(crate) timer_capacity: usize,
}

impl From<Builder> for Config {
    fn from(builder: Builder) -> Config {
        Config {
            ready_capacity: builder.ready_capacity,
            timer_capacity: builder.timer_capacity,
        }
    }
}
