use crate::task::TaskRef;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// How the host wants to react to a scheduling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wakeup {
    /// Run a scheduling pass right away, on the current call stack.
    #[default]
    RunNow,

    /// Only remember the request. The host event loop later consumes it with
    /// [`Runner::take_wake_request`] and calls [`Runner::run_tasks`].
    ///
    /// [`Runner::take_wake_request`]: crate::Runner::take_wake_request
    /// [`Runner::run_tasks`]: crate::Runner::run_tasks
    Deferred,
}

/// Hooks supplied by the embedder of a [`Runner`](crate::Runner).
pub trait Host {
    /// Monotonic clock used for start times and every timeout computation.
    /// The epoch is arbitrary but must never move.
    fn current_time(&self) -> Duration;

    /// Some task became runnable.
    fn wake_tasks(&mut self) -> Wakeup {
        Wakeup::RunNow
    }

    /// The nearest pending deadline moved. Lets the host reprogram an
    /// external timer to call [`Runner::poll_tasks`](crate::Runner::poll_tasks)
    /// at `next`. May fire spuriously.
    fn on_timeout_change(&mut self, _next: Option<Duration>) {}

    /// `task` ran out of time. Fires once per timeout occurrence.
    fn on_task_timed_out(&mut self, _task: TaskRef) {}
}

/// Host backed by the system monotonic clock, running passes synchronously.
#[derive(Debug, Clone, Copy)]
pub struct SystemHost {
    epoch: Instant,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn current_time(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to the runner and
/// advance another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.0.get()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }

    #[track_caller]
    pub fn set(&self, now: Duration) {
        assert!(now >= self.0.get(), "ManualClock must be monotonic");
        self.0.set(now);
    }
}

impl Host for ManualClock {
    fn current_time(&self) -> Duration {
        self.now()
    }
}
