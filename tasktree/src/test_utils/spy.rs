use crate::runtime::{Host, ManualClock, Wakeup};
use crate::task::TaskRef;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    WakeTasks,
    TimeoutChange,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    WakeTasks { mode: Wakeup },
    TimeoutChange { next: Option<Duration> },
    TimedOut { task: TaskRef, at: Duration },
}

#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Rc<RefCell<HashMap<Method, Vec<Call>>>>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            calls: Rc::new(RefCell::new(HashMap::from([
                (Method::WakeTasks, Vec::new()),
                (Method::TimeoutChange, Vec::new()),
                (Method::TimedOut, Vec::new()),
            ]))),
        }
    }

    fn record(&self, method: Method, call: Call) {
        self.calls
            .borrow_mut()
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls.borrow().get(method).cloned().unwrap_or_default()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.borrow().get(method).map_or(0, |calls| calls.len())
    }

    pub(crate) fn clear(&self) {
        self.calls.borrow_mut().values_mut().for_each(Vec::clear);
    }
}

/// Host recording every hook call, on a manual clock.
///
/// Clones share the clock, the records and the wakeup mode: hand one to the
/// runner and keep another to drive and inspect it.
#[derive(Debug, Clone)]
pub(crate) struct SpyHost {
    pub(crate) clock: ManualClock,
    pub(crate) tracker: Tracker,
    mode: Rc<Cell<Wakeup>>,
}

impl SpyHost {
    pub(crate) fn new() -> Self {
        Self {
            clock: ManualClock::new(),
            tracker: Tracker::new(),
            mode: Rc::new(Cell::new(Wakeup::RunNow)),
        }
    }

    pub(crate) fn set_mode(&self, mode: Wakeup) {
        self.mode.set(mode);
    }

    pub(crate) fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    /// Tasks that timed out, in notification order.
    pub(crate) fn timed_out(&self) -> Vec<TaskRef> {
        self.tracker
            .get_calls(&Method::TimedOut)
            .into_iter()
            .filter_map(|call| match call {
                Call::TimedOut { task, .. } => Some(task),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn timeout_changes(&self) -> Vec<Option<Duration>> {
        self.tracker
            .get_calls(&Method::TimeoutChange)
            .into_iter()
            .filter_map(|call| match call {
                Call::TimeoutChange { next } => Some(next),
                _ => None,
            })
            .collect()
    }
}

impl Host for SpyHost {
    fn current_time(&self) -> Duration {
        self.clock.now()
    }

    fn wake_tasks(&mut self) -> Wakeup {
        let mode = self.mode.get();
        self.tracker.record(Method::WakeTasks, Call::WakeTasks { mode });
        mode
    }

    fn on_timeout_change(&mut self, next: Option<Duration>) {
        self.tracker
            .record(Method::TimeoutChange, Call::TimeoutChange { next });
    }

    fn on_task_timed_out(&mut self, task: TaskRef) {
        let at = self.clock.now();
        self.tracker
            .record(Method::TimedOut, Call::TimedOut { task, at });
    }
}
