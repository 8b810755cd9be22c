use crate::task::state::Flags;
use crate::task::{ChildSet, Id, ParentRef, State, Task};
use std::fmt;
use std::time::Duration;

/// Storage record of one task inside the runner arena.
///
/// The record holds everything the scheduler needs to drive the task: the
/// current phase, lifecycle flags, timeout bookkeeping and the children that
/// report to it. The task kind itself lives in `task` and is temporarily taken
/// out while one of its hooks runs.
pub(crate) struct TaskNode {
    pub(crate) id: Id,

    // Fixed at creation.
    pub(crate) parent: ParentRef,

    pub(crate) state: State,

    pub(crate) flags: Flags,

    pub(crate) start_time: Option<Duration>,

    // Absolute deadline, `None` when no timeout is armed.
    pub(crate) timeout_time: Option<Duration>,

    // Budget, 0 disables timeouts.
    pub(crate) timeout_seconds: u32,

    pub(crate) children: ChildSet,

    pub(crate) task: Option<Box<dyn Task>>,
}

impl TaskNode {
    pub(crate) fn new(
        id: Id,
        parent: ParentRef,
        task: Box<dyn Task>,
        timeout_seconds: u32,
    ) -> Self {
        Self {
            id,
            parent,
            state: State::INIT,
            flags: Flags::empty(),
            start_time: None,
            timeout_time: None,
            timeout_seconds,
            children: ChildSet::default(),
            task: Some(task),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.flags.contains(Flags::DONE)
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.flags.contains(Flags::BLOCKED)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.flags.contains(Flags::BUSY)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.flags.contains(Flags::ABORTED)
    }

    pub(crate) fn has_error(&self) -> bool {
        self.flags.contains(Flags::ERROR)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.flags.contains(Flags::STARTED)
    }

    pub(crate) fn rewake_requested(&self) -> bool {
        self.flags.contains(Flags::REWAKE)
    }

    pub(crate) fn is_timeout_suspended(&self) -> bool {
        self.flags.contains(Flags::TIMEOUT_SUSPENDED)
    }

    /// Timeouts only run while the task is somewhere between its first step
    /// and its terminal state. An aborted task is done without ever reaching
    /// a terminal state.
    fn timeout_allowed(&self) -> bool {
        self.state != State::INIT && !self.state.is_terminal() && !self.is_done()
    }

    /// Fresh deadline for a window starting at `now`.
    pub(crate) fn compute_deadline(&self, now: Duration) -> Option<Duration> {
        if self.timeout_seconds > 0 && self.timeout_allowed() && !self.is_timeout_suspended() {
            Some(now + Duration::from_secs(u64::from(self.timeout_seconds)))
        } else {
            None
        }
    }

    pub(crate) fn timed_out(&self, now: Duration) -> bool {
        self.timeout_seconds > 0 && self.timeout_time.is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn elapsed_time(&self, now: Duration) -> Option<Duration> {
        self.start_time.map(|start| now.saturating_sub(start))
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match &self.task {
            Some(task) => task.state_name(self.state),
            None => self.state.name(),
        }
    }
}

// Skip the task kind and the children to avoid printing the whole tree.
impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("timeout_time", &self.timeout_time)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("child_count", &self.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Context;
    use crate::task::Transition;
    use anyhow::Result;
    use rstest::rstest;

    struct Idle;

    impl Task for Idle {
        fn process_start(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
            Ok(Transition::Blocked)
        }
    }

    fn node(state: State, timeout_seconds: u32) -> TaskNode {
        let mut node = TaskNode::new(Id::next(), ParentRef::Root, Box::new(Idle), timeout_seconds);
        node.state = state;
        node
    }

    #[rstest]
    #[case::init(State::INIT, 5, None)]
    #[case::start(State::START, 5, Some(15))]
    #[case::response(State::RESPONSE, 1, Some(11))]
    #[case::custom(State::custom(2), 3, Some(13))]
    #[case::done(State::DONE, 5, None)]
    #[case::error(State::ERROR, 5, None)]
    #[case::disabled(State::START, 0, None)]
    fn test_compute_deadline(
        #[case] state: State,
        #[case] timeout_seconds: u32,
        #[case] expected_secs: Option<u64>,
    ) {
        let node = node(state, timeout_seconds);
        let now = Duration::from_secs(10);

        assert_eq!(
            node.compute_deadline(now),
            expected_secs.map(Duration::from_secs)
        );
    }

    #[test]
    fn test_suspended_timeout_has_no_deadline() {
        let mut node = node(State::START, 5);
        node.flags.insert(Flags::TIMEOUT_SUSPENDED);

        assert_eq!(node.compute_deadline(Duration::ZERO), None);
    }

    #[test]
    fn test_done_task_has_no_deadline() {
        let mut node = node(State::START, 5);
        node.flags.insert(Flags::DONE | Flags::ABORTED);

        assert_eq!(node.compute_deadline(Duration::ZERO), None);
    }

    #[test]
    fn test_timed_out_requires_budget_and_deadline() {
        let mut node = node(State::START, 2);
        let now = Duration::from_secs(3);

        assert!(!node.timed_out(now));

        node.timeout_time = Some(Duration::from_secs(3));
        assert!(node.timed_out(now));
        assert!(!node.timed_out(Duration::from_millis(2_999)));

        node.timeout_seconds = 0;
        assert!(!node.timed_out(now));
    }

    #[test]
    fn test_elapsed_time() {
        let mut node = node(State::START, 0);
        assert_eq!(node.elapsed_time(Duration::from_secs(4)), None);

        node.start_time = Some(Duration::from_secs(1));
        assert_eq!(
            node.elapsed_time(Duration::from_secs(4)),
            Some(Duration::from_secs(3))
        );
    }
}
