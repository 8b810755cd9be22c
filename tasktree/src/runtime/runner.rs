use crate::error::{Result, TaskError};
use crate::runtime::builder::RunnerConfig;
use crate::runtime::{Context, Host, Wakeup};
use crate::task::state::Flags;
use crate::task::{ChildSet, Id, ParentRef, State, Task, TaskNode, TaskRef, Transition};
use slab::Slab;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Scheduler root.
///
/// The runner owns the memory of every task from creation until the
/// end-of-pass sweep deletes it. Two views are kept over that memory:
/// - the *logical* tree, i.e. each parent's child set, used for cascade abort
///   and error aggregation.
/// - the *physical* registry of started tasks, scanned by index when stepping
///   and when sweeping finished tasks.
///
/// The runner is itself the parent of every top level task, see
/// [`ParentRef::Root`].
pub struct Runner {
    pub(super) cfg: RunnerConfig,

    pub(super) host: Box<dyn Host>,

    pub(super) nodes: Slab<TaskNode>,

    // Started tasks in start order. May hold done tasks until the next sweep.
    pub(super) registry: Vec<TaskRef>,

    // Children of `ParentRef::Root`.
    root: ChildSet,

    // Tasks that finished without ever being started. They are not in the
    // registry but still need to go through the sweep.
    detached: Vec<TaskRef>,

    // Task currently believed to hold the nearest deadline.
    pub(super) next_timeout_task: Option<TaskRef>,

    // Re-entrancy guard of `run_tasks`.
    pub(super) tasks_running: bool,

    // Depth of nested stop/abort cascades. No pass runs while it is non zero.
    abort_depth: usize,

    // A pass was requested during a cascade.
    run_deferred: bool,

    // The host deferred a wake request that nobody consumed yet.
    wake_pending: bool,

    pub(super) shut_down: bool,
}

impl Runner {
    /// Runner with the default configuration.
    pub fn new<H: Host + 'static>(host: H) -> Self {
        Self::with_config(RunnerConfig::default(), Box::new(host))
    }

    pub(crate) fn with_config(cfg: RunnerConfig, host: Box<dyn Host>) -> Self {
        Self {
            nodes: Slab::with_capacity(cfg.registry_capacity),
            registry: Vec::with_capacity(cfg.registry_capacity),
            cfg,
            host,
            root: ChildSet::default(),
            detached: Vec::new(),
            next_timeout_task: None,
            tasks_running: false,
            abort_depth: 0,
            run_deferred: false,
            wake_pending: false,
            shut_down: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn current_time(&self) -> Duration {
        self.host.current_time()
    }

    /// Number of tasks owned by the runner, started or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, t: TaskRef) -> Option<&TaskNode> {
        self.nodes.get(t.key).filter(|node| node.id == t.id)
    }

    pub(crate) fn node_mut(&mut self, t: TaskRef) -> Option<&mut TaskNode> {
        self.nodes.get_mut(t.key).filter(|node| node.id == t.id)
    }

    fn child_set(&self, parent: ParentRef) -> Option<&ChildSet> {
        match parent {
            ParentRef::Root => Some(&self.root),
            ParentRef::Task(t) => self.node(t).map(|node| &node.children),
        }
    }

    fn child_set_mut(&mut self, parent: ParentRef) -> Option<&mut ChildSet> {
        match parent {
            ParentRef::Root => Some(&mut self.root),
            ParentRef::Task(t) => self.node_mut(t).map(|node| &mut node.children),
        }
    }

    /// Runs `f` against the behavior of `t`.
    ///
    /// The boxed task is moved out of its slot for the duration of the call so
    /// the hook can borrow the runner mutably. Returns `None` when the task is
    /// gone or one of its hooks is already running.
    pub(super) fn with_task<R>(
        &mut self,
        t: TaskRef,
        f: impl FnOnce(&mut dyn Task, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let mut task = self.node_mut(t)?.task.take()?;

        let res = f(task.as_mut(), &mut Context::new(self, t));

        // Deletion only happens in the sweep, which never overlaps a hook.
        if let Some(node) = self.node_mut(t) {
            node.task = Some(task);
        }

        Some(res)
    }

    /// Creates a task in the `INIT` state under `parent`.
    ///
    /// The task does nothing until [`Runner::start`] is called on it, but it
    /// is already part of the tree: aborting the parent aborts it too.
    pub fn create<T: Task + 'static>(
        &mut self,
        parent: impl Into<ParentRef>,
        task: T,
    ) -> Result<TaskRef> {
        if self.shut_down {
            return Err(TaskError::ShuttingDown);
        }

        let parent = parent.into();
        if let ParentRef::Task(p) = parent {
            let node = self.node(p).ok_or(TaskError::Stale(p))?;
            if node.is_done() {
                return Err(TaskError::ParentFinished(p));
            }
        }

        let id = Id::next();
        let entry = self.nodes.vacant_entry();
        let t = TaskRef::new(entry.key(), id);
        entry.insert(TaskNode::new(
            id,
            parent,
            Box::new(task),
            self.cfg.default_timeout_seconds,
        ));

        if let Some(children) = self.child_set_mut(parent) {
            children.add_child(t);
        }

        trace!(runner = %self.cfg.name, task = %t, parent = %parent, "task created");
        Ok(t)
    }

    /// Hands `t` to the scheduler and requests a pass.
    ///
    /// A no-op unless the task is still in `INIT` and was never started.
    pub fn start(&mut self, t: TaskRef) -> Result<()> {
        let now = self.current_time();
        let node = self.node_mut(t).ok_or(TaskError::Stale(t))?;

        if node.state != State::INIT || node.is_started() || node.is_done() {
            return Ok(());
        }

        node.flags.insert(Flags::STARTED);
        node.start_time = Some(now);
        self.registry.push(t);

        debug!(runner = %self.cfg.name, task = %t, "task started");

        // The task may carry a deadline already.
        self.update_task_timeout(t, None);
        self.wake_tasks();
        Ok(())
    }

    /// Shorthand for [`Runner::create`] followed by [`Runner::start`].
    pub fn spawn<T: Task + 'static>(
        &mut self,
        parent: impl Into<ParentRef>,
        task: T,
    ) -> Result<TaskRef> {
        let t = self.create(parent, task)?;
        self.start(t)?;
        Ok(t)
    }

    /// Makes a blocked task runnable again and requests a pass.
    pub fn wake(&mut self, t: TaskRef) {
        let Some(node) = self.node_mut(t) else {
            return;
        };

        if node.is_done() {
            return;
        }

        // Never blocked while its own hook runs. Remember the wake so the
        // step does not block on return.
        if node.is_busy() {
            node.flags.insert(Flags::REWAKE);
            return;
        }

        if !node.is_blocked() {
            return;
        }

        node.flags.remove(Flags::BLOCKED);
        self.wake_tasks();
    }

    /// Asks `t` to fail on its next step.
    pub fn error(&mut self, t: TaskRef) {
        let Some(node) = self.node_mut(t) else {
            return;
        };

        if node.has_error() || node.is_done() {
            return;
        }

        node.flags.insert(Flags::ERROR);
        self.wake(t);
    }

    /// Finishes `t` with an error, cascading to its children, then requests a
    /// pass so the task gets swept.
    ///
    /// Called from one of the task's own hooks, the teardown is deferred until
    /// the hook returns.
    pub fn abort(&mut self, t: TaskRef) {
        self.abort_task(t, false);
    }

    fn abort_task(&mut self, t: TaskRef, no_wake: bool) {
        let Some(node) = self.node_mut(t) else {
            return;
        };

        if node.is_done() {
            return;
        }

        node.flags.insert(Flags::ABORTED);

        // The in-flight step finishes the job.
        if node.is_busy() {
            return;
        }

        node.flags.insert(Flags::DONE | Flags::BLOCKED | Flags::ERROR);
        let state = node.state_name();
        debug!(runner = %self.cfg.name, task = %t, state, "task aborted");

        self.stop(t);

        if !no_wake {
            self.wake_tasks();
        }
    }

    /// Teardown of a task that just became done.
    fn stop(&mut self, t: TaskRef) {
        self.abort_depth += 1;

        self.with_task(t, |task, cx| task.on_stop(cx));

        if self.node(t).is_some_and(|node| node.timeout_time.is_some()) {
            self.clear_timeout(t);
        }

        self.abort_children(ParentRef::Task(t));

        if let Some((parent, errored, started)) = self
            .node(t)
            .map(|node| (node.parent, node.has_error(), node.is_started()))
        {
            if let Some(children) = self.child_set_mut(parent) {
                children.on_child_stopped(t, errored);
            }

            debug_assert!(
                !self
                    .child_set(parent)
                    .is_some_and(|children| children.contains(&t)),
                "{} still registered with {} after stop",
                t,
                parent
            );

            if !started {
                self.detached.push(t);
            }
        }

        self.leave_abort_cascade();
    }

    fn leave_abort_cascade(&mut self) {
        self.abort_depth -= 1;

        if self.abort_depth == 0 && self.run_deferred {
            self.run_deferred = false;
            self.wake_tasks();
        }
    }

    /// Aborts every child of `parent` without requesting a pass per child.
    /// Returns how many children were still running.
    fn abort_children(&mut self, parent: ParentRef) -> usize {
        let Some(snapshot) = self.child_set(parent).map(ChildSet::snapshot) else {
            return 0;
        };

        if snapshot.is_empty() {
            return 0;
        }

        self.abort_depth += 1;

        let mut aborted = 0;
        for child in snapshot {
            if self.node(child).is_some_and(|node| !node.is_done()) {
                aborted += 1;
            }
            self.abort_task(child, true);
        }

        self.leave_abort_cascade();
        aborted
    }

    /// Requests a scheduling pass from the host.
    pub(crate) fn wake_tasks(&mut self) {
        if self.shut_down {
            return;
        }

        match self.host.wake_tasks() {
            Wakeup::RunNow => self.run_tasks(),
            Wakeup::Deferred => self.wake_pending = true,
        }
    }

    /// The host deferred a wake request that was not served yet.
    pub fn is_wake_pending(&self) -> bool {
        self.wake_pending
    }

    /// Consumes the pending wake request, if any. A host running in
    /// [`Wakeup::Deferred`] mode calls [`Runner::run_tasks`] when this returns
    /// `true`.
    pub fn take_wake_request(&mut self) -> bool {
        std::mem::take(&mut self.wake_pending)
    }

    /// Steps every runnable task until none can progress, then deletes the
    /// finished ones. Calling it from inside a pass does nothing.
    pub fn run_tasks(&mut self) {
        self.internal_run_tasks(false);
    }

    fn internal_run_tasks(&mut self, in_teardown: bool) {
        if self.tasks_running {
            return;
        }

        if self.abort_depth > 0 {
            self.run_deferred = true;
            return;
        }

        self.tasks_running = true;
        let previous = self.next_task_timeout();

        let mut did_run = true;
        while did_run {
            did_run = false;

            // Stepping can start new tasks, so the registry may grow while we
            // walk it.
            let mut i = 0;
            while i < self.registry.len() {
                let t = self.registry[i];
                while self.node(t).is_some_and(|node| !node.is_blocked()) {
                    self.step(t);
                    did_run = true;
                }
                i += 1;
            }
        }

        // Every task is blocked or done, wake requests made during the pass
        // have been served.
        self.wake_pending = false;

        self.sweep();

        if !in_teardown {
            self.check_for_timeout_change(previous);
        }

        self.tasks_running = false;
    }

    fn step(&mut self, t: TaskRef) {
        debug_assert_eq!(self.abort_depth, 0, "{} stepped during an abort cascade", t);

        let Some(node) = self.node_mut(t) else {
            return;
        };

        if node.is_done() {
            node.flags.insert(Flags::BLOCKED);
            return;
        }

        if node.has_error() {
            node.flags.insert(Flags::DONE | Flags::BLOCKED);
            node.state = State::ERROR;
            debug!(runner = %self.cfg.name, task = %t, "task failed on request");
            self.stop(t);
            return;
        }

        node.flags.insert(Flags::BUSY);
        let transition = self.process(t);

        let Some(node) = self.node_mut(t) else {
            return;
        };
        let rewake = node.rewake_requested();
        node.flags.remove(Flags::BUSY | Flags::REWAKE);

        if node.is_aborted() {
            self.abort_task(t, true);
            return;
        }

        let state = match transition {
            Transition::Blocked => {
                // A wake or a failure requested from inside the hook is
                // applied on the next step, so stay runnable.
                if !rewake && !node.has_error() {
                    node.flags.insert(Flags::BLOCKED);
                }
                return;
            }
            Transition::Goto(state) => state,
        };

        let from = std::mem::replace(&mut node.state, state);
        node.flags.remove(Flags::BLOCKED);
        trace!(
            runner = %self.cfg.name,
            task = %t,
            from = %from,
            to = %state,
            "state transition"
        );

        // Forward progress restarts the timeout window.
        self.reset_timeout(t);

        if state.is_terminal() {
            let Some(node) = self.node_mut(t) else {
                return;
            };

            node.flags.insert(Flags::DONE | Flags::BLOCKED);
            if state == State::ERROR {
                node.flags.insert(Flags::ERROR);
            }

            self.stop(t);
        }
    }

    fn process(&mut self, t: TaskRef) -> Transition {
        let now = self.current_time();
        let Some(node) = self.node(t) else {
            return Transition::Blocked;
        };

        if node.timed_out(now) {
            // Cleared first so the task cannot time out again right away.
            self.clear_timeout(t);

            let next = self
                .with_task(t, |task, cx| task.on_timeout(cx))
                .unwrap_or(Transition::Goto(State::DONE));

            debug!(runner = %self.cfg.name, task = %t, "task timed out");
            self.host.on_task_timed_out(t);
            return next;
        }

        let state = node.state;
        let res = match state {
            State::INIT => return Transition::Goto(State::START),
            State::DONE | State::ERROR => return Transition::Blocked,
            State::START => self.with_task(t, |task, cx| task.process_start(cx)),
            State::RESPONSE => self.with_task(t, |task, cx| task.process_response(cx)),
            _ => self.with_task(t, |task, cx| task.process_state(state, cx)),
        };

        match res {
            Some(Ok(transition)) => transition,
            Some(Err(err)) => {
                warn!(
                    runner = %self.cfg.name,
                    task = %t,
                    state = %state,
                    error = %err,
                    "task hook failed"
                );
                Transition::Goto(State::ERROR)
            }
            None => Transition::Blocked,
        }
    }

    /// Deletes every finished task. Only place where task memory is freed.
    fn sweep(&mut self) {
        let mut recalc = false;
        let mut swept = 0;

        for i in 0..self.registry.len() {
            let t = self.registry[i];
            if !self.node(t).is_some_and(TaskNode::is_done) {
                continue;
            }

            if self.next_timeout_task == Some(t) {
                self.next_timeout_task = None;
                recalc = true;
            }

            self.nodes.remove(t.key);
            swept += 1;
        }

        let nodes = &self.nodes;
        self.registry
            .retain(|t| nodes.get(t.key).is_some_and(|node| node.id == t.id));

        for t in std::mem::take(&mut self.detached) {
            if self.node(t).is_some_and(TaskNode::is_done) {
                self.nodes.remove(t.key);
                swept += 1;
            }
        }

        if recalc {
            self.recalc_next_timeout(None);
        }

        if swept > 0 {
            debug!(
                runner = %self.cfg.name,
                swept,
                remaining = self.nodes.len(),
                "swept finished tasks"
            );
        }
    }

    /// Aborts every task and deletes them all, without notifying the host.
    ///
    /// Idempotent, and also run when the runner is dropped. New tasks are
    /// refused afterwards.
    pub fn shutdown(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            let aborted = self.abort_children(ParentRef::Root);
            debug!(runner = %self.cfg.name, aborted, "runner shutting down");
        }

        self.internal_run_tasks(true);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

// Queries
impl Runner {
    /// The task still exists. Swept tasks are gone for good.
    pub fn contains(&self, t: TaskRef) -> bool {
        self.node(t).is_some()
    }

    pub fn state(&self, t: TaskRef) -> Option<State> {
        self.node(t).map(|node| node.state)
    }

    pub fn state_name(&self, t: TaskRef) -> Option<&'static str> {
        self.node(t).map(TaskNode::state_name)
    }

    /// A swept task counts as done.
    pub fn is_done(&self, t: TaskRef) -> bool {
        self.node(t).is_none_or(TaskNode::is_done)
    }

    pub fn is_blocked(&self, t: TaskRef) -> bool {
        self.node(t).is_some_and(TaskNode::is_blocked)
    }

    pub fn is_aborted(&self, t: TaskRef) -> bool {
        self.node(t).is_some_and(TaskNode::is_aborted)
    }

    pub fn has_error(&self, t: TaskRef) -> bool {
        self.node(t).is_some_and(TaskNode::has_error)
    }

    pub fn is_started(&self, t: TaskRef) -> bool {
        self.node(t).is_some_and(TaskNode::is_started)
    }

    pub fn parent_of(&self, t: TaskRef) -> Option<ParentRef> {
        self.node(t).map(|node| node.parent)
    }

    pub fn start_time(&self, t: TaskRef) -> Option<Duration> {
        self.node(t).and_then(|node| node.start_time)
    }

    pub fn elapsed_time(&self, t: TaskRef) -> Option<Duration> {
        let now = self.current_time();
        self.node(t).and_then(|node| node.elapsed_time(now))
    }
}

// Parent role, for the runner itself or any task.
impl Runner {
    pub fn all_children_done(&self, parent: impl Into<ParentRef>) -> bool {
        self.child_set(parent.into()).is_none_or(|children| {
            children
                .iter()
                .all(|child| self.node(*child).is_none_or(TaskNode::is_done))
        })
    }

    pub fn any_child_error(&self, parent: impl Into<ParentRef>) -> bool {
        self.child_set(parent.into())
            .is_some_and(ChildSet::any_child_error)
    }

    /// Aborts every child of `parent`, then requests a single pass. Returns
    /// how many children were still running.
    pub fn abort_all_children(&mut self, parent: impl Into<ParentRef>) -> usize {
        let aborted = self.abort_children(parent.into());
        if aborted > 0 {
            self.wake_tasks();
        }
        aborted
    }

    /// Children still reporting to `parent`, in creation order.
    pub fn children(&self, parent: impl Into<ParentRef>) -> Vec<TaskRef> {
        self.child_set(parent.into())
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn num_children(&self, parent: impl Into<ParentRef>) -> usize {
        self.child_set(parent.into()).map_or(0, ChildSet::len)
    }

    pub fn is_child_task(&self, parent: impl Into<ParentRef>, child: TaskRef) -> bool {
        self.child_set(parent.into())
            .is_some_and(|children| children.contains(&child))
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.cfg.name)
            .field("tasks", &self.nodes.len())
            .field("registry", &self.registry.len())
            .field("root_children", &self.root.len())
            .field("next_timeout_task", &self.next_timeout_task)
            .field("tasks_running", &self.tasks_running)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
