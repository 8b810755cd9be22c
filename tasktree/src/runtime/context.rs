use crate::error::Result;
use crate::runtime::Runner;
use crate::task::{ParentRef, State, Task, TaskRef};
use std::time::Duration;

/// Handle given to a [`Task`] hook while it runs.
///
/// It borrows the whole runner, so a hook can act on itself, its children or
/// any other task. The task currently running is [`Context::task`].
pub struct Context<'a> {
    runner: &'a mut Runner,
    this: TaskRef,
}

impl<'a> Context<'a> {
    pub(crate) fn new(runner: &'a mut Runner, this: TaskRef) -> Self {
        Self { runner, this }
    }

    /// The task whose hook is running.
    pub fn task(&self) -> TaskRef {
        self.this
    }

    pub fn state(&self) -> State {
        self.runner.state(self.this).unwrap_or(State::DONE)
    }

    /// Escape hatch to every runner operation.
    pub fn runner(&mut self) -> &mut Runner {
        self.runner
    }

    pub fn create_child<T: Task + 'static>(&mut self, task: T) -> Result<TaskRef> {
        self.runner.create(ParentRef::Task(self.this), task)
    }

    pub fn spawn_child<T: Task + 'static>(&mut self, task: T) -> Result<TaskRef> {
        self.runner.spawn(ParentRef::Task(self.this), task)
    }

    /// Step the current task again even if the hook returns
    /// [`Transition::Blocked`], e.g. after scheduling work that completed
    /// synchronously. No effect from `on_stop`, the task is already done.
    ///
    /// [`Transition::Blocked`]: crate::Transition::Blocked
    pub fn wake(&mut self) {
        self.runner.wake(self.this);
    }

    /// Fail the current task on its next step.
    pub fn error(&mut self) {
        self.runner.error(self.this);
    }

    /// Abort the current task. The teardown happens once the hook returns,
    /// whatever the hook decides.
    pub fn abort(&mut self) {
        self.runner.abort(self.this);
    }

    pub fn set_timeout_seconds(&mut self, seconds: u32) -> Result<()> {
        self.runner.set_timeout_seconds(self.this, seconds)
    }

    pub fn suspend_timeout(&mut self) -> Result<()> {
        self.runner.suspend_timeout(self.this)
    }

    pub fn resume_timeout(&mut self) -> Result<()> {
        self.runner.resume_timeout(self.this)
    }

    pub fn timed_out(&self) -> bool {
        self.runner.timed_out(self.this)
    }

    pub fn elapsed_time(&self) -> Option<Duration> {
        self.runner.elapsed_time(self.this)
    }

    pub fn current_time(&self) -> Duration {
        self.runner.current_time()
    }

    pub fn all_children_done(&self) -> bool {
        self.runner.all_children_done(self.this)
    }

    pub fn any_child_error(&self) -> bool {
        self.runner.any_child_error(self.this)
    }
}
