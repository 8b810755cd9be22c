use crate::runtime::Context;
use anyhow::Result;

// Public API
pub mod id;
pub use self::id::{Id, TaskRef};

pub mod parent;
pub use self::parent::ParentRef;
pub(crate) use self::parent::ChildSet;

pub mod state;
pub use self::state::{State, Transition};

pub(crate) mod node;
pub(crate) use self::node::TaskNode;

/// A unit of work driven by the [`Runner`] as an explicit state machine.
///
/// The runner owns the bookkeeping (state, timeouts, children, lifecycle
/// flags). A task kind only decides what happens in each phase. Hooks receive
/// a [`Context`] to act on the runner: spawn children, wake or abort tasks,
/// adjust their own timeout, and so on.
///
/// Returning [`Transition::Blocked`] suspends the task until something calls
/// `wake()` on it, or until its timeout fires. Returning an `Err` fails the
/// task, exactly as if it moved to [`State::ERROR`].
///
/// [`Runner`]: crate::Runner
pub trait Task {
    /// First real phase of the task.
    fn process_start(&mut self, cx: &mut Context<'_>) -> Result<Transition>;

    /// Phase entered through [`State::RESPONSE`]. Finishes by default.
    fn process_response(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
        Ok(Transition::Goto(State::DONE))
    }

    /// Task-specific phases, numbered from [`State::NEXT`]. A task that lands
    /// in a phase it does not handle fails.
    fn process_state(&mut self, _state: State, _cx: &mut Context<'_>) -> Result<Transition> {
        Ok(Transition::Goto(State::ERROR))
    }

    /// The timeout budget ran out. By default the task is simply finished.
    fn on_timeout(&mut self, _cx: &mut Context<'_>) -> Transition {
        Transition::Goto(State::DONE)
    }

    /// Custom teardown, runs once when the task stops for any reason. The
    /// runner aborts the children and detaches the task from its parent
    /// right after this returns.
    fn on_stop(&mut self, _cx: &mut Context<'_>) {}

    /// Debug label for a state of this task kind.
    fn state_name(&self, state: State) -> &'static str {
        state.name()
    }
}
