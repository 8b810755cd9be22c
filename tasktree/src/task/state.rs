use bitflags::bitflags;
use std::fmt;

/// The phase a task is in.
///
/// The built-in phases cover the generic lifecycle. Task kinds that need more
/// phases number them from [`State::NEXT`] upwards with [`State::custom`] and
/// handle them in [`Task::process_state`].
///
/// [`Task::process_state`]: crate::Task::process_state
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct State(u32);

impl State {
    /// Created but not stepped yet.
    pub const INIT: State = State(0);

    /// First real phase, handled by [`Task::process_start`](crate::Task::process_start).
    pub const START: State = State(1);

    /// Finished successfully. Terminal.
    pub const DONE: State = State(2);

    /// Finished with an error. Terminal.
    pub const ERROR: State = State(3);

    /// Handled by [`Task::process_response`](crate::Task::process_response).
    pub const RESPONSE: State = State(4);

    /// First state number available to task kinds.
    pub const NEXT: State = State(5);

    /// Task-specific phase `NEXT + offset`.
    pub const fn custom(offset: u32) -> State {
        State(Self::NEXT.0 + offset)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_terminal(self) -> bool {
        self == State::DONE || self == State::ERROR
    }

    /// Debug label of the built-in states, `"??"` for anything else.
    pub fn name(self) -> &'static str {
        match self {
            State::INIT => "INIT",
            State::START => "START",
            State::DONE => "DONE",
            State::ERROR => "ERROR",
            State::RESPONSE => "RESPONSE",
            _ => "??",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            "??" => write!(f, "NEXT+{}", self.0 - Self::NEXT.0),
            name => f.write_str(name),
        }
    }
}

/// What a processing step decided.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Transition {
    /// Cannot make progress until woken. The state is left unchanged and the
    /// timeout keeps counting down.
    Blocked,

    /// Move to the given state. Any move restarts the timeout window.
    Goto(State),
}

impl Transition {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Transition::Blocked)
    }
}

impl From<State> for Transition {
    fn from(state: State) -> Self {
        Transition::Goto(state)
    }
}

bitflags! {
    /// Lifecycle flags of a task node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct Flags: u8 {
        /// Nothing to do until woken.
        const BLOCKED = 1;

        /// Finished, waiting for the end-of-pass sweep.
        const DONE = 1 << 1;

        /// `abort()` was requested.
        const ABORTED = 1 << 2;

        /// Inside its own processing hook.
        const BUSY = 1 << 3;

        /// Failed, or asked to fail on the next step.
        const ERROR = 1 << 4;

        /// Timeout accounting paused.
        const TIMEOUT_SUSPENDED = 1 << 5;

        /// Handed to the runner registry.
        const STARTED = 1 << 6;

        /// Woken from inside its own hook, step again instead of blocking.
        const REWAKE = 1 << 7;
    }
}
