use crate::runtime::Context;
use crate::task::{State, Task, Transition};
use anyhow::{Result, anyhow};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Waits forever on its first phase.
pub(crate) struct Blocker;

impl Task for Blocker {
    fn process_start(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
        Ok(Transition::Blocked)
    }
}

/// Completes right away through `RESPONSE`.
pub(crate) struct Responder;

impl Task for Responder {
    fn process_start(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
        Ok(Transition::Goto(State::RESPONSE))
    }
}

/// Aborts itself from inside its first phase.
pub(crate) struct SelfAbort;

impl Task for SelfAbort {
    fn process_start(&mut self, cx: &mut Context<'_>) -> Result<Transition> {
        cx.abort();
        Ok(Transition::Goto(State::RESPONSE))
    }
}

/// First phase fails with an error.
pub(crate) struct Failing;

impl Task for Failing {
    fn process_start(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
        Err(anyhow!("connection refused"))
    }
}

/// Runs a closure as its first phase.
pub(crate) struct FnTask<F>(F);

impl<F> FnTask<F> {
    pub(crate) fn new(f: F) -> Self
    where
        F: FnMut(&mut Context<'_>) -> Result<Transition>,
    {
        Self(f)
    }
}

impl<F> Task for FnTask<F>
where
    F: FnMut(&mut Context<'_>) -> Result<Transition>,
{
    fn process_start(&mut self, cx: &mut Context<'_>) -> Result<Transition> {
        (self.0)(cx)
    }
}

/// Blocks forever and counts how many times it was stopped.
pub(crate) struct StopProbe {
    pub(crate) stops: Rc<Cell<usize>>,
}

impl StopProbe {
    pub(crate) fn new() -> (Self, Rc<Cell<usize>>) {
        let stops = Rc::new(Cell::new(0));
        (
            Self {
                stops: stops.clone(),
            },
            stops,
        )
    }
}

impl Task for StopProbe {
    fn process_start(&mut self, _cx: &mut Context<'_>) -> Result<Transition> {
        Ok(Transition::Blocked)
    }

    fn on_stop(&mut self, _cx: &mut Context<'_>) {
        self.stops.set(self.stops.get() + 1);
    }
}

/// Walks through two task specific phases before finishing.
pub(crate) struct Handshake {
    pub(crate) visited: Rc<RefCell<Vec<State>>>,
}

impl Handshake {
    pub(crate) const HELLO: State = State::custom(0);
    pub(crate) const ACK: State = State::custom(1);
}

impl Task for Handshake {
    fn process_start(&mut self, cx: &mut Context<'_>) -> Result<Transition> {
        self.visited.borrow_mut().push(cx.state());
        Ok(Transition::Goto(Self::HELLO))
    }

    fn process_state(&mut self, state: State, _cx: &mut Context<'_>) -> Result<Transition> {
        self.visited.borrow_mut().push(state);
        match state {
            Self::HELLO => Ok(Transition::Goto(Self::ACK)),
            Self::ACK => Ok(Transition::Goto(State::DONE)),
            _ => Ok(Transition::Goto(State::ERROR)),
        }
    }

    fn state_name(&self, state: State) -> &'static str {
        match state {
            Self::HELLO => "HELLO",
            Self::ACK => "ACK",
            _ => state.name(),
        }
    }
}
