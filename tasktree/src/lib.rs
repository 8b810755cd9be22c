//! Single threaded cooperative task scheduler.
//!
//! Units of work are explicit state machines ([`Task`]) arranged in a
//! parent/child tree: stopping a parent aborts all its descendants. A
//! [`Runner`] steps every runnable task until nothing can progress, deletes the
//! finished ones, and tracks the nearest pending timeout so the embedder only
//! needs one timer.
//!
//! ```
//! use tasktree::{Context, ParentRef, Runner, State, SystemHost, Task, Transition};
//!
//! struct Ping;
//!
//! impl Task for Ping {
//!     fn process_start(&mut self, _cx: &mut Context<'_>) -> anyhow::Result<Transition> {
//!         Ok(Transition::Goto(State::RESPONSE))
//!     }
//! }
//!
//! let mut runner = Runner::new(SystemHost::new());
//! let ping = runner.spawn(ParentRef::Root, Ping).unwrap();
//!
//! // The default host runs passes synchronously, the task is already swept.
//! assert!(!runner.contains(ping));
//! assert!(runner.all_children_done(ParentRef::Root));
//! ```

pub mod error;
pub use error::TaskError;

pub mod runtime;
pub use runtime::{Builder, Context, Host, ManualClock, Runner, SystemHost, Wakeup};

pub mod task;
pub use task::{Id, ParentRef, State, Task, TaskRef, Transition};

#[cfg(test)]
mod test_utils;
