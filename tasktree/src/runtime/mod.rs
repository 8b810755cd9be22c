// Public API
mod builder;
pub use builder::Builder;

mod context;
pub use context::Context;

mod host;
pub use host::{Host, ManualClock, SystemHost, Wakeup};

mod runner;
pub use runner::Runner;

// Nearest deadline index, more `impl Runner`.
mod timeout;
