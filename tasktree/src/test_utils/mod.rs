use std::sync::Once;
use tracing_subscriber::EnvFilter;

// Exports
pub(crate) mod mocks;
pub(crate) use mocks::*;

pub(crate) mod spy;
pub(crate) use spy::{Call, Method, SpyHost};

/// Logs to the test output, filtered with `RUST_LOG`.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
