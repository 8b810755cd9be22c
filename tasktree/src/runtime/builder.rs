use crate::error::{Result, TaskError};
use crate::runtime::{Host, Runner};

/// Initial capacity of the task arena and registry.
const REGISTRY_CAPACITY: usize = 64;

/// Timeouts are disabled unless a task asks for one.
const DEFAULT_TIMEOUT_SECONDS: u32 = 0;

const DEFAULT_NAME: &str = "tasktree";

/// Configures and builds a [`Runner`].
///
/// ```
/// use tasktree::runtime::{Builder, SystemHost};
///
/// let runner = Builder::new()
///     .name("signaling")
///     .default_timeout_seconds(30)
///     .try_build(SystemHost::new())
///     .unwrap();
/// assert!(runner.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    /// Label used in log events.
    name: String,

    /// How many tasks we expect to be alive at the same time. The arena and
    /// the registry grow past it on demand.
    registry_capacity: usize,

    /// Budget given to every new task. Tasks can still change it with
    /// `set_timeout_seconds`.
    default_timeout_seconds: u32,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            registry_capacity: REGISTRY_CAPACITY,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn name(mut self, val: impl Into<String>) -> Self {
        self.name = val.into();
        self
    }

    #[track_caller]
    pub fn registry_capacity(mut self, val: usize) -> Self {
        assert!(val > 0, "registry_capacity must be greater than 0");
        self.registry_capacity = val;
        self
    }

    pub fn default_timeout_seconds(mut self, val: u32) -> Self {
        self.default_timeout_seconds = val;
        self
    }

    /// Creates the configured `Runner`, driven by `host`.
    pub fn try_build<H: Host + 'static>(self, host: H) -> Result<Runner> {
        let cfg = RunnerConfig::try_from(self)?;
        Ok(Runner::with_config(cfg, Box::new(host)))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunnerConfig {
    pub(crate) name: String,
    pub(crate) registry_capacity: usize,
    pub(crate) default_timeout_seconds: u32,
}

impl RunnerConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TaskError::InvalidConfig(
                "runner name cannot be empty".to_owned(),
            ));
        }

        if self.registry_capacity == 0 {
            return Err(TaskError::InvalidConfig(
                "registry_capacity must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            name: DEFAULT_NAME.to_owned(),
            registry_capacity: REGISTRY_CAPACITY,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl TryFrom<Builder> for RunnerConfig {
    type Error = TaskError;

    fn try_from(builder: Builder) -> Result<Self> {
        let cfg = RunnerConfig {
            name: builder.name,
            registry_capacity: builder.registry_capacity,
            default_timeout_seconds: builder.default_timeout_seconds,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualClock;
    use static_assertions::assert_impl_all;

    assert_impl_all!(RunnerConfig: Send, Sync, Clone);
    assert_impl_all!(Builder: Send, Sync, Clone, Default);

    #[test]
    fn test_builder_defaults_match_config_defaults() -> anyhow::Result<()> {
        let cfg = RunnerConfig::try_from(Builder::new())?;
        assert_eq!(cfg, RunnerConfig::default());
        Ok(())
    }

    #[test]
    fn test_builder_overrides() -> anyhow::Result<()> {
        let cfg = RunnerConfig::try_from(
            Builder::new()
                .name("media")
                .registry_capacity(8)
                .default_timeout_seconds(12),
        )?;

        assert_eq!(cfg.name, "media");
        assert_eq!(cfg.registry_capacity, 8);
        assert_eq!(cfg.default_timeout_seconds, 12);
        Ok(())
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let res = Builder::new().name("  ").try_build(ManualClock::new());
        assert!(matches!(res, Err(TaskError::InvalidConfig(_))));
    }

    #[test]
    #[should_panic(expected = "registry_capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = Builder::new().registry_capacity(0);
    }
}
