//! Nearest deadline index.
//!
//! The runner tracks a single task believed to hold the soonest deadline,
//! maintained incrementally on every deadline change. The linear scan in
//! [`Runner::recalc_next_timeout`] is only the fallback when the tracked task
//! loses its deadline or pushes it back.

use crate::error::{Result, TaskError};
use crate::runtime::Runner;
use crate::task::state::Flags;
use crate::task::TaskRef;
use std::time::Duration;
use tracing::debug;

impl Runner {
    /// Deadline of the tracked nearest task.
    pub fn next_task_timeout(&self) -> Option<Duration> {
        self.next_timeout_task
            .and_then(|t| self.node(t))
            .and_then(|node| node.timeout_time)
    }

    pub fn next_timeout_task(&self) -> Option<TaskRef> {
        self.next_timeout_task
    }

    pub fn has_pending_timeout_task(&self) -> bool {
        self.next_task_timeout().is_some()
    }

    pub fn timed_out(&self, t: TaskRef) -> bool {
        let now = self.current_time();
        self.node(t).is_some_and(|node| node.timed_out(now))
    }

    pub fn timeout_time(&self, t: TaskRef) -> Option<Duration> {
        self.node(t).and_then(|node| node.timeout_time)
    }

    pub fn timeout_seconds(&self, t: TaskRef) -> Option<u32> {
        self.node(t).map(|node| node.timeout_seconds)
    }

    /// Changes the budget of `t` and restarts its timeout window. A budget of
    /// 0 disables timeouts.
    pub fn set_timeout_seconds(&mut self, t: TaskRef, seconds: u32) -> Result<()> {
        self.node_mut(t).ok_or(TaskError::Stale(t))?.timeout_seconds = seconds;
        self.reset_timeout(t);
        Ok(())
    }

    /// Stops the timeout of `t` from counting, e.g. while it only waits on its
    /// own children.
    pub fn suspend_timeout(&mut self, t: TaskRef) -> Result<()> {
        self.toggle_timeout_suspended(t, true)
    }

    /// Restarts a full timeout window after [`Runner::suspend_timeout`].
    pub fn resume_timeout(&mut self, t: TaskRef) -> Result<()> {
        self.toggle_timeout_suspended(t, false)
    }

    fn toggle_timeout_suspended(&mut self, t: TaskRef, suspend: bool) -> Result<()> {
        let node = self.node_mut(t).ok_or(TaskError::Stale(t))?;
        if node.is_timeout_suspended() == suspend {
            return Ok(());
        }

        node.flags.set(Flags::TIMEOUT_SUSPENDED, suspend);
        self.reset_timeout(t);
        Ok(())
    }

    /// Wakes the tasks whose deadline passed, nearest first.
    ///
    /// Meant to be called by the host when the timer programmed through
    /// [`Host::on_timeout_change`] fires, or periodically.
    ///
    /// [`Host::on_timeout_change`]: crate::Host::on_timeout_change
    pub fn poll_tasks(&mut self) {
        let mut last_woken = None;

        // Waking a task may move the tracked task to another expired one. The
        // same task is never woken twice, it may still be waiting for a
        // deferred pass.
        while let Some(t) = self.next_timeout_task {
            if last_woken == Some(t) || !self.timed_out(t) {
                break;
            }

            last_woken = Some(t);
            self.wake(t);
            self.wake_tasks();
        }
    }

    pub(super) fn reset_timeout(&mut self, t: TaskRef) {
        let now = self.current_time();
        let Some(node) = self.node_mut(t) else {
            return;
        };

        let previous = node.timeout_time;
        node.timeout_time = node.compute_deadline(now);
        self.update_task_timeout(t, previous);
    }

    pub(super) fn clear_timeout(&mut self, t: TaskRef) {
        let Some(node) = self.node_mut(t) else {
            return;
        };

        let previous = node.timeout_time.take();
        self.update_task_timeout(t, previous);
    }

    /// Records that the deadline of `t` changed from `previous`.
    pub(super) fn update_task_timeout(&mut self, t: TaskRef, previous: Option<Duration>) {
        let tracked = self.next_timeout_task == Some(t);

        // When `t` is the tracked task its deadline already changed, so the
        // previous nearest deadline is its old one.
        let previous_next = if tracked {
            previous
        } else {
            self.next_task_timeout()
        };

        match self.timeout_time(t) {
            Some(deadline) if tracked => {
                // Pushed back, another task may now be sooner.
                if previous.is_none_or(|p| deadline > p) {
                    self.recalc_next_timeout(None);
                }
            }
            Some(deadline) => {
                if self.next_task_timeout().is_none_or(|next| deadline <= next) {
                    self.next_timeout_task = Some(t);
                }
            }
            None if tracked => self.recalc_next_timeout(Some(t)),
            None => {}
        }

        // The run loop reports once, at the end of the pass.
        if !self.tasks_running {
            self.check_for_timeout_change(previous_next);
        }
    }

    /// Full scan for the soonest deadline among live tasks. On equal
    /// deadlines the first task in registry order wins.
    pub(super) fn recalc_next_timeout(&mut self, exclude: Option<TaskRef>) {
        let mut nearest: Option<(TaskRef, Duration)> = None;

        for &t in &self.registry {
            if exclude == Some(t) {
                continue;
            }

            let Some(node) = self.node(t) else {
                continue;
            };

            if node.is_done() {
                continue;
            }

            if let Some(deadline) = node.timeout_time
                && nearest.is_none_or(|(_, best)| deadline < best)
            {
                nearest = Some((t, deadline));
            }
        }

        self.next_timeout_task = nearest.map(|(t, _)| t);
    }

    /// Tells the host about a new nearest deadline. Extra notifications are
    /// fine, missing one is not.
    pub(super) fn check_for_timeout_change(&mut self, previous: Option<Duration>) {
        if self.shut_down {
            return;
        }

        let next = self.next_task_timeout();
        let now = self.current_time();

        let changed = match (previous, next) {
            (None, None) => false,
            (None, Some(_)) | (Some(_), None) => true,
            (Some(prev), Some(next)) => next < prev || (prev <= now && prev != next),
        };

        if changed {
            debug!(
                runner = %self.cfg.name,
                ?previous,
                ?next,
                "nearest timeout changed"
            );
            self.host.on_timeout_change(next);
        }
    }
}
