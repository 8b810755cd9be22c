use crate::task::TaskRef;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

// Used wherever we snapshot a child set on the stack first. Most tasks have a
// handful of children, so we avoid a heap allocation per cascade.
pub(crate) const SPILL_TO_HEAP_THRESHOLD: usize = 16;

pub(crate) type ChildSnapshot = SmallVec<[TaskRef; SPILL_TO_HEAP_THRESHOLD]>;

/// Who a task reports to when it stops.
///
/// Every task has exactly one parent, fixed at creation: either the runner
/// itself or another task.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ParentRef {
    Root,
    Task(TaskRef),
}

impl ParentRef {
    pub fn as_task(&self) -> Option<TaskRef> {
        match self {
            ParentRef::Root => None,
            ParentRef::Task(task) => Some(*task),
        }
    }
}

impl From<TaskRef> for ParentRef {
    fn from(task: TaskRef) -> Self {
        ParentRef::Task(task)
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentRef::Root => f.write_str("root"),
            ParentRef::Task(task) => task.fmt(f),
        }
    }
}

/// Logical membership of the children of a parent.
///
/// The set only tracks *which* tasks still report to the parent, for cascade
/// abort and aggregation. It never owns the task memory, that belongs to the
/// runner arena.
#[derive(Debug, Default)]
pub(crate) struct ChildSet {
    children: BTreeSet<TaskRef>,
    any_child_error: bool,
}

impl ChildSet {
    pub(crate) fn add_child(&mut self, child: TaskRef) {
        let inserted = self.children.insert(child);
        debug_assert!(inserted, "Child {} registered twice.", child);
    }

    /// Forget a child that stopped, remembering whether it ended in error.
    pub(crate) fn on_child_stopped(&mut self, child: TaskRef, errored: bool) -> bool {
        if errored {
            self.any_child_error = true;
        }

        self.children.remove(&child)
    }

    /// Copy of the current children. Aborting a child removes it from the live
    /// set, so cascades must walk a snapshot.
    pub(crate) fn snapshot(&self) -> ChildSnapshot {
        self.children.iter().copied().collect()
    }

    pub(crate) fn contains(&self, child: &TaskRef) -> bool {
        self.children.contains(child)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &TaskRef> {
        self.children.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn any_child_error(&self) -> bool {
        self.any_child_error
    }
}
