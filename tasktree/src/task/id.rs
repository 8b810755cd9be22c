use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task relative to every other task
/// created by this process, across all runners.
///
/// # Notes
///
/// - IDs are handed out in creation order and are strictly increasing.
/// - An ID is never re-used, even after the task it belonged to has been
///   swept and its storage recycled for another task.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Safety: this number is unimaginably large, even if the runner was
        // creating 1 billion task/sec, it would take 584 years to wrap around.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

/// A handle to a task owned by a [`Runner`].
///
/// The handle pairs the arena slot of the task with its unique [`Id`]. The
/// runner only resolves a handle when the slot still holds the task that was
/// created with that `Id`, so a handle to a task that has since been swept
/// goes stale instead of silently pointing at whatever reused the slot.
///
/// Handles order by `Id`, i.e. by creation order.
///
/// [`Runner`]: crate::Runner
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TaskRef {
    pub(crate) key: usize,
    pub(crate) id: Id,
}

impl TaskRef {
    pub(crate) fn new(key: usize, id: Id) -> Self {
        Self { key, id }
    }

    /// The unique id of the task this handle points to.
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn unique_id(&self) -> u64 {
        self.id.as_u64()
    }
}

impl Ord for TaskRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id).then(self.key.cmp(&other.key))
    }
}

impl PartialOrd for TaskRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_task_id_unique_and_increasing() {
        let n = 13;
        let mut all_ids = HashSet::with_capacity(n);
        let mut prev = Id::next();

        for _ in 1..=n {
            let id = Id::next();
            assert!(id > prev);
            assert!(all_ids.insert(id));
            prev = id;
        }

        assert_eq!(all_ids.len(), n);
    }

    #[test]
    fn test_task_ref_orders_by_id() {
        let first = TaskRef::new(7, Id::next());
        let second = TaskRef::new(0, Id::next());

        assert!(first < second);
        assert!(first.unique_id() < second.unique_id());
        assert_eq!(format!("{}", first), format!("task#{}", first.unique_id()));
    }
}
