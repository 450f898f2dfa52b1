//! # Start-task set with identity membership.
//!
//! Start tasks install per-worker state (registrations, caches, thread-local
//! setup) and are delivered once to every newly spawned worker before it
//! accepts user tasks. Membership is keyed by object identity (the `Arc`
//! data pointer), so adding the same handle twice is a no-op and removing it
//! once clears it.

use std::sync::Arc;

use super::task::TaskRef;

/// Identity-keyed set of start tasks.
///
/// Kept as a small vector: start-task sets are a handful of entries and the
/// whole set is snapshotted on every worker spawn anyway.
pub(crate) struct StartTaskSet {
    tasks: Vec<TaskRef>,
}

impl StartTaskSet {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Adds a task; returns `false` if the same object was already present.
    pub fn add(&mut self, task: TaskRef) -> bool {
        if self.tasks.iter().any(|t| same_task(t, &task)) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Removes a task by identity; returns `false` if it was not present.
    pub fn remove(&mut self, task: &TaskRef) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| !same_task(t, task));
        self.tasks.len() != before
    }

    /// Snapshot for a worker spawn. Delivery order is the insertion order,
    /// but callers must not rely on it.
    pub fn snapshot(&self) -> Vec<TaskRef> {
        self.tasks.clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Identity comparison on the data pointer only; comparing fat pointers
/// would also compare vtable addresses, which are not stable across
/// codegen units.
fn same_task(a: &TaskRef, b: &TaskRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskFn;

    #[test]
    fn double_add_is_a_noop() {
        let mut set = StartTaskSet::new();
        let task: TaskRef = TaskFn::arc(|r| {
            r.resolve(serde_json::Value::Null);
        });

        assert!(set.add(task.clone()));
        assert!(!set.add(task.clone()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.snapshot().len(), 1);
    }

    #[test]
    fn distinct_objects_are_distinct_members() {
        let mut set = StartTaskSet::new();
        let a: TaskRef = TaskFn::arc(|r| {
            r.resolve(serde_json::Value::Null);
        });
        let b: TaskRef = TaskFn::arc(|r| {
            r.resolve(serde_json::Value::Null);
        });

        assert!(set.add(a));
        assert!(set.add(b));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut set = StartTaskSet::new();
        let task: TaskRef = TaskFn::arc(|r| {
            r.resolve(serde_json::Value::Null);
        });

        set.add(task.clone());
        assert!(set.remove(&task));
        assert!(!set.remove(&task));
        assert_eq!(set.len(), 0);
    }
}
