//! Ordered pending set.
//!
//! Pending tasks are ordered by `(bucket, priority, coordinate)`, lowest
//! first. The bucket is fixed by [`TaskKind`]; the priority is the distance
//! from the current focus and changes as the focus moves. The coordinate
//! tie-break keeps equal-priority tasks in a deterministic order.
//!
//! A `BTreeMap` keyed on the ordering gives O(log n) pop, removal and
//! reinsertion; a side index maps each [`TaskKey`] to its current ordering
//! key so individual tasks can be found without a scan.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::coord::ChunkCoord;

use super::task::{TaskKey, TaskKind};

/// Position of a pending task in the dispatch order.
#[derive(Clone, Copy, Debug)]
pub struct QueueKey {
    bucket: u8,
    priority: f32,
    coord: ChunkCoord,
    kind: TaskKind,
}

impl QueueKey {
    fn new(key: TaskKey, priority: f32) -> Self {
        Self {
            bucket: key.kind.bucket(),
            priority,
            coord: key.coord,
            kind: key.kind,
        }
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bucket
            .cmp(&other.bucket)
            .then_with(|| self.priority.total_cmp(&other.priority))
            .then_with(|| self.coord.cmp(&other.coord))
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

/// Pending tasks in dispatch order.
///
/// Holds at most one value per [`TaskKey`].
#[derive(Debug)]
pub struct PendingQueue<V> {
    order: BTreeMap<QueueKey, (TaskKey, V)>,
    index: HashMap<TaskKey, QueueKey>,
}

impl<V> Default for PendingQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PendingQueue<V> {
    pub fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &TaskKey) -> bool {
        self.index.contains_key(key)
    }

    /// Current priority of a pending task.
    #[cfg(test)]
    pub fn priority_of(&self, key: &TaskKey) -> Option<f32> {
        self.index.get(key).map(QueueKey::priority)
    }

    /// Inserts a task, replacing (and returning) any value already queued
    /// under the same key.
    pub fn push(&mut self, key: TaskKey, priority: f32, value: V) -> Option<V> {
        let replaced = self.remove(&key);
        let queue_key = QueueKey::new(key, priority);
        self.index.insert(key, queue_key);
        self.order.insert(queue_key, (key, value));
        replaced
    }

    /// Removes and returns the first task in dispatch order.
    pub fn pop(&mut self) -> Option<(TaskKey, V)> {
        let (_, (key, value)) = self.order.pop_first()?;
        self.index.remove(&key);
        Some((key, value))
    }

    /// Key of the first task in dispatch order.
    #[cfg(test)]
    pub fn peek(&self) -> Option<TaskKey> {
        self.order.first_key_value().map(|(_, (key, _))| *key)
    }

    /// Removes the task queued under `key`.
    pub fn remove(&mut self, key: &TaskKey) -> Option<V> {
        let queue_key = self.index.remove(key)?;
        self.order.remove(&queue_key).map(|(_, value)| value)
    }

    /// Removes the task queued under `key` only if `matches` accepts it.
    pub fn remove_if(&mut self, key: &TaskKey, matches: impl FnOnce(&V) -> bool) -> Option<V> {
        let queue_key = *self.index.get(key)?;
        let accepted = self
            .order
            .get(&queue_key)
            .map(|(_, value)| matches(value))
            .unwrap_or(false);
        if accepted {
            self.remove(key)
        } else {
            None
        }
    }

    /// Recomputes priorities and reinserts every task whose priority moved
    /// by more than `threshold`. Returns the number of tasks moved.
    pub fn reprioritize(
        &mut self,
        mut priority: impl FnMut(&TaskKey, &V) -> f32,
        threshold: f32,
    ) -> usize {
        let moved: Vec<(QueueKey, f32)> = self
            .order
            .iter()
            .filter_map(|(queue_key, (key, value))| {
                let updated = priority(key, value);
                ((updated - queue_key.priority()).abs() > threshold).then_some((*queue_key, updated))
            })
            .collect();

        for (queue_key, updated) in &moved {
            if let Some((key, value)) = self.order.remove(queue_key) {
                let requeued = QueueKey::new(key, *updated);
                self.index.insert(key, requeued);
                self.order.insert(requeued, (key, value));
            }
        }

        moved.len()
    }

    /// Number of pending tasks of each kind, indexed by bucket.
    pub fn kind_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for queue_key in self.order.keys() {
            counts[queue_key.bucket as usize] += 1;
        }
        counts
    }

    /// Removes every task.
    #[cfg(test)]
    pub fn drain(&mut self) -> Vec<(TaskKey, V)> {
        self.index.clear();
        std::mem::take(&mut self.order).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(kind: TaskKind, x: i32, y: i32) -> TaskKey {
        TaskKey::new(kind, ChunkCoord::new(x, y))
    }

    #[test]
    fn test_bucket_beats_priority() {
        let mut queue = PendingQueue::new();
        queue.push(key(TaskKind::Build, 0, 0), 0.0, "build");
        queue.push(key(TaskKind::Load, 5, 5), 7.0, "load");
        queue.push(key(TaskKind::Unload, 9, 9), 12.0, "unload");
        queue.push(key(TaskKind::Generate, 3, 3), 4.0, "generate");

        let order: Vec<&str> = std::iter::from_fn(|| queue.pop().map(|(_, v)| v)).collect();
        assert_eq!(order, vec!["unload", "generate", "load", "build"]);
    }

    #[test]
    fn test_priority_within_bucket() {
        let mut queue = PendingQueue::new();
        queue.push(key(TaskKind::Load, 3, 0), 3.0, 3);
        queue.push(key(TaskKind::Load, 1, 0), 1.0, 1);
        queue.push(key(TaskKind::Load, 2, 0), 2.0, 2);

        assert_eq!(queue.pop().map(|(_, v)| v), Some(1));
        assert_eq!(queue.pop().map(|(_, v)| v), Some(2));
        assert_eq!(queue.pop().map(|(_, v)| v), Some(3));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_equal_priority_uses_coordinate() {
        let mut queue = PendingQueue::new();
        queue.push(key(TaskKind::Load, 1, 0), 1.0, "east");
        queue.push(key(TaskKind::Load, -1, 0), 1.0, "west");
        assert_eq!(queue.pop().map(|(_, v)| v), Some("west"));
    }

    #[test]
    fn test_push_replaces_same_key() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(key(TaskKind::Load, 0, 0), 5.0, "old").is_none());
        assert_eq!(queue.push(key(TaskKind::Load, 0, 0), 1.0, "new"), Some("old"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.priority_of(&key(TaskKind::Load, 0, 0)), Some(1.0));
    }

    #[test]
    fn test_remove_and_remove_if() {
        let mut queue = PendingQueue::new();
        let a = key(TaskKind::Load, 0, 0);
        let b = key(TaskKind::Load, 1, 0);
        queue.push(a, 0.0, 10);
        queue.push(b, 1.0, 20);

        assert_eq!(queue.remove_if(&a, |v| *v == 11), None);
        assert!(queue.contains(&a));
        assert_eq!(queue.remove_if(&a, |v| *v == 10), Some(10));
        assert_eq!(queue.remove(&b), Some(20));
        assert!(queue.is_empty());
        assert_eq!(queue.remove(&b), None);
    }

    #[test]
    fn test_reprioritize_respects_threshold() {
        let mut queue = PendingQueue::new();
        let near = key(TaskKind::Load, 0, 0);
        let far = key(TaskKind::Load, 10, 0);
        queue.push(near, 0.0, ());
        queue.push(far, 10.0, ());

        // Focus moves to (10, 0): both priorities change by 10.
        let focus = ChunkCoord::new(10, 0);
        let moved = queue.reprioritize(|k, _| k.coord.distance(focus), 0.5);
        assert_eq!(moved, 2);
        assert_eq!(queue.peek(), Some(far));

        // A tiny wobble below the threshold moves nothing.
        let moved = queue.reprioritize(|k, _| k.coord.distance(focus) + 0.1, 0.5);
        assert_eq!(moved, 0);
        assert_eq!(queue.priority_of(&far), Some(0.0));
    }

    #[test]
    fn test_kind_counts_and_drain() {
        let mut queue = PendingQueue::new();
        queue.push(key(TaskKind::Load, 0, 0), 0.0, ());
        queue.push(key(TaskKind::Load, 1, 0), 0.0, ());
        queue.push(key(TaskKind::Unload, 0, 0), 0.0, ());

        assert_eq!(queue.kind_counts(), [1, 0, 2, 0]);

        assert_eq!(queue.drain().len(), 3);
        assert!(queue.is_empty());
        assert!(!queue.contains(&key(TaskKind::Load, 0, 0)));
    }

    fn arb_kind() -> impl Strategy<Value = TaskKind> {
        prop_oneof![
            Just(TaskKind::Generate),
            Just(TaskKind::Load),
            Just(TaskKind::Build),
            Just(TaskKind::Unload),
        ]
    }

    proptest! {
        #[test]
        fn prop_pop_order_is_sorted(
            items in prop::collection::vec((arb_kind(), -8i32..8, -8i32..8, 0.0f32..50.0), 0..64)
        ) {
            let mut queue = PendingQueue::new();
            for (kind, x, y, priority) in &items {
                queue.push(key(*kind, *x, *y), *priority, ());
            }
            let unique: std::collections::HashSet<_> =
                items.iter().map(|(k, x, y, _)| key(*k, *x, *y)).collect();
            prop_assert_eq!(queue.len(), unique.len());

            let mut previous: Option<(u8, f32)> = None;
            while let Some((popped, _)) = queue.pop() {
                let priority = items
                    .iter()
                    .rev()
                    .find(|(k, x, y, _)| key(*k, *x, *y) == popped)
                    .map(|(_, _, _, p)| *p)
                    .unwrap();
                let current = (popped.kind.bucket(), priority);
                if let Some((bucket, last)) = previous {
                    prop_assert!(bucket < current.0 || (bucket == current.0 && last <= current.1));
                }
                previous = Some(current);
            }
        }
    }
}
