//! Completion handles.
//!
//! Every tracked task owns one [`Completer`]; every caller that submits the
//! task (or a duplicate of it) receives a clone of the matching
//! [`CompletionHandle`]. The outcome is published once and observed by all
//! clones.

use std::fmt;

use tokio::sync::watch;

use super::task::{TaskKey, TaskOutcome};

/// Creates a connected completer/handle pair for the task `key`.
pub(crate) fn completion_pair<T>(key: TaskKey) -> (Completer<T>, CompletionHandle<T>) {
    let (tx, rx) = watch::channel(None);
    (Completer { tx }, CompletionHandle { key, rx })
}

/// Write side of a completion handle.
pub(crate) struct Completer<T> {
    tx: watch::Sender<Option<TaskOutcome<T>>>,
}

impl<T> Completer<T> {
    /// Publishes the outcome to every handle.
    pub(crate) fn complete(self, outcome: TaskOutcome<T>) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Future-like handle to a task's eventual outcome.
///
/// Handles are cheap to clone. A handle whose task is dropped without ever
/// publishing an outcome resolves as [`TaskOutcome::Cancelled`].
pub struct CompletionHandle<T> {
    key: TaskKey,
    rx: watch::Receiver<Option<TaskOutcome<T>>>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            rx: self.rx.clone(),
        }
    }
}

impl<T> fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("key", &self.key)
            .field("finished", &self.rx.borrow().is_some())
            .finish()
    }
}

impl<T: Clone> CompletionHandle<T> {
    /// Key of the task this handle belongs to.
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Returns true once an outcome has been published.
    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The outcome, if published. Never blocks.
    ///
    /// A task dropped without publishing reads as cancelled, as in
    /// [`wait`](Self::wait).
    pub fn try_outcome(&self) -> Option<TaskOutcome<T>> {
        let published = self.rx.borrow().clone();
        match published {
            Some(outcome) => Some(outcome),
            None if self.rx.has_changed().is_err() => Some(TaskOutcome::Cancelled),
            None => None,
        }
    }

    /// Waits for the outcome.
    pub async fn wait(&self) -> TaskOutcome<T> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(TaskOutcome::Cancelled)
    }

    /// Returns true when both handles observe the same tracked task.
    pub fn same_task(&self, other: &CompletionHandle<T>) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ChunkCoord;
    use crate::scheduler::task::TaskKind;
    use std::time::Duration;

    fn key() -> TaskKey {
        TaskKey::new(TaskKind::Generate, ChunkCoord::new(0, 0))
    }

    #[tokio::test]
    async fn test_wait_returns_published_outcome() {
        let (completer, handle) = completion_pair::<u32>(key());
        let clone = handle.clone();
        assert!(!handle.is_finished());

        completer.complete(TaskOutcome::Completed(3));

        assert_eq!(handle.wait().await, TaskOutcome::Completed(3));
        assert_eq!(clone.try_outcome(), Some(TaskOutcome::Completed(3)));
        assert!(clone.same_task(&handle));
    }

    #[tokio::test]
    async fn test_dropped_completer_resolves_cancelled() {
        let (completer, handle) = completion_pair::<u32>(key());
        assert_eq!(handle.try_outcome(), None);
        drop(completer);
        assert_eq!(handle.try_outcome(), Some(TaskOutcome::Cancelled));
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_wait_before_publish() {
        let (completer, handle) = completion_pair::<&'static str>(key());
        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait().await }
        });
        tokio::task::yield_now().await;
        completer.complete(TaskOutcome::Completed("done"));
        assert_eq!(waiter.await.unwrap(), TaskOutcome::Completed("done"));
    }

    #[test]
    fn test_distinct_pairs_are_distinct_tasks() {
        let (_a_tx, a) = completion_pair::<u32>(key());
        let (_b_tx, b) = completion_pair::<u32>(key());
        assert!(!a.same_task(&b));
        assert_eq!(a.key(), b.key());
    }
}
