//! Fire-and-forget background work.
//!
//! Cache writes are spawned as soon as they are scheduled and never awaited
//! on the response path. Each task is recorded so a harness can list what was
//! scheduled and wait for it with [`BackgroundTasks::settle`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::trace;

/// What a background task does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskLabel {
    /// Write a response into a named cache.
    CachePut { cache: String, url: String },
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskLabel::CachePut { cache, url } => write!(f, "cache-put {cache} {url}"),
        }
    }
}

/// Result of a settled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub label: TaskLabel,
    /// `Err` carries the message that was logged when the task failed.
    pub result: Result<(), String>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
struct PendingTask {
    label: TaskLabel,
    handle: JoinHandle<Result<(), String>>,
}

/// Background tasks scheduled while handling one event.
///
/// Clones share the same task list.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    pending: Arc<Mutex<Vec<PendingTask>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the runtime and record it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, label: TaskLabel, task: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        trace!(task = %label, "Spawning background task");
        let handle = tokio::spawn(task);
        self.lock().push(PendingTask { label, handle });
    }

    /// Labels of tasks not yet settled.
    pub fn pending(&self) -> Vec<TaskLabel> {
        self.lock().iter().map(|t| t.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait for every recorded task, including ones spawned while waiting.
    pub async fn settle(&self) -> Vec<TaskReport> {
        let mut reports = Vec::new();
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for PendingTask { label, handle } in batch {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(e.to_string()),
                };
                reports.push(TaskReport { label, result });
            }
        }
        reports
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn label(url: &str) -> TaskLabel {
        TaskLabel::CachePut {
            cache: "v1".to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_settle_reports_each_task() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(label("/a"), async { Ok(()) });
        tasks.spawn(label("/b"), async { Err("quota".to_string()) });

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.pending(), vec![label("/a"), label("/b")]);

        let reports = tasks.settle().await;
        assert_eq!(reports.len(), 2);
        assert!(reports[0].succeeded());
        assert_eq!(reports[1].result, Err("quota".to_string()));
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_task_runs_without_being_awaited() {
        let tasks = BackgroundTasks::new();
        let (tx, rx) = oneshot::channel();
        tasks.spawn(label("/a"), async move {
            let _ = tx.send(());
            Ok(())
        });

        // The task makes progress on its own.
        rx.await.unwrap();
        assert_eq!(tasks.settle().await.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_tasks() {
        let tasks = BackgroundTasks::new();
        let handle = tasks.clone();
        handle.spawn(label("/a"), async { Ok(()) });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.settle().await.len(), 1);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(label("/a").to_string(), "cache-put v1 /a");
    }
}
