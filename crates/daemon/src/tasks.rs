//! Task store for seedforge
//!
//! The only state shared between workers and pollers. Tasks are keyed by the
//! canonical source path and move strictly forward through
//! `pending -> running -> {done, error}`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Done | TaskStatus::Error => 2,
        }
    }

    /// Whether a task in `self` may be moved to `next`
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

/// Kind of output a task may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Metafile,
    MetadataReport,
    PreviewDownload,
    PreviewImage,
}

/// Point-in-time copy of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub message: String,
    pub artifacts: BTreeMap<ArtifactKind, PathBuf>,
}

impl TaskSnapshot {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            message: "Queued".to_string(),
            artifacts: BTreeMap::new(),
        }
    }
}

/// Outcome of [`TaskStore::try_begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A fresh pending task now occupies the slot
    Created,
    /// A pending or running task already holds the slot
    AlreadyActive(TaskStatus),
}

/// Concurrency-safe registry of tasks, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, TaskSnapshot>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally (re)create `id` as a pending task with no artifacts
    pub async fn create(&self, id: &str) {
        let mut tasks = self.inner.write().await;
        tasks.insert(id.to_string(), TaskSnapshot::pending());
    }

    /// Create `id` as pending unless an active task already exists for it.
    ///
    /// A terminal task is overwritten, which clears its artifact map.
    pub async fn try_begin(&self, id: &str) -> BeginOutcome {
        let mut tasks = self.inner.write().await;
        if let Some(existing) = tasks.get(id) {
            if existing.status.is_active() {
                return BeginOutcome::AlreadyActive(existing.status);
            }
        }
        tasks.insert(id.to_string(), TaskSnapshot::pending());
        BeginOutcome::Created
    }

    /// Merge a status, message and at most one artifact into `id`.
    ///
    /// Returns `false` when the task is unknown or the status would move
    /// backwards (including any change to a terminal task). Artifacts are
    /// never removed.
    pub async fn update(
        &self,
        id: &str,
        status: TaskStatus,
        message: impl Into<String>,
        artifact: Option<(ArtifactKind, PathBuf)>,
    ) -> bool {
        let mut tasks = self.inner.write().await;
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };

        if !task.status.can_advance_to(status) {
            debug!(
                task_id = id,
                from = task.status.as_str(),
                to = status.as_str(),
                "rejected backwards task update"
            );
            return false;
        }

        task.status = status;
        task.message = message.into();
        if let Some((kind, path)) = artifact {
            task.artifacts.insert(kind, path);
        }
        true
    }

    pub async fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner.read().await.get(id).cloned()
    }

    /// All tasks, ordered by id
    pub async fn list(&self) -> Vec<(String, TaskSnapshot)> {
        let tasks = self.inner.read().await;
        let mut all: Vec<(String, TaskSnapshot)> = tasks
            .iter()
            .map(|(id, snapshot)| (id.clone(), snapshot.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_unknown_task_is_none() {
        let store = TaskStore::new();
        assert!(store.get("/data/Nothing").await.is_none());
        assert!(!store.update("/data/Nothing", TaskStatus::Running, "x", None).await);
    }

    #[tokio::test]
    async fn test_update_merges_artifacts() {
        let store = TaskStore::new();
        store.create("/data/Movie").await;

        assert!(
            store
                .update(
                    "/data/Movie",
                    TaskStatus::Running,
                    "Creating metafile...",
                    Some((ArtifactKind::Metafile, PathBuf::from("/data/Movie/torrent/Movie.torrent"))),
                )
                .await
        );
        assert!(
            store
                .update("/data/Movie", TaskStatus::Running, "Scanning for media...", None)
                .await
        );

        let task = store.get("/data/Movie").await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.message, "Scanning for media...");
        assert_eq!(
            task.artifacts.get(&ArtifactKind::Metafile),
            Some(&PathBuf::from("/data/Movie/torrent/Movie.torrent"))
        );
    }

    #[tokio::test]
    async fn test_terminal_task_is_immutable() {
        let store = TaskStore::new();
        store.create("t").await;
        assert!(store.update("t", TaskStatus::Done, "Completed", None).await);

        assert!(!store.update("t", TaskStatus::Running, "again", None).await);
        assert!(!store.update("t", TaskStatus::Error, "late failure", None).await);

        let task = store.get("t").await.unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.message, "Completed");
    }

    #[tokio::test]
    async fn test_running_cannot_return_to_pending() {
        let store = TaskStore::new();
        store.create("t").await;
        assert!(store.update("t", TaskStatus::Running, "Initializing...", None).await);
        assert!(!store.update("t", TaskStatus::Pending, "Queued", None).await);
    }

    #[tokio::test]
    async fn test_try_begin_refuses_active_and_resets_terminal() {
        let store = TaskStore::new();
        assert_eq!(store.try_begin("t").await, BeginOutcome::Created);
        assert_eq!(
            store.try_begin("t").await,
            BeginOutcome::AlreadyActive(TaskStatus::Pending)
        );

        store
            .update(
                "t",
                TaskStatus::Done,
                "Completed",
                Some((ArtifactKind::PreviewImage, PathBuf::from("/x.jpg"))),
            )
            .await;
        assert_eq!(store.try_begin("t").await, BeginOutcome::Created);

        let task = store.get("t").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = TaskStore::new();
        store.create("t").await;
        store.update("t", TaskStatus::Running, "start", None).await;

        let kinds = [
            ArtifactKind::Metafile,
            ArtifactKind::MetadataReport,
            ArtifactKind::PreviewDownload,
            ArtifactKind::PreviewImage,
        ];
        let mut handles = Vec::new();
        for kind in kinds {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("t", TaskStatus::Running, format!("{:?}", kind), Some((kind, PathBuf::from("/a"))))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let task = store.get("t").await.unwrap();
        assert_eq!(task.artifacts.len(), 4);
    }

    #[test]
    fn test_snapshot_serializes_snake_case_kinds() {
        let mut snapshot = TaskSnapshot::pending();
        snapshot
            .artifacts
            .insert(ArtifactKind::MetadataReport, PathBuf::from("/r.txt"));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["artifacts"]["metadata_report"], "/r.txt");
    }

    fn status_strategy() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Running),
            Just(TaskStatus::Done),
            Just(TaskStatus::Error),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Whatever sequence of updates arrives, the observed status never moves backwards
        // and never leaves a terminal state.
        #[test]
        fn prop_status_is_monotonic(updates in prop::collection::vec(status_strategy(), 0..20)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = TaskStore::new();
                store.create("t").await;
                let mut last = TaskStatus::Pending;
                for next in updates {
                    store.update("t", next, "m", None).await;
                    let now = store.get("t").await.unwrap().status;
                    prop_assert!(now.rank() >= last.rank());
                    if last.is_terminal() {
                        prop_assert_eq!(now, last);
                    }
                    last = now;
                }
                Ok(())
            })?;
        }
    }
}
