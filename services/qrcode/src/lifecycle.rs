use crate::artifact_store::ArtifactStore;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Cutoff applied when a caller does not name one
pub const DEFAULT_CUTOFF_DAYS: u32 = 1;

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Cutoff the pass ran with
    pub cutoff_days: u32,
    /// Folders examined
    pub scanned: usize,
    /// Folders removed
    pub deleted_count: usize,
    /// Expired folders that could not be removed
    pub failed_count: usize,
}

/// Deletes artifact folders that have outlived a cutoff
///
/// A folder is expired when `now - created > cutoff_days`. One folder that
/// cannot be removed is logged and skipped; the rest of the pass continues.
pub struct LifecycleManager {
    store: Arc<dyn ArtifactStore>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Run a cleanup pass against the current time
    pub async fn cleanup(&self, cutoff_days: u32) -> Result<CleanupReport> {
        self.cleanup_at(cutoff_days, Utc::now()).await
    }

    /// Run a cleanup pass as if the current time were `now`
    #[instrument(skip(self, now))]
    pub async fn cleanup_at(&self, cutoff_days: u32, now: DateTime<Utc>) -> Result<CleanupReport> {
        let cutoff = Duration::days(i64::from(cutoff_days));
        let folders = self.store.list_folders().await?;

        let mut report = CleanupReport {
            cutoff_days,
            scanned: folders.len(),
            ..Default::default()
        };

        for folder in folders {
            let age = now.signed_duration_since(folder.created);
            if age <= cutoff {
                continue;
            }

            match self.store.delete(&folder.id).await {
                Ok(()) => {
                    debug!(folder = %folder.id, age_hours = age.num_hours(), "Expired folder deleted");
                    report.deleted_count += 1;
                }
                Err(e) => {
                    warn!(folder = %folder.id, error = %e, "Failed to delete expired folder");
                    report.failed_count += 1;
                }
            }
        }

        metrics::counter!("qr.cleanup.deleted").increment(report.deleted_count as u64);
        metrics::counter!("qr.cleanup.failed").increment(report.failed_count as u64);

        info!(
            scanned = report.scanned,
            deleted = report.deleted_count,
            failed = report.failed_count,
            "Cleanup pass finished"
        );

        Ok(report)
    }

    /// Run cleanup every `interval` until `shutdown` changes or its sender drops
    ///
    /// The first pass runs immediately.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: std::time::Duration,
        cutoff_days: u32,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_secs = interval.as_secs(),
            cutoff_days, "Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup(cutoff_days).await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Retention sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::{FolderEntry, FsArtifactStore, Metadata};
    use crate::error::QrServiceError;
    use crate::folder_id::FolderId;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// Delegates to a real store but refuses to delete one folder
    struct StubbornStore {
        inner: FsArtifactStore,
        undeletable: FolderId,
    }

    #[async_trait]
    impl ArtifactStore for StubbornStore {
        async fn create(&self, id: &FolderId, image: &[u8], metadata: &Metadata) -> Result<()> {
            self.inner.create(id, image, metadata).await
        }

        async fn read_image(&self, id: &FolderId) -> Result<Vec<u8>> {
            self.inner.read_image(id).await
        }

        async fn read_metadata(&self, id: &FolderId) -> Result<Metadata> {
            self.inner.read_metadata(id).await
        }

        async fn list_folders(&self) -> Result<Vec<FolderEntry>> {
            self.inner.list_folders().await
        }

        async fn delete(&self, id: &FolderId) -> Result<()> {
            if *id == self.undeletable {
                return Err(QrServiceError::storage(
                    "deleting folder",
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            self.inner.delete(id).await
        }

        fn folder_path(&self, id: &FolderId) -> PathBuf {
            self.inner.folder_path(id)
        }
    }

    async fn create_test_store() -> (FsArtifactStore, TempDir) {
        let dir = tempdir().expect("tempdir");
        let store = FsArtifactStore::open(dir.path()).await.expect("open store");
        (store, dir)
    }

    async fn seed(store: &dyn ArtifactStore, created: DateTime<Utc>) -> FolderId {
        let id = FolderId::generate_at(created);
        let metadata = Metadata::new("https://example.com", created, Duration::days(1));
        store.create(&id, b"png", &metadata).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_deletes_only_folders_past_cutoff() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();

        let three_days = seed(&store, now - Duration::days(3)).await;
        let two_days = seed(&store, now - Duration::days(2)).await;
        let half_day = seed(&store, now - Duration::hours(12)).await;
        let fresh = seed(&store, now).await;

        let store = Arc::new(store);
        let manager = LifecycleManager::new(store.clone());

        // Age equal to the cutoff is not expired
        let report = manager.cleanup_at(2, now).await.unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.deleted_count, 1);
        assert!(matches!(
            store.read_metadata(&three_days).await,
            Err(QrServiceError::NotFound(_))
        ));

        let report = manager.cleanup_at(1, now).await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(store.read_metadata(&two_days).await.is_err());

        let remaining: Vec<FolderId> = store
            .list_folders()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(remaining, vec![half_day, fresh]);
    }

    #[tokio::test]
    async fn test_second_pass_deletes_nothing() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        seed(&store, now - Duration::days(5)).await;
        seed(&store, now - Duration::days(4)).await;

        let manager = LifecycleManager::new(Arc::new(store));

        assert_eq!(manager.cleanup_at(1, now).await.unwrap().deleted_count, 2);
        assert_eq!(manager.cleanup_at(1, now).await.unwrap().deleted_count, 0);
    }

    #[tokio::test]
    async fn test_zero_cutoff_removes_everything_older_than_now() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        seed(&store, now - Duration::seconds(1)).await;
        seed(&store, now - Duration::minutes(30)).await;

        let manager = LifecycleManager::new(Arc::new(store));
        assert_eq!(manager.cleanup_at(0, now).await.unwrap().deleted_count, 2);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_abort_pass() {
        let (inner, _dir) = create_test_store().await;
        let now = Utc::now();

        let stuck = seed(&inner, now - Duration::days(4)).await;
        seed(&inner, now - Duration::days(3)).await;
        seed(&inner, now - Duration::days(2)).await;

        let store = Arc::new(StubbornStore {
            inner,
            undeletable: stuck.clone(),
        });
        let manager = LifecycleManager::new(store.clone());

        let report = manager.cleanup_at(1, now).await.unwrap();
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.failed_count, 1);

        let remaining = store.list_folders().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, stuck);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let (store, _dir) = create_test_store().await;
        seed(&store, Utc::now() - Duration::days(10)).await;

        let store = Arc::new(store);
        let manager = Arc::new(LifecycleManager::new(store.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(
            manager.run_sweeper(std::time::Duration::from_millis(20), 1, rx),
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(store.list_folders().await.unwrap().is_empty());
    }
}
