//! Filesystem storage for generated QR artifacts.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/
//!   qr_20260212_105235_123456_58e0421c9a1f/
//!     qrcode.png
//!     metadata.json
//!   .staging-<folder_id>/      (transient, ignored by listing)
//! ```
//!
//! Folders are written into a hidden staging directory and renamed into
//! place once both files are on disk, so a folder visible under its final
//! name always holds a complete artifact.

use crate::error::{QrServiceError, Result};
use crate::folder_id::FolderId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// File name of the QR image inside an artifact folder
pub const IMAGE_FILE: &str = "qrcode.png";
/// File name of the metadata record inside an artifact folder
pub const METADATA_FILE: &str = "metadata.json";

const STAGING_PREFIX: &str = ".staging-";

/// Metadata stored next to each QR image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Normalized URL encoded in the image
    pub url: String,
    /// When the artifact was generated
    pub created: DateTime<Utc>,
    /// When the artifact falls out of its retention window
    pub expires: DateTime<Utc>,
    /// Image file name within the folder
    pub filename: String,
}

impl Metadata {
    /// Build a record expiring `retention` after `created`.
    ///
    /// `expires` saturates at the largest representable instant.
    pub fn new(url: impl Into<String>, created: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            url: url.into(),
            created,
            expires: created
                .checked_add_signed(retention)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            filename: IMAGE_FILE.to_string(),
        }
    }
}

/// A stored folder as seen by cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: FolderId,
    pub created: DateTime<Utc>,
}

/// Storage backend for QR artifacts
///
/// Folders are write-once: `create` never overwrites and nothing mutates a
/// folder afterwards. `delete` is idempotent so overlapping cleanup passes
/// are harmless.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an image and its metadata under a new folder
    async fn create(&self, id: &FolderId, image: &[u8], metadata: &Metadata) -> Result<()>;

    /// Raw image bytes of a folder
    async fn read_image(&self, id: &FolderId) -> Result<Vec<u8>>;

    /// Metadata record of a folder
    async fn read_metadata(&self, id: &FolderId) -> Result<Metadata>;

    /// All stored folders with their creation times, oldest first
    async fn list_folders(&self) -> Result<Vec<FolderEntry>>;

    /// Remove a folder and everything in it; absent folders are not an error
    async fn delete(&self, id: &FolderId) -> Result<()>;

    /// Location reported to clients for a folder
    fn folder_path(&self, id: &FolderId) -> PathBuf;

    /// Location reported to clients for a folder's image
    fn image_path(&self, id: &FolderId) -> PathBuf {
        self.folder_path(id).join(IMAGE_FILE)
    }
}

/// [`ArtifactStore`] on a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        fs::create_dir_all(&root)
            .await
            .map_err(|e| QrServiceError::storage(format!("creating root {}", root.display()), e))?;

        info!(root = %root.display(), "Artifact store ready");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_path(&self, id: &FolderId) -> PathBuf {
        self.root.join(format!("{STAGING_PREFIX}{id}"))
    }

    async fn write_files(&self, dir: &Path, image: &[u8], metadata: &Metadata) -> Result<()> {
        let record = serde_json::to_vec_pretty(metadata)
            .map_err(|e| QrServiceError::storage("encoding metadata", e.into()))?;

        fs::write(dir.join(IMAGE_FILE), image)
            .await
            .map_err(|e| QrServiceError::storage("writing image", e))?;

        fs::write(dir.join(METADATA_FILE), record)
            .await
            .map_err(|e| QrServiceError::storage("writing metadata", e))?;

        Ok(())
    }

    async fn read_file(&self, id: &FolderId, file: &str) -> Result<Vec<u8>> {
        let path = self.folder_path(id).join(file);

        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => QrServiceError::NotFound(format!("{id}/{file}")),
            _ => QrServiceError::storage(format!("reading {}", path.display()), e),
        })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    #[instrument(skip(self, image, metadata), fields(folder = %id, image_bytes = image.len()))]
    async fn create(&self, id: &FolderId, image: &[u8], metadata: &Metadata) -> Result<()> {
        let target = self.folder_path(id);

        let exists = fs::try_exists(&target)
            .await
            .map_err(|e| QrServiceError::storage("checking folder", e))?;
        if exists {
            return Err(QrServiceError::storage(
                format!("creating folder {id}"),
                std::io::Error::new(ErrorKind::AlreadyExists, "folder already exists"),
            ));
        }

        let staging = self.staging_path(id);
        fs::create_dir(&staging)
            .await
            .map_err(|e| QrServiceError::storage(format!("creating staging folder for {id}"), e))?;

        let written = match self.write_files(&staging, image, metadata).await {
            Ok(()) => fs::rename(&staging, &target)
                .await
                .map_err(|e| QrServiceError::storage(format!("publishing folder {id}"), e)),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(cleanup_err) = fs::remove_dir_all(&staging).await {
                warn!(error = %cleanup_err, "Failed to remove staging folder");
            }
            return Err(e);
        }

        debug!(path = %target.display(), "Artifact folder created");
        Ok(())
    }

    async fn read_image(&self, id: &FolderId) -> Result<Vec<u8>> {
        self.read_file(id, IMAGE_FILE).await
    }

    async fn read_metadata(&self, id: &FolderId) -> Result<Metadata> {
        let raw = self.read_file(id, METADATA_FILE).await?;

        serde_json::from_slice(&raw)
            .map_err(|e| QrServiceError::storage(format!("decoding metadata of {id}"), e.into()))
    }

    #[instrument(skip(self))]
    async fn list_folders(&self) -> Result<Vec<FolderEntry>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| QrServiceError::storage("listing storage root", e))?;

        let mut folders = Vec::new();

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| QrServiceError::storage("listing storage root", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let Ok(id) = FolderId::parse(name) else {
                continue;
            };

            let created = match self.read_metadata(&id).await {
                Ok(metadata) => Some(metadata.created),
                Err(e) => {
                    debug!(folder = %id, error = %e, "Metadata unreadable, using folder name");
                    id.timestamp()
                }
            };

            match created {
                Some(created) => folders.push(FolderEntry { id, created }),
                None => warn!(folder = %id, "Cannot determine folder age, skipping"),
            }
        }

        folders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(folders)
    }

    #[instrument(skip(self), fields(folder = %id))]
    async fn delete(&self, id: &FolderId) -> Result<()> {
        match fs::remove_dir_all(self.folder_path(id)).await {
            Ok(()) => {
                debug!("Artifact folder deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QrServiceError::storage(format!("deleting folder {id}"), e)),
        }
    }

    fn folder_path(&self, id: &FolderId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    async fn create_test_store() -> (FsArtifactStore, TempDir) {
        let dir = tempdir().expect("tempdir");
        let store = FsArtifactStore::open(dir.path().join("QR code"))
            .await
            .expect("open store");
        (store, dir)
    }

    fn metadata(url: &str, created: DateTime<Utc>) -> Metadata {
        Metadata::new(url, created, Duration::days(1))
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        let id = FolderId::generate_at(now);
        let meta = metadata("https://example.com", now);

        store.create(&id, b"png-bytes", &meta).await.unwrap();

        assert_eq!(store.read_image(&id).await.unwrap(), b"png-bytes");
        assert_eq!(store.read_metadata(&id).await.unwrap(), meta);
        assert!(store.image_path(&id).ends_with(format!("{id}/{IMAGE_FILE}")));
    }

    #[test]
    fn test_metadata_expiry_follows_retention() {
        let now = Utc::now();
        let meta = Metadata::new("https://example.com", now, Duration::days(3));

        assert_eq!(meta.expires - meta.created, Duration::days(3));
        assert_eq!(meta.filename, IMAGE_FILE);
    }

    #[test]
    fn test_huge_retention_saturates() {
        let now = Utc::now();
        let meta = Metadata::new("https://example.com", now, Duration::days(200_000_000));

        assert_eq!(meta.expires, DateTime::<Utc>::MAX_UTC);
        assert!(meta.expires > meta.created);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_folder() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        let id = FolderId::generate_at(now);

        store
            .create(&id, b"first", &metadata("https://first.example", now))
            .await
            .unwrap();

        let second = store
            .create(&id, b"second", &metadata("https://second.example", now))
            .await;

        assert!(matches!(second, Err(QrServiceError::Storage { .. })));
        assert_eq!(store.read_image(&id).await.unwrap(), b"first");
        assert_eq!(
            store.read_metadata(&id).await.unwrap().url,
            "https://first.example"
        );
    }

    #[tokio::test]
    async fn test_missing_folder_is_not_found() {
        let (store, _dir) = create_test_store().await;
        let id = FolderId::parse("nonexistent_folder").unwrap();

        assert!(matches!(store.read_image(&id).await, Err(QrServiceError::NotFound(_))));
        assert!(matches!(store.read_metadata(&id).await, Err(QrServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        let id = FolderId::generate_at(now);
        store
            .create(&id, b"png", &metadata("https://example.com", now))
            .await
            .unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();

        assert!(matches!(store.read_image(&id).await, Err(QrServiceError::NotFound(_))));
        assert!(store.list_folders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_staging_and_stray_files() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        let id = FolderId::generate_at(now);
        store
            .create(&id, b"png", &metadata("https://example.com", now))
            .await
            .unwrap();

        fs::create_dir(store.root().join(".staging-qr_leftover")).await.unwrap();
        fs::write(store.root().join("notes.txt"), b"hello").await.unwrap();

        let listed = store.list_folders().await.unwrap();
        assert_eq!(listed, vec![FolderEntry { id, created: now }]);
    }

    #[tokio::test]
    async fn test_list_falls_back_to_folder_name_timestamp() {
        let (store, _dir) = create_test_store().await;
        let legacy = FolderId::parse("qr_20260212_105235_58e0421c").unwrap();
        fs::create_dir(store.folder_path(&legacy)).await.unwrap();

        let unknown = FolderId::parse("scratch").unwrap();
        fs::create_dir(store.folder_path(&unknown)).await.unwrap();

        let listed = store.list_folders().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, legacy);
        assert_eq!(listed[0].created, legacy.timestamp().unwrap());
    }

    #[tokio::test]
    async fn test_list_orders_oldest_first() {
        let (store, _dir) = create_test_store().await;
        let now = Utc::now();
        let older = now - Duration::hours(5);

        let newer_id = FolderId::generate_at(now);
        let older_id = FolderId::generate_at(older);
        store
            .create(&newer_id, b"png", &metadata("https://b.example", now))
            .await
            .unwrap();
        store
            .create(&older_id, b"png", &metadata("https://a.example", older))
            .await
            .unwrap();

        let ids: Vec<FolderId> = store
            .list_folders()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![older_id, newer_id]);
    }
}
