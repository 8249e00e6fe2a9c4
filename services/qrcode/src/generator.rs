use crate::artifact_store::{ArtifactStore, Metadata};
use crate::encoder::QrEncoder;
use crate::error::{QrServiceError, Result};
use crate::folder_id::FolderId;
use crate::lifecycle::{CleanupReport, LifecycleManager};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Result of a successful generate call
#[derive(Debug, Clone)]
pub struct GeneratedQr {
    pub folder_id: FolderId,
    /// Folder holding the artifact
    pub folder: PathBuf,
    /// Image file inside the folder
    pub path: PathBuf,
    pub metadata: Metadata,
    /// Report of the post-generate cleanup, if one ran and succeeded
    pub cleanup: Option<CleanupReport>,
}

/// Trim a submitted URL and give it a scheme.
///
/// Anything that does not already start with `http://` or `https://`
/// (in any case) gets `https://` prepended.
pub fn normalize_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(QrServiceError::Validation("URL cannot be empty".to_string()));
    }

    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Ok(format!("https://{url}"))
    }
}

/// Orchestrates one QR generation: validate, encode, persist, tidy up
pub struct QrGenerator {
    store: Arc<dyn ArtifactStore>,
    encoder: Arc<dyn QrEncoder>,
    lifecycle: Arc<LifecycleManager>,
    retention: Duration,
    cleanup_cutoff_days: u32,
}

impl QrGenerator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        encoder: Arc<dyn QrEncoder>,
        lifecycle: Arc<LifecycleManager>,
        retention: Duration,
        cleanup_cutoff_days: u32,
    ) -> Self {
        Self {
            store,
            encoder,
            lifecycle,
            retention,
            cleanup_cutoff_days,
        }
    }

    /// Generate and store a QR code for `url`
    ///
    /// Validation happens before anything touches storage. When
    /// `cleanup_on_generate` is set, a cleanup pass runs after the new folder
    /// is written; its failure is logged and does not fail the request.
    #[instrument(skip(self))]
    pub async fn generate(&self, url: &str, cleanup_on_generate: bool) -> Result<GeneratedQr> {
        let url = normalize_url(url)?;

        let result = self.encode_and_store(url).await;
        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                metrics::counter!("qr.generate.failed").increment(1);
                return Err(e);
            }
        };

        metrics::counter!("qr.generated").increment(1);
        info!(
            folder = %generated.folder_id,
            url = %generated.metadata.url,
            "QR code generated"
        );

        let cleanup = if cleanup_on_generate {
            match self.lifecycle.cleanup(self.cleanup_cutoff_days).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Post-generate cleanup failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(GeneratedQr { cleanup, ..generated })
    }

    async fn encode_and_store(&self, url: String) -> Result<GeneratedQr> {
        let created = Utc::now();
        let folder_id = FolderId::generate_at(created);

        let encoder = Arc::clone(&self.encoder);
        let data = url.clone();
        let image = tokio::task::spawn_blocking(move || encoder.encode(&data))
            .await
            .map_err(|e| {
                error!(error = %e, "Encoder task panicked");
                QrServiceError::Internal(format!("encoder task failed: {e}"))
            })??;

        let metadata = Metadata::new(url, created, self.retention);
        self.store.create(&folder_id, &image, &metadata).await?;

        Ok(GeneratedQr {
            folder: self.store.folder_path(&folder_id),
            path: self.store.image_path(&folder_id),
            folder_id,
            metadata,
            cleanup: None,
        })
    }

    /// Image bytes of a stored folder
    pub async fn image(&self, folder_name: &str) -> Result<Vec<u8>> {
        let id = FolderId::parse(folder_name)?;
        self.store.read_image(&id).await
    }

    /// Metadata of a stored folder
    pub async fn metadata(&self, folder_name: &str) -> Result<Metadata> {
        let id = FolderId::parse(folder_name)?;
        self.store.read_metadata(&id).await
    }

    /// Media type of generated images
    pub fn content_type(&self) -> &'static str {
        self.encoder.content_type()
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }
}
