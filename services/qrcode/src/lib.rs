//! QR Code Service
//!
//! HTTP service that turns submitted URLs into QR code images, keeps every
//! result in its own folder next to a metadata record, and deletes folders
//! once they outlive a retention cutoff.
//!
//! ## Architecture
//!
//! ```text
//!  POST /generate          GET /qr/{folder}        POST /cleanup
//!        │                 GET /metadata/{folder}        │
//!        ▼                        │                      │
//! ┌──────────────┐                │               ┌──────────────┐
//! │ QrGenerator  │────────────────┼──────────────▶│ Lifecycle    │◀── sweeper
//! └──────────────┘                │               │ Manager      │    (interval)
//!   │         │                   │               └──────────────┘
//!   ▼         ▼                   ▼                      │
//! ┌────────┐ ┌──────────────────────────────┐            │
//! │Encoder │ │ ArtifactStore                │◀───────────┘
//! └────────┘ │  <root>/<folder_id>/         │
//!            │    qrcode.png, metadata.json │
//!            └──────────────────────────────┘
//! ```
//!
//! Folder ids (see [`FolderId`]) are the only index into storage; there is
//! no separate lookup table.

pub mod api;
pub mod artifact_store;
pub mod config;
pub mod encoder;
pub mod error;
pub mod folder_id;
pub mod generator;
pub mod lifecycle;

pub use api::{create_router, start_api_server, AppState};
pub use artifact_store::{ArtifactStore, FolderEntry, FsArtifactStore, Metadata};
pub use config::Config;
pub use encoder::{PngQrEncoder, QrEncoder};
pub use error::{QrServiceError, Result};
pub use folder_id::FolderId;
pub use generator::{normalize_url, GeneratedQr, QrGenerator};
pub use lifecycle::{CleanupReport, LifecycleManager};
