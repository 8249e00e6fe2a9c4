use thiserror::Error;

/// Errors produced by the QR code service
#[derive(Error, Debug)]
pub enum QrServiceError {
    /// Caller supplied unusable input; nothing was written
    #[error("{0}")]
    Validation(String),

    /// Folder, image or metadata does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The QR encoder rejected the input
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Filesystem failure while touching the artifact store
    #[error("Storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Anything else that should surface as a server failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QrServiceError {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, QrServiceError>;
