//! Folder identifiers for stored QR artifacts.
//!
//! A folder id is both the storage key and the handle returned to clients.
//! Generated ids look like `qr_20260212_105235_123456_58e0421c9a1f`: UTC date,
//! time, microseconds and a random hex suffix. The fixed-width timestamp prefix
//! keeps lexicographic order equal to creation order.

use crate::error::{QrServiceError, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

const PREFIX: &str = "qr_";
const SUFFIX_LEN: usize = 12;
const MAX_LEN: usize = 128;

/// Unique, sortable name of one artifact folder
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    /// Generate a fresh id for the current instant
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a fresh id embedding the given creation time
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{PREFIX}{stamp}_{suffix}",
            stamp = now.format("%Y%m%d_%H%M%S_%6f"),
            suffix = &suffix[..SUFFIX_LEN],
        ))
    }

    /// Accept a client-supplied folder name.
    ///
    /// Only ASCII alphanumerics, `_` and `-` are allowed, so a valid id can
    /// never escape the storage root. Anything else cannot name a stored
    /// folder and is reported as not found.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(QrServiceError::NotFound(format!("invalid folder name: {raw:?}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time embedded in a generated id.
    ///
    /// Also understands the older `qr_<date>_<time>_<hex>` form without
    /// microseconds. Returns `None` for ids not produced by a generator.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let rest = self.0.strip_prefix(PREFIX)?;
        let parts: Vec<&str> = rest.split('_').collect();

        let (date, time, micros) = match parts.as_slice() {
            [date, time, micros, _suffix] => (*date, *time, micros.parse::<u32>().ok()?),
            [date, time, _suffix] => (*date, *time, 0),
            _ => return None,
        };

        let naive = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S").ok()?;
        let naive = naive.with_nanosecond(micros.checked_mul(1_000)?)?;
        Some(naive.and_utc())
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FolderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
