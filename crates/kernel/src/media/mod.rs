//! Media endpoint storage.
//!
//! Uploaded files are typed by their content, renamed to a random name and
//! moved under the image or file directory of the site. Every upload is
//! recorded in an append-only metadata log.

pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::{LAST_UPLOAD_WINDOW, MediaStore, Sniffed, sniff};

/// One entry of the metadata log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub timestamp: DateTime<Utc>,
    pub generated_name: String,
    pub storage_path: PathBuf,
    /// Site-relative URL, e.g. `/images/<name>.png`.
    pub relative_url: String,
    pub public_url: String,
    pub mime_type: String,
    #[serde(default)]
    pub owning_post_id: Option<String>,
}

/// Media storage errors.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write media log: {0}")]
    Log(#[from] serde_yml::Error),
}
