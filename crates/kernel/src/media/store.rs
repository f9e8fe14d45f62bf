//! Local media store and metadata log.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MediaError, MediaRecord};
use crate::config::{MediaPaths, SiteConfig};
use crate::entry::Upload;
use crate::post::store::write_synced;

/// How long after an upload `q=last` still reports it.
pub const LAST_UPLOAD_WINDOW: Duration = Duration::from_secs(300);

/// Bytes read from the head of an upload for type detection.
const SNIFF_LEN: usize = 8192;

/// Result of content type detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub is_image: bool,
}

const GENERIC_FILE: Sniffed = Sniffed {
    mime_type: "application/octet-stream",
    extension: "bin",
    is_image: false,
};

/// Detect a file type from its leading bytes.
///
/// Unrecognised content is a generic binary file.
pub fn sniff(header: &[u8]) -> Sniffed {
    match infer::get(header) {
        Some(kind) => Sniffed {
            mime_type: kind.mime_type(),
            extension: kind.extension(),
            is_image: matches!(kind.matcher_type(), infer::MatcherType::Image),
        },
        None => GENERIC_FILE,
    }
}

/// Media files under the site root plus their metadata log.
pub struct MediaStore {
    site_location: PathBuf,
    site_url: String,
    paths: MediaPaths,
    log_path: PathBuf,
    /// Serializes read-modify-write cycles on the log.
    log_lock: Mutex<()>,
}

impl MediaStore {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            site_location: site.site_location.clone(),
            site_url: site.site_url.trim_end_matches('/').to_string(),
            paths: site.media_paths.clone(),
            log_path: site.media_metadata.clone(),
            log_lock: Mutex::new(()),
        }
    }

    /// Store an upload and record it in the metadata log.
    ///
    /// The data is staged in a temporary file, typed from its content,
    /// logged, then moved into place under a random name.
    pub async fn ingest(
        &self,
        upload: &Upload,
        owning_post_id: Option<&str>,
    ) -> Result<MediaRecord, MediaError> {
        fs::create_dir_all(&self.site_location).await?;

        let temp = self
            .site_location
            .join(format!(".upload-{}.part", Uuid::new_v4().simple()));

        let result = self.ingest_staged(&temp, upload, owning_post_id).await;

        if result.is_err() {
            match fs::remove_file(&temp).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, path = ?temp, "failed to remove staged upload"),
            }
        }

        result
    }

    async fn ingest_staged(
        &self,
        temp: &Path,
        upload: &Upload,
        owning_post_id: Option<&str>,
    ) -> Result<MediaRecord, MediaError> {
        write_synced(temp, &upload.data).await?;

        let header = read_header(temp).await?;
        let sniffed = sniff(&header);

        let generated_name = format!("{}.{}", Uuid::new_v4(), sniffed.extension);
        let dir = if sniffed.is_image {
            &self.paths.images
        } else {
            &self.paths.files
        };
        let dir = dir.trim_matches('/');
        let dest_dir = self.site_location.join(dir);
        let storage_path = dest_dir.join(&generated_name);
        let relative_url = format!("/{dir}/{generated_name}");

        let record = MediaRecord {
            timestamp: Utc::now(),
            generated_name,
            storage_path: storage_path.clone(),
            public_url: format!("{}{relative_url}", self.site_url),
            relative_url,
            mime_type: sniffed.mime_type.to_string(),
            owning_post_id: owning_post_id.map(str::to_string),
        };

        {
            let _guard = self.log_lock.lock().await;
            let mut records = self.load_records().await;
            records.push(record.clone());
            self.save_records(&records).await?;
        }

        fs::create_dir_all(&dest_dir).await?;
        fs::rename(temp, &storage_path).await?;

        info!(
            name = %record.generated_name,
            mime = %record.mime_type,
            size = upload.data.len(),
            post = ?record.owning_post_id,
            "media stored"
        );

        Ok(record)
    }

    /// All log records, oldest first.
    pub async fn records(&self) -> Vec<MediaRecord> {
        self.load_records().await
    }

    /// URL of the most recent upload if it happened within `window` of `now`.
    pub async fn last_upload_within(&self, now: DateTime<Utc>, window: Duration) -> Option<String> {
        let last = self.load_records().await.pop()?;

        let recent = match now.signed_duration_since(last.timestamp).to_std() {
            Ok(age) => age < window,
            // Recorded after `now`: clock skew between writers.
            Err(_) => true,
        };

        recent.then_some(last.public_url)
    }

    /// Load the log; a missing or unreadable log counts as empty.
    async fn load_records(&self) -> Vec<MediaRecord> {
        let raw = match fs::read_to_string(&self.log_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(error = %e, path = ?self.log_path, "media log unreadable, starting empty");
                return Vec::new();
            }
        };

        if raw.trim().is_empty() {
            return Vec::new();
        }

        match serde_yml::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, path = ?self.log_path, "media log corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Rewrite the log through a temporary sibling and a rename.
    async fn save_records(&self, records: &[MediaRecord]) -> Result<(), MediaError> {
        let yaml = serde_yml::to_string(records)?;

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media");
        let temp = self
            .log_path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        write_synced(&temp, yaml.as_bytes()).await?;
        fs::rename(&temp, &self.log_path).await?;

        debug!(path = ?self.log_path, records = records.len(), "media log written");
        Ok(())
    }
}

impl std::fmt::Debug for MediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStore")
            .field("site_location", &self.site_location)
            .field("log_path", &self.log_path)
            .finish()
    }
}

async fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header).await?;
    Ok(header)
}
