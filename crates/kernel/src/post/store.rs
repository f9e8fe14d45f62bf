//! File-backed post store.
//!
//! One document per post at `<root>/<id>.md`:
//!
//! ```text
//! ---
//! <front matter as YAML>
//! ---
//! <body>
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{FrontMatter, Post, PostStore, StoreError};

/// Line delimiting the front-matter block.
const MARKER: &str = "---";

const EXTENSION: &str = ".md";

/// Posts stored as documents in one directory.
#[derive(Debug, Clone)]
pub struct FilePostStore {
    root: PathBuf,
}

impl FilePostStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Document path for an id.
    ///
    /// Rejects ids that could escape the post directory.
    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let unsafe_id = id.is_empty()
            || id.starts_with('.')
            || id.contains(['/', '\\', '\0'])
            || id.contains("..");

        if unsafe_id {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        Ok(self.root.join(format!("{id}{EXTENSION}")))
    }
}

#[async_trait]
impl PostStore for FilePostStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(EXTENSION) {
                ids.push(id.to_string());
            }
        }

        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    async fn read(&self, id: &str) -> Result<Post, StoreError> {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(_) => return Err(StoreError::NotFound(id.to_string())),
        };

        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(StoreError::Corrupt {
                    id: id.to_string(),
                    reason: "document is not valid UTF-8".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        parse_document(id, &text)
    }

    async fn write(&self, post: &Post) -> Result<(), StoreError> {
        let path = self.path_for(&post.id)?;
        let document = render_document(post)?;

        fs::create_dir_all(&self.root).await?;

        let temp = self
            .root
            .join(format!(".{}.{}.tmp", post.id, Uuid::new_v4().simple()));

        if let Err(e) = write_synced(&temp, document.as_bytes()).await {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                warn!(error = %cleanup, path = ?temp, "failed to remove partial post");
            }
            return Err(e.into());
        }

        fs::rename(&temp, &path).await?;

        debug!(id = %post.id, path = ?path, size = document.len(), "post written");
        Ok(())
    }
}

/// Write `data` to a fresh file at `path` and flush it to disk.
///
/// Callers rename the file into place afterwards.
pub(crate) async fn write_synced(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

/// Serialize a post as a front-matter document.
pub fn render_document(post: &Post) -> Result<String, StoreError> {
    let mut yaml = serde_yml::to_string(&post.front_matter)?;
    if let Some(stripped) = yaml.strip_prefix("---\n") {
        yaml = stripped.to_string();
    }
    if !yaml.ends_with('\n') {
        yaml.push('\n');
    }
    Ok(format!("{MARKER}\n{yaml}{MARKER}\n{}", post.content))
}

fn is_marker(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == MARKER
}

/// Split a document into front matter and body.
///
/// Only the first two marker lines delimit front matter; later ones belong
/// to the body.
pub fn parse_document(id: &str, text: &str) -> Result<Post, StoreError> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let mut offset = 0;
    let mut front_matter_start = None;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        match front_matter_start {
            None if is_marker(line) => front_matter_start = Some(offset),
            None => return Err(corrupt("missing opening front-matter marker")),
            Some(start) if is_marker(line) => {
                let yaml = &text[start..line_start];
                let front_matter: FrontMatter = if yaml.trim().is_empty() {
                    FrontMatter::new()
                } else {
                    serde_yml::from_str(yaml)
                        .map_err(|e| corrupt(&format!("invalid front matter: {e}")))?
                };

                return Ok(Post {
                    id: id.to_string(),
                    slug: Post::slug_from_id(id).to_string(),
                    front_matter,
                    content: text[offset..].to_string(),
                });
            }
            Some(_) => {}
        }
    }

    Err(corrupt("missing closing front-matter marker"))
}
