//! Posts and their storage.
//!
//! A post is a front-matter mapping plus a body, stored as one document per
//! id. Ids are `YYYY-MM-DD-slug`, so sorting ids sorts posts by date.

pub mod store;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use thiserror::Error;

pub use store::FilePostStore;

/// Front-matter key → value.
pub type FrontMatter = BTreeMap<String, Value>;

/// Length of the `YYYY-MM-DD-` id prefix.
const DATE_PREFIX_LEN: usize = 11;

/// A published post.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub slug: String,
    pub front_matter: FrontMatter,
    pub content: String,
}

impl Post {
    /// Slug part of an id.
    pub fn slug_from_id(id: &str) -> &str {
        id.get(DATE_PREFIX_LEN..)
            .filter(|slug| !slug.is_empty())
            .unwrap_or(id)
    }

    /// Publication instant recorded in the `date` key.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.front_matter
            .get("date")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    }
}

/// Post storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("post not found: {0}")]
    NotFound(String),

    #[error("invalid post id: {0}")]
    InvalidId(String),

    #[error("corrupt post {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("post storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize front matter: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// Post storage backend.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Ids of committed posts, newest first.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Read one post.
    async fn read(&self, id: &str) -> Result<Post, StoreError>;

    /// Create or replace a post. Readers see the old or the new document,
    /// never a partial one.
    async fn write(&self, post: &Post) -> Result<(), StoreError>;
}
