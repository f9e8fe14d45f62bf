//! Configuration.
//!
//! Two layers: process settings loaded from environment variables, and the
//! site document (YAML) that describes storage locations, the token
//! endpoint and the front-matter mapping tables.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::front_matter::{MappingTable, merge_layers};

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Path to the site configuration document (default: `_config.yml`).
    pub site_config: PathBuf,

    /// Route the micropub endpoint is mounted on (default: `/micropub`).
    pub micropub_path: String,

    /// Timeout for the token endpoint round trip (default: 10s).
    pub auth_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let site_config = env::var("SITE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("_config.yml"));

        let micropub_path = env::var("MICROPUB_PATH").unwrap_or_else(|_| "/micropub".to_string());
        if !micropub_path.starts_with('/') {
            anyhow::bail!("MICROPUB_PATH must start with '/': {micropub_path}");
        }

        let auth_timeout_secs: u64 = env::var("AUTH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("AUTH_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            port,
            site_config,
            micropub_path,
            auth_timeout: Duration::from_secs(auth_timeout_secs),
        })
    }
}

/// Where uploaded media lands, relative to the site root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPaths {
    #[serde(default = "default_images_dir")]
    pub images: String,
    #[serde(default = "default_files_dir")]
    pub files: String,
}

fn default_images_dir() -> String {
    "images".to_string()
}

fn default_files_dir() -> String {
    "files".to_string()
}

impl Default for MediaPaths {
    fn default() -> Self {
        Self {
            images: default_images_dir(),
            files: default_files_dir(),
        }
    }
}

/// A channel advertised to microsub readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub uid: String,
    pub name: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            uid: "posts".to_string(),
            name: "Posts".to_string(),
        }
    }
}

/// A syndication target listed by `q=syndicate-to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndicationTarget {
    pub uid: String,
    pub name: String,
}

/// Front-matter mapping tables.
///
/// The `all` layer applies to every post, named type layers (`note`,
/// `article`, `like`, ...) apply by inferred type, and `categories` layers
/// apply per declared category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontMatterConfig {
    #[serde(default)]
    pub all: MappingTable,

    #[serde(default)]
    pub categories: BTreeMap<String, MappingTable>,

    #[serde(flatten)]
    pub types: BTreeMap<String, MappingTable>,
}

/// Site configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public base URL of the published site.
    pub site_url: String,

    /// Root directory of the site sources.
    pub site_location: PathBuf,

    /// Post directory, relative to `site_location`.
    #[serde(default = "default_posts_dir")]
    pub posts_dir: String,

    #[serde(default)]
    pub media_paths: MediaPaths,

    /// Path of the media metadata log.
    pub media_metadata: PathBuf,

    /// URL advertised as the media endpoint by `q=config`.
    #[serde(default)]
    pub media_endpoint: Option<String>,

    /// Token introspection URL consulted for every authenticated request.
    pub token_endpoint: String,

    #[serde(default)]
    pub feed: FeedConfig,

    /// JSON document served verbatim by `q=category`.
    #[serde(default)]
    pub categories: Option<PathBuf>,

    #[serde(default)]
    pub syndicate_to: Vec<SyndicationTarget>,

    /// chrono format placed between `site_url` and the slug in permalinks.
    #[serde(default = "default_permalink_date_format")]
    pub permalink_date_format: String,

    /// Query names answered without a bearer token.
    #[serde(default)]
    pub public_queries: Vec<String>,

    /// Commands run after a successful operation, keyed by operation name.
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,

    /// Directory receiving command stdout/stderr (default: site root).
    #[serde(default)]
    pub command_output_dir: Option<PathBuf>,

    #[serde(default)]
    pub front_matter: FrontMatterConfig,
}

fn default_posts_dir() -> String {
    "_posts".to_string()
}

fn default_permalink_date_format() -> String {
    "/%Y/%m/%d/".to_string()
}

impl SiteConfig {
    /// Load the site document from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read site config {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("invalid site config {}", path.display()))
    }

    /// Parse the site document from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yml::from_str(raw).context("failed to parse site config YAML")?;
        url::Url::parse(&config.site_url).context("site_url must be an absolute URL")?;
        if StrftimeItems::new(&config.permalink_date_format).any(|item| item == Item::Error) {
            anyhow::bail!(
                "permalink_date_format is not a valid date format: {}",
                config.permalink_date_format
            );
        }
        Ok(config)
    }

    /// Directory holding one file per post.
    pub fn posts_path(&self) -> PathBuf {
        self.site_location.join(&self.posts_dir)
    }

    /// Directory where commands write their captured output.
    pub fn command_output_path(&self) -> PathBuf {
        self.command_output_dir
            .clone()
            .unwrap_or_else(|| self.site_location.clone())
    }

    /// Whether a query may be answered without authentication.
    pub fn is_public_query(&self, query: &str) -> bool {
        self.public_queries.iter().any(|q| q == query)
    }

    /// Effective mapping table for a post type and its categories.
    ///
    /// Layers merge all → type → each category in order; a later layer
    /// replaces entries of an earlier one.
    pub fn mappings<S: AsRef<str>>(
        &self,
        post_type: Option<&str>,
        categories: &[S],
    ) -> MappingTable {
        let fm = &self.front_matter;
        let mut layers: Vec<&MappingTable> = vec![&fm.all];

        if let Some(table) = post_type.and_then(|t| fm.types.get(t)) {
            layers.push(table);
        }

        for category in categories {
            if let Some(table) = fm.categories.get(category.as_ref()) {
                layers.push(table);
            }
        }

        merge_layers(layers)
    }

    /// Permalink of a post published at `date` with `slug`.
    pub fn permalink(&self, date: &chrono::DateTime<chrono::FixedOffset>, slug: &str) -> String {
        format!(
            "{}{}{}",
            self.site_url.trim_end_matches('/'),
            date.format(&self.permalink_date_format),
            slug
        )
    }
}
