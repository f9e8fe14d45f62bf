//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::auth::{RemoteTokenVerifier, TokenVerifier};
use crate::config::{Config, SiteConfig};
use crate::media::MediaStore;
use crate::post::{FilePostStore, PostStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Site document, read once at start-up.
    site: SiteConfig,

    /// Post storage.
    posts: Arc<dyn PostStore>,

    /// Uploaded media and its metadata log.
    media: MediaStore,

    /// Bearer token gate.
    verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// State over the file-backed stores of `site`, gated by `verifier`.
    pub fn new(site: SiteConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        let posts: Arc<dyn PostStore> = Arc::new(FilePostStore::new(site.posts_path()));
        let media = MediaStore::new(&site);

        Self {
            inner: Arc::new(AppStateInner {
                site,
                posts,
                media,
                verifier,
            }),
        }
    }

    /// Load the site document named by `config` and verify tokens remotely.
    pub fn from_config(config: &Config) -> Result<Self> {
        let site = SiteConfig::load(&config.site_config).context("failed to load site config")?;

        info!(
            site_url = %site.site_url,
            posts = %site.posts_path().display(),
            "site configuration loaded"
        );

        let verifier = Arc::new(
            RemoteTokenVerifier::new(site.token_endpoint.clone(), config.auth_timeout)
                .context("failed to build token endpoint client")?,
        );

        Ok(Self::new(site, verifier))
    }

    /// Get the site configuration.
    pub fn site(&self) -> &SiteConfig {
        &self.inner.site
    }

    /// Get the post store.
    pub fn posts(&self) -> &dyn PostStore {
        self.inner.posts.as_ref()
    }

    /// Get the media store.
    pub fn media(&self) -> &MediaStore {
        &self.inner.media
    }

    /// Get the token verifier.
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.inner.verifier.as_ref()
    }
}
