//! Bearer token verification against a remote token endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::{debug, error, warn};

/// Yes/no gate consulted once per authenticated request.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Whether the request's `Authorization` header grants access.
    async fn verify(&self, authorization: Option<&str>) -> bool;
}

/// Verifies tokens with one GET to an IndieAuth-style token endpoint.
///
/// Success is a 2xx response whose body parses as JSON. Everything else
/// (missing header, timeout, transport error, other status) denies access.
/// There are no retries.
#[derive(Debug, Clone)]
pub struct RemoteTokenVerifier {
    client: reqwest::Client,
    token_endpoint: String,
}

impl RemoteTokenVerifier {
    /// Build a verifier whose every round trip is bounded by `timeout`.
    ///
    /// Fails when the HTTP client cannot be constructed (for example when no
    /// TLS backend is available).
    pub fn new(token_endpoint: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // A redirect is a failed introspection, not something to chase.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            token_endpoint: token_endpoint.into(),
        })
    }
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(authorization) = authorization.filter(|h| !h.trim().is_empty()) else {
            warn!("request without authorization header");
            return false;
        };

        let response = match self
            .client
            .get(&self.token_endpoint)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                error!(endpoint = %self.token_endpoint, "token endpoint timed out");
                return false;
            }
            Err(e) => {
                error!(endpoint = %self.token_endpoint, error = %e, "token endpoint unreachable");
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "token rejected");
            return false;
        }

        match response.json::<serde_json::Value>().await {
            Ok(_) => {
                debug!("token accepted");
                true
            }
            Err(e) => {
                warn!(error = %e, "token endpoint returned unparseable body");
                false
            }
        }
    }
}
