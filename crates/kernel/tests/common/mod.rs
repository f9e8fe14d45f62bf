#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every [`TestApp`] runs the REAL router and stores against its own site
//! directory in a [`TempDir`], so tests are independent and can run in
//! parallel.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use quire_kernel::auth::TokenVerifier;
use quire_kernel::{AppState, SiteConfig, build_router};

/// Token accepted by [`StaticVerifier`].
pub const TOKEN: &str = "Bearer test-token";

/// Micropub route used by the test router.
pub const MICROPUB: &str = "/micropub";

/// Smallest recognisable PNG header.
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52,
];

const BOUNDARY: &str = "quire-test-boundary";

/// Accepts exactly [`TOKEN`].
pub struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, authorization: Option<&str>) -> bool {
        authorization == Some(TOKEN)
    }
}

/// Site document for a site rooted at `root`.
pub fn site_yaml(root: &std::path::Path) -> String {
    format!(
        r#"
site_url: https://example.com
site_location: {root}
media_metadata: {root}/_data/media.yml
media_endpoint: https://example.com/micropub
token_endpoint: https://tokens.example.com/token
categories: {root}/_data/categories.json
feed:
  uid: blog
  name: Blog
syndicate_to:
  - uid: https://social.example.com/
    name: Social
public_queries: [config]
front_matter:
  all:
    title: {{ property: name }}
    kind: {{ property: type }}
    tags: {{ property: category }}
    layout: post
  note:
    layout: note
    images: {{ property: photo }}
  like:
    layout: like
    target: {{ property: like-of }}
"#,
        root = root.display()
    )
}

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    pub dir: TempDir,
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// A fresh site gated by [`StaticVerifier`].
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(StaticVerifier))
    }

    pub fn with_verifier(verifier: Arc<dyn TokenVerifier>) -> Self {
        let dir = TempDir::new().expect("Failed to create site directory");

        let data = dir.path().join("_data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(
            data.join("categories.json"),
            r#"{"categories":["books","travel"]}"#,
        )
        .unwrap();

        let site = SiteConfig::from_yaml(&site_yaml(dir.path())).expect("Failed to parse site");
        let state = AppState::new(site, verifier);
        let router = build_router(state.clone(), MICROPUB);

        Self { dir, router, state }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Authenticated GET of the micropub endpoint with a query string.
    pub async fn query(&self, query: &str) -> Response {
        self.request(
            Request::get(format!("{MICROPUB}?{query}"))
                .header(header::AUTHORIZATION, TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Authenticated url-encoded POST.
    pub async fn post_form(&self, body: &str) -> Response {
        self.request(
            Request::post(MICROPUB)
                .header(header::AUTHORIZATION, TOKEN)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Authenticated JSON POST.
    pub async fn post_json(&self, body: serde_json::Value) -> Response {
        self.request(
            Request::post(MICROPUB)
                .header(header::AUTHORIZATION, TOKEN)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Authenticated multipart POST.
    pub async fn post_multipart(&self, parts: &[Part<'_>]) -> Response {
        self.request(
            Request::post(MICROPUB)
                .header(header::AUTHORIZATION, TOKEN)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(parts)))
                .unwrap(),
        )
        .await
    }

    /// Ids of the stored posts, newest first.
    pub async fn post_ids(&self) -> Vec<String> {
        self.state.posts().list().await.unwrap()
    }
}

/// One multipart part: a text field or a file.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; \
                         name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Read a response body as bytes.
pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}

/// Location header of a response.
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}
