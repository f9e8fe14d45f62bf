#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests for the micropub endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

use common::{MICROPUB, PNG, Part, TestApp, body_bytes, body_json, location};
use quire_kernel::auth::RemoteTokenVerifier;

fn encode(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app
        .request(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_create_from_form() {
    let app = TestApp::new();

    let response = app
        .post_form(
            "h=entry&content=Hello+world&published=2024-03-01T10%3A00%3A00Z&category%5B%5D=misc",
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        location(&response),
        "https://example.com/2024/03/01/hello-world"
    );

    let post = app.state.posts().read("2024-03-01-hello-world").await.unwrap();
    assert_eq!(post.content, "Hello world");
    assert_eq!(post.front_matter["title"], json!("Hello world"));
    assert_eq!(post.front_matter["kind"], json!("note"));
    assert_eq!(post.front_matter["layout"], json!("note"));
    assert_eq!(post.front_matter["tags"], json!(["misc"]));
    assert_eq!(post.front_matter["date"], json!("2024-03-01T10:00:00+00:00"));
}

#[tokio::test]
async fn test_create_from_json_like() {
    let app = TestApp::new();

    let response = app
        .post_json(json!({
            "type": ["h-entry"],
            "properties": {
                "like-of": ["https://other.example.com/post"],
                "published": ["2024-05-06T08:00:00+02:00"]
            }
        }))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    let ids = app.post_ids().await;
    assert_eq!(ids.len(), 1);
    assert!(ids[0].starts_with("2024-05-06-"), "{}", ids[0]);

    let post = app.state.posts().read(&ids[0]).await.unwrap();
    assert_eq!(post.front_matter["kind"], json!("like"));
    assert_eq!(post.front_matter["layout"], json!("like"));
    assert_eq!(
        post.front_matter["target"],
        json!("https://other.example.com/post")
    );
}

#[tokio::test]
async fn test_create_with_numeric_published_defaults_date() {
    let app = TestApp::new();

    let response = app
        .post_json(json!({
            "type": ["h-entry"],
            "properties": {
                "content": ["hi"],
                "published": [12345]
            }
        }))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(location(&response).ends_with("/hi"));

    let ids = app.post_ids().await;
    assert_eq!(ids.len(), 1);
    assert!(ids[0].ends_with("-hi"), "{}", ids[0]);
}

#[tokio::test]
async fn test_create_multipart_with_photo() {
    let app = TestApp::new();

    let response = app
        .post_multipart(&[
            Part::Text("h", "entry"),
            Part::Text("content", "Sunset"),
            Part::Text("published", "2024-03-02T19:00:00Z"),
            Part::File("photo", "sunset.jpg", PNG),
            Part::Text("mp-photo-alt", "An orange sky"),
        ])
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    let post = app.state.posts().read("2024-03-02-sunset").await.unwrap();
    let images = post.front_matter["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["alt"], json!("An orange sky"));

    let path = images[0]["path"].as_str().unwrap();
    assert!(path.starts_with("/images/") && path.ends_with(".png"), "{path}");
    assert_eq!(
        std::fs::read(app.dir.path().join(path.trim_start_matches('/'))).unwrap(),
        PNG
    );

    let records = app.state.media().records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].owning_post_id.as_deref(), Some("2024-03-02-sunset"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new();

    // Decoding happens before authentication.
    let response = app
        .request(
            Request::post(MICROPUB)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.post_ids().await.is_empty());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .request(
            Request::post(MICROPUB)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("h=entry&content=nope"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.post_ids().await.is_empty());
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .request(
            Request::get(format!("{MICROPUB}?q=channels"))
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_query_skips_auth() {
    let app = TestApp::new();

    let response = app
        .request(
            Request::get(format!("{MICROPUB}?q=config"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "media-endpoint": "https://example.com/micropub",
            "syndicate-to": [{"uid": "https://social.example.com/", "name": "Social"}]
        })
    );
}

#[tokio::test]
async fn test_unknown_query_and_action() {
    let app = TestApp::new();

    assert_eq!(app.query("q=nonsense").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.post_form("action=undelete&url=x").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_empty_create_is_bad_request() {
    let app = TestApp::new();

    let response = app
        .request(
            Request::post(MICROPUB)
                .header(header::AUTHORIZATION, common::TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_delete_acknowledged() {
    let app = TestApp::new();
    app.post_form("h=entry&content=Keep+me&published=2024-03-01T10%3A00%3A00Z")
        .await;

    let response = app
        .post_json(json!({"action": "delete", "url": "https://example.com/2024/03/01/keep-me"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());

    let response = app.post_form("action=update&url=x").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.post_ids().await, vec!["2024-03-01-keep-me"]);
}

#[tokio::test]
async fn test_channels_syndicate_and_category() {
    let app = TestApp::new();

    let channels = body_json(app.query("q=channels").await).await;
    assert_eq!(
        channels,
        json!({"channels": [
            {"uid": "notifications", "name": "Notifications"},
            {"uid": "blog", "name": "Blog"}
        ]})
    );

    let syndicate = body_json(app.query("q=syndicate-to").await).await;
    assert_eq!(syndicate["syndicate-to"][0]["name"], json!("Social"));

    let response = app.query("q=category").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        body_json(response).await,
        json!({"categories": ["books", "travel"]})
    );
}

#[tokio::test]
async fn test_timeline_paging() {
    let app = TestApp::new();

    for day in 1..=8 {
        let response = app
            .post_json(json!({
                "type": ["h-entry"],
                "properties": {
                    "content": [format!("Entry {day}")],
                    "published": [format!("2024-01-{day:02}T12:00:00Z")]
                }
            }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let first = body_json(app.query("q=timeline&channel=blog").await).await;
    let items = first["items"].as_array().unwrap();
    assert_eq!(items.len(), 6);
    assert_eq!(items[0]["uid"], json!("2024-01-08-entry-8"));
    assert_eq!(items[0]["type"], json!("entry"));
    assert_eq!(items[0]["name"], json!("Entry 8"));
    assert_eq!(items[0]["content"], json!({"text": "Entry 8"}));
    assert!(items[0].get("layout").is_none());
    assert_eq!(first["paging"], json!({"after": "2024-01-03-entry-3"}));

    let second = body_json(
        app.query(&encode(&[("q", "timeline"), ("after", "2024-01-03-entry-3")]))
            .await,
    )
    .await;
    let uids: Vec<_> = second["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["uid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(uids, vec!["2024-01-02-entry-2", "2024-01-01-entry-1"]);
    assert_eq!(second["paging"], json!({"before": "2024-01-02-entry-2"}));

    let back = body_json(
        app.query(&encode(&[("q", "timeline"), ("before", "2024-01-02-entry-2")]))
            .await,
    )
    .await;
    assert_eq!(back["items"].as_array().unwrap().len(), 6);
    assert_eq!(back["items"][5]["uid"], json!("2024-01-03-entry-3"));
}

#[tokio::test]
async fn test_timeline_empty() {
    let app = TestApp::new();
    assert_eq!(
        body_json(app.query("q=timeline").await).await,
        json!({"items": [], "paging": {}})
    );
}

#[tokio::test]
async fn test_source_by_url_and_id() {
    let app = TestApp::new();
    app.post_form(
        "h=entry&name=Trip+report&content=We+went+places&published=2024-03-01T10%3A00%3A00Z",
    )
    .await;

    let response = app
        .query(&encode(&[
            ("q", "source"),
            ("url", "https://example.com/2024/03/01/trip-report"),
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let source = body_json(response).await;
    assert_eq!(source["type"], json!(["h-entry"]));
    assert_eq!(source["properties"]["name"], json!(["Trip report"]));
    assert_eq!(source["properties"]["type"], json!(["article"]));
    assert_eq!(source["properties"]["content"], json!(["We went places"]));
    assert_eq!(
        source["properties"]["published"],
        json!(["2024-03-01T10:00:00+00:00"])
    );

    let by_id = body_json(app.query("q=source&id=2024-03-01-trip-report").await).await;
    assert_eq!(by_id, source);
}

#[tokio::test]
async fn test_source_unknown_is_not_found() {
    let app = TestApp::new();

    let response = app
        .query(&encode(&[
            ("q", "source"),
            ("url", "https://example.com/2024/03/01/missing"),
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.query("q=source&id=2024-03-01-missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_then_last() {
    let app = TestApp::new();

    assert_eq!(body_json(app.query("q=last").await).await, json!({}));

    let response = app
        .post_multipart(&[Part::File("file", "picture.gif", PNG)])
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let url = location(&response);
    assert!(url.starts_with("https://example.com/images/"), "{url}");
    assert!(url.ends_with(".png"), "{url}");

    let name = url.rsplit('/').next().unwrap();
    assert!(app.dir.path().join("images").join(name).exists());

    assert_eq!(
        body_json(app.query("q=last").await).await,
        json!({"url": url})
    );
}

#[tokio::test]
async fn test_remote_token_endpoint() {
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;

    async fn token(headers: HeaderMap) -> axum::response::Response {
        if headers.get(header::AUTHORIZATION).is_some_and(|v| v == "Bearer remote") {
            axum::Json(json!({"me": "https://example.com/", "scope": "create"})).into_response()
        } else {
            StatusCode::UNAUTHORIZED.into_response()
        }
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().route("/token", get(token)))
            .await
            .unwrap();
    });

    let verifier =
        RemoteTokenVerifier::new(format!("http://{addr}/token"), Duration::from_secs(5)).unwrap();
    let app = TestApp::with_verifier(Arc::new(verifier));

    let granted = app
        .request(
            Request::get(format!("{MICROPUB}?q=channels"))
                .header(header::AUTHORIZATION, "Bearer remote")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(granted.status(), StatusCode::OK);

    let denied = app
        .request(
            Request::get(format!("{MICROPUB}?q=channels"))
                .header(header::AUTHORIZATION, "Bearer other")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
}
