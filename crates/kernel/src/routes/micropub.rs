//! Micropub endpoint.
//!
//! One route serves every operation. The request is decoded into an entry
//! message, the operation is picked from `q`, `action` or an uploaded
//! `file`, the bearer token is checked, and the operation runs. A configured
//! command hook fires after any success.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::entry::decode::{is_form_encoded, is_multipart};
use crate::entry::{
    EntryMessage, Operation, Params, Query, RawRequest, Upload, decode, normalize,
    select_operation,
};
use crate::error::{AppError, AppResult};
use crate::front_matter::{self, project};
use crate::hooks;
use crate::media::LAST_UPLOAD_WINDOW;
use crate::post::{Post, StoreError};
use crate::state::AppState;
use crate::timeline;

/// Largest accepted request body (multipart uploads included).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Create the micropub router mounted at `path`.
pub fn router(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, get(micropub).post(micropub))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
}

/// Micropub handler.
///
/// Decode and auth failures short-circuit before anything is written.
async fn micropub(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let raw = read_request(&state, request).await?;
    let message = decode(&raw)?;
    let operation = select_operation(&raw.params, message.as_ref())?;

    debug!(%operation, message = ?message, "request decoded");

    let public =
        matches!(operation, Operation::Query(q) if state.site().is_public_query(q.as_str()));
    if !public && !state.verifier().verify(authorization.as_deref()).await {
        return Err(AppError::Unauthorized);
    }

    let response = match operation {
        Operation::Create => create(&state, message).await?,
        Operation::Upload => upload(&state, message).await?,
        Operation::Update | Operation::Delete => {
            info!(%operation, "acknowledged without changes");
            StatusCode::OK.into_response()
        }
        Operation::Query(q) => query(&state, q, &raw.params, message.as_ref()).await?,
    };

    hooks::spawn_hook(state.site(), operation);

    Ok(response)
}

/// Collect parameters and body according to the content type.
///
/// Query-string parameters come first, form parameters after them.
async fn read_request(state: &AppState, request: Request) -> AppResult<RawRequest> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut params = request
        .uri()
        .query()
        .map(|q| Params::from_urlencoded(q.as_bytes()))
        .unwrap_or_default();

    if is_multipart(content_type.as_deref()) {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::MalformedBody(e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::MalformedBody(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::MalformedBody(e.body_text()))?;
                    params.push_file(name, Upload::new(Some(file_name), data));
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::MalformedBody(e.body_text()))?;
                    params.push_text(name, text);
                }
            }
        }

        return Ok(RawRequest {
            content_type,
            params,
            body: Bytes::new(),
        });
    }

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| AppError::MalformedBody(e.body_text()))?;

    if is_form_encoded(content_type.as_deref()) {
        params.extend_urlencoded(&body);
        return Ok(RawRequest {
            content_type,
            params,
            body: Bytes::new(),
        });
    }

    Ok(RawRequest {
        content_type,
        params,
        body,
    })
}

async fn create(state: &AppState, message: Option<EntryMessage>) -> AppResult<Response> {
    let Some(mut message) = message else {
        return Err(AppError::BadRequest("nothing to create".to_string()));
    };

    normalize(&mut message, Local::now().fixed_offset());
    let post = front_matter::map(&message, state.site(), state.media()).await?;
    state.posts().write(&post).await?;

    let published = message
        .published()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("published missing after normalize")))?;
    let location = state.site().permalink(&published, &post.slug);

    info!(id = %post.id, %location, "post created");

    Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response())
}

async fn upload(state: &AppState, message: Option<EntryMessage>) -> AppResult<Response> {
    let Some(upload) = message.and_then(|m| m.file) else {
        return Err(AppError::BadRequest("file must be an uploaded file".to_string()));
    };

    let record = state.media().ingest(&upload, None).await?;

    Ok((StatusCode::CREATED, [(LOCATION, record.public_url)]).into_response())
}

/// Value of a query argument, from the parameters or a JSON body.
fn argument<'a>(
    params: &'a Params,
    message: Option<&'a EntryMessage>,
    name: &str,
) -> Option<&'a str> {
    params
        .first_text(name)
        .or_else(|| message.and_then(|m| m.query.get(name)).map(String::as_str))
}

async fn query(
    state: &AppState,
    query: Query,
    params: &Params,
    message: Option<&EntryMessage>,
) -> AppResult<Response> {
    let site = state.site();

    let body = match query {
        Query::Channels => json!({
            "channels": [
                {"uid": "notifications", "name": "Notifications"},
                {"uid": site.feed.uid, "name": site.feed.name},
            ]
        }),
        Query::Timeline => {
            let timeline = timeline::timeline(
                state.posts(),
                site,
                argument(params, message, "before"),
                argument(params, message, "after"),
            )
            .await?;
            serde_json::to_value(timeline).map_err(anyhow::Error::from)?
        }
        Query::Category => return categories(state).await,
        Query::SyndicateTo => json!({ "syndicate-to": site.syndicate_to }),
        Query::Config => {
            let mut config = Map::new();
            if let Some(endpoint) = &site.media_endpoint {
                config.insert("media-endpoint".into(), json!(endpoint));
            }
            config.insert("syndicate-to".into(), json!(site.syndicate_to));
            Value::Object(config)
        }
        Query::Source => {
            let post = find_source(state, params, message).await?;
            source(state, &post)
        }
        Query::Last => {
            match state
                .media()
                .last_upload_within(Utc::now(), LAST_UPLOAD_WINDOW)
                .await
            {
                Some(url) => json!({ "url": url }),
                None => json!({}),
            }
        }
    };

    Ok(Json(body).into_response())
}

/// The configured category document, passed through unchanged.
async fn categories(state: &AppState) -> AppResult<Response> {
    let Some(path) = &state.site().categories else {
        return Ok(Json(json!({ "categories": [] })).into_response());
    };

    let raw = tokio::fs::read(path).await?;
    Ok(([(CONTENT_TYPE, "application/json")], raw).into_response())
}

/// Resolve `q=source` to a post by `id` or by permalink `url`.
async fn find_source(
    state: &AppState,
    params: &Params,
    message: Option<&EntryMessage>,
) -> AppResult<Post> {
    if let Some(id) = argument(params, message, "id") {
        return Ok(state.posts().read(id).await?);
    }

    let Some(url) = argument(params, message, "url") else {
        return Err(AppError::BadRequest("source needs a url or id".to_string()));
    };

    let slug = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if slug.is_empty() {
        return Err(AppError::NotFound);
    }

    for id in state.posts().list().await? {
        if Post::slug_from_id(&id) != slug {
            continue;
        }

        let post = match state.posts().read(&id).await {
            Ok(post) => post,
            Err(StoreError::NotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let matches = post
            .date()
            .is_some_and(|date| state.site().permalink(&date, &post.slug) == url);
        if matches {
            return Ok(post);
        }
    }

    Err(AppError::NotFound)
}

/// A post as an `h-entry` with list-valued properties.
fn source(state: &AppState, post: &Post) -> Value {
    let table = timeline::mappings_for(state.site(), post);

    let mut properties: Map<String, Value> = project(&table, &post.front_matter)
        .into_iter()
        .map(|(name, value)| match value {
            list @ Value::Array(_) => (name, list),
            scalar => (name, Value::Array(vec![scalar])),
        })
        .collect();
    properties.insert("content".into(), json!([post.content]));

    if let Some(date) = post.date() {
        properties.insert("published".into(), json!([date.to_rfc3339()]));
    }

    json!({ "type": ["h-entry"], "properties": properties })
}
