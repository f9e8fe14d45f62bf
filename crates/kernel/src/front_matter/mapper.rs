//! Entry → post mapping.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::Mapping;
use crate::config::SiteConfig;
use crate::entry::{EntryMessage, PropertyValue};
use crate::media::{MediaError, MediaStore};
use crate::post::{FrontMatter, Post};

/// Property whose uploads become image descriptors.
const PHOTO_PROPERTY: &str = "photo";

/// Alternative texts, index-aligned with `photo`.
const PHOTO_ALT_PROPERTY: &str = "mp-photo-alt";

#[derive(Debug, Error)]
pub enum MapError {
    #[error("entry has not been normalized")]
    Unnormalized,

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Project a normalized entry into a post.
///
/// Front matter holds exactly the keys of the effective mapping table whose
/// source is present, plus `date`. Uploaded files referenced by mapped
/// properties are ingested into the media store, owned by the new post.
pub async fn map(
    message: &EntryMessage,
    site: &SiteConfig,
    media: &MediaStore,
) -> Result<Post, MapError> {
    let (Some(id), Some(slug), Some(published)) =
        (message.id.as_deref(), message.slug.as_deref(), message.published())
    else {
        return Err(MapError::Unnormalized);
    };

    let categories = message.categories();
    let table = site.mappings(message.text("type"), &categories);

    let mut front_matter = FrontMatter::new();
    let mut photos: Option<Value> = None;

    for (key, mapping) in &table {
        let value = match mapping {
            Mapping::Literal(value) => value.clone(),
            Mapping::PropertyRef(source) => {
                let Some(value) = message.properties.get(&source.property) else {
                    continue;
                };

                if source.property == PHOTO_PROPERTY {
                    if photos.is_none() {
                        photos = Some(attach_photos(message, value, id, media).await?);
                    }
                    photos.clone().unwrap_or_default()
                } else if value.is_upload() {
                    attach_uploads(value, id, media).await?
                } else {
                    value.to_json()
                }
            }
        };

        front_matter.insert(key.clone(), value);
    }

    front_matter.insert("date".to_string(), Value::String(published.to_rfc3339()));

    let post = Post {
        id: id.to_string(),
        slug: slug.to_string(),
        front_matter,
        content: message.text("content").unwrap_or_default().to_string(),
    };

    debug!(id = %post.id, keys = post.front_matter.len(), "entry mapped");
    Ok(post)
}

/// Turn `photo` values into `{path, alt?}` image descriptors.
async fn attach_photos(
    message: &EntryMessage,
    photos: &PropertyValue,
    post_id: &str,
    media: &MediaStore,
) -> Result<Value, MediaError> {
    let alts: Vec<&str> = message
        .properties
        .get(PHOTO_ALT_PROPERTY)
        .map(|v| v.items().iter().map(|a| a.as_text().unwrap_or_default()).collect())
        .unwrap_or_default();

    let mut images = Vec::new();

    for (index, photo) in photos.items().iter().enumerate() {
        let mut image = Map::new();

        match photo {
            PropertyValue::Upload(upload) => {
                let record = media.ingest(upload, Some(post_id)).await?;
                image.insert("path".into(), Value::String(record.relative_url));
            }
            PropertyValue::Text(url) => {
                image.insert("path".into(), Value::String(url.clone()));
            }
            PropertyValue::Structured(object) => {
                let Some(url) = object.get("value").and_then(Value::as_str) else {
                    continue;
                };
                image.insert("path".into(), Value::String(url.to_string()));
                if let Some(alt) = object.get("alt").and_then(Value::as_str) {
                    image.insert("alt".into(), Value::String(alt.to_string()));
                }
            }
            PropertyValue::Published(_) | PropertyValue::List(_) => continue,
        }

        if let Some(alt) = alts.get(index).filter(|a| !a.is_empty()) {
            image.insert("alt".into(), Value::String((*alt).to_string()));
        }

        images.push(Value::Object(image));
    }

    Ok(Value::Array(images))
}

/// Uploads outside `photo` are stored and referenced by relative URL.
async fn attach_uploads(
    value: &PropertyValue,
    post_id: &str,
    media: &MediaStore,
) -> Result<Value, MediaError> {
    let mut items = Vec::new();
    for item in value.items() {
        match item {
            PropertyValue::Upload(upload) => {
                let record = media.ingest(upload, Some(post_id)).await?;
                items.push(Value::String(record.relative_url));
            }
            other => items.push(other.to_json()),
        }
    }
    Ok(Value::Array(items))
}
