//! Property normalization.
//!
//! Collapses scalar properties, fills in defaults, infers the post type and
//! a display name, and derives the slug and id. Running it twice leaves an
//! already-normalized message unchanged.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{EntryMessage, Properties, PropertyValue};

/// Properties that hold one value even though clients send lists.
const SCALAR_PROPERTIES: &[&str] = &[
    "type",
    "name",
    "summary",
    "content",
    "bookmark-of",
    "like-of",
    "repost-of",
    "in-reply-to",
    "read-of",
    "read-status",
    "published",
];

/// Characters of content kept when a note name is synthesized.
const NOTE_NAME_LENGTH: usize = 30;

const TRUNCATION_MARKER: &str = "...";

/// Target-carrying properties and the type each implies, in precedence order.
const RESPONSE_TYPES: &[(&str, &str)] = &[
    ("like-of", "like"),
    ("repost-of", "repost"),
    ("bookmark-of", "bookmark"),
];

/// A trailing partial word, with the separator before it.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static TRAILING_PARTIAL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W\w+\s*$").expect("valid regex literal"));

/// Runs of characters not allowed in a slug.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9-]+").expect("valid regex literal"));

/// Normalize a message in place.
///
/// `now` supplies the default `published` instant and the slug fallback for
/// unnamed posts.
pub fn normalize(message: &mut EntryMessage, now: DateTime<FixedOffset>) {
    message.kind = message.kind.take().and_then(PropertyValue::into_first);
    collapse(&mut message.extra);
    collapse(&mut message.properties);

    let props = &mut message.properties;

    props
        .entry("content".to_string())
        .or_insert_with(|| PropertyValue::Text(String::new()));

    props
        .entry("published".to_string())
        .or_insert(PropertyValue::Published(now));

    if !(props.contains_key("type") && props.contains_key("name")) {
        infer_type(props);
    }

    let name = message.text("name").unwrap_or_default().to_string();
    let slug = message
        .slug
        .get_or_insert_with(|| {
            let slug = slugify(&name);
            if slug.is_empty() {
                now.format("%H-%M-%S").to_string()
            } else {
                slug
            }
        })
        .clone();

    if message.id.is_none() {
        let published = message.published().unwrap_or(now);
        message.id = Some(format!("{}-{slug}", published.format("%Y-%m-%d")));
    }

    debug!(
        id = ?message.id,
        post_type = ?message.text("type"),
        "entry normalized"
    );
}

/// Lower-cased name with every run of disallowed characters turned into one
/// hyphen and trailing hyphens removed.
pub fn slugify(name: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(name, "-")
        .trim_end_matches('-')
        .to_lowercase()
}

/// Name for a note: its content, cut back to a whole word when longer than
/// [`NOTE_NAME_LENGTH`] characters.
pub fn note_name(content: &str) -> String {
    if content.chars().count() <= NOTE_NAME_LENGTH {
        return content.to_string();
    }

    let head: String = content.chars().take(NOTE_NAME_LENGTH + 1).collect();
    let trimmed = TRAILING_PARTIAL_WORD.replace(&head, "");
    format!("{trimmed}{TRUNCATION_MARKER}")
}

/// Replace scalar-only lists with their first element.
fn collapse(props: &mut Properties) {
    for &key in SCALAR_PROPERTIES {
        let Some(value) = props.remove(key) else {
            continue;
        };

        let Some(value) = value.into_first() else {
            continue;
        };

        let value = match (key, value) {
            ("published", PropertyValue::Published(date)) => PropertyValue::Published(date),
            ("published", PropertyValue::Text(raw)) => match parse_published(&raw) {
                Some(date) => PropertyValue::Published(date),
                None => {
                    warn!(published = %raw, "ignoring unparseable published timestamp");
                    continue;
                }
            },
            ("published", other) => {
                warn!(published = ?other, "ignoring non-text published timestamp");
                continue;
            }
            ("content", PropertyValue::Structured(content)) => {
                PropertyValue::Text(content_text(&content))
            }
            (_, value) => value,
        };

        props.insert(key.to_string(), value);
    }
}

/// Parse a client timestamp. Offsets are kept so the id uses the author's date.
fn parse_published(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(date) = DateTime::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Text of a structured `content` value (`{"html": ...}` or `{"text": ...}`).
fn content_text(content: &Value) -> String {
    ["html", "text", "value"]
        .iter()
        .find_map(|key| content.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_default()
}

fn set_text(props: &mut Properties, key: &str, value: impl Into<String>) {
    props.insert(key.to_string(), PropertyValue::Text(value.into()));
}

/// First string of `properties.<key>` in a microformats object.
fn mf2_first<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    let value = object.get("properties")?.get(key)?;
    match value {
        Value::Array(items) => items.first()?.as_str(),
        other => other.as_str(),
    }
}

/// Human-readable form of a response target (a URL or an `h-cite`).
fn describe_target(target: &PropertyValue) -> String {
    match target {
        PropertyValue::Structured(object) => mf2_first(object, "url")
            .or_else(|| mf2_first(object, "name"))
            .map(str::to_string)
            .unwrap_or_else(|| object.to_string()),
        other => other.as_text().unwrap_or_default().to_string(),
    }
}

fn infer_type(props: &mut Properties) {
    for &(key, post_type) in RESPONSE_TYPES {
        if let Some(target) = props.get(key) {
            let name = describe_target(target);
            set_text(props, "type", post_type);
            set_text(props, "name", name);
            return;
        }
    }

    if props.contains_key("read-of") {
        infer_read(props);
        return;
    }

    if props.contains_key("name") {
        set_text(props, "type", "article");
        return;
    }

    let content = props
        .get("content")
        .and_then(PropertyValue::as_text)
        .unwrap_or_default();
    let name = note_name(content);
    set_text(props, "type", "note");
    set_text(props, "name", name);
}

/// Reading progress posts take their name from the cited title and status.
fn infer_read(props: &mut Properties) {
    let (title, uid) = match props.get("read-of") {
        Some(PropertyValue::Structured(cite)) => (
            mf2_first(cite, "name").unwrap_or_default().to_string(),
            mf2_first(cite, "uid").map(str::to_string),
        ),
        Some(other) => (other.as_text().unwrap_or_default().to_string(), None),
        None => (String::new(), None),
    };

    set_text(props, "type", "read");
    set_text(props, "title", title.clone());

    if let Some((scheme, value)) = uid.as_deref().and_then(|uid| uid.split_once(':')) {
        set_text(props, scheme, value);
    }

    let name = match props.get("read-status").and_then(PropertyValue::as_text) {
        Some("to-read") => format!("Want to read {title}"),
        Some("reading") => format!("Currently reading {title}"),
        Some("finished") => format!("Finished reading {title}"),
        _ => title,
    };
    set_text(props, "name", name);
}
