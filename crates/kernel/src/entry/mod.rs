//! Entry messages.
//!
//! An [`EntryMessage`] is the request-scoped, canonical form of one micropub
//! submission. The decoder builds it from whichever encoding the client used,
//! the normalizer completes it in place, and the front-matter mapper consumes
//! it to produce a [`Post`](crate::post::Post).

pub mod decode;
pub mod normalize;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use axum::body::Bytes;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;

pub use decode::{DecodeError, ParamValue, Params, RawRequest, decode, select_operation};
pub use normalize::normalize;

/// A file received in a multipart request.
#[derive(Clone, PartialEq)]
pub struct Upload {
    /// File name as sent by the client; never used to pick a storage name.
    pub file_name: Option<String>,
    pub data: Bytes,
}

impl Upload {
    pub fn new(file_name: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name,
            data: data.into(),
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Value of one entry property.
///
/// Every encoding delivers properties as lists; the normalizer collapses the
/// scalar-only ones to their first element.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    /// A `published` timestamp after normalization.
    Published(DateTime<FixedOffset>),
    /// Nested JSON such as an `h-cite` object or `{value, alt}` photo.
    Structured(Value),
    Upload(Upload),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Wrap a single value as a one-element list.
    pub fn list_of(value: PropertyValue) -> Self {
        Self::List(vec![value])
    }

    /// Convert a JSON value, preserving list shape.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            other => Self::Structured(other),
        }
    }

    /// Text of a scalar value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// First element of a list, or the value itself when already scalar.
    pub fn into_first(self) -> Option<Self> {
        match self {
            Self::List(items) => items.into_iter().next(),
            other => Some(other),
        }
    }

    /// Elements of a list; a scalar counts as a one-element list.
    pub fn items(&self) -> &[PropertyValue] {
        match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    pub fn is_upload(&self) -> bool {
        self.items().iter().any(|v| matches!(v, Self::Upload(_)))
    }

    /// JSON rendering used for front matter and query responses.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Published(date) => Value::String(date.to_rfc3339()),
            Self::Structured(v) => v.clone(),
            Self::Upload(upload) => Value::String(upload.file_name.clone().unwrap_or_default()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Property name → value.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Canonical form of one inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryMessage {
    /// Microformat type, e.g. `h-entry`.
    pub kind: Option<PropertyValue>,

    /// Top-level fields other than `type`, `properties` and `action`.
    pub extra: Properties,

    pub properties: Properties,

    /// Derived by the normalizer.
    pub slug: Option<String>,

    /// Derived by the normalizer: `YYYY-MM-DD-slug`.
    pub id: Option<String>,

    pub action: Option<String>,

    /// Scalar query fields (`q`, `before`, `after`, `url`, ...).
    pub query: BTreeMap<String, String>,

    /// Media endpoint upload.
    pub file: Option<Upload>,
}

impl EntryMessage {
    /// An `h-<kind>` message with no properties.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: Some(PropertyValue::Text(format!("h-{kind}"))),
            ..Default::default()
        }
    }

    /// Set a property as a one-element list, the shape decoders produce.
    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties
            .insert(name.to_string(), PropertyValue::list_of(value.into()));
        self
    }

    /// Text of a scalar property.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_text)
    }

    /// Resolved `published` instant, once normalized.
    pub fn published(&self) -> Option<DateTime<FixedOffset>> {
        match self.properties.get("published") {
            Some(PropertyValue::Published(date)) => Some(*date),
            _ => None,
        }
    }

    /// Categories declared by the entry, in order.
    pub fn categories(&self) -> Vec<String> {
        self.properties
            .get("category")
            .map(|v| {
                v.items()
                    .iter()
                    .filter_map(|c| c.as_text().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Named read operations selected by `q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Channels,
    Timeline,
    Category,
    SyndicateTo,
    Config,
    Source,
    Last,
}

impl Query {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channels => "channels",
            Self::Timeline => "timeline",
            Self::Category => "category",
            Self::SyndicateTo => "syndicate-to",
            Self::Config => "config",
            Self::Source => "source",
            Self::Last => "last",
        }
    }
}

impl FromStr for Query {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channels" => Ok(Self::Channels),
            "timeline" => Ok(Self::Timeline),
            "category" => Ok(Self::Category),
            "syndicate-to" => Ok(Self::SyndicateTo),
            "config" => Ok(Self::Config),
            "source" => Ok(Self::Source),
            "last" => Ok(Self::Last),
            other => Err(format!("unknown query: {other}")),
        }
    }
}

/// What a request asks the endpoint to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Upload,
    Query(Query),
}

impl Operation {
    /// Name used for command hooks and logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upload => "upload",
            Self::Query(q) => q.as_str(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
