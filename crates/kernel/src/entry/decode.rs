//! Request decoding.
//!
//! Turns the three client encodings (url-encoded form, multipart form, JSON
//! body) into one [`EntryMessage`], and picks the [`Operation`] a request
//! asks for.

use std::collections::BTreeMap;

use axum::body::Bytes;
use serde_json::Value;
use thiserror::Error;

use super::{EntryMessage, Operation, PropertyValue, Upload};

const MULTIPART_FORM: &str = "multipart/form-data";
const URLENCODED_FORM: &str = "application/x-www-form-urlencoded";

/// Decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("{0}")]
    UnknownOperation(String),
}

/// One query or form parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    File(Upload),
}

/// Query and form parameters in arrival order; names may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `application/x-www-form-urlencoded` bytes (also query strings).
    pub fn from_urlencoded(input: &[u8]) -> Self {
        let mut params = Self::new();
        params.extend_urlencoded(input);
        params
    }

    pub fn extend_urlencoded(&mut self, input: &[u8]) {
        for (name, value) in url::form_urlencoded::parse(input) {
            self.push_text(name.into_owned(), value.into_owned());
        }
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), ParamValue::Text(value.into())));
    }

    pub fn push_file(&mut self, name: impl Into<String>, upload: Upload) {
        self.0.push((name.into(), ParamValue::File(upload)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    /// First text value of `name`.
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.0.iter().find_map(|(n, v)| match v {
            ParamValue::Text(s) if n == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// First uploaded file named `name`.
    pub fn first_file(&self, name: &str) -> Option<&Upload> {
        self.0.iter().find_map(|(n, v)| match v {
            ParamValue::File(upload) if n == name => Some(upload),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Transport-level view of one request.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub content_type: Option<String>,
    /// Query-string parameters merged with form parameters.
    pub params: Params,
    /// Raw body; empty when the body was a form.
    pub body: Bytes,
}

/// Whether a content type carries form parameters rather than a document.
pub fn is_form_encoded(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with(MULTIPART_FORM) || ct.starts_with(URLENCODED_FORM))
}

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with(MULTIPART_FORM))
}

/// Decode a request into an entry message.
///
/// Returns `Ok(None)` when the request carries nothing to act on (no
/// recognised parameters and an empty body).
pub fn decode(request: &RawRequest) -> Result<Option<EntryMessage>, DecodeError> {
    let body = parse_body(request)?;
    let params = &request.params;

    if params.contains("h") {
        return Ok(Some(decode_entry_params(params)));
    }

    if params.contains("q") || params.contains("action") {
        return Ok(Some(decode_query_params(params)));
    }

    if params.contains("file") {
        return Ok(params.first_file("file").map(|upload| EntryMessage {
            file: Some(upload.clone()),
            ..Default::default()
        }));
    }

    body.map(decode_document).transpose()
}

/// Pick the operation a request asks for.
///
/// `q` wins over `action`, which wins over an uploaded `file`; anything else
/// is a create.
pub fn select_operation(
    params: &Params,
    message: Option<&EntryMessage>,
) -> Result<Operation, DecodeError> {
    if let Some(q) = params.first_text("q") {
        return q
            .parse()
            .map(Operation::Query)
            .map_err(DecodeError::UnknownOperation);
    }

    let action = params
        .first_text("action")
        .or_else(|| message.and_then(|m| m.action.as_deref()));

    if let Some(action) = action {
        return match action {
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DecodeError::UnknownOperation(format!(
                "unknown action: {other}"
            ))),
        };
    }

    if params.contains("file") {
        return Ok(Operation::Upload);
    }

    Ok(Operation::Create)
}

fn parse_body(request: &RawRequest) -> Result<Option<Value>, DecodeError> {
    if is_form_encoded(request.content_type.as_deref()) || request.body.is_empty() {
        return Ok(None);
    }

    serde_json::from_slice(&request.body)
        .map(Some)
        .map_err(|e| DecodeError::MalformedBody(e.to_string()))
}

fn strip_array_suffix(name: &str) -> &str {
    name.strip_suffix("[]").unwrap_or(name)
}

/// Url-encoded micropub: every parameter except `h` is a property.
fn decode_entry_params(params: &Params) -> EntryMessage {
    let kind = params.first_text("h").unwrap_or("entry");
    let mut message = EntryMessage::new(kind);

    for (name, value) in params.iter() {
        if name == "h" {
            continue;
        }

        let value = match value {
            ParamValue::Text(s) => PropertyValue::Text(s.clone()),
            ParamValue::File(upload) => PropertyValue::Upload(upload.clone()),
        };

        let entry = message
            .properties
            .entry(strip_array_suffix(name).to_string())
            .or_insert_with(|| PropertyValue::List(Vec::new()));

        if let PropertyValue::List(items) = entry {
            items.push(value);
        }
    }

    message
}

/// Query and action requests keep only scalar fields.
fn decode_query_params(params: &Params) -> EntryMessage {
    let mut query = BTreeMap::new();

    for (name, value) in params.iter() {
        if let ParamValue::Text(s) = value {
            query
                .entry(strip_array_suffix(name).to_string())
                .or_insert_with(|| s.clone());
        }
    }

    EntryMessage {
        action: query.get("action").cloned(),
        query,
        ..Default::default()
    }
}

/// JSON micropub: the body is the message.
fn decode_document(body: Value) -> Result<EntryMessage, DecodeError> {
    let Value::Object(mut object) = body else {
        return Err(DecodeError::MalformedBody(
            "expected a JSON object".to_string(),
        ));
    };

    let mut message = EntryMessage {
        kind: object.remove("type").map(PropertyValue::from_json),
        ..Default::default()
    };

    match object.remove("action") {
        Some(Value::String(action)) => message.action = Some(action),
        Some(_) => {
            return Err(DecodeError::MalformedBody(
                "action must be a string".to_string(),
            ));
        }
        None => {}
    }

    match object.remove("properties") {
        Some(Value::Object(properties)) => {
            for (name, value) in properties {
                let value = match PropertyValue::from_json(value) {
                    list @ PropertyValue::List(_) => list,
                    scalar => PropertyValue::list_of(scalar),
                };
                message.properties.insert(name, value);
            }
        }
        Some(_) => {
            return Err(DecodeError::MalformedBody(
                "properties must be an object".to_string(),
            ));
        }
        None => {}
    }

    for (name, value) in object {
        if let Value::String(s) = &value {
            message.query.insert(name.clone(), s.clone());
        }
        message.extra.insert(name, PropertyValue::from_json(value));
    }

    Ok(message)
}
