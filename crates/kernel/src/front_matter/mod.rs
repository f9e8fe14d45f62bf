//! Front-matter mapping tables.
//!
//! A mapping table says, for each front-matter key, whether it is filled
//! from an entry property or holds a fixed value. The same table read
//! backwards turns stored front matter into timeline fields.

pub mod mapper;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use mapper::{MapError, map};

use crate::post::FrontMatter;

/// Reference to an entry property, written `{ property: <name> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyRef {
    pub property: String,
}

/// One mapping table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mapping {
    PropertyRef(PropertyRef),
    Literal(Value),
}

impl Mapping {
    pub fn property(name: &str) -> Self {
        Self::PropertyRef(PropertyRef {
            property: name.to_string(),
        })
    }

    /// Source property name for a reference.
    pub fn source_property(&self) -> Option<&str> {
        match self {
            Self::PropertyRef(r) => Some(&r.property),
            Self::Literal(_) => None,
        }
    }
}

/// Front-matter key → mapping.
pub type MappingTable = BTreeMap<String, Mapping>;

/// Merge layers in order; entries of later layers replace earlier ones.
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a MappingTable>) -> MappingTable {
    let mut merged = MappingTable::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Front-matter key a table fills from `property`, if any.
pub fn key_for_property<'a>(table: &'a MappingTable, property: &str) -> Option<&'a str> {
    table
        .iter()
        .find(|(_, mapping)| mapping.source_property() == Some(property))
        .map(|(key, _)| key.as_str())
}

/// Read mapped front matter back into property-named fields.
///
/// Only property references whose key is present contribute; literals are
/// never reported.
pub fn project(table: &MappingTable, front_matter: &FrontMatter) -> Map<String, Value> {
    table
        .iter()
        .filter_map(|(key, mapping)| {
            let property = mapping.source_property()?;
            let value = front_matter.get(key)?;
            Some((property.to_string(), value.clone()))
        })
        .collect()
}
