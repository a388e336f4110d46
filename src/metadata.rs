//! Open-ended metadata attached to entities and relationships.
//!
//! Metadata is opaque to the store: it is encoded to JSON on write and decoded on read.
//! A stored blob that fails to decode degrades to "no metadata" plus a warning, it never
//! fails the read that encountered it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key → value map carried by entities and relationships
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

/// Encode metadata for storage. Empty maps are stored as NULL.
pub fn encode(metadata: Option<&Metadata>) -> crate::Result<Option<String>> {
    match metadata {
        Some(map) if !map.is_empty() => Ok(Some(serde_json::to_string(map)?)),
        _ => Ok(None),
    }
}

/// Decode a stored metadata blob. `owner` names the row for the warning.
pub fn decode(raw: Option<String>, owner: &str) -> Option<Metadata> {
    let raw = raw?;
    match serde_json::from_str::<Metadata>(&raw) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!("Ignoring malformed metadata on {}: {}", owner, e);
            None
        }
    }
}
