//! Documents, revisions, and typed accessors over JSON payloads.
//!
//! All manifest payloads are [`serde_json::Value`] trees. The accessors in
//! this module fail with a [`ShapeError`] naming the location instead of
//! silently defaulting, so a changed upstream shape surfaces immediately.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::ShapeError;

/// A schemaless store document: a JSON object.
pub type Document = Map<String, Value>;

/// Opaque revision token assigned by the store on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wraps a store-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as read from the store, with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document body, without store bookkeeping fields.
    pub body: Document,
    /// Current revision token.
    pub revision: Revision,
}

/// Outcome of a document lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The document exists.
    Found(StoredDocument),
    /// No document with that id.
    NotFound,
}

impl Lookup {
    /// Splits into a baseline body (empty when missing) and an optional revision.
    pub fn into_baseline(self) -> (Document, Option<Revision>) {
        match self {
            Lookup::Found(doc) => (doc.body, Some(doc.revision)),
            Lookup::NotFound => (Document::new(), None),
        }
    }
}

/// Shallow merge: every top-level key of `patch` replaces the same key in
/// `baseline` wholesale; keys only in `baseline` are kept.
pub fn merge_patch(baseline: &Document, patch: &Document) -> Document {
    let mut merged = baseline.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Borrows `value` as an object.
pub fn as_object<'a>(value: &'a Value, location: &str) -> Result<&'a Document, ShapeError> {
    value.as_object().ok_or_else(|| shape("object", location))
}

/// Takes ownership of `value` as an object.
pub fn into_object(value: Value, location: &str) -> Result<Document, ShapeError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(shape("object", location)),
    }
}

/// Borrows `value` as an array.
pub fn as_array<'a>(value: &'a Value, location: &str) -> Result<&'a Vec<Value>, ShapeError> {
    value.as_array().ok_or_else(|| shape("array", location))
}

/// Borrows `value` as a string.
pub fn as_str<'a>(value: &'a Value, location: &str) -> Result<&'a str, ShapeError> {
    value.as_str().ok_or_else(|| shape("string", location))
}

/// Looks up a required field of an object.
pub fn field<'a>(object: &'a Document, key: &str, location: &str) -> Result<&'a Value, ShapeError> {
    object
        .get(key)
        .ok_or_else(|| shape("field", &format!("{location}.{key}")))
}

/// Renders a scalar identifier (string or integer) as a document id.
pub fn id_of(value: &Value, location: &str) -> Result<String, ShapeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(shape("string or integer id", location)),
    }
}

fn shape(expected: &'static str, location: &str) -> ShapeError {
    ShapeError {
        expected,
        location: location.to_owned(),
    }
}
