// Documents are plain JSON objects; field order is preserved on disk.

use crate::error::{Result, ShelfDbError};
use serde_json::{Map, Value};

/// A stored record: a JSON object carrying the system-assigned `id` field
pub type Document = Map<String, Value>;

/// Name of the identifier field assigned on insert
pub const ID_FIELD: &str = "id";

/// Generate a fresh document identifier (random UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The identifier of a stored document, if it has one.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Convert a caller-supplied value into a document, rejecting anything that is
/// not a JSON object.
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ShelfDbError::InvalidDocument(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Shallow merge: every field of `update` overwrites the field in `doc`.
/// The identifier is never overwritten.
pub fn merge(doc: &mut Document, update: &Document) {
    for (key, value) in update {
        if key == ID_FIELD {
            continue;
        }
        doc.insert(key.clone(), value.clone());
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
