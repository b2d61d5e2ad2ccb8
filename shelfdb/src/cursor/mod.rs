use crate::diagnostics::{self, Diagnostics};
use crate::document::Document;
use crate::error::{Result, ShelfDbError};
use crate::query::{compare_values, values_equal};
use crate::schema::Schema;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// What a cursor currently holds.
///
/// A cursor starts out holding documents. `distinct` turns it into a list of
/// raw field values and `count` collapses it into a single number; both change
/// which later shaping calls still have an effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CursorOutput {
    Documents(Vec<Document>),
    Values(Vec<Value>),
    Count(usize),
}

impl CursorOutput {
    pub fn into_documents(self) -> Option<Vec<Document>> {
        match self {
            CursorOutput::Documents(docs) => Some(docs),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            CursorOutput::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            CursorOutput::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Number of documents or values held; the count itself after `count`.
    pub fn len(&self) -> usize {
        match self {
            CursorOutput::Documents(docs) => docs.len(),
            CursorOutput::Values(values) => values.len(),
            CursorOutput::Count(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory pipeline over the result of a find.
///
/// The cursor owns its own copy of the matched documents; nothing done here is
/// written back to the collection file. Shaping calls mutate the cursor and
/// return it so they chain:
///
/// ```rust,ignore
/// let youngest = users
///     .find(&json!({}))?
///     .sort(&json!({"age": 1}))?
///     .limit(2)
///     .exec();
/// ```
#[derive(Clone)]
pub struct Cursor {
    data: CursorOutput,
    schema: Arc<Schema>,
    collection: String,
    diagnostics: Arc<dyn Diagnostics>,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("data", &self.data)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub fn new(docs: Vec<Document>, schema: Arc<Schema>) -> Self {
        Cursor {
            data: CursorOutput::Documents(docs),
            schema,
            collection: String::new(),
            diagnostics: diagnostics::default_sink(),
        }
    }

    /// Report failing shaping calls to `sink` under the given collection name.
    pub fn with_diagnostics(mut self, collection: &str, sink: Arc<dyn Diagnostics>) -> Self {
        self.collection = collection.to_string();
        self.diagnostics = sink;
        self
    }

    /// The schema of the collection this cursor was read from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate (and coerce) every held document against the schema.
    /// Fails on the first invalid document.
    pub fn validate(&mut self) -> Result<&mut Self> {
        let result = match &mut self.data {
            CursorOutput::Documents(docs) => {
                docs.iter_mut().try_for_each(|doc| self.schema.validate(doc))
            }
            _ => Ok(()),
        };
        self.reported("validate", result)?;
        Ok(self)
    }

    /// Sort by `{field: 1 | -1, ...}`.
    ///
    /// Each field is applied as its own stable sort, in the order given, so
    /// the last field listed ends up as the primary key. Values that cannot be
    /// ordered against each other (missing fields, mixed kinds) compare equal.
    pub fn sort(&mut self, spec: &Value) -> Result<&mut Self> {
        let keys = self.reported("sort", parse_sort_spec(spec))?;

        if let CursorOutput::Documents(docs) = &mut self.data {
            for (field, order) in &keys {
                docs.sort_by(|a, b| {
                    let ord = compare_field(a, b, field);
                    match order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                });
            }
        }
        Ok(self)
    }

    /// Keep at most the first `n` entries.
    pub fn limit(&mut self, n: usize) -> &mut Self {
        match &mut self.data {
            CursorOutput::Documents(docs) => docs.truncate(n),
            CursorOutput::Values(values) => values.truncate(n),
            CursorOutput::Count(_) => {}
        }
        self
    }

    /// Drop the first `n` entries.
    pub fn skip(&mut self, n: usize) -> &mut Self {
        match &mut self.data {
            CursorOutput::Documents(docs) => {
                docs.drain(..n.min(docs.len()));
            }
            CursorOutput::Values(values) => {
                values.drain(..n.min(values.len()));
            }
            CursorOutput::Count(_) => {}
        }
        self
    }

    /// Project fields with `{field: 1 | 0, ...}`.
    ///
    /// If any field is marked `1`, only the `1` fields are kept and the `0`
    /// markers are ignored. Otherwise every field except the `0` ones is kept.
    pub fn select(&mut self, spec: &Value) -> Result<&mut Self> {
        let (include, exclude) = self.reported("select", parse_select_spec(spec))?;

        if let CursorOutput::Documents(docs) = &mut self.data {
            for doc in docs.iter_mut() {
                if include.is_empty() {
                    doc.retain(|key, _| !exclude.contains(key));
                } else {
                    let mut projected = Map::new();
                    for key in &include {
                        if let Some(value) = doc.get(key.as_str()) {
                            projected.insert(key.clone(), value.clone());
                        }
                    }
                    *doc = projected;
                }
            }
        }
        Ok(self)
    }

    /// Replace the documents with the distinct values of `field`, in first-seen
    /// order. Falsy values (`null`, `false`, `0`, `""`) are dropped along with
    /// missing ones.
    pub fn distinct(&mut self, field: &str) -> &mut Self {
        if let CursorOutput::Documents(docs) = &self.data {
            let mut seen: Vec<Value> = Vec::new();
            for value in docs.iter().filter_map(|doc| doc.get(field)) {
                if is_truthy(value) && !seen.iter().any(|s| values_equal(s, value)) {
                    seen.push(value.clone());
                }
            }
            self.data = CursorOutput::Values(seen);
        }
        self
    }

    /// Collapse the result into the number of entries it holds.
    pub fn count(&mut self) -> &mut Self {
        self.data = CursorOutput::Count(self.data.len());
        self
    }

    /// The current result. The cursor keeps its state and can be shaped further.
    pub fn exec(&self) -> CursorOutput {
        self.data.clone()
    }

    fn reported<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            self.diagnostics.report(&self.collection, operation, &e);
            e
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Ascending,
    Descending,
}

fn parse_sort_spec(spec: &Value) -> Result<Vec<(String, SortOrder)>> {
    let Some(fields) = spec.as_object() else {
        return Err(ShelfDbError::InvalidSortDirection {
            field: String::new(),
            value: spec.to_string(),
        });
    };

    fields
        .iter()
        .map(|(field, order)| {
            let order = match order.as_f64() {
                Some(o) if o == 1.0 => SortOrder::Ascending,
                Some(o) if o == -1.0 => SortOrder::Descending,
                _ => {
                    return Err(ShelfDbError::InvalidSortDirection {
                        field: field.clone(),
                        value: order.to_string(),
                    })
                }
            };
            Ok((field.clone(), order))
        })
        .collect()
}

fn parse_select_spec(spec: &Value) -> Result<(Vec<String>, Vec<String>)> {
    let fields = spec.as_object().ok_or_else(|| {
        ShelfDbError::InvalidSelectSpecification(format!("expected an object, got {spec}"))
    })?;

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for (field, marker) in fields {
        match marker {
            Value::Bool(true) => include.push(field.clone()),
            Value::Bool(false) => exclude.push(field.clone()),
            Value::Number(n) if n.as_f64() == Some(1.0) => include.push(field.clone()),
            Value::Number(n) if n.as_f64() == Some(0.0) => exclude.push(field.clone()),
            other => {
                return Err(ShelfDbError::InvalidSelectSpecification(format!(
                    "marker for '{field}' must be 1 or 0, got {other}"
                )))
            }
        }
    }
    Ok((include, exclude))
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
