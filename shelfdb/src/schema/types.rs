use crate::document::Document;
use crate::error::Result;
use crate::validation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field rules for one collection, in declaration order.
///
/// A schema is never persisted alongside the data; callers supply it every
/// time a collection is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the rule for `name`.
    pub fn with_field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate `doc`, injecting defaults and coercing temporal fields in place.
    pub fn validate(&self, doc: &mut Document) -> Result<()> {
        validation::validate_document(self, doc)
    }

    /// Validate the fields named by an update payload, coercing them in place.
    pub fn validate_update(&self, update: &mut Document) -> Result<()> {
        validation::validate_update(self, update)
    }

    /// List every problem with `doc` without modifying it.
    pub fn check(&self, doc: &Document) -> Vec<String> {
        validation::check_document(self, doc)
    }
}

/// Definition of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        FieldRule {
            field_type,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Field kind enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[serde(alias = "string")]
    Text,
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "object")]
    Struct,
    #[serde(alias = "array", alias = "list")]
    Sequence,
    #[serde(alias = "date", alias = "datetime")]
    Temporal,
    /// Any tag outside the supported set. Rejected when a document is validated.
    #[serde(untagged)]
    Unsupported(String),
}

impl FieldType {
    pub fn name(&self) -> &str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Struct => "Struct",
            FieldType::Sequence => "Sequence",
            FieldType::Temporal => "Temporal",
            FieldType::Unsupported(name) => name,
        }
    }
}
