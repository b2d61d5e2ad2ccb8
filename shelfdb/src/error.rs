use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShelfDbError {
    #[error("Invalid collection config: {0}")]
    InvalidCollectionConfig(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Required field '{field}' is missing")]
    MissingRequiredField { field: String },

    #[error("Required field '{field}' cannot be empty")]
    EmptyRequiredField { field: String },

    #[error("Invalid type at '{field}'. Expected {expected}")]
    InvalidFieldType { field: String, expected: &'static str },

    #[error("Invalid date format at '{field}': {value}")]
    InvalidTemporalValue { field: String, value: String },

    #[error("Unsupported type '{type_name}' at '{field}'")]
    UnsupportedSchemaType { field: String, type_name: String },

    #[error("Corrupt collection file {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Invalid sort direction {value} for '{field}'. Use 1 for ascending, -1 for descending")]
    InvalidSortDirection { field: String, value: String },

    #[error("Invalid select specification: {0}")]
    InvalidSelectSpecification(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to replace collection file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl ShelfDbError {
    /// Whether this error came out of schema validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ShelfDbError::InvalidDocument(_)
                | ShelfDbError::MissingRequiredField { .. }
                | ShelfDbError::EmptyRequiredField { .. }
                | ShelfDbError::InvalidFieldType { .. }
                | ShelfDbError::InvalidTemporalValue { .. }
                | ShelfDbError::UnsupportedSchemaType { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ShelfDbError>;
