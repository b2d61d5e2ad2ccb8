use crate::error::{Result, ShelfDbError};
use super::types::Schema;
use std::path::Path;

/// Parse a schema file (YAML or JSON) into a Schema
pub fn parse_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ShelfDbError::Schema(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_schema_str(&content)
}

/// Parse a schema YAML (or JSON, which is valid YAML) string into a Schema
pub fn parse_schema_str(content: &str) -> Result<Schema> {
    if content.trim().is_empty() {
        return Err(ShelfDbError::Schema("schema is empty".into()));
    }
    let schema: Schema = serde_yaml::from_str(content)?;
    Ok(schema)
}
