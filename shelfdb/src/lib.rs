pub mod collection;
pub mod cursor;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod query;
pub mod schema;
pub mod storage;
pub mod validation;

pub use collection::{Collection, CollectionOptions};
pub use cursor::{Cursor, CursorOutput};
pub use diagnostics::{Diagnostics, LogDiagnostics, NullDiagnostics};
pub use document::Document;
pub use error::{Result, ShelfDbError};
pub use schema::{parse_schema, parse_schema_str, FieldRule, FieldType, Schema};
