use crate::document::Document;
use crate::error::{Result, ShelfDbError};
use crate::schema::{FieldRule, FieldType, Schema};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Validate a document against its schema, failing on the first problem.
///
/// Fields are visited in schema order; fields the schema does not declare are
/// left alone. The document is modified in place: defaults are injected for
/// missing required fields and temporal values are replaced with their
/// normalized RFC 3339 form.
pub fn validate_document(schema: &Schema, doc: &mut Document) -> Result<()> {
    for (field_name, rule) in schema.fields() {
        validate_field(field_name, rule, doc)?;
    }
    Ok(())
}

/// Validate an update payload before it is merged into stored documents.
///
/// Only the fields the update names are checked and coerced. Fields it leaves
/// out are not looked at, so stored documents that predate a schema change can
/// still be updated and no defaults are injected for them.
pub fn validate_update(schema: &Schema, update: &mut Document) -> Result<()> {
    for (field_name, rule) in schema.fields() {
        if update.contains_key(field_name) {
            validate_field(field_name, rule, update)?;
        }
    }
    Ok(())
}

/// Collect every validation problem in a document without touching it.
pub fn check_document(schema: &Schema, doc: &Document) -> Vec<String> {
    let mut scratch = doc.clone();
    schema
        .fields()
        .filter_map(|(field_name, rule)| validate_field(field_name, rule, &mut scratch).err())
        .map(|e| e.to_string())
        .collect()
}

fn validate_field(field_name: &str, rule: &FieldRule, doc: &mut Document) -> Result<()> {
    let mut value = doc.get(field_name).filter(|v| !v.is_null()).cloned();

    if rule.required && value.is_none() {
        match &rule.default {
            Some(default) => {
                doc.insert(field_name.to_string(), default.clone());
                value = Some(default.clone());
            }
            None => {
                return Err(ShelfDbError::MissingRequiredField {
                    field: field_name.to_string(),
                })
            }
        }
    }

    if is_empty_string(value.as_ref()) {
        if rule.required && rule.field_type == FieldType::Text {
            return Err(ShelfDbError::EmptyRequiredField {
                field: field_name.to_string(),
            });
        }
        if !rule.required {
            value = None;
        }
    }

    match &rule.field_type {
        FieldType::Text => expect(field_name, value.as_ref(), Value::is_string, "String"),
        FieldType::Number => expect(field_name, value.as_ref(), Value::is_number, "Number"),
        FieldType::Boolean => expect(field_name, value.as_ref(), Value::is_boolean, "Boolean"),
        FieldType::Struct => expect(field_name, value.as_ref(), Value::is_object, "Struct"),
        FieldType::Sequence => expect(field_name, value.as_ref(), Value::is_array, "Sequence"),
        FieldType::Temporal => {
            if let Some(raw) = value {
                let parsed = parse_temporal(&raw).ok_or_else(|| ShelfDbError::InvalidTemporalValue {
                    field: field_name.to_string(),
                    value: raw.to_string(),
                })?;
                doc.insert(
                    field_name.to_string(),
                    Value::String(parsed.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
            Ok(())
        }
        FieldType::Unsupported(type_name) => Err(ShelfDbError::UnsupportedSchemaType {
            field: field_name.to_string(),
            type_name: type_name.clone(),
        }),
    }
}

fn expect(
    field_name: &str,
    value: Option<&Value>,
    predicate: fn(&Value) -> bool,
    expected: &'static str,
) -> Result<()> {
    match value {
        Some(v) if !predicate(v) => Err(ShelfDbError::InvalidFieldType {
            field: field_name.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

fn is_empty_string(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if s.is_empty())
}

/// Parse a JSON value into a UTC instant.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// (read as UTC), bare `YYYY-MM-DD` dates (midnight UTC), and numbers holding
/// milliseconds since the Unix epoch.
pub fn parse_temporal(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => n.as_f64().filter(|f| f.is_finite())?.trunc() as i64,
            };
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::into_document;
    use crate::schema::parse_schema_str;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_schema() -> Schema {
        parse_schema_str(
            r#"
name: { type: text, required: true }
email: { type: text }
age: { type: number }
active: { type: boolean, required: true, default: true }
address: { type: struct }
tags: { type: sequence }
joined: { type: temporal }
"#,
        )
        .unwrap()
    }

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let schema = test_schema();
        let mut data = doc(json!({
            "name": "Alice",
            "age": 31,
            "address": {"city": "Oslo"},
            "tags": ["a", "b"],
        }));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["active"], json!(true));
    }

    #[test]
    fn test_missing_required_field() {
        let schema = Schema::new().with_field("name", FieldRule::new(FieldType::Text).required());
        let mut data = Document::new();
        let err = validate_document(&schema, &mut data).unwrap_err();
        assert!(matches!(err, ShelfDbError::MissingRequiredField { ref field } if field == "name"));
    }

    #[test]
    fn test_null_required_field_counts_as_missing() {
        let schema = Schema::new().with_field("name", FieldRule::new(FieldType::Text).required());
        let mut data = doc(json!({"name": null}));
        assert!(matches!(
            validate_document(&schema, &mut data),
            Err(ShelfDbError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_default_applied() {
        let schema = Schema::new()
            .with_field("name", FieldRule::new(FieldType::Text).required().default_value("x"));
        let mut data = Document::new();
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(Value::Object(data), json!({"name": "x"}));
    }

    #[test]
    fn test_default_is_type_checked() {
        let schema = Schema::new()
            .with_field("count", FieldRule::new(FieldType::Number).required().default_value("zero"));
        let mut data = Document::new();
        assert!(matches!(
            validate_document(&schema, &mut data),
            Err(ShelfDbError::InvalidFieldType { expected: "Number", .. })
        ));
    }

    #[test]
    fn test_empty_required_text() {
        let schema = test_schema();
        let mut data = doc(json!({"name": ""}));
        assert!(matches!(
            validate_document(&schema, &mut data),
            Err(ShelfDbError::EmptyRequiredField { ref field }) if field == "name"
        ));
    }

    #[test]
    fn test_empty_optional_value_is_treated_as_absent() {
        let schema = test_schema();
        // An empty string on an optional number field is not a type error.
        let mut data = doc(json!({"name": "Alice", "age": "", "joined": ""}));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["age"], json!(""));
        assert_eq!(data["joined"], json!(""));
    }

    #[test]
    fn test_type_mismatches() {
        let schema = test_schema();
        let cases = [
            (json!({"name": 42}), "String"),
            (json!({"name": "A", "age": "old"}), "Number"),
            (json!({"name": "A", "active": "yes"}), "Boolean"),
            (json!({"name": "A", "address": ["not", "a", "struct"]}), "Struct"),
            (json!({"name": "A", "tags": "not-a-list"}), "Sequence"),
        ];
        for (value, expected_type) in cases {
            let mut data = doc(value);
            match validate_document(&schema, &mut data) {
                Err(ShelfDbError::InvalidFieldType { expected, .. }) => {
                    assert_eq!(expected, expected_type)
                }
                other => panic!("expected type error for {expected_type}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let schema = test_schema();
        let mut data = doc(json!({"name": "A", "nickname": 7}));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["nickname"], json!(7));
    }

    #[test]
    fn test_temporal_coercion() {
        let schema = test_schema();
        let mut data = doc(json!({"name": "A", "joined": "2024-03-05"}));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["joined"], json!("2024-03-05T00:00:00.000Z"));

        let mut data = doc(json!({"name": "A", "joined": "2024-03-05T10:30:00+02:00"}));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["joined"], json!("2024-03-05T08:30:00.000Z"));

        let mut data = doc(json!({"name": "A", "joined": 0}));
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(data["joined"], json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_temporal_coercion_is_idempotent() {
        let schema = test_schema();
        let mut data = doc(json!({"name": "A", "joined": "2024-03-05 12:00:00"}));
        validate_document(&schema, &mut data).unwrap();
        let first = data.clone();
        validate_document(&schema, &mut data).unwrap();
        assert_eq!(first, data);
    }

    #[test]
    fn test_invalid_temporal() {
        let schema = test_schema();
        let mut data = doc(json!({"name": "A", "joined": "next tuesday"}));
        assert!(matches!(
            validate_document(&schema, &mut data),
            Err(ShelfDbError::InvalidTemporalValue { ref field, .. }) if field == "joined"
        ));
        assert_eq!(data["joined"], json!("next tuesday"));
    }

    #[test]
    fn test_unsupported_type_fails_even_when_absent() {
        let schema = parse_schema_str("blob: { type: binary }").unwrap();
        let mut data = Document::new();
        assert!(matches!(
            validate_document(&schema, &mut data),
            Err(ShelfDbError::UnsupportedSchemaType { ref type_name, .. }) if type_name == "binary"
        ));
    }

    #[test]
    fn test_check_reports_all_problems_without_mutating() {
        let schema = test_schema();
        let data = doc(json!({"age": "old", "joined": "2024-01-01"}));
        let problems = check_document(&schema, &data);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("name"));
        assert!(problems[1].contains("age"));
        assert_eq!(data["joined"], json!("2024-01-01"));
        assert!(!data.contains_key("active"));
    }

    #[test]
    fn test_update_checks_only_named_fields() {
        let schema = test_schema();
        let mut update = doc(json!({"age": 40, "joined": "2024-03-01", "extra": 1}));
        validate_update(&schema, &mut update).unwrap();
        assert_eq!(
            Value::Object(update),
            json!({"age": 40, "joined": "2024-03-01T00:00:00.000Z", "extra": 1})
        );

        let mut bad = doc(json!({"age": "old"}));
        assert!(matches!(
            validate_update(&schema, &mut bad),
            Err(ShelfDbError::InvalidFieldType { .. })
        ));

        let mut cleared = doc(json!({"name": null}));
        assert!(matches!(
            validate_update(&schema, &mut cleared),
            Err(ShelfDbError::MissingRequiredField { .. })
        ));
    }
}
