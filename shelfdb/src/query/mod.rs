use crate::document::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// Check whether `doc` satisfies `query`.
///
/// Every key of the query must hold. A plain value is compared for strict
/// equality; an object is read as a bag of operators (`$in`, `$nin`, `$lte`,
/// `$gte`, `$eq`, `$ne`), all of which must hold. An unknown operator never
/// matches. The empty query matches every document; a query that is not an
/// object matches none.
pub fn matches(doc: &Document, query: &Value) -> bool {
    let Some(query) = query.as_object() else {
        return false;
    };

    query.iter().all(|(key, expected)| {
        let actual = doc.get(key).unwrap_or(&Value::Null);
        match expected {
            Value::Object(operators) => operators
                .iter()
                .all(|(op, operand)| apply_operator(op, actual, operand)),
            literal => values_equal(actual, literal),
        }
    })
}

fn apply_operator(op: &str, actual: &Value, operand: &Value) -> bool {
    match op {
        "$in" => operand
            .as_array()
            .is_some_and(|list| list.iter().any(|v| values_equal(actual, v))),
        "$nin" => operand
            .as_array()
            .is_some_and(|list| !list.iter().any(|v| values_equal(actual, v))),
        "$lte" => matches!(compare_values(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        "$gte" => matches!(
            compare_values(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$eq" => values_equal(actual, operand),
        "$ne" => !values_equal(actual, operand),
        _ => {
            log::debug!("unsupported query operator '{op}'");
            false
        }
    }
}

/// Strict equality, except that numbers compare by numeric value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Natural ordering between two values of the same kind.
///
/// Numbers, strings and booleans are comparable among themselves; every other
/// pairing has no ordering.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::into_document;
    use serde_json::json;

    fn person(name: &str, age: i64, city: Option<&str>) -> Document {
        let mut doc = into_document(json!({"name": name, "age": age})).unwrap();
        if let Some(city) = city {
            doc.insert("city".into(), json!(city));
        }
        doc
    }

    fn people() -> Vec<Document> {
        vec![
            person("Ann", 18, Some("Oslo")),
            person("Bob", 25, Some("Rome")),
            person("Cid", 40, None),
        ]
    }

    fn names(query: Value) -> Vec<String> {
        people()
            .iter()
            .filter(|d| matches(d, &query))
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(names(json!({})), vec!["Ann", "Bob", "Cid"]);
    }

    #[test]
    fn test_literal_equality() {
        assert_eq!(names(json!({"city": "Rome"})), vec!["Bob"]);
        assert_eq!(names(json!({"age": 25.0})), vec!["Bob"]);
        assert_eq!(names(json!({"city": null})), vec!["Cid"]);
    }

    #[test]
    fn test_fields_are_anded() {
        assert_eq!(names(json!({"city": "Oslo", "age": 18})), vec!["Ann"]);
        assert!(names(json!({"city": "Oslo", "age": 25})).is_empty());
    }

    #[test]
    fn test_range_operators() {
        assert_eq!(names(json!({"age": {"$gte": 20, "$lte": 30}})), vec!["Bob"]);
        assert_eq!(names(json!({"age": {"$lte": 25}})), vec!["Ann", "Bob"]);
        assert_eq!(names(json!({"name": {"$gte": "B"}})), vec!["Bob", "Cid"]);
    }

    #[test]
    fn test_range_against_incomparable_value_fails() {
        // A missing city is null, which has no ordering against a string.
        assert_eq!(names(json!({"city": {"$gte": "A"}})), vec!["Ann", "Bob"]);
        assert!(names(json!({"age": {"$gte": "20"}})).is_empty());
    }

    #[test]
    fn test_membership_operators() {
        assert_eq!(names(json!({"city": {"$in": ["Oslo", "Rome"]}})), vec!["Ann", "Bob"]);
        assert_eq!(names(json!({"city": {"$nin": ["Oslo"]}})), vec!["Bob", "Cid"]);
        assert!(names(json!({"city": {"$in": "Oslo"}})).is_empty());
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(names(json!({"age": {"$eq": 40}})), vec!["Cid"]);
        assert_eq!(names(json!({"age": {"$ne": 40}})), vec!["Ann", "Bob"]);
    }

    #[test]
    fn test_unknown_operator_fails_closed() {
        assert!(names(json!({"age": {"$gt": 1}})).is_empty());
        assert!(names(json!({"age": {"$gte": 1, "$regex": "x"}})).is_empty());
    }

    #[test]
    fn test_non_object_query_matches_nothing() {
        assert!(names(json!(["age"])).is_empty());
    }
}
