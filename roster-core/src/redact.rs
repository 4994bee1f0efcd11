//! Credential field removal for response bodies.

use serde_json::Value;

use crate::SECRET_FIELDS;

/// Remove credential fields from every object in `value`.
///
/// Returns the number of fields removed.
pub fn strip_secret_fields(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut removed = 0;
            for field in SECRET_FIELDS {
                if map.remove(*field).is_some() {
                    removed += 1;
                }
            }
            for nested in map.values_mut() {
                removed += strip_secret_fields(nested);
            }
            removed
        }
        Value::Array(items) => items.iter_mut().map(strip_secret_fields).sum(),
        _ => 0,
    }
}

/// True if any credential field survives anywhere in `value`.
pub fn contains_secret_fields(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            SECRET_FIELDS.iter().any(|field| map.contains_key(*field))
                || map.values().any(contains_secret_fields)
        }
        Value::Array(items) => items.iter().any(contains_secret_fields),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_counts_removed_fields() {
        let mut value = json!({
            "accessToken": "a",
            "data": [{ "decodedToken": {}, "_id": "1" }, { "access_token": "b" }],
            "meta": { "decoded_token": null, "pages": 2 }
        });
        assert_eq!(strip_secret_fields(&mut value), 4);
        assert_eq!(
            value,
            json!({ "data": [{ "_id": "1" }, {}], "meta": { "pages": 2 } })
        );
    }

    #[test]
    fn test_scalars_and_clean_values_untouched() {
        let mut value = json!(["accessToken", 1, null]);
        assert_eq!(strip_secret_fields(&mut value), 0);
        assert!(!contains_secret_fields(&value));
    }

    #[test]
    fn test_contains_finds_nested_field() {
        assert!(contains_secret_fields(&json!({"a": [{"b": {"accessToken": 1}}]})));
        assert!(!contains_secret_fields(&json!({"token": "x"})));
    }
}
