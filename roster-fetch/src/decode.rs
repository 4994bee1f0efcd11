//! Response body validation.
//!
//! A successful response body must be JSON. The bearer token is lifted out
//! of the body, every credential field is removed, and what remains must
//! deserialize into the requested schema and pass its checks.

use roster_core::{strip_secret_fields, ResponseSchema, SchemaError, ACCESS_TOKEN_FIELD};
use secrecy::SecretString;
use serde_json::Value;

/// A validated response payload and the token that accompanied it.
#[derive(Debug)]
pub struct DecodedBody<T> {
    pub payload: T,
    pub access_token: Option<SecretString>,
}

pub fn decode_body<T: ResponseSchema>(body: &[u8]) -> Result<DecodedBody<T>, SchemaError> {
    let schema = T::SCHEMA_ID.to_string();

    let mut value: Value = serde_json::from_slice(body).map_err(|e| SchemaError::NotJson {
        schema: schema.clone(),
        reason: e.to_string(),
    })?;

    let access_token = match &mut value {
        Value::Object(map) => match map.remove(ACCESS_TOKEN_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) if token.is_empty() => None,
            Some(Value::String(token)) => Some(SecretString::from(token)),
            Some(other) => {
                return Err(SchemaError::InvalidField {
                    schema,
                    field: ACCESS_TOKEN_FIELD.to_string(),
                    reason: format!("expected string, got {}", json_type(&other)),
                })
            }
        },
        _ => None,
    };

    strip_secret_fields(&mut value);

    let payload: T = serde_json::from_value(value).map_err(|e| SchemaError::Mismatch {
        schema: schema.clone(),
        reason: e.to_string(),
    })?;
    payload.validate()?;

    Ok(DecodedBody {
        payload,
        access_token,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
