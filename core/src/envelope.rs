//! Decoding of the `{ success, data, errors }` response envelope.
//!
//! Shared by `RequestExecutor` and `UploadManager` so both report identical
//! errors for the same body.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;

/// Decode an already-parsed envelope.
///
/// `body` is `None` when the response had no parseable JSON. `url` is only
/// used to describe a malformed envelope.
pub fn decode(url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    let Some(envelope) = body.and_then(Value::as_object) else {
        warn!(url, "response is not an envelope");
        return Err(ApiError::MalformedEnvelope { url: url.to_string() });
    };
    let Some(success) = envelope.get("success") else {
        warn!(url, "envelope has no success field");
        return Err(ApiError::MalformedEnvelope { url: url.to_string() });
    };

    if !is_truthy(success) {
        let errors = envelope
            .get("errors")
            .filter(|errors| is_truthy(errors))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        return Err(ApiError::Application(errors));
    }

    Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
}

/// Decode a raw response body. Bytes that are not JSON count as no body.
pub fn decode_body(url: &str, body: &[u8]) -> Result<Value, ApiError> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    decode(url, parsed.as_ref())
}

/// Decode `data` into `T`.
pub fn decode_as<T: DeserializeOwned>(url: &str, body: Option<&Value>) -> Result<T, ApiError> {
    let data = decode(url, body)?;
    data_into(data)
}

pub(crate) fn data_into<T: DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Truthiness of a JSON value as the server's clients have always read it:
/// `false`, `null`, `0` and `""` are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    const URL: &str = "/api/items?page=1";

    #[test]
    fn success_yields_data() {
        let data = decode(URL, Some(&json!({"success": true, "data": {"id": 1}}))).unwrap();
        assert_eq!(data, json!({"id": 1}));
    }

    #[test]
    fn success_without_data_yields_null() {
        let data = decode(URL, Some(&json!({"success": true}))).unwrap();
        assert!(data.is_null());
    }

    #[test]
    fn failure_yields_server_errors() {
        let err = decode(URL, Some(&json!({"success": false, "errors": {"field": "bad"}}))).unwrap_err();
        assert!(matches!(err, ApiError::Application(ref e) if *e == json!({"field": "bad"})));
    }

    #[test]
    fn failure_without_errors_yields_empty_object() {
        let err = decode(URL, Some(&json!({"success": false}))).unwrap_err();
        assert!(matches!(err, ApiError::Application(ref e) if *e == json!({})));

        let err = decode(URL, Some(&json!({"success": false, "errors": null}))).unwrap_err();
        assert!(matches!(err, ApiError::Application(ref e) if *e == json!({})));
    }

    #[test]
    fn missing_body_is_malformed() {
        let err = decode(URL, None).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { ref url } if url == URL));

        let err = decode(URL, Some(&Value::Null)).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { ref url } if url == URL));
    }

    #[test]
    fn object_without_success_is_malformed() {
        let err = decode(URL, Some(&json!({}))).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { ref url } if url == URL));

        let err = decode(URL, Some(&json!({"data": {"id": 1}}))).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { .. }));
    }

    #[test]
    fn non_object_bodies_are_malformed() {
        for body in [json!([1, 2]), json!("success"), json!(true)] {
            let err = decode(URL, Some(&body)).unwrap_err();
            assert!(matches!(err, ApiError::MalformedEnvelope { .. }), "{body}");
        }
    }

    #[test]
    fn falsy_success_values_are_failures() {
        for success in [json!(null), json!(0), json!("")] {
            let err = decode(URL, Some(&json!({"success": success}))).unwrap_err();
            assert!(matches!(err, ApiError::Application(_)));
        }
        assert!(decode(URL, Some(&json!({"success": 1, "data": 5}))).is_ok());
    }

    #[test]
    fn decode_body_treats_invalid_json_as_missing() {
        let err = decode_body(URL, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { .. }));

        let data = decode_body(URL, br#"{"success":true,"data":[1,2,3]}"#).unwrap();
        assert_eq!(data, json!([1, 2, 3]));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn decode_as_deserializes_data() {
        let item: Item = decode_as(URL, Some(&json!({"success": true, "data": {"id": 7}}))).unwrap();
        assert_eq!(item, Item { id: 7 });

        let err = decode_as::<Item>(URL, Some(&json!({"success": true, "data": "nope"}))).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
