//! CBOR body helpers.
//!
//! SMP request and response bodies are CBOR maps keyed by short text
//! strings. [`Body`] builds request maps, [`ResponseBody`] reads fields out
//! of a decoded response and extracts device error reports.

use ciborium::value::{Integer, Value};

use crate::error::{DeviceError, ProtocolError, ReturnCode};

/// Builder for a request body map.
#[derive(Debug, Clone, Default)]
pub struct Body {
    entries: Vec<(Value, Value)>,
}

impl Body {
    /// Start an empty map.
    pub fn map() -> Self {
        Body::default()
    }

    /// Add an arbitrary CBOR value.
    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.entries.push((Value::Text(key.to_string()), value));
        self
    }

    /// Add a text field.
    pub fn text(self, key: &str, value: impl Into<String>) -> Self {
        self.value(key, Value::Text(value.into()))
    }

    /// Add an unsigned integer field.
    pub fn uint(self, key: &str, value: u64) -> Self {
        self.value(key, Value::Integer(Integer::from(value)))
    }

    /// Add a signed integer field.
    pub fn int(self, key: &str, value: i64) -> Self {
        self.value(key, Value::Integer(Integer::from(value)))
    }

    /// Add a byte string field.
    pub fn bytes(self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.value(key, Value::Bytes(value.into()))
    }

    /// Add a boolean field.
    pub fn bool(self, key: &str, value: bool) -> Self {
        self.value(key, Value::Bool(value))
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the map to CBOR bytes.
    pub fn encode(self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Map(self.entries), &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }
}

/// A decoded response body map.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBody {
    entries: Vec<(Value, Value)>,
}

impl ResponseBody {
    /// Decode a response body. An empty body decodes to an empty map.
    pub fn decode(data: &[u8]) -> Result<ResponseBody, ProtocolError> {
        if data.is_empty() {
            return Ok(ResponseBody {
                entries: Vec::new(),
            });
        }

        let value: Value =
            ciborium::from_reader(data).map_err(|e| ProtocolError::CborDecode(e.to_string()))?;

        ResponseBody::from_value(value)
    }

    /// Wrap a nested map, e.g. one element of an array field.
    pub fn from_value(value: Value) -> Result<ResponseBody, ProtocolError> {
        match value {
            Value::Map(entries) => Ok(ResponseBody { entries }),
            _ => Err(ProtocolError::NotAMap),
        }
    }

    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Read an optional integer field.
    pub fn int(&self, key: &'static str) -> Result<Option<i64>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value_to_i64(value)
                .map(Some)
                .ok_or_else(|| ProtocolError::invalid_field(key, "expected integer")),
        }
    }

    /// Read an optional unsigned integer field.
    pub fn uint(&self, key: &'static str) -> Result<Option<u64>, ProtocolError> {
        match self.int(key)? {
            None => Ok(None),
            Some(value) if value >= 0 => Ok(Some(value as u64)),
            Some(value) => Err(ProtocolError::invalid_field(
                key,
                format!("expected unsigned integer, got {}", value),
            )),
        }
    }

    /// Read a required unsigned integer field.
    pub fn require_uint(&self, key: &'static str) -> Result<u64, ProtocolError> {
        self.uint(key)?.ok_or(ProtocolError::MissingField(key))
    }

    /// Read an optional text field.
    pub fn text(&self, key: &'static str) -> Result<Option<String>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(ProtocolError::invalid_field(key, "expected text")),
        }
    }

    /// Read a required text field.
    pub fn require_text(&self, key: &'static str) -> Result<String, ProtocolError> {
        self.text(key)?.ok_or(ProtocolError::MissingField(key))
    }

    /// Read an optional byte string field.
    pub fn bytes(&self, key: &'static str) -> Result<Option<Vec<u8>>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(ProtocolError::invalid_field(key, "expected byte string")),
        }
    }

    /// Read an optional boolean field.
    pub fn bool(&self, key: &'static str) -> Result<Option<bool>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(ProtocolError::invalid_field(key, "expected boolean")),
        }
    }

    /// Read an optional array field.
    pub fn array(&self, key: &'static str) -> Result<Option<&[Value]>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items.as_slice())),
            Some(_) => Err(ProtocolError::invalid_field(key, "expected array")),
        }
    }

    /// Extract the device error carried by this body, if any.
    ///
    /// SMP v1 reports `rc`, SMP v2 reports `err: { group, rc }`. A code of 0
    /// in either form means success.
    pub fn device_error(&self) -> Option<DeviceError> {
        if let Some(Value::Map(err)) = self.get("err") {
            let field = |name: &str| {
                err.iter()
                    .find(|(k, _)| k.as_text() == Some(name))
                    .and_then(|(_, v)| value_to_i64(v))
            };
            let rc = field("rc").unwrap_or(0);
            if rc != 0 {
                return Some(DeviceError {
                    group: field("group").map(|g| g as u16),
                    rc: ReturnCode::from(rc),
                });
            }
        }

        match self.get("rc").and_then(value_to_i64) {
            Some(rc) if rc != 0 => Some(DeviceError {
                group: None,
                rc: ReturnCode::from(rc),
            }),
            _ => None,
        }
    }

    /// All entries of the map.
    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    /// Convert back into a CBOR map value.
    pub fn into_value(self) -> Value {
        Value::Map(self.entries)
    }
}

/// Convert a CBOR integer value to `i64`, if it fits.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read_back() {
        let encoded = Body::map()
            .text("d", "hello")
            .uint("off", 512)
            .bytes("data", vec![1, 2, 3])
            .bool("upgrade", true)
            .encode()
            .expect("should encode");

        let body = ResponseBody::decode(&encoded).expect("should decode");
        assert_eq!(body.require_text("d").unwrap(), "hello");
        assert_eq!(body.require_uint("off").unwrap(), 512);
        assert_eq!(body.bytes("data").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(body.bool("upgrade").unwrap(), Some(true));
        assert_eq!(body.text("missing").unwrap(), None);
        assert!(body.device_error().is_none());
    }

    #[test]
    fn test_wrong_field_type() {
        let encoded = Body::map().text("off", "nope").encode().unwrap();
        let body = ResponseBody::decode(&encoded).unwrap();
        assert!(matches!(
            body.uint("off"),
            Err(ProtocolError::InvalidField { field: "off", .. })
        ));
        assert_eq!(body.require_uint("len"), Err(ProtocolError::MissingField("len")));
    }

    #[test]
    fn test_empty_body_is_empty_map() {
        let body = ResponseBody::decode(&[]).unwrap();
        assert!(body.entries().is_empty());
    }

    #[test]
    fn test_non_map_body_rejected() {
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Integer(Integer::from(3u8)), &mut buf).unwrap();
        assert_eq!(ResponseBody::decode(&buf), Err(ProtocolError::NotAMap));
    }

    #[test]
    fn test_nested_map() {
        let inner = Value::Map(vec![(
            Value::Text("slot".into()),
            Value::Integer(Integer::from(1u8)),
        )]);
        let body = ResponseBody::from_value(inner).unwrap();
        assert_eq!(body.require_uint("slot").unwrap(), 1);
        assert_eq!(
            ResponseBody::from_value(Value::Bool(true)),
            Err(ProtocolError::NotAMap)
        );
    }

    #[test]
    fn test_v1_error() {
        let encoded = Body::map().int("rc", 8).encode().unwrap();
        let err = ResponseBody::decode(&encoded).unwrap().device_error().unwrap();
        assert_eq!(err.rc, ReturnCode::NotSupported);
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_v2_group_error() {
        let err_map = Value::Map(vec![
            (Value::Text("group".into()), Value::Integer(Integer::from(1u16))),
            (Value::Text("rc".into()), Value::Integer(Integer::from(3u8))),
        ]);
        let encoded = Body::map().value("err", err_map).encode().unwrap();
        let err = ResponseBody::decode(&encoded).unwrap().device_error().unwrap();
        assert_eq!(err.group, Some(1));
        assert_eq!(err.rc, ReturnCode::InValue);
    }

    #[test]
    fn test_zero_rc_is_success() {
        let encoded = Body::map().int("rc", 0).encode().unwrap();
        assert!(ResponseBody::decode(&encoded).unwrap().device_error().is_none());
    }
}
