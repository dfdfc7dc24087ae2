//! Tag payload record and codec.
//!
//! A tag holds a single versionless JSON object:
//!
//! ```json
//! {"pairing_key":"c20c8a91","value":{"name":"lamp"}}
//! ```
//!
//! Both fields are optional and omitted when absent. The value slot holds any
//! application type that round-trips through `serde_json`. Decoding is split
//! in two phases so that a payload that is not a record at all
//! ([`CodecError::Decoding`]) can be told apart from a record whose value has
//! the wrong shape ([`CodecError::Schema`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CodecError, CodecResult};

/// A decoded (or about to be written) tag record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord<V> {
    pairing_key: Option<String>,
    value: Option<V>,
}

impl<V> TagRecord<V> {
    /// Create a record from its parts.
    pub fn new(pairing_key: Option<String>, value: Option<V>) -> Self {
        Self { pairing_key, value }
    }

    /// The pairing key, if the record carries one.
    pub fn pairing_key(&self) -> Option<&str> {
        self.pairing_key.as_deref()
    }

    /// The application value, if the record carries one.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Return the pairing key or [`CodecError::MissingPairingKey`].
    pub fn require_pairing_key(&self) -> CodecResult<&str> {
        self.pairing_key().ok_or(CodecError::MissingPairingKey)
    }

    /// Split the record into `(pairing_key, value)`.
    pub fn into_parts(self) -> (Option<String>, Option<V>) {
        (self.pairing_key, self.value)
    }
}

impl<V: Serialize> TagRecord<V> {
    /// Encode this record into tag payload bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        encode(self.pairing_key(), self.value())
    }
}

#[derive(Serialize)]
struct PayloadRef<'a, V> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pairing_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a V>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    pairing_key: Option<String>,
    #[serde(default, deserialize_with = "present")]
    value: Option<Value>,
}

/// Keep an explicit `null` apart from a missing field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Encode a pairing key and value into tag payload bytes.
///
/// The output is deterministic for deterministic `V` serializations.
pub fn encode<V: Serialize>(pairing_key: Option<&str>, value: Option<&V>) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(&PayloadRef { pairing_key, value }).map_err(CodecError::Encoding)
}

/// Decode tag payload bytes into a record.
///
/// A value slot holding JSON `null` decodes as `Some` when `V` accepts `null`
/// and as `None` otherwise.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> CodecResult<TagRecord<V>> {
    let raw: RawPayload = serde_json::from_slice(bytes).map_err(CodecError::Decoding)?;

    let value = match raw.value {
        None => None,
        Some(Value::Null) => serde_json::from_value(Value::Null).ok(),
        Some(value) => Some(serde_json::from_value(value).map_err(CodecError::Schema)?),
    };

    Ok(TagRecord {
        pairing_key: raw.pairing_key,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Lamp {
        name: String,
    }

    fn lamp() -> Lamp {
        Lamp {
            name: "lamp".to_string(),
        }
    }

    #[test]
    fn test_lamp_record_round_trip() {
        let bytes = encode(Some("c20c8a91"), Some(&lamp())).unwrap();
        let record: TagRecord<Lamp> = decode(&bytes).unwrap();

        assert_eq!(record, TagRecord::new(Some("c20c8a91".to_string()), Some(lamp())));
        assert_eq!(record.require_pairing_key().unwrap(), "c20c8a91");
    }

    #[test]
    fn test_encoding_layout() {
        let bytes = encode(Some("c20c8a91"), Some(&lamp())).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"pairing_key":"c20c8a91","value":{"name":"lamp"}}"#
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let value = serde_json::json!({"zeta": 1, "alpha": [1, 2, 3], "mid": {"b": 2, "a": 1}});
        let first = encode(Some("k"), Some(&value)).unwrap();
        let second = encode(Some("k"), Some(&value.clone())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_key_is_omitted() {
        let bytes = encode(None, Some(&lamp())).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"value":{"name":"lamp"}}"#);

        let record: TagRecord<Lamp> = decode(&bytes).unwrap();
        assert_eq!(record.pairing_key(), None);
        assert!(matches!(
            record.require_pairing_key(),
            Err(CodecError::MissingPairingKey)
        ));
    }

    #[test]
    fn test_empty_record() {
        let bytes = encode::<Lamp>(None, None).unwrap();
        assert_eq!(bytes, b"{}");

        let record: TagRecord<Lamp> = decode(&bytes).unwrap();
        assert_eq!(record, TagRecord::new(None, None));
    }

    #[test]
    fn test_null_fields_decode_as_none() {
        let record: TagRecord<Lamp> = decode(br#"{"pairing_key":null,"value":null}"#).unwrap();
        assert_eq!(record.into_parts(), (None, None));
    }

    #[test]
    fn test_null_value_kept_when_type_accepts_it() {
        let bytes = encode(Some("k"), Some(&Value::Null)).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"pairing_key":"k","value":null}"#);

        let record: TagRecord<Value> = decode(&bytes).unwrap();
        assert_eq!(record.value(), Some(&Value::Null));

        let record: TagRecord<Value> = decode(br#"{"pairing_key":"k"}"#).unwrap();
        assert_eq!(record.value(), None);
    }

    #[test]
    fn test_key_is_not_normalized() {
        let bytes = encode::<Lamp>(Some(" AbC "), None).unwrap();
        let record: TagRecord<Lamp> = decode(&bytes).unwrap();
        assert_eq!(record.pairing_key(), Some(" AbC "));
    }

    #[test]
    fn test_garbage_is_decoding_error() {
        let result = decode::<Lamp>(b"\x00\x01not json");
        assert!(matches!(result, Err(CodecError::Decoding(_))));

        let result = decode::<Lamp>(b"[1,2,3]");
        assert!(matches!(result, Err(CodecError::Decoding(_))));

        let result = decode::<Lamp>(br#"{"pairing_key":42}"#);
        assert!(matches!(result, Err(CodecError::Decoding(_))));
    }

    #[test]
    fn test_wrong_value_shape_is_schema_error() {
        let result = decode::<Lamp>(br#"{"pairing_key":"k","value":{"name":5}}"#);
        assert!(matches!(result, Err(CodecError::Schema(_))));
    }

    #[test]
    fn test_unserializable_value_is_encoding_error() {
        struct Broken;

        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot serialize"))
            }
        }

        let result = encode(Some("k"), Some(&Broken));
        assert!(matches!(result, Err(CodecError::Encoding(_))));
    }

    #[test]
    fn test_record_encode_method() {
        let record = TagRecord::new(Some("c20c8a91".to_string()), Some(lamp()));
        assert_eq!(
            record.encode().unwrap(),
            encode(Some("c20c8a91"), Some(&lamp())).unwrap()
        );
    }
}
