//! Platform-agnostic types for tag-to-peripheral pairing.
//!
//! This crate provides the pieces of the pairing system that do not touch a
//! radio: the tag payload codec, the connection and manager state models, and
//! peripheral identity types. They are shared by `tagpair-core` and any
//! alternative transport implementation.
//!
//! # Example
//!
//! ```
//! use tagpair_types::{TagRecord, decode, encode};
//!
//! let bytes = encode(Some("c20c8a91"), Some(&serde_json::json!({"name": "lamp"}))).unwrap();
//! let record: TagRecord<serde_json::Value> = decode(&bytes).unwrap();
//! assert_eq!(record.pairing_key(), Some("c20c8a91"));
//! ```

pub mod error;
pub mod record;
pub mod state;
pub mod types;
pub mod uuid;

pub use error::{CodecError, CodecResult};
pub use record::{TagRecord, decode, encode};
pub use state::{ConnectionState, ManagerState};
pub use types::{PeripheralId, ServiceFilter, filter_allows};
pub use uuid as uuids;

/// Property-based tests for the tag codec.
///
/// Run with: `cargo test -p tagpair-types proptests`
#[cfg(test)]
mod proptests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Fixture {
        name: String,
        level: u8,
        tags: Vec<String>,
        extra: BTreeMap<String, i64>,
    }

    fn fixture() -> impl Strategy<Value = Fixture> {
        (
            ".*",
            any::<u8>(),
            proptest::collection::vec(".*", 0..4),
            proptest::collection::btree_map(".*", any::<i64>(), 0..4),
        )
            .prop_map(|(name, level, tags, extra)| Fixture {
                name,
                level,
                tags,
                extra,
            })
    }

    fn json_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            ".*".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
                proptest::collection::btree_map(".*", inner, 0..4)
                    .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn round_trip_json_value(key in proptest::option::of(".*"), value in proptest::option::of(json_value())) {
            let bytes = encode(key.as_deref(), value.as_ref()).unwrap();
            let record: TagRecord<serde_json::Value> = decode(&bytes).unwrap();
            prop_assert_eq!(record, TagRecord::new(key, value));
        }

        #[test]
        fn round_trip(key in proptest::option::of(".*"), value in proptest::option::of(fixture())) {
            let bytes = encode(key.as_deref(), value.as_ref()).unwrap();
            let record: TagRecord<Fixture> = decode(&bytes).unwrap();
            prop_assert_eq!(record, TagRecord::new(key, value));
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode::<Fixture>(&bytes);
        }
    }
}
