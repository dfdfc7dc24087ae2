//! Pairing key extraction from BLE advertisements.
//!
//! A pairing-capable peripheral advertises its key as UTF-8 service data
//! under [`PAIRING_KEY_SERVICE`]. Anything else (no entry, empty data, bytes
//! that are not UTF-8) counts as "no key", and the coordinator ignores the
//! advertisement.

use std::collections::HashMap;

use tracing::trace;
use uuid::Uuid;

use tagpair_types::uuids::PAIRING_KEY_SERVICE;

/// Extract the pairing key from advertised service data.
pub fn extract_pairing_key(service_data: &HashMap<Uuid, Vec<u8>>) -> Option<String> {
    let data = service_data.get(&PAIRING_KEY_SERVICE)?;
    if data.is_empty() {
        return None;
    }
    match std::str::from_utf8(data) {
        Ok(key) => Some(key.to_string()),
        Err(e) => {
            trace!(error = %e, "Pairing key service data is not UTF-8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairing_key_service_data(key: &str) -> (Uuid, Vec<u8>) {
        (PAIRING_KEY_SERVICE, key.as_bytes().to_vec())
    }

    #[test]
    fn test_extract_pairing_key() {
        let service_data: HashMap<Uuid, Vec<u8>> =
            [pairing_key_service_data("c20c8a91")].into_iter().collect();
        assert_eq!(
            extract_pairing_key(&service_data),
            Some("c20c8a91".to_string())
        );
    }

    #[test]
    fn test_key_is_not_normalized() {
        let service_data: HashMap<Uuid, Vec<u8>> =
            [pairing_key_service_data(" Key ")].into_iter().collect();
        assert_eq!(extract_pairing_key(&service_data), Some(" Key ".to_string()));
    }

    #[test]
    fn test_no_key() {
        assert_eq!(extract_pairing_key(&HashMap::new()), None);

        let other: HashMap<Uuid, Vec<u8>> =
            [(Uuid::from_u128(1), b"c20c8a91".to_vec())].into_iter().collect();
        assert_eq!(extract_pairing_key(&other), None);

        let empty: HashMap<Uuid, Vec<u8>> =
            [(PAIRING_KEY_SERVICE, Vec::new())].into_iter().collect();
        assert_eq!(extract_pairing_key(&empty), None);
    }

    #[test]
    fn test_invalid_utf8_is_no_key() {
        let service_data: HashMap<Uuid, Vec<u8>> =
            [(PAIRING_KEY_SERVICE, vec![0xff, 0xfe])].into_iter().collect();
        assert_eq!(extract_pairing_key(&service_data), None);
    }
}
