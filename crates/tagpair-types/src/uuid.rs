//! Well-known Bluetooth UUIDs used by tagpair peripherals.

use uuid::{Uuid, uuid};

/// Service UUID whose advertised service data carries the pairing key (UTF-8).
pub const PAIRING_KEY_SERVICE: Uuid = uuid!("0000fd2a-0000-1000-8000-00805f9b34fb");

/// Build a full UUID from a 16-bit Bluetooth SIG short UUID.
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_short() {
        assert_eq!(from_short(0xfd2a), PAIRING_KEY_SERVICE);
        assert_eq!(
            from_short(0x180a).to_string(),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
    }
}
