//! BLE GATT characteristic UUIDs

use uuid::Uuid;

/// Base for all provisioning characteristics; the last byte selects one
const fn char_uuid(selector: u8) -> Uuid {
    Uuid::from_bytes([
        0x4f, 0x86, 0x5a, 0x9d, 0x93, 0x1a, 0x4b, 0xc5, 0x9a, 0x0e, 0x52, 0x8f, 0x6f, 0xd2, 0x00,
        selector,
    ])
}

/// Proof-of-possession characteristic (write, 32-byte SHA3-256 digest)
pub const POP_CHAR_UUID: Uuid = char_uuid(0x01);

/// SSID characteristic (write, accumulates partial writes)
pub const SSID_CHAR_UUID: Uuid = char_uuid(0x02);

/// Passphrase characteristic (write, accumulates partial writes)
pub const SECRET_CHAR_UUID: Uuid = char_uuid(0x03);

/// Commit characteristic (write 0x01 to submit the buffered credentials)
pub const COMMIT_CHAR_UUID: Uuid = char_uuid(0x04);

/// Validation status characteristic (read/notify, JSON payload)
pub const STATUS_CHAR_UUID: Uuid = char_uuid(0x05);

/// Selector of the first custom data endpoint characteristic
const ENDPOINT_CHAR_BASE: u8 = 0x10;

/// Largest number of custom data endpoints one session can expose
pub const MAX_ENDPOINTS: usize = 16;

/// Characteristic UUID of the custom data endpoint at `index`
pub fn endpoint_char_uuid(index: usize) -> Option<Uuid> {
    if index >= MAX_ENDPOINTS {
        return None;
    }
    Some(char_uuid(ENDPOINT_CHAR_BASE + index as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_uuids_unique() {
        let uuids = [
            POP_CHAR_UUID,
            SSID_CHAR_UUID,
            SECRET_CHAR_UUID,
            COMMIT_CHAR_UUID,
            STATUS_CHAR_UUID,
        ];

        for (i, a) in uuids.iter().enumerate() {
            for (j, b) in uuids.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "UUIDs at positions {} and {} collide", i, j);
                }
            }
        }
    }

    #[test]
    fn test_endpoint_uuids_unique_and_disjoint() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..MAX_ENDPOINTS {
            let uuid = endpoint_char_uuid(i).unwrap();
            assert!(seen.insert(uuid));
            assert_ne!(uuid, STATUS_CHAR_UUID);
            assert_ne!(uuid, COMMIT_CHAR_UUID);
        }
    }

    #[test]
    fn test_endpoint_index_bound() {
        assert!(endpoint_char_uuid(MAX_ENDPOINTS).is_none());
        assert!(endpoint_char_uuid(MAX_ENDPOINTS - 1).is_some());
    }
}
