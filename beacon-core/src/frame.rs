//! Parse raw advertisement payloads into beacon records.
//!
//! Responsibilities:
//! - Check the fixed structural prefix (flags, length and type markers)
//! - Extract UUID, major, minor and reference power
//! - Apply the optional UUID filter
//! - Reject truncated buffers without ever reading out of bounds
//!
//! Anything that does not look like a beacon frame is routine radio traffic,
//! so rejection is `None` rather than an error.

use crate::types::{BeaconRecord, BeaconUuid};

/// Length of the structural prefix preceding the UUID.
pub const ADV_PREFIX_LENGTH: usize = 9;

/// Length of the region UUID.
pub const ADV_UUID_LENGTH: usize = 16;

/// Prefix + UUID + major/minor + reference power.
pub const MIN_FRAME_LENGTH: usize = ADV_PREFIX_LENGTH + ADV_UUID_LENGTH + 4 + 1;

/// Byte carrying the connectable flag on vendor version-2 devices.
pub const CONNECTABLE_OFFSET: usize = 31;

// (offset, expected byte) pairs of the structural prefix
const PREFIX_MARKERS: &[(usize, u8)] = &[(0, 0x02), (1, 0x01), (4, 0xFF), (7, 0x02)];

/// Decodes advertisement payloads, optionally restricted to one UUID.
#[derive(Debug, Clone, Default)]
pub struct FrameParser {
    uuid_filter: Option<BeaconUuid>,
}

impl FrameParser {
    pub fn new(uuid_filter: Option<BeaconUuid>) -> Self {
        FrameParser { uuid_filter }
    }

    pub fn uuid_filter(&self) -> Option<&BeaconUuid> {
        self.uuid_filter.as_ref()
    }

    /// Only frames carrying this UUID are accepted from now on. `None` accepts all.
    pub fn set_uuid_filter(&mut self, uuid: Option<BeaconUuid>) {
        self.uuid_filter = uuid;
    }

    /// Decode one payload. Address, signal and vendor fields are left for
    /// the caller since they come from the transport, not the payload.
    pub fn parse(&self, data: &[u8]) -> Option<BeaconRecord> {
        if data.len() < MIN_FRAME_LENGTH || !has_beacon_prefix(data) {
            return None;
        }

        let uuid: BeaconUuid = data[ADV_PREFIX_LENGTH..ADV_PREFIX_LENGTH + ADV_UUID_LENGTH]
            .try_into()
            .ok()?;

        if let Some(filter) = &self.uuid_filter {
            if *filter != uuid {
                return None;
            }
        }

        let offset = ADV_PREFIX_LENGTH + ADV_UUID_LENGTH;
        let major = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let minor = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        let reference_power = data[offset + 4] as i8;

        Some(BeaconRecord::new(uuid, major, minor, reference_power))
    }
}

fn has_beacon_prefix(data: &[u8]) -> bool {
    PREFIX_MARKERS
        .iter()
        .all(|&(offset, expected)| data.get(offset) == Some(&expected))
}

/// Connectable flag of a vendor version-2 frame. Missing byte reads as not connectable.
pub fn connectable_flag(data: &[u8]) -> bool {
    data.get(CONNECTABLE_OFFSET).is_some_and(|&b| b != 0)
}

/// Build a well-formed beacon payload. Used by tests and capture tooling.
pub fn encode_frame(uuid: &BeaconUuid, major: u16, minor: u16, reference_power: i8) -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06, 0x1A, 0xFF, 0x4C, 0x00, 0x02, 0x15];
    data.extend_from_slice(uuid);
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(reference_power as u8);
    data
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
