//! Vendor extension decoding.
//!
//! Vendor devices advertise a name of the form `<prefix><model><version>...`
//! where model and version are single digits. Version 1 hardware is always
//! connectable; version 2 signals connectability in the frame itself, and a
//! non-connectable version 2 device is reported as a generic beacon.

use crate::frame::connectable_flag;
use crate::types::BeaconRecord;

/// Name prefix used by the vendor's firmware.
pub const DEFAULT_VENDOR_PREFIX: &str = "easiBeacon_";

/// Vendor attributes decoded from a device name and frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorInfo {
    pub model: u8,
    pub version: u8,
    pub connectable: bool,
    /// False when the device should be reported as a generic beacon.
    pub flagged: bool,
}

impl VendorInfo {
    /// Copy the vendor attributes onto a record.
    pub fn apply(&self, record: &mut BeaconRecord) {
        record.vendor_flag = self.flagged;
        record.vendor_model = Some(self.model);
        record.vendor_version = Some(self.version);
        record.connectable = self.connectable;
    }
}

/// Recognizes vendor devices by advertised name.
#[derive(Debug, Clone)]
pub struct VendorDecoder {
    prefix: String,
}

impl VendorDecoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        VendorDecoder {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Decode vendor attributes. `None` for unnamed or foreign devices and for
    /// names whose model/version characters are not digits.
    pub fn decode(&self, device_name: Option<&str>, frame: &[u8]) -> Option<VendorInfo> {
        let rest = device_name?.strip_prefix(self.prefix.as_str())?;
        let mut chars = rest.chars();
        let model = digit(chars.next()?)?;
        let version = digit(chars.next()?)?;

        let (connectable, flagged) = match version {
            1 => (true, true),
            2 => {
                let connectable = connectable_flag(frame);
                (connectable, connectable)
            }
            _ => (false, true),
        };

        Some(VendorInfo {
            model,
            version,
            connectable,
            flagged,
        })
    }
}

impl Default for VendorDecoder {
    fn default() -> Self {
        VendorDecoder::new(DEFAULT_VENDOR_PREFIX)
    }
}

fn digit(c: char) -> Option<u8> {
    c.to_digit(10).and_then(|d| u8::try_from(d).ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_frame, CONNECTABLE_OFFSET};

    fn frame(connectable: Option<u8>) -> Vec<u8> {
        let mut data = encode_frame(&[0u8; 16], 1, 1, -59);
        if let Some(flag) = connectable {
            data.resize(CONNECTABLE_OFFSET, 0);
            data.push(flag);
        }
        data
    }

    #[test]
    fn test_version_one_always_connectable() {
        let info = VendorDecoder::default()
            .decode(Some("easiBeacon_31"), &frame(None))
            .unwrap();
        assert_eq!(info.model, 3);
        assert_eq!(info.version, 1);
        assert!(info.connectable);
        assert!(info.flagged);
    }

    #[test]
    fn test_version_two_reads_frame_flag() {
        let decoder = VendorDecoder::default();

        let info = decoder.decode(Some("easiBeacon_12"), &frame(Some(1))).unwrap();
        assert!(info.connectable);
        assert!(info.flagged);

        let info = decoder.decode(Some("easiBeacon_12"), &frame(Some(0))).unwrap();
        assert!(!info.connectable);
        assert!(!info.flagged, "non-connectable v2 is reported as generic");

        let info = decoder.decode(Some("easiBeacon_12"), &frame(None)).unwrap();
        assert!(!info.connectable);
    }

    #[test]
    fn test_unknown_version_flagged_not_connectable() {
        let info = VendorDecoder::default()
            .decode(Some("easiBeacon_17"), &frame(Some(1)))
            .unwrap();
        assert!(info.flagged);
        assert!(!info.connectable);
    }

    #[test]
    fn test_non_vendor_names() {
        let decoder = VendorDecoder::default();
        assert!(decoder.decode(None, &frame(None)).is_none());
        assert!(decoder.decode(Some("Estimote"), &frame(None)).is_none());
        assert!(decoder.decode(Some("easiBeacon_"), &frame(None)).is_none());
        assert!(decoder.decode(Some("easiBeacon_1"), &frame(None)).is_none());
        assert!(decoder.decode(Some("easiBeacon_xy"), &frame(None)).is_none());
    }

    #[test]
    fn test_custom_prefix_and_apply() {
        let decoder = VendorDecoder::new("acme-");
        let info = decoder.decode(Some("acme-21"), &frame(None)).unwrap();

        let mut record = BeaconRecord::new([0u8; 16], 1, 1, -59);
        info.apply(&mut record);
        assert!(record.vendor_flag);
        assert_eq!(record.vendor_model, Some(2));
        assert_eq!(record.vendor_version, Some(1));
        assert!(record.connectable);
    }
}
