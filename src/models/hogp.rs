//! HID-over-GATT Profile identifiers shared by HOGP-based models.

use crate::types::Uuid;

/// Human Interface Device service.
pub const HID_SERVICE: Uuid = Uuid::Uuid16(0x1812);

/// HID Report characteristic (input and output instances).
pub const HID_REPORT: Uuid = Uuid::Uuid16(0x2A4D);

/// Protocol Mode characteristic.
pub const PROTOCOL_MODE: Uuid = Uuid::Uuid16(0x2A4E);

/// Battery service and its level characteristic.
pub const BATTERY_SERVICE: Uuid = Uuid::Uuid16(0x180F);
pub const BATTERY_LEVEL: Uuid = Uuid::Uuid16(0x2A19);

/// Protocol Mode values.
pub const PROTOCOL_MODE_BOOT: u8 = 0x00;
pub const PROTOCOL_MODE_REPORT: u8 = 0x01;
