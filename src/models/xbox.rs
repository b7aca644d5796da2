//! Xbox Wireless Controller (BLE firmware) model.
//!
//! Input report layout (16 bytes, HID Report characteristic):
//! ```text
//! Bytes  0-1: Left stick X   (u16 LE, 0..65535)
//! Bytes  2-3: Left stick Y   (u16 LE, 0..65535)
//! Bytes  4-5: Right stick X  (u16 LE, 0..65535)
//! Bytes  6-7: Right stick Y  (u16 LE, 0..65535)
//! Bytes  8-9: Left trigger   (u16 LE, 0..1023)
//! Bytes 10-11: Right trigger (u16 LE, 0..1023)
//! Byte  12: Hat switch (0 = released, 1..=8 clockwise from north)
//! Bytes 13-15: Button bitmap (LE; see `Buttons` bit positions)
//! ```
//!
//! Rumble output report layout (8 bytes):
//! ```text
//! Byte 0: Actuator enable mask
//!         Bit 0 = Right trigger, Bit 1 = Left trigger,
//!         Bit 2 = Right (weak),  Bit 3 = Left (strong)
//! Byte 1: Left trigger magnitude  (0..100)
//! Byte 2: Right trigger magnitude (0..100)
//! Byte 3: Left magnitude          (0..100)
//! Byte 4: Right magnitude         (0..100)
//! Byte 5: Duration    (10 ms units)
//! Byte 6: Start delay (10 ms units)
//! Byte 7: Repeat count
//! ```

use crate::error::EncodeError;
use crate::matcher::{
    BatteryChannel, ChannelSpec, ControllerDescription, ControlsChannel, VibrationChannel,
};
use crate::models::hogp;
use crate::types::{BatteryLevel, Buttons, ControlsState, DPad, StickPosition, VibrationCommand};

/// Input report size in bytes.
pub const INPUT_REPORT_SIZE: usize = 16;

/// Rumble output report size in bytes.
pub const RUMBLE_REPORT_SIZE: usize = 8;

const ENABLE_RIGHT_TRIGGER: u8 = 1 << 0;
const ENABLE_LEFT_TRIGGER: u8 = 1 << 1;
const ENABLE_RIGHT: u8 = 1 << 2;
const ENABLE_LEFT: u8 = 1 << 3;

/// Built-in description, registered lowest-priority at registry init.
pub static XBOX_WIRELESS: ControllerDescription = ControllerDescription {
    name: Some("Xbox Wireless Controller"),
    controls: Some(ControlsChannel {
        channel: ChannelSpec {
            service: hogp::HID_SERVICE,
            characteristic: hogp::HID_REPORT,
        },
        decode: decode_input_report,
    }),
    battery: Some(BatteryChannel {
        channel: ChannelSpec {
            service: hogp::BATTERY_SERVICE,
            characteristic: hogp::BATTERY_LEVEL,
        },
        decode: decode_battery_level,
    }),
    vibration: Some(VibrationChannel {
        channel: ChannelSpec {
            service: hogp::HID_SERVICE,
            characteristic: hogp::HID_REPORT,
        },
        encode: encode_rumble_report,
    }),
    hid_setup: true,
};

/// Map a raw 16-bit axis to `-1.0..=1.0`.
fn axis(raw: u16) -> f32 {
    (raw as f32 / 32767.5) - 1.0
}

/// Map a raw 10-bit trigger to `0.0..=1.0`.
fn trigger(raw: u16) -> f32 {
    (raw.min(1023) as f32) / 1023.0
}

/// Decode one input report.
pub fn decode_input_report(data: &[u8], out: &mut ControlsState) -> usize {
    if data.len() < INPUT_REPORT_SIZE {
        return 0;
    }
    let Some(dpad) = DPad::from_hat(data[12]) else {
        return 0;
    };

    out.left_stick = StickPosition {
        x: axis(u16::from_le_bytes([data[0], data[1]])),
        y: axis(u16::from_le_bytes([data[2], data[3]])),
    };
    out.right_stick = StickPosition {
        x: axis(u16::from_le_bytes([data[4], data[5]])),
        y: axis(u16::from_le_bytes([data[6], data[7]])),
    };
    out.left_trigger = trigger(u16::from_le_bytes([data[8], data[9]]));
    out.right_trigger = trigger(u16::from_le_bytes([data[10], data[11]]));
    out.dpad = dpad;
    out.buttons = Buttons(u32::from_le_bytes([data[13], data[14], data[15], 0]));

    INPUT_REPORT_SIZE
}

/// Decode one Battery Level value (single percent byte).
pub fn decode_battery_level(data: &[u8], out: &mut BatteryLevel) -> usize {
    if data.is_empty() || data[0] > 100 {
        return 0;
    }
    out.percent = data[0];
    1
}

/// Quantize a `0.0..=1.0` power to 1/100 steps.
fn magnitude(power: f32) -> u8 {
    (power * 100.0 + 0.5) as u8
}

/// Encode one rumble command.
pub fn encode_rumble_report(cmd: &VibrationCommand, buf: &mut [u8]) -> Result<usize, EncodeError> {
    for power in [cmd.left, cmd.right, cmd.left_trigger, cmd.right_trigger] {
        if !(0.0..=1.0).contains(&power) {
            return Err(EncodeError::InvalidValue);
        }
    }
    if buf.len() < RUMBLE_REPORT_SIZE {
        return Err(EncodeError::BufferTooShort);
    }

    let mut enable = 0u8;
    if cmd.right_trigger > 0.0 {
        enable |= ENABLE_RIGHT_TRIGGER;
    }
    if cmd.left_trigger > 0.0 {
        enable |= ENABLE_LEFT_TRIGGER;
    }
    if cmd.right > 0.0 {
        enable |= ENABLE_RIGHT;
    }
    if cmd.left > 0.0 {
        enable |= ENABLE_LEFT;
    }

    buf[0] = enable;
    buf[1] = magnitude(cmd.left_trigger);
    buf[2] = magnitude(cmd.right_trigger);
    buf[3] = magnitude(cmd.left);
    buf[4] = magnitude(cmd.right);
    buf[5] = (cmd.duration_ms / 10).min(255) as u8;
    buf[6] = (cmd.delay_ms / 10).min(255) as u8;
    buf[7] = cmd.repeat;

    Ok(RUMBLE_REPORT_SIZE)
}

/// Decode a rumble report back into a command.
///
/// Pairs with [`encode_rumble_report`] so the codec is self-consistent;
/// useful for loopback testing against peripherals that echo output
/// reports.
pub fn decode_rumble_report(data: &[u8], out: &mut VibrationCommand) -> usize {
    if data.len() < RUMBLE_REPORT_SIZE {
        return 0;
    }
    let enable = data[0];
    let power = |bit: u8, mag: u8| -> f32 {
        if enable & bit != 0 {
            (mag.min(100) as f32) / 100.0
        } else {
            0.0
        }
    };

    out.left_trigger = power(ENABLE_LEFT_TRIGGER, data[1]);
    out.right_trigger = power(ENABLE_RIGHT_TRIGGER, data[2]);
    out.left = power(ENABLE_LEFT, data[3]);
    out.right = power(ENABLE_RIGHT, data[4]);
    out.duration_ms = data[5] as u16 * 10;
    out.delay_ms = data[6] as u16 * 10;
    out.repeat = data[7];

    RUMBLE_REPORT_SIZE
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32, tolerance: f32) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn decode_centered_sticks_idle_report() {
        // Sticks centered (0x8000), triggers released, hat released.
        let mut data = [0u8; 16];
        for i in [1, 3, 5, 7] {
            data[i] = 0x80;
        }
        let mut state = ControlsState::default();
        assert_eq!(decode_input_report(&data, &mut state), INPUT_REPORT_SIZE);
        assert!(close(state.left_stick.x, 0.0, 0.001));
        assert!(close(state.right_stick.y, 0.0, 0.001));
        assert_eq!(state.left_trigger, 0.0);
        assert_eq!(state.dpad, DPad::Released);
        assert!(!state.buttons.any());
    }

    #[test]
    fn decode_extremes_and_buttons() {
        let mut data = [0u8; 16];
        // Left stick full left/up = 0, right stick full right/down = max.
        data[4] = 0xFF;
        data[5] = 0xFF;
        data[6] = 0xFF;
        data[7] = 0xFF;
        // Right trigger fully pulled.
        data[10] = 0xFF;
        data[11] = 0x03;
        // Hat east, A + menu pressed.
        data[12] = 3;
        data[13] = (Buttons::A | Buttons::B) as u8;
        data[14] = (Buttons::MENU >> 8) as u8;

        let mut state = ControlsState::default();
        assert_eq!(decode_input_report(&data, &mut state), INPUT_REPORT_SIZE);
        assert!(close(state.left_stick.x, -1.0, 0.001));
        assert!(close(state.right_stick.x, 1.0, 0.001));
        assert_eq!(state.right_trigger, 1.0);
        assert_eq!(state.dpad, DPad::Right);
        assert!(state.buttons.pressed(Buttons::A | Buttons::B | Buttons::MENU));
        assert!(!state.buttons.pressed(Buttons::X));
    }

    #[test]
    fn decode_rejects_short_report() {
        let mut state = ControlsState::default();
        assert_eq!(decode_input_report(&[0u8; 15], &mut state), 0);
    }

    #[test]
    fn decode_rejects_invalid_hat() {
        let mut data = [0u8; 16];
        data[12] = 9;
        let mut state = ControlsState::default();
        assert_eq!(decode_input_report(&data, &mut state), 0);
    }

    #[test]
    fn battery_level_decoding() {
        let mut level = BatteryLevel::default();
        assert_eq!(decode_battery_level(&[87], &mut level), 1);
        assert_eq!(level.percent, 87);

        // Out-of-range and empty payloads are rejected.
        assert_eq!(decode_battery_level(&[101], &mut level), 0);
        assert_eq!(decode_battery_level(&[], &mut level), 0);
        assert_eq!(level.percent, 87);
    }

    #[test]
    fn rumble_roundtrip_quantized_to_hundredths() {
        let cmd = VibrationCommand {
            left: 0.75,
            right: 0.5,
            left_trigger: 0.33,
            right_trigger: 0.0,
            duration_ms: 500,
            delay_ms: 20,
            repeat: 2,
        };
        let mut buf = [0u8; RUMBLE_REPORT_SIZE];
        assert_eq!(encode_rumble_report(&cmd, &mut buf), Ok(RUMBLE_REPORT_SIZE));

        let mut back = VibrationCommand::default();
        assert_eq!(decode_rumble_report(&buf, &mut back), RUMBLE_REPORT_SIZE);
        assert!(close(back.left, cmd.left, 0.005));
        assert!(close(back.right, cmd.right, 0.005));
        assert!(close(back.left_trigger, cmd.left_trigger, 0.005));
        assert_eq!(back.right_trigger, 0.0);
        assert_eq!(back.duration_ms, 500);
        assert_eq!(back.delay_ms, 20);
        assert_eq!(back.repeat, 2);
    }

    #[test]
    fn rumble_enable_mask_tracks_nonzero_motors() {
        let mut buf = [0u8; RUMBLE_REPORT_SIZE];
        encode_rumble_report(&VibrationCommand::main(1.0, 0.0, 100), &mut buf).unwrap();
        assert_eq!(buf[0], 1 << 3); // left only
        assert_eq!(buf[3], 100);
        assert_eq!(buf[4], 0);
        assert_eq!(buf[5], 10);

        encode_rumble_report(&VibrationCommand::off(), &mut buf).unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn rumble_rejects_out_of_range_power() {
        let mut buf = [0u8; RUMBLE_REPORT_SIZE];
        let too_hot = VibrationCommand::main(1.5, 0.0, 100);
        assert_eq!(
            encode_rumble_report(&too_hot, &mut buf),
            Err(EncodeError::InvalidValue)
        );
        let negative = VibrationCommand::main(-0.1, 0.0, 100);
        assert_eq!(
            encode_rumble_report(&negative, &mut buf),
            Err(EncodeError::InvalidValue)
        );
    }

    #[test]
    fn rumble_reports_short_buffer() {
        let mut buf = [0u8; RUMBLE_REPORT_SIZE - 1];
        assert_eq!(
            encode_rumble_report(&VibrationCommand::off(), &mut buf),
            Err(EncodeError::BufferTooShort)
        );
    }

    #[test]
    fn description_enables_all_three_channels() {
        assert!(XBOX_WIRELESS.has_enabled_channel());
        assert!(XBOX_WIRELESS.controls.is_some());
        assert!(XBOX_WIRELESS.battery.is_some());
        assert!(XBOX_WIRELESS.vibration.is_some());
        assert!(XBOX_WIRELESS.hid_setup);
    }
}
