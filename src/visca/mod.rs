//! VISCA command encoding for the subset of camera operations the controller drives.
//!
//! Every function here is pure: it turns a semantic request into the exact bytes that go
//! out on the serial line. Framing is always `0x81 0x01 <category> <command> [params] 0xFF`.

mod charset;
mod encoder;
mod table;


pub use charset::{overlay_code, BLANK_CODE, OVERLAY_LINE_WIDTH};
pub use encoder::{
    encode_autofocus, encode_brightness, encode_freeze, encode_overlay_clear,
    encode_overlay_line, encode_power, encode_title_clear, encode_white_balance,
    encode_zoom_absolute, power_on_defaults, OverlayColor, OverlaySlot, OverlayStyle,
    WhiteBalance, MAX_BRIGHTNESS,
};
pub use table::{lens_position, ZoomLevel, ZOOM_TABLE};

/// Camera address byte for the first (and only) device on the chain.
pub const ADDRESS: u8 = 0x81;
/// Command message type.
pub const COMMAND: u8 = 0x01;
/// Frame terminator.
pub const TERMINATOR: u8 = 0xFF;

/// One complete, framed VISCA message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViscaFrame(Vec<u8>);

impl ViscaFrame {
    /// Frame `category`, `command` and `params` with the fixed address and terminator.
    pub fn command(category: u8, command: u8, params: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(params.len() + 5);
        bytes.extend_from_slice(&[ADDRESS, COMMAND, category, command]);
        bytes.extend_from_slice(params);
        bytes.push(TERMINATOR);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-separated uppercase hex, used in logs and `--print-frames`.
    pub fn hex(&self) -> String {
        self.0
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl AsRef<[u8]> for ViscaFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
