use super::charset::{encode_line, BLANK_CODE, OVERLAY_LINE_WIDTH};
use super::table::{lens_position, ZoomLevel};
use super::ViscaFrame;

/// Camera category byte; everything this controller sends lives in it.
const CAMERA: u8 = 0x04;

const CMD_POWER: u8 = 0x00;
const CMD_WHITE_BALANCE: u8 = 0x35;
const CMD_FOCUS_MODE: u8 = 0x38;
const CMD_AE_MODE: u8 = 0x39;
const CMD_EXPOSURE_COMP: u8 = 0x3E;
const CMD_ZOOM_DIRECT: u8 = 0x47;
const CMD_BRIGHT_DIRECT: u8 = 0x4E;
const CMD_SPOT_AE: u8 = 0x59;
const CMD_FREEZE: u8 = 0x62;
const CMD_TITLE_SET: u8 = 0x73;
const CMD_TITLE_DISPLAY: u8 = 0x74;

const ON: u8 = 0x02;
const OFF: u8 = 0x03;

const TITLE_DISPLAY_ON: u8 = 0x2F;
const TITLE_CLEAR_ALL: u8 = 0x1F;
/// Character payload slots sit 0x10 above their attribute slot.
const PAYLOAD_SLOT_OFFSET: u8 = 0x10;

/// Upper bound for the bright-direct level accepted from the operator.
pub const MAX_BRIGHTNESS: u8 = 20;

/// Zoom to the lens position stored for `level`.
///
/// The 16-bit code is split into four nibbles, most significant first, each in the low bits
/// of its own byte.
pub fn encode_zoom_absolute(level: ZoomLevel) -> ViscaFrame {
    let code = lens_position(level);
    ViscaFrame::command(
        CAMERA,
        CMD_ZOOM_DIRECT,
        &[
            ((code >> 12) & 0x0F) as u8,
            ((code >> 8) & 0x0F) as u8,
            ((code >> 4) & 0x0F) as u8,
            (code & 0x0F) as u8,
        ],
    )
}

/// Bright-direct level, clamped to `0..=MAX_BRIGHTNESS`.
pub fn encode_brightness(level: u8) -> ViscaFrame {
    let level = level.min(MAX_BRIGHTNESS);
    ViscaFrame::command(
        CAMERA,
        CMD_BRIGHT_DIRECT,
        &[0x00, 0x00, (level >> 4) & 0x0F, level & 0x0F],
    )
}

pub fn encode_freeze(on: bool) -> ViscaFrame {
    ViscaFrame::command(CAMERA, CMD_FREEZE, &[on_off(on)])
}

pub fn encode_autofocus(on: bool) -> ViscaFrame {
    ViscaFrame::command(CAMERA, CMD_FOCUS_MODE, &[on_off(on)])
}

pub fn encode_power(on: bool) -> ViscaFrame {
    ViscaFrame::command(CAMERA, CMD_POWER, &[on_off(on)])
}

/// White balance presets supported by the title camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteBalance {
    Auto,
    Indoor,
    Outdoor,
    OnePush,
    Atw,
    Manual,
}

impl WhiteBalance {
    fn code(self) -> u8 {
        match self {
            WhiteBalance::Auto => 0x00,
            WhiteBalance::Indoor => 0x01,
            WhiteBalance::Outdoor => 0x02,
            WhiteBalance::OnePush => 0x03,
            WhiteBalance::Atw => 0x04,
            WhiteBalance::Manual => 0x05,
        }
    }
}

pub fn encode_white_balance(mode: WhiteBalance) -> ViscaFrame {
    ViscaFrame::command(CAMERA, CMD_WHITE_BALANCE, &[mode.code()])
}

/// Wipe every title line held by the camera.
pub fn encode_title_clear() -> ViscaFrame {
    ViscaFrame::command(CAMERA, CMD_TITLE_DISPLAY, &[TITLE_CLEAR_ALL])
}

/// Initialisation burst sent once the camera has powered up.
pub fn power_on_defaults() -> Vec<ViscaFrame> {
    vec![
        encode_title_clear(),
        ViscaFrame::command(CAMERA, CMD_SPOT_AE, &[OFF]),
        ViscaFrame::command(CAMERA, CMD_AE_MODE, &[0x00]),
        ViscaFrame::command(CAMERA, CMD_EXPOSURE_COMP, &[ON]),
        encode_brightness(4),
        encode_white_balance(WhiteBalance::OnePush),
        encode_freeze(false),
        encode_autofocus(true),
    ]
}

/// Title line attribute slot. Valid slots are `0x10..=0x1A`, one per title row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlaySlot(u8);

impl OverlaySlot {
    pub const FIRST: u8 = 0x10;
    pub const LAST: u8 = 0x1A;

    /// Conventional slot for the override label ("ZOOM BY:").
    pub const LABEL: OverlaySlot = OverlaySlot(0x10);
    /// Conventional slot for the override identity.
    pub const NAME: OverlaySlot = OverlaySlot(0x11);
    /// Bottom row, used for the live zoom readout.
    pub const ZOOM: OverlaySlot = OverlaySlot(0x1A);

    pub fn new(slot: u8) -> Option<Self> {
        (Self::FIRST..=Self::LAST).contains(&slot).then_some(Self(slot))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn payload(self) -> u8 {
        self.0 + PAYLOAD_SLOT_OFFSET
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayColor {
    #[default]
    White,
    Yellow,
    Pink,
    Orange,
    LightBlue,
    Green,
    DarkBlue,
}

impl OverlayColor {
    fn code(self) -> u8 {
        match self {
            OverlayColor::White => 0x00,
            OverlayColor::Yellow => 0x01,
            OverlayColor::Pink => 0x02,
            OverlayColor::Orange => 0x03,
            OverlayColor::LightBlue => 0x04,
            OverlayColor::Green => 0x05,
            OverlayColor::DarkBlue => 0x06,
        }
    }
}

/// Per-line rendering attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayStyle {
    pub x_position: u8,
    pub color: OverlayColor,
    pub blink: bool,
}

/// Write `text` into one title line.
///
/// Produces three frames in order: title display on, line attributes for `slot`, and the
/// ten character cells at the payload slot. Text is truncated or blank-padded to the line
/// width.
pub fn encode_overlay_line(text: &str, slot: OverlaySlot, style: OverlayStyle) -> [ViscaFrame; 3] {
    overlay_frames(slot, style, encode_line(text))
}

/// Blank one title line. There is no dedicated clear opcode; the line is rewritten with
/// blank cells.
pub fn encode_overlay_clear(slot: OverlaySlot) -> [ViscaFrame; 3] {
    overlay_frames(slot, OverlayStyle::default(), [BLANK_CODE; OVERLAY_LINE_WIDTH])
}

fn overlay_frames(
    slot: OverlaySlot,
    style: OverlayStyle,
    cells: [u8; OVERLAY_LINE_WIDTH],
) -> [ViscaFrame; 3] {
    let attributes = [
        slot.get(),
        0x00,
        style.x_position,
        style.color.code(),
        u8::from(style.blink),
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    let mut payload = Vec::with_capacity(OVERLAY_LINE_WIDTH + 1);
    payload.push(slot.payload());
    payload.extend_from_slice(&cells);

    [
        ViscaFrame::command(CAMERA, CMD_TITLE_DISPLAY, &[TITLE_DISPLAY_ON]),
        ViscaFrame::command(CAMERA, CMD_TITLE_SET, &attributes),
        ViscaFrame::command(CAMERA, CMD_TITLE_SET, &payload),
    ]
}

fn on_off(on: bool) -> u8 {
    if on {
        ON
    } else {
        OFF
    }
}
