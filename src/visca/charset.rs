/// Characters per title line segment.
pub const OVERLAY_LINE_WIDTH: usize = 10;

/// Code the title engine renders as an empty cell. Also used for anything unmapped.
pub const BLANK_CODE: u8 = 0x42;

/// Map one character to its title-generator code. Lowercase letters are folded to
/// uppercase first; characters whose uppercase form is not a single char (`ß`) keep their
/// own entry.
pub fn overlay_code(ch: char) -> u8 {
    let mut folded = ch.to_uppercase();
    let upper = match (folded.next(), folded.next()) {
        (Some(single), None) => single,
        _ => ch,
    };
    match upper {
        'A'..='Z' => upper as u8 - b'A',
        '1'..='9' => 0x1E + (upper as u8 - b'1'),
        '0' => 0x27,
        '&' => 0x1A,
        '?' => 0x1C,
        '!' => 0x1D,
        'À' => 0x28,
        'È' => 0x29,
        'Ì' => 0x2A,
        'Ò' => 0x2B,
        'Ù' => 0x2C,
        'Á' => 0x2D,
        'É' => 0x2E,
        'Í' => 0x2F,
        'Ó' => 0x30,
        'Ú' => 0x31,
        'Â' => 0x32,
        'Ê' => 0x33,
        'Ô' => 0x34,
        'Æ' => 0x35,
        'Ã' => 0x37,
        'Õ' => 0x38,
        'Ñ' => 0x39,
        'Ç' => 0x3A,
        'ß' => 0x3B,
        'Ä' => 0x3C,
        'Ï' => 0x3D,
        'Ö' => 0x3E,
        'Ü' => 0x3F,
        'Å' => 0x40,
        '$' => 0x41,
        '¥' => 0x43,
        '£' => 0x45,
        '¿' => 0x46,
        '¡' => 0x47,
        'Ø' => 0x48,
        '“' => 0x49,
        ':' => 0x4A,
        '\'' => 0x4B,
        '.' => 0x4C,
        ',' => 0x4D,
        '/' => 0x4E,
        '-' => 0x4F,
        _ => BLANK_CODE,
    }
}

/// Encode `text` into exactly one line segment: truncated to the line width, right-padded
/// with blanks.
pub(super) fn encode_line(text: &str) -> [u8; OVERLAY_LINE_WIDTH] {
    let mut cells = [BLANK_CODE; OVERLAY_LINE_WIDTH];
    for (cell, ch) in cells.iter_mut().zip(text.chars()) {
        *cell = overlay_code(ch);
    }
    cells
}
