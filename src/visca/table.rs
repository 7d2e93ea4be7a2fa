use std::fmt;

/// Lens position codes indexed by `level - 1`.
///
/// The optical zoom curve is not linear; these values were measured on the camera and are
/// the ground truth for every level. Strictly increasing.
pub const ZOOM_TABLE: [u16; 30] = [
    0x0000, 0x16A1, 0x2063, 0x2628, 0x2A1D, 0x2D13, 0x2F6D, 0x3161, 0x330D, 0x3486, //
    0x35D7, 0x3709, 0x3820, 0x3920, 0x3A0A, 0x3ADD, 0x3B9C, 0x3C46, 0x3CDC, 0x3D60, //
    0x3D9C, 0x3DD8, 0x3E14, 0x3E50, 0x3E8C, 0x3EC8, 0x3F04, 0x3F40, 0x3F7C, 0x3FFF,
];

/// Integer zoom level in `1..=30`. Construction either validates or clamps, so every value
/// of this type has a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    pub const MIN: ZoomLevel = ZoomLevel(1);
    pub const MAX: ZoomLevel = ZoomLevel(30);

    /// Returns `None` for values outside `1..=30`.
    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN.0 as i64..=Self::MAX.0 as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate every level from 1x to 30x.
    pub fn all() -> impl Iterator<Item = ZoomLevel> {
        (Self::MIN.0..=Self::MAX.0).map(ZoomLevel)
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Lens position code for `level`.
pub fn lens_position(level: ZoomLevel) -> u16 {
    ZOOM_TABLE[usize::from(level.0) - 1]
}
