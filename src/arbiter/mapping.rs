use clap::ValueEnum;

use crate::visca::ZoomLevel;

/// How a raw manual-input reading becomes a zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ZoomMapping {
    /// Linear and inverted: 0 is fully zoomed in (30x), the maximum reading is 1x.
    #[default]
    Inverted,
    /// Linear, not inverted: 0 is 1x, the maximum reading is 30x.
    Direct,
}

impl ZoomMapping {
    pub fn label(self) -> &'static str {
        match self {
            ZoomMapping::Inverted => "inverted",
            ZoomMapping::Direct => "direct",
        }
    }

    /// Scale `reading` (clamped to `0..=max`) into `1..=30`.
    pub fn level_for(self, reading: u16, max: u16) -> ZoomLevel {
        let max = u32::from(max.max(1));
        let reading = u32::from(reading).min(max);
        let span = u32::from(ZoomLevel::MAX.get() - ZoomLevel::MIN.get());
        let steps = i64::from(reading * span / max);
        match self {
            ZoomMapping::Inverted => ZoomLevel::clamped(i64::from(ZoomLevel::MAX.get()) - steps),
            ZoomMapping::Direct => ZoomLevel::clamped(i64::from(ZoomLevel::MIN.get()) + steps),
        }
    }
}
