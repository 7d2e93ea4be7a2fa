//! Zoom arbitration between the manual input and a time-limited remote override.
//!
//! The arbiter is polled once per control tick. It never talks to the camera; it reports the
//! effective level plus the events the caller has to turn into VISCA traffic. Repeated
//! identical levels produce no events, which keeps the low-baud serial link quiet and avoids
//! rewriting the title engine mid-update.

mod mapping;


use std::time::{Duration, Instant};

use crate::visca::ZoomLevel;
use crate::{log_debug, log_debug_content};

pub use mapping::ZoomMapping;

/// A command that arrived from a remote source (chat reward, UDP bridge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Zoom { level: ZoomLevel, source: String },
    Cancel { source: String },
}

/// Active override. Only one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideState {
    pub level: ZoomLevel,
    pub source: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterMode {
    Manual,
    Override(OverrideState),
}

/// Output events, in the order the caller should act on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterEvent {
    ZoomChanged(ZoomLevel),
    OverlayUpdate { identity: String },
    OverlayClear,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub level: ZoomLevel,
    pub events: Vec<ArbiterEvent>,
}

/// Settings snapshot taken from the CLI config.
#[derive(Debug, Clone, Copy)]
pub struct ArbiterSettings {
    pub mapping: ZoomMapping,
    pub input_max: u16,
    pub override_window: Duration,
}

pub struct ZoomArbiter {
    settings: ArbiterSettings,
    mode: ArbiterMode,
    last_emitted: Option<ZoomLevel>,
    pending: Vec<ArbiterEvent>,
}

impl ZoomArbiter {
    pub fn new(settings: ArbiterSettings) -> Self {
        Self {
            settings,
            mode: ArbiterMode::Manual,
            last_emitted: None,
            pending: Vec::new(),
        }
    }

    pub fn mode(&self) -> &ArbiterMode {
        &self.mode
    }

    pub fn is_override(&self) -> bool {
        matches!(self.mode, ArbiterMode::Override(_))
    }

    pub fn settings(&self) -> ArbiterSettings {
        self.settings
    }

    /// Record a remote command. Events it causes are reported by the next `tick`.
    ///
    /// A zoom command replaces any active override and restarts its window. A cancel while
    /// already manual does nothing.
    pub fn apply(&mut self, command: RemoteCommand, now: Instant) {
        match command {
            RemoteCommand::Zoom { level, source } => {
                let expires_at = now + self.settings.override_window;
                log_debug(&format!(
                    "override {level} for {}s",
                    self.settings.override_window.as_secs()
                ));
                log_debug_content(&format!("override source: {source}"));
                tracing::info!(level = level.get(), "zoom override started");
                self.pending
                    .retain(|event| !matches!(event, ArbiterEvent::OverlayUpdate { .. }));
                self.pending.push(ArbiterEvent::OverlayUpdate {
                    identity: source.clone(),
                });
                self.mode = ArbiterMode::Override(OverrideState {
                    level,
                    source,
                    expires_at,
                });
            }
            RemoteCommand::Cancel { source } => {
                if self.is_override() {
                    log_debug_content(&format!("override cancelled by {source}"));
                    self.end_override("cancelled");
                }
            }
        }
    }

    /// Decide the effective level for this tick from the manual `reading`, expiring the
    /// override when `now` is past its deadline.
    pub fn tick(&mut self, reading: u16, now: Instant) -> Tick {
        if let ArbiterMode::Override(state) = &self.mode {
            if now > state.expires_at {
                self.end_override("expired");
            }
        }

        let level = match &self.mode {
            ArbiterMode::Override(state) => state.level,
            ArbiterMode::Manual => self.manual_level(reading),
        };

        let mut events = std::mem::take(&mut self.pending);
        if self.last_emitted != Some(level) {
            self.last_emitted = Some(level);
            events.push(ArbiterEvent::ZoomChanged(level));
        }
        Tick { level, events }
    }

    /// Level the manual input alone would select.
    pub fn manual_level(&self, reading: u16) -> ZoomLevel {
        self.settings
            .mapping
            .level_for(reading, self.settings.input_max)
    }

    /// Drop back to the safe default: manual control, override cleared. The next tick
    /// re-emits the zoom level even if it did not change.
    pub fn reset(&mut self) {
        if self.is_override() {
            self.end_override("reset");
        }
        self.last_emitted = None;
    }

    /// Forget what was last emitted so the next tick sends the level again. Used after a
    /// transport failure; the override, if any, stays.
    pub fn resend_next_tick(&mut self) {
        self.last_emitted = None;
    }

    fn end_override(&mut self, reason: &str) {
        log_debug(&format!("override ended ({reason}), back to manual"));
        tracing::info!(reason, "zoom override ended");
        self.mode = ArbiterMode::Manual;
        self.pending
            .retain(|event| !matches!(event, ArbiterEvent::OverlayUpdate { .. }));
        self.pending.push(ArbiterEvent::OverlayClear);
    }
}
