use super::defaults::{
    MAX_BAUD, MAX_CHANNEL_CHARS, MAX_CHAT_PREFIX_CHARS, MAX_REWARD_ID_CHARS, MAX_TICK_MS,
    MAX_WINDOW_SECS, MIN_BAUD,
};
use super::AppConfig;
use crate::visca::{OverlaySlot, MAX_BRIGHTNESS};
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize identifiers.
    pub fn validate(&mut self) -> Result<()> {
        if self.tick_ms == 0 || self.tick_ms > MAX_TICK_MS {
            bail!("--tick-ms must be between 1 and {MAX_TICK_MS}, got {}", self.tick_ms);
        }
        if self.override_secs == 0 || self.override_secs > MAX_WINDOW_SECS {
            bail!(
                "--override-secs must be between 1 and {MAX_WINDOW_SECS}, got {}",
                self.override_secs
            );
        }
        if self.cooldown_secs > MAX_WINDOW_SECS {
            bail!(
                "--cooldown-secs must be at most {MAX_WINDOW_SECS}, got {}",
                self.cooldown_secs
            );
        }
        if !(MIN_BAUD..=MAX_BAUD).contains(&self.baud) {
            bail!("--baud must be between {MIN_BAUD} and {MAX_BAUD}, got {}", self.baud);
        }
        if self.adc_max == 0 {
            bail!("--adc-max must be greater than zero");
        }
        if let Some(reading) = self.manual_reading {
            if reading > self.adc_max {
                bail!(
                    "--manual-reading ({reading}) cannot exceed --adc-max ({})",
                    self.adc_max
                );
            }
        }
        if let Some(brightness) = self.brightness {
            if brightness > MAX_BRIGHTNESS {
                bail!("--brightness must be between 0 and {MAX_BRIGHTNESS}, got {brightness}");
            }
        }
        if self.irc_port == 0 {
            bail!("--irc-port must be non-zero");
        }
        if self.udp_port == Some(0) {
            bail!("--udp-port must be non-zero");
        }
        if self.irc_host.trim().is_empty() {
            bail!("--irc-host cannot be empty");
        }
        if self.chat_prefix.chars().count() > MAX_CHAT_PREFIX_CHARS {
            bail!("--chat-prefix must be at most {MAX_CHAT_PREFIX_CHARS} characters");
        }
        if self.chat_prefix.contains(['\r', '\n']) {
            bail!("--chat-prefix cannot contain line breaks");
        }

        self.validate_slots()?;

        self.client_id = non_empty(self.client_id.take());
        self.client_secret = non_empty(self.client_secret.take());
        self.reward_id = non_empty(self.reward_id.take());
        self.serial_port = non_empty(self.serial_port.take());
        self.channel = match non_empty(self.channel.take()) {
            Some(channel) => Some(normalize_channel(&channel)?),
            None => None,
        };
        if let Some(reward_id) = &self.reward_id {
            validate_reward_id(reward_id)?;
        }
        for scope in &self.scopes {
            if scope.is_empty() || scope.contains(char::is_whitespace) {
                bail!("--scope values must be single non-empty tokens, got {scope:?}");
            }
        }
        Ok(())
    }

    fn validate_slots(&self) -> Result<()> {
        for (flag, slot) in [
            ("--zoom-slot", self.zoom_slot),
            ("--label-slot", self.label_slot),
            ("--name-slot", self.name_slot),
        ] {
            if OverlaySlot::new(slot).is_none() {
                bail!(
                    "{flag} must be between {:#04X} and {:#04X}, got {slot:#04X}",
                    OverlaySlot::FIRST,
                    OverlaySlot::LAST
                );
            }
        }
        if self.label_slot == self.name_slot {
            bail!("--label-slot and --name-slot must differ");
        }
        if !self.no_zoom_overlay
            && (self.zoom_slot == self.label_slot || self.zoom_slot == self.name_slot)
        {
            bail!("--zoom-slot must differ from the override label and name slots");
        }
        Ok(())
    }
}

/// Accept overlay slots as hex (`0x1A`) or decimal (`26`).
pub(super) fn parse_slot(raw: &str) -> Result<u8, String> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => trimmed.parse::<u8>(),
    };
    parsed.map_err(|err| format!("invalid overlay slot {raw:?}: {err}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Lowercase, drop a leading `#`, and keep to the characters channel names allow.
pub(super) fn normalize_channel(raw: &str) -> Result<String> {
    let channel = raw.trim().trim_start_matches('#').to_ascii_lowercase();
    if channel.is_empty() {
        bail!("--channel cannot be empty");
    }
    if channel.chars().count() > MAX_CHANNEL_CHARS {
        bail!("--channel must be at most {MAX_CHANNEL_CHARS} characters");
    }
    if !channel
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        bail!("--channel may only contain letters, digits, and underscores, got {raw:?}");
    }
    Ok(channel)
}

fn validate_reward_id(reward_id: &str) -> Result<()> {
    if reward_id.chars().count() > MAX_REWARD_ID_CHARS {
        bail!("--reward-id must be at most {MAX_REWARD_ID_CHARS} characters");
    }
    if !reward_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    {
        bail!("--reward-id may only contain letters, digits, and dashes");
    }
    Ok(())
}
