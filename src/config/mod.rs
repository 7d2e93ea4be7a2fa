//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::{path::PathBuf, time::Duration};

use crate::arbiter::{ArbiterSettings, ZoomMapping};
use crate::log_debug;
use crate::visca::{OverlaySlot, OverlayStyle};

pub use defaults::{
    DEFAULT_ADC_MAX, DEFAULT_BAUD, DEFAULT_COOLDOWN_SECS, DEFAULT_IRC_HOST, DEFAULT_IRC_PORT,
    DEFAULT_OVERRIDE_LABEL, DEFAULT_OVERRIDE_SECS, DEFAULT_SCOPES, DEFAULT_SECRETS_PATH,
    DEFAULT_TICK_MS,
};
use validation::parse_slot;

/// CLI options for the zoom controller. Validated values keep the serial link and chat
/// session within the ranges the camera and server accept.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "visca-zoom",
    about = "VISCA zoom controller with chat reward override",
    author,
    version
)]
pub struct AppConfig {
    /// Serial device connected to the camera (omit for a dry run that only logs frames)
    #[arg(long = "serial-port", env = "VISCA_ZOOM_SERIAL")]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Send the power-on initialisation burst before the first tick
    #[arg(long = "init-camera", default_value_t = false)]
    pub init_camera: bool,

    /// Exposure brightness (0-20) sent at startup
    #[arg(long)]
    pub brightness: Option<u8>,

    /// File holding the raw manual-input reading (sysfs/IIO ADC)
    #[arg(long = "adc-path")]
    pub adc_path: Option<PathBuf>,

    /// Largest raw reading the manual input produces
    #[arg(long = "adc-max", default_value_t = DEFAULT_ADC_MAX)]
    pub adc_max: u16,

    /// Fixed manual reading used when no ADC path is given
    #[arg(long = "manual-reading")]
    pub manual_reading: Option<u16>,

    /// How raw manual readings map onto zoom levels
    #[arg(long = "zoom-mapping", value_enum, default_value_t = ZoomMapping::Inverted)]
    pub zoom_mapping: ZoomMapping,

    /// Seconds a chat or UDP override holds before manual control resumes
    #[arg(long = "override-secs", default_value_t = DEFAULT_OVERRIDE_SECS)]
    pub override_secs: u64,

    /// Minimum seconds between accepted chat commands
    #[arg(long = "cooldown-secs", default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown_secs: u64,

    /// Control loop period (milliseconds)
    #[arg(long = "tick-ms", default_value_t = DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Chat channel to join
    #[arg(long, env = "TWITCH_CHANNEL")]
    pub channel: Option<String>,

    /// OAuth client id
    #[arg(long = "client-id", env = "TWITCH_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (needed for refresh on confidential clients)
    #[arg(
        long = "client-secret",
        env = "TWITCH_CLIENT_SECRET",
        hide_env_values = true
    )]
    pub client_secret: Option<String>,

    /// Channel-point reward id whose redemptions may set the zoom
    #[arg(long = "reward-id", env = "TWITCH_REWARD_ID")]
    pub reward_id: Option<String>,

    /// OAuth scopes requested by the device flow (repeatable)
    #[arg(long = "scope", action = ArgAction::Append, value_name = "SCOPE")]
    pub scopes: Vec<String>,

    /// JSON file the tokens are persisted to
    #[arg(long = "secrets-path", default_value = DEFAULT_SECRETS_PATH)]
    pub secrets_path: PathBuf,

    /// Chat server host
    #[arg(long = "irc-host", default_value = DEFAULT_IRC_HOST)]
    pub irc_host: String,

    /// Chat server port
    #[arg(long = "irc-port", default_value_t = DEFAULT_IRC_PORT)]
    pub irc_port: u16,

    /// Run without chat even when credentials are present
    #[arg(long = "no-chat", default_value_t = false)]
    pub no_chat: bool,

    /// Text prepended to every message the controller posts in chat
    #[arg(long = "chat-prefix", default_value = "")]
    pub chat_prefix: String,

    /// Listen for zoom commands on this UDP port
    #[arg(long = "udp-port")]
    pub udp_port: Option<u16>,

    /// Do not show the current zoom level on the camera overlay
    #[arg(long = "no-zoom-overlay", default_value_t = false)]
    pub no_zoom_overlay: bool,

    /// Overlay line for the zoom readout (0x10-0x1A)
    #[arg(long = "zoom-slot", value_parser = parse_slot, default_value = "0x1A")]
    pub zoom_slot: u8,

    /// Overlay line for the override label (0x10-0x1A)
    #[arg(long = "label-slot", value_parser = parse_slot, default_value = "0x10")]
    pub label_slot: u8,

    /// Overlay line for the override identity (0x10-0x1A)
    #[arg(long = "name-slot", value_parser = parse_slot, default_value = "0x11")]
    pub name_slot: u8,

    /// Label shown above the identity while an override is active
    #[arg(long = "override-label", default_value = DEFAULT_OVERRIDE_LABEL)]
    pub override_label: String,

    /// Print the zoom frames for every level and exit
    #[arg(long = "print-frames", default_value_t = false)]
    pub print_frames: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VISCA_ZOOM_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VISCA_ZOOM_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging chat lines and viewer names (debug log only)
    #[arg(
        long = "log-content",
        env = "VISCA_ZOOM_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

/// Everything the chat runtime needs, resolved from the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub reward_id: String,
    pub scopes: Vec<String>,
    pub secrets_path: PathBuf,
    pub cooldown: Duration,
    pub prefix: String,
}

/// Overlay slots and label text used by the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySettings {
    pub zoom_slot: Option<OverlaySlot>,
    pub label_slot: OverlaySlot,
    pub name_slot: OverlaySlot,
    pub label: String,
    pub style: OverlayStyle,
}

impl AppConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn arbiter_settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            mapping: self.zoom_mapping,
            input_max: self.adc_max,
            override_window: Duration::from_secs(self.override_secs),
        }
    }

    /// Reading used when no ADC is configured: the widest zoom unless overridden.
    pub fn fixed_reading(&self) -> u16 {
        self.manual_reading.unwrap_or(match self.zoom_mapping {
            ZoomMapping::Inverted => self.adc_max,
            ZoomMapping::Direct => 0,
        })
    }

    pub fn overlay_settings(&self) -> OverlaySettings {
        OverlaySettings {
            zoom_slot: if self.no_zoom_overlay {
                None
            } else {
                OverlaySlot::new(self.zoom_slot)
            },
            label_slot: OverlaySlot::new(self.label_slot).unwrap_or(OverlaySlot::LABEL),
            name_slot: OverlaySlot::new(self.name_slot).unwrap_or(OverlaySlot::NAME),
            label: self.override_label.clone(),
            style: OverlayStyle::default(),
        }
    }

    /// Chat is optional: a missing identifier disables it for this run instead of failing.
    pub fn chat_settings(&self) -> Option<ChatSettings> {
        if self.no_chat {
            log_debug("chat disabled by --no-chat");
            return None;
        }
        let missing = [
            ("client id", self.client_id.is_none()),
            ("channel", self.channel.is_none()),
            ("reward id", self.reward_id.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            let reason = missing.join(", ");
            log_debug(&format!("chat disabled: missing {reason}"));
            tracing::warn!(missing = %reason, "chat integration disabled");
            return None;
        }
        let scopes = if self.scopes.is_empty() {
            DEFAULT_SCOPES.split_whitespace().map(str::to_string).collect()
        } else {
            self.scopes.clone()
        };
        Some(ChatSettings {
            host: self.irc_host.clone(),
            port: self.irc_port,
            channel: self.channel.clone()?,
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone(),
            reward_id: self.reward_id.clone()?,
            scopes,
            secrets_path: self.secrets_path.clone(),
            cooldown: Duration::from_secs(self.cooldown_secs),
            prefix: self.chat_prefix.clone(),
        })
    }
}
