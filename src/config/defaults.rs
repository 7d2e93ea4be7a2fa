pub const DEFAULT_OVERRIDE_SECS: u64 = 20;
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_TICK_MS: u64 = 5;
pub const DEFAULT_BAUD: u32 = 9600;
pub const DEFAULT_ADC_MAX: u16 = u16::MAX;

pub const DEFAULT_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_IRC_PORT: u16 = 6667;
pub const DEFAULT_SECRETS_PATH: &str = "secrets.json";
pub const DEFAULT_SCOPES: &str = "chat:read chat:edit";
pub const DEFAULT_OVERRIDE_LABEL: &str = "ZOOM BY:";

pub(super) const MAX_TICK_MS: u64 = 1_000;
pub(super) const MAX_WINDOW_SECS: u64 = 3_600;
pub(super) const MIN_BAUD: u32 = 1_200;
pub(super) const MAX_BAUD: u32 = 921_600;
pub(super) const MAX_CHANNEL_CHARS: usize = 25;
pub(super) const MAX_REWARD_ID_CHARS: usize = 64;
pub(super) const MAX_CHAT_PREFIX_CHARS: usize = 64;
