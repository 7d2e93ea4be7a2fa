use std::time::{Duration, Instant};

use super::irc::ChatMessage;
use crate::arbiter::RemoteCommand;
use crate::visca::ZoomLevel;
use crate::{log_debug, log_debug_content};

pub const REWARD_TAG: &str = "custom-reward-id";
const CANCEL_TOKENS: [&str; 5] = ["auto", "off", "zoomoff", "!zoomoff", "zoom off"];

/// What to do with one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not addressed to us; no side effects.
    Ignore,
    /// Authorized command. `reply` is posted back to the channel.
    Accept {
        command: RemoteCommand,
        reply: Option<String>,
    },
    /// Authorized but unusable; `notice` (if any) is posted back to the channel.
    Reject { notice: Option<String> },
}

/// Reward filter plus the shared cooldown window. Only accepted zoom commands move the
/// window; rejections never extend it.
#[derive(Debug, Clone)]
pub struct CommandFilter {
    reward_id: String,
    cooldown: Duration,
    next_allowed: Option<Instant>,
    next_advisory: Option<Instant>,
}

impl CommandFilter {
    pub fn new(reward_id: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            reward_id: reward_id.into(),
            cooldown,
            next_allowed: None,
            next_advisory: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time left before the next command is accepted.
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.next_allowed
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn evaluate(&mut self, message: &ChatMessage, now: Instant) -> Verdict {
        let rewarded = message.tag(REWARD_TAG) == Some(self.reward_id.as_str());
        let body = message.body.trim();

        if is_cancel(body) && (rewarded || message.is_privileged()) {
            log_debug_content(&format!("cancel from {}", message.sender));
            return Verdict::Accept {
                command: RemoteCommand::Cancel {
                    source: message.sender.clone(),
                },
                reply: Some("Zoom back to manual control.".to_string()),
            };
        }
        if !rewarded {
            return Verdict::Ignore;
        }

        let level = match first_integer(body) {
            Some(Some(value)) => match ZoomLevel::new(value) {
                Some(level) => level,
                None => {
                    log_debug(&format!("zoom value {value} out of range"));
                    return self.advisory(
                        now,
                        format!(
                            "Please pick a value between {} and {}.",
                            ZoomLevel::MIN.get(),
                            ZoomLevel::MAX.get()
                        ),
                    );
                }
            },
            Some(None) => {
                log_debug("zoom value overflowed");
                return self.advisory(
                    now,
                    format!(
                        "Please pick a value between {} and {}.",
                        ZoomLevel::MIN.get(),
                        ZoomLevel::MAX.get()
                    ),
                );
            }
            None => {
                log_debug("reward message without a zoom value");
                return self.advisory(now, "Invalid zoom value.".to_string());
            }
        };

        if let Some(next) = self.next_allowed {
            if now < next {
                let wait = self.cooldown.as_secs().max(1);
                log_debug("zoom command rejected by cooldown");
                return Verdict::Reject {
                    notice: Some(format!(
                        "Please wait {wait} seconds before sending a new command."
                    )),
                };
            }
        }

        self.next_allowed = Some(now + self.cooldown);
        log_debug_content(&format!("zoom {level} accepted from {}", message.sender));
        Verdict::Accept {
            command: RemoteCommand::Zoom {
                level,
                source: message.sender.clone(),
            },
            reply: Some(format!("Zoom set to {level}!")),
        }
    }

    /// At most one advisory per cooldown window; extra ones are dropped silently.
    fn advisory(&mut self, now: Instant, text: String) -> Verdict {
        let allowed = self.next_advisory.map_or(true, |next| now >= next);
        if !allowed {
            return Verdict::Reject { notice: None };
        }
        self.next_advisory = Some(now + self.cooldown);
        Verdict::Reject { notice: Some(text) }
    }
}

fn is_cancel(body: &str) -> bool {
    CANCEL_TOKENS
        .iter()
        .any(|token| body.eq_ignore_ascii_case(token))
}

/// First run of ASCII digits in `text`, with an immediately preceding `-` taken as the sign.
/// `Some(None)` means digits were found but do not fit an `i64`.
pub fn first_integer(text: &str) -> Option<Option<i64>> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let end = bytes[start..]
        .iter()
        .position(|byte| !byte.is_ascii_digit())
        .map_or(bytes.len(), |offset| start + offset);
    let negative = start > 0 && bytes[start - 1] == b'-';
    let digits = &text[start..end];
    let parsed = digits.parse::<i64>().ok();
    Some(parsed.map(|value| if negative { -value } else { value }))
}
