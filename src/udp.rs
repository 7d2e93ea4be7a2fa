//! Zoom commands from a local bridge (stream-deck or bot) over UDP.
//!
//! Accepted, case-insensitive: `ZOOM 12 Name`, `!zoom 12 Name`, `ZOOM:12:Name`,
//! `ZOOM=12;Name`, `zoom12`, and `ZOOMOFF` / `ZOOM OFF` to cancel. Levels are clamped
//! rather than rejected.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use anyhow::{Context, Result};

use crate::arbiter::RemoteCommand;
use crate::utf8_safe::overlay_name;
use crate::visca::{ZoomLevel, OVERLAY_LINE_WIDTH};
use crate::{log_debug, log_debug_content};

pub const MAX_DATAGRAMS_PER_TICK: usize = 12;
const DATAGRAM_BYTES: usize = 256;
const DEFAULT_SOURCE: &str = "UDP";
const OFF_FORMS: [&str; 6] = ["zoomoff", "!zoomoff", "zoom off", "!zoom off", "zoom:off", "zoom=off"];

/// Parse one datagram. `None` when it is not a zoom command.
pub fn parse_udp_message(message: &str) -> Option<RemoteCommand> {
    let text = message.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    if OFF_FORMS.contains(&lower.as_str()) {
        return Some(RemoteCommand::Cancel {
            source: DEFAULT_SOURCE.to_string(),
        });
    }

    let normalized: String = text
        .chars()
        .map(|ch| if matches!(ch, ';' | '=' | ':') { ' ' } else { ch })
        .collect();
    let parts: Vec<&str> = normalized.split_whitespace().collect();
    let head = parts.first()?.to_lowercase();

    if head == "zoom" || head == "!zoom" {
        let value = parts.get(1)?;
        if value.eq_ignore_ascii_case("off") {
            return Some(RemoteCommand::Cancel {
                source: DEFAULT_SOURCE.to_string(),
            });
        }
        let level = clamp_level(value)?;
        let source = parts
            .get(2)
            .map(|name| overlay_name(name, OVERLAY_LINE_WIDTH))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        return Some(RemoteCommand::Zoom { level, source });
    }

    if lower.starts_with("zoom") || lower.starts_with("!zoom") {
        let digits: String = text
            .chars()
            .skip_while(|ch| !ch.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        if !digits.is_empty() {
            return Some(RemoteCommand::Zoom {
                level: clamp_level(&digits)?,
                source: DEFAULT_SOURCE.to_string(),
            });
        }
    }
    None
}

/// Integer token clamped into `1..=30`; digit strings too long for `i64` clamp to the top.
fn clamp_level(token: &str) -> Option<ZoomLevel> {
    match token.parse::<i64>() {
        Ok(value) => Some(ZoomLevel::clamped(value)),
        Err(_) if !token.is_empty() && token.chars().all(|ch| ch.is_ascii_digit()) => {
            Some(ZoomLevel::MAX)
        }
        Err(_) => None,
    }
}

/// Non-blocking listener drained a bounded number of datagrams per tick.
pub struct UdpCommandSource {
    socket: UdpSocket,
}

impl UdpCommandSource {
    pub fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .with_context(|| format!("failed to bind UDP port {port}"))?;
        Self::from_socket(socket)
    }

    pub fn from_socket(socket: UdpSocket) -> Result<Self> {
        socket
            .set_nonblocking(true)
            .context("failed to make UDP socket non-blocking")?;
        if let Ok(addr) = socket.local_addr() {
            log_debug(&format!("udp listener on {addr}"));
        }
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Commands from the datagrams waiting right now, oldest first.
    pub fn poll(&mut self) -> Vec<RemoteCommand> {
        let mut commands = Vec::new();
        let mut buf = [0u8; DATAGRAM_BYTES];
        for _ in 0..MAX_DATAGRAMS_PER_TICK {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    let text = String::from_utf8_lossy(&buf[..len]);
                    log_debug_content(&format!("udp < {from}: {:?}", text.trim()));
                    match parse_udp_message(&text) {
                        Some(command) => commands.push(command),
                        None => log_debug("udp datagram ignored"),
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    log_debug(&format!("udp receive failed: {err}"));
                    break;
                }
            }
        }
        commands
    }
}
