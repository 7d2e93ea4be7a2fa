//! Minimal IRCv3 line tokenizer: tags, prefix, command, params.
//!
//! Only what joining one channel and reading tagged messages needs. Parsing is a single
//! left-to-right pass over the line; there is no backtracking.

use std::collections::HashMap;

/// One protocol line, split into its parts. The trailing parameter (after ` :`) is stored
/// as the last entry of `params`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse a line without its `\r\n` terminator. Returns `None` for blank lines and lines
    /// with no command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut parsed = IrcLine::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (raw_tags, after) = split_word(tagged);
            parsed.tags = parse_tags(raw_tags);
            rest = after;
        }
        rest = rest.trim_start_matches(' ');
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, after) = split_word(prefixed);
            if !prefix.is_empty() {
                parsed.prefix = Some(prefix.to_string());
            }
            rest = after;
        }

        let (command, mut rest) = split_word(rest.trim_start_matches(' '));
        if command.is_empty() {
            return None;
        }
        parsed.command = command.to_ascii_uppercase();

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                parsed.params.push(trailing.to_string());
                break;
            }
            let (param, after) = split_word(rest);
            parsed.params.push(param.to_string());
            rest = after;
        }
        Some(parsed)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Nickname part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

/// A channel message with the parts the command filter looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub tags: HashMap<String, String>,
    pub sender: String,
    pub channel: String,
    pub body: String,
}

impl ChatMessage {
    /// Build from a `PRIVMSG`. The sender is the `display-name` tag when present, else the
    /// prefix nick.
    pub fn from_line(line: IrcLine) -> Option<Self> {
        if line.command != "PRIVMSG" || line.params.len() < 2 {
            return None;
        }
        let sender = line
            .tag("display-name")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| line.nick())
            .unwrap_or("UNKNOWN")
            .to_string();
        let channel = line.params[0].trim_start_matches('#').to_string();
        let body = line.params[1].clone();
        Some(ChatMessage {
            tags: line.tags,
            sender,
            channel,
            body,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Badge names from the `badges` tag (`broadcaster/1,subscriber/12` -> broadcaster, subscriber).
    pub fn badges(&self) -> impl Iterator<Item = &str> {
        self.tag("badges")
            .unwrap_or("")
            .split(',')
            .filter_map(|badge| badge.split('/').next())
            .filter(|name| !name.is_empty())
    }

    /// Channel owner or moderator.
    pub fn is_privileged(&self) -> bool {
        self.tag("mod") == Some("1")
            || self
                .badges()
                .any(|badge| badge == "broadcaster" || badge == "moderator")
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.find(' ') {
        Some(idx) => (&input[..idx], &input[idx + 1..]),
        None => (input, ""),
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape_tag(value)),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

/// Undo IRCv3 tag value escaping. A lone trailing backslash is dropped.
pub fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
