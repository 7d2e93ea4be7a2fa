use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::filter::{CommandFilter, Verdict};
use super::irc::{ChatMessage, IrcLine};
use crate::arbiter::RemoteCommand;
use crate::utf8_safe::ellipsize;
use crate::{log_debug, log_debug_content};

const READ_CHUNK_BYTES: usize = 4096;
const MAX_READS_PER_POLL: usize = 16;
const MAX_PENDING_BYTES: usize = 16 * 1024;
const WRITE_RETRY_LIMIT: usize = 200;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CAPABILITIES: [&str; 3] = ["twitch.tv/tags", "twitch.tv/commands", "twitch.tv/membership"];
const AUTH_FAILURE_MARKERS: [&str; 3] = [
    "Login authentication failed",
    "Improperly formatted auth",
    "Login unsuccessful",
];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("chat session is not connected")]
    NotConnected,
    #[error("chat server closed the connection")]
    Closed,
    #[error("chat server rejected the credentials")]
    AuthenticationFailed,
    #[error("chat server asked for a reconnect")]
    ReconnectRequested,
    #[error("chat socket error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Credentials must be re-resolved before the next connect.
    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::AuthenticationFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingJoin,
    Joined,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingJoin => "awaiting join",
            SessionState::Joined => "joined",
        }
    }
}

/// Where to connect and how to speak in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub prefix: String,
}

/// Non-blocking chat connection for one channel. The command filter (and its cooldown)
/// outlives individual connections.
pub struct ChatSession {
    target: ChatTarget,
    filter: CommandFilter,
    state: SessionState,
    stream: Option<TcpStream>,
    pending: Vec<u8>,
    deferred_fault: Option<SessionError>,
}

impl ChatSession {
    pub fn new(target: ChatTarget, filter: CommandFilter) -> Self {
        Self {
            target,
            filter,
            state: SessionState::Disconnected,
            stream: None,
            pending: Vec::new(),
            deferred_fault: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> &ChatTarget {
        &self.target
    }

    pub fn filter(&self) -> &CommandFilter {
        &self.filter
    }

    /// Open the socket and send the login burst (PASS, NICK, CAP REQ, JOIN) in blocking
    /// mode with a short timeout, then switch to non-blocking reads.
    pub fn connect(&mut self, login: &str, token: &str) -> Result<(), SessionError> {
        self.teardown();
        self.deferred_fault = None;
        self.set_state(SessionState::Connecting);
        match self.open(login, token) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.set_state(SessionState::AwaitingJoin);
                log_debug(&format!(
                    "chat connected to {}:{}, joining #{}",
                    self.target.host, self.target.port, self.target.channel
                ));
                Ok(())
            }
            Err(err) => {
                self.set_state(SessionState::Disconnected);
                log_debug(&format!("chat connect failed: {err}"));
                Err(err.into())
            }
        }
    }

    fn open(&self, login: &str, token: &str) -> io::Result<TcpStream> {
        let addrs = (self.target.host.as_str(), self.target.port).to_socket_addrs()?;
        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let mut stream = match stream {
            Some(stream) => stream,
            None => {
                return Err(last_err.unwrap_or_else(|| {
                    io::Error::new(ErrorKind::NotFound, "chat host did not resolve")
                }))
            }
        };
        stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
        let _ = stream.set_nodelay(true);

        let token = token.trim_start_matches("oauth:");
        let mut burst = format!("PASS oauth:{token}\r\nNICK {}\r\n", login.to_ascii_lowercase());
        for capability in CAPABILITIES {
            burst.push_str(&format!("CAP REQ :{capability}\r\n"));
        }
        burst.push_str(&format!("JOIN #{}\r\n", self.target.channel));
        stream.write_all(burst.as_bytes())?;
        stream.flush()?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    }

    /// Process whatever is buffered on the socket right now. Returns accepted commands in
    /// arrival order. Lines without a terminator wait for the next call.
    ///
    /// Complete lines are handled before a read error or EOF is reported. A fault that ends
    /// the session after commands were accepted is returned by the next call.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<RemoteCommand>, SessionError> {
        if let Some(fault) = self.deferred_fault.take() {
            return Err(fault);
        }
        if self.stream.is_none() {
            return Err(SessionError::NotConnected);
        }
        let read_fault = self.fill_pending();

        let mut commands = Vec::new();
        while let Some(line) = self.next_line() {
            if let Err(err) = self.handle_line(&line, now, &mut commands) {
                return self.end_with(err, commands);
            }
        }
        match read_fault {
            Some(err) => self.end_with(err, commands),
            None => Ok(commands),
        }
    }

    /// Whether a fault is waiting to be reported by the next `poll`.
    pub fn has_deferred_fault(&self) -> bool {
        self.deferred_fault.is_some()
    }

    fn end_with(
        &mut self,
        err: SessionError,
        commands: Vec<RemoteCommand>,
    ) -> Result<Vec<RemoteCommand>, SessionError> {
        log_debug(&format!("chat session ended: {err}"));
        tracing::warn!(error = %err, "chat session torn down");
        self.teardown();
        if commands.is_empty() {
            return Err(err);
        }
        self.deferred_fault = Some(err);
        Ok(commands)
    }

    /// Read what the socket has. A read error or EOF is returned after the bytes that came
    /// before it are buffered.
    fn fill_pending(&mut self) -> Option<SessionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Some(SessionError::NotConnected);
        };
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut fault = None;
        for _ in 0..MAX_READS_PER_POLL {
            match stream.read(&mut buf) {
                Ok(0) => {
                    fault = Some(SessionError::Closed);
                    break;
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    fault = Some(err.into());
                    break;
                }
            }
        }
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            log_debug("chat line exceeded buffer without terminator; dropped");
            self.pending.clear();
        }
        fault
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|byte| *byte == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let trimmed = raw
            .strip_suffix(b"\n")
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .unwrap_or(&raw);
        Some(String::from_utf8_lossy(trimmed).into_owned())
    }

    fn handle_line(
        &mut self,
        raw: &str,
        now: Instant,
        commands: &mut Vec<RemoteCommand>,
    ) -> Result<(), SessionError> {
        let Some(line) = IrcLine::parse(raw) else {
            return Ok(());
        };
        log_debug_content(&format!("irc < {}", ellipsize(raw, 200)));
        let command = line.command.clone();
        match command.as_str() {
            "PING" => {
                let payload = line.trailing().unwrap_or("tmi.twitch.tv").to_string();
                self.send_raw(&format!("PONG :{payload}"))?;
            }
            "001" | "366" | "JOIN" => self.mark_joined()?,
            "NOTICE" => {
                let text = line.trailing().unwrap_or("");
                if AUTH_FAILURE_MARKERS
                    .iter()
                    .any(|marker| text.contains(marker))
                {
                    return Err(SessionError::AuthenticationFailed);
                }
                log_debug_content(&format!("notice: {text}"));
            }
            "RECONNECT" => return Err(SessionError::ReconnectRequested),
            "PRIVMSG" => {
                if let Some(message) = ChatMessage::from_line(line) {
                    self.dispatch(&message, now, commands)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        message: &ChatMessage,
        now: Instant,
        commands: &mut Vec<RemoteCommand>,
    ) -> Result<(), SessionError> {
        match self.filter.evaluate(message, now) {
            Verdict::Ignore => Ok(()),
            Verdict::Accept { command, reply } => {
                commands.push(command);
                match reply {
                    Some(text) => self.say(&text),
                    None => Ok(()),
                }
            }
            Verdict::Reject { notice } => match notice {
                Some(text) => self.say(&text),
                None => Ok(()),
            },
        }
    }

    fn mark_joined(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Joined {
            return Ok(());
        }
        self.set_state(SessionState::Joined);
        self.say("Camera online!")
    }

    /// Post a message to the channel, prefixed with the configured chat prefix.
    pub fn say(&mut self, text: &str) -> Result<(), SessionError> {
        let body = if self.target.prefix.is_empty() {
            text.to_string()
        } else {
            format!("{} {text}", self.target.prefix)
        };
        let line = format!("PRIVMSG #{} :{body}", self.target.channel);
        self.send_raw(&line)
    }

    fn send_raw(&mut self, line: &str) -> Result<(), SessionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        let data = format!("{line}\r\n");
        write_all_nonblocking(stream, data.as_bytes())?;
        Ok(())
    }

    /// Best-effort goodbye, then close. Safe from any state.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Joined {
            if let Err(err) = self.say("Camera offline!") {
                log_debug(&format!("chat goodbye failed: {err}"));
            }
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.pending.clear();
        self.set_state(SessionState::Disconnected);
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = self.state.label(), to = next.label(), "chat session state");
            self.state = next;
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Write everything, retrying briefly when the non-blocking socket is full.
fn write_all_nonblocking(stream: &mut TcpStream, data: &[u8]) -> io::Result<()> {
    let mut offset = 0;
    let mut retries = 0;
    while offset < data.len() {
        match stream.write(&data[offset..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "chat socket wrote 0 bytes")),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::Interrupted => {
                retries += 1;
                if retries > WRITE_RETRY_LIMIT {
                    return Err(io::Error::new(ErrorKind::TimedOut, "chat socket stayed full"));
                }
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
