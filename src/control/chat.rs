use std::time::{Duration, Instant};

use crate::arbiter::RemoteCommand;
use crate::chat::{
    auth::{JsonFileStore, SystemClock, TwitchOAuth},
    AuthError, AuthToken, ChatAuthManager, ChatSession, ChatTarget, CommandFilter, SessionError,
    SessionState,
};
use crate::config::ChatSettings;
use crate::log_debug;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Auth manager plus session, with the reconnect policy the session leaves to its caller.
pub struct ChatRuntime {
    auth: ChatAuthManager,
    session: ChatSession,
    token: Option<AuthToken>,
    next_attempt: Option<Instant>,
    backoff: Duration,
    disabled: bool,
}

impl ChatRuntime {
    pub fn new(auth: ChatAuthManager, session: ChatSession) -> Self {
        Self {
            auth,
            session,
            token: None,
            next_attempt: None,
            backoff: INITIAL_BACKOFF,
            disabled: false,
        }
    }

    /// Wire up the HTTP client, the JSON token file, and the session from CLI settings.
    pub fn from_settings(settings: &ChatSettings) -> anyhow::Result<Self> {
        let client = TwitchOAuth::new(&settings.client_id, settings.client_secret.as_deref())?;
        let auth = ChatAuthManager::new(
            Box::new(client),
            Box::new(JsonFileStore::new(&settings.secrets_path)),
            Box::new(SystemClock),
            settings.scopes.clone(),
        );
        let session = ChatSession::new(
            ChatTarget {
                host: settings.host.clone(),
                port: settings.port,
                channel: settings.channel.clone(),
                prefix: settings.prefix.clone(),
            },
            CommandFilter::new(settings.reward_id.clone(), settings.cooldown),
        );
        Ok(Self::new(auth, session))
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Resolve a token and connect. Blocking (HTTP, device flow, TCP connect), so it is
    /// only called before the tick loop starts.
    pub fn connect(&mut self, now: Instant) {
        self.open_session(now, ChatAuthManager::ensure_token);
    }

    /// Reconnect from inside the tick loop. A token is only revalidated or refreshed here;
    /// when that fails chat is switched off for the run instead of waiting on the operator.
    fn reconnect(&mut self, now: Instant) {
        self.open_session(now, ChatAuthManager::renew_token);
    }

    fn open_session(
        &mut self,
        now: Instant,
        resolve: fn(&mut ChatAuthManager) -> Result<AuthToken, AuthError>,
    ) {
        if self.disabled {
            return;
        }
        let token = match self.token.clone() {
            Some(token) => token,
            None => match resolve(&mut self.auth) {
                Ok(token) => {
                    self.token = Some(token.clone());
                    token
                }
                Err(err) => {
                    self.auth_failed(err, now);
                    return;
                }
            },
        };
        match self.session.connect(&token.login, &token.access_token) {
            Ok(()) => self.next_attempt = None,
            Err(err) => {
                log_debug(&format!("chat connect failed: {err}"));
                self.schedule_retry(now);
            }
        }
    }

    /// Commands received this tick. `Err` means the session just faulted; it has been torn
    /// down and a reconnect is scheduled.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<RemoteCommand>, SessionError> {
        if self.disabled {
            return Ok(Vec::new());
        }
        let idle = self.session.state() == SessionState::Disconnected;
        if idle && !self.session.has_deferred_fault() {
            match self.next_attempt {
                Some(at) if now < at => return Ok(Vec::new()),
                _ => self.reconnect(now),
            }
            if self.session.state() == SessionState::Disconnected {
                return Ok(Vec::new());
            }
        }
        match self.session.poll(now) {
            Ok(commands) => {
                if self.session.state() == SessionState::Joined {
                    self.backoff = INITIAL_BACKOFF;
                }
                Ok(commands)
            }
            Err(err) => {
                self.session_failed(&err, now);
                Err(err)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    fn session_failed(&mut self, err: &SessionError, now: Instant) {
        match err {
            SessionError::AuthenticationFailed => {
                log_debug("chat server rejected the token; re-resolving before reconnect");
                self.token = None;
                self.schedule_retry(now);
            }
            SessionError::ReconnectRequested => {
                self.backoff = INITIAL_BACKOFF;
                self.schedule_retry(now);
            }
            _ => {
                log_debug(&format!("chat session fault: {err}"));
                self.schedule_retry(now);
            }
        }
    }

    fn auth_failed(&mut self, err: AuthError, now: Instant) {
        if err.is_fatal() || matches!(err, AuthError::AuthorizationRequired) {
            eprintln!("Chat control disabled: {err}");
            log_debug(&format!("chat disabled for this run: {err}"));
            tracing::error!(error = %err, "chat auth failed permanently");
            self.disabled = true;
            return;
        }
        log_debug(&format!("no chat token yet: {err}"));
        tracing::warn!(error = %err, "chat token unavailable; will retry");
        self.schedule_retry(now);
    }

    fn schedule_retry(&mut self, now: Instant) {
        self.next_attempt = Some(now + self.backoff);
        log_debug(&format!("chat reconnect in {}s", self.backoff.as_secs()));
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
    }

    #[cfg(test)]
    pub(crate) fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }
}
