//! Bearer-token resolution for the chat session: validate the stored token, else refresh
//! it, else run the interactive device-code flow. Every newly obtained token is persisted.

mod oauth;
mod store;

#[cfg(test)]
mod tests;

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::log_debug;

pub use oauth::{
    classify_device_poll, classify_refresh, classify_validate, DeviceCode, DevicePoll,
    OAuthClient, OAuthError, TokenGrant, TwitchOAuth, ValidatedToken, DEFAULT_OAUTH_BASE,
};
pub use store::{JsonFileStore, MemoryStore, StoreError, StoredToken, TokenStore};

const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no chat token available")]
    NoTokenAvailable,
    #[error("device authorization was denied")]
    Denied,
    #[error("device authorization expired before it was approved")]
    Expired,
    #[error("the OAuth client id was rejected")]
    InvalidClient,
    #[error("chat needs a new device authorization; restart to authorize")]
    AuthorizationRequired,
    #[error(transparent)]
    Http(#[from] OAuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Retrying cannot help: the client id or the secrets file needs operator attention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::InvalidClient | AuthError::Store(_))
    }
}

/// Where the returned token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Stored,
    Refreshed,
    DeviceFlow,
}

impl TokenSource {
    pub fn label(self) -> &'static str {
        match self {
            TokenSource::Stored => "stored",
            TokenSource::Refreshed => "refreshed",
            TokenSource::DeviceFlow => "device flow",
        }
    }
}

/// A usable bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub login: String,
    pub expires_in: Option<Duration>,
    pub source: TokenSource,
}

/// Time source for the device-flow poll loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

type DevicePresenter = Box<dyn Fn(&DeviceCode)>;

pub struct ChatAuthManager {
    client: Box<dyn OAuthClient>,
    store: Box<dyn TokenStore>,
    clock: Box<dyn Clock>,
    scopes: Vec<String>,
    presenter: DevicePresenter,
}

impl ChatAuthManager {
    pub fn new(
        client: Box<dyn OAuthClient>,
        store: Box<dyn TokenStore>,
        clock: Box<dyn Clock>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client,
            store,
            clock,
            scopes,
            presenter: Box::new(log_device_code),
        }
    }

    /// Replace how the user code is shown to the operator.
    pub fn with_presenter(mut self, presenter: impl Fn(&DeviceCode) + 'static) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    /// Resolve a token, falling back step by step. Blocking; call outside the tick loop.
    pub fn ensure_token(&mut self) -> Result<AuthToken, AuthError> {
        let stored = self.store.load()?;

        if let Some(stored) = &stored {
            if let Some(token) = self.try_stored(stored) {
                return Ok(token);
            }
            if let Some(token) = self.try_refresh(stored) {
                return Ok(token);
            }
        }

        let token = self.run_device_flow(stored.as_ref())?;
        Ok(token)
    }

    /// Like `ensure_token` but never starts the device flow: only the stored token and the
    /// refresh grant are tried. Bounded by the HTTP timeout, so it may run between ticks.
    pub fn renew_token(&mut self) -> Result<AuthToken, AuthError> {
        let Some(stored) = self.store.load()? else {
            return Err(AuthError::AuthorizationRequired);
        };
        if let Some(token) = self.try_stored(&stored) {
            return Ok(token);
        }
        self.try_refresh(&stored)
            .ok_or(AuthError::AuthorizationRequired)
    }

    fn try_stored(&self, stored: &StoredToken) -> Option<AuthToken> {
        if stored.access_token.is_empty() {
            return None;
        }
        match self.client.validate(&stored.access_token) {
            Ok(Some(validated)) if validated.expires_in > 0 => {
                if stored.login.as_deref() != Some(validated.login.as_str()) {
                    self.persist(&StoredToken {
                        login: Some(validated.login.clone()),
                        ..stored.clone()
                    });
                }
                let token = AuthToken {
                    access_token: stored.access_token.clone(),
                    refresh_token: stored.refresh_token.clone(),
                    login: validated.login,
                    expires_in: Some(Duration::from_secs(validated.expires_in)),
                    source: TokenSource::Stored,
                };
                resolved(&token);
                Some(token)
            }
            Ok(_) => {
                log_debug("stored chat token is invalid or expired");
                None
            }
            Err(err) => {
                log_debug(&format!("chat token validation failed: {err}"));
                None
            }
        }
    }

    fn try_refresh(&self, stored: &StoredToken) -> Option<AuthToken> {
        let refresh_token = stored.refresh_token.as_deref()?;
        let grant = match self.client.refresh(refresh_token) {
            Ok(Some(grant)) => grant,
            Ok(None) => {
                log_debug("chat refresh token was rejected");
                return None;
            }
            Err(err) => {
                log_debug(&format!("chat token refresh failed: {err}"));
                return None;
            }
        };
        let token = self.adopt_grant(grant, stored.login.as_deref(), TokenSource::Refreshed)?;
        resolved(&token);
        Some(token)
    }

    fn run_device_flow(&self, stored: Option<&StoredToken>) -> Result<AuthToken, AuthError> {
        let code = match self.client.start_device_flow(&self.scopes) {
            Ok(code) => code,
            Err(err) => {
                log_debug(&format!("device flow could not start: {err}"));
                tracing::warn!(error = %err, "device flow start failed");
                return Err(AuthError::NoTokenAvailable);
            }
        };
        (self.presenter)(&code);

        let deadline = self.clock.now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval).max(MIN_POLL_INTERVAL);
        loop {
            self.clock.sleep(interval);
            if self.clock.now() >= deadline {
                log_debug("device flow expired");
                return Err(AuthError::Expired);
            }
            match self.client.poll_device_token(&code.device_code, &self.scopes) {
                Ok(DevicePoll::Granted(grant)) => {
                    let login = stored.and_then(|token| token.login.as_deref());
                    let token = self
                        .adopt_grant(grant, login, TokenSource::DeviceFlow)
                        .ok_or(AuthError::NoTokenAvailable)?;
                    resolved(&token);
                    return Ok(token);
                }
                Ok(DevicePoll::Pending) => {}
                Ok(DevicePoll::SlowDown) => {
                    interval += SLOW_DOWN_STEP;
                    log_debug(&format!(
                        "device flow asked to slow down; polling every {}s",
                        interval.as_secs()
                    ));
                }
                Ok(DevicePoll::Denied) => return Err(AuthError::Denied),
                Ok(DevicePoll::Expired) => return Err(AuthError::Expired),
                Ok(DevicePoll::InvalidClient) => return Err(AuthError::InvalidClient),
                Err(err) => log_debug(&format!("device flow poll failed: {err}")),
            }
        }
    }

    /// Look up the login for a fresh grant, persist it, and build the token. `None` when no
    /// login can be determined.
    fn adopt_grant(
        &self,
        grant: TokenGrant,
        known_login: Option<&str>,
        source: TokenSource,
    ) -> Option<AuthToken> {
        let login = match self.client.validate(&grant.access_token) {
            Ok(Some(validated)) => Some(validated.login),
            Ok(None) => None,
            Err(err) => {
                log_debug(&format!("validating new chat token failed: {err}"));
                known_login.map(str::to_string)
            }
        };
        let Some(login) = login else {
            log_debug("new chat token has no resolvable login");
            return None;
        };
        self.persist(&StoredToken {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            login: Some(login.clone()),
        });
        Some(AuthToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            login,
            expires_in: grant.expires_in.map(Duration::from_secs),
            source,
        })
    }

    fn persist(&self, token: &StoredToken) {
        if let Err(err) = self.store.save(token) {
            log_debug(&format!("failed to persist chat token: {err}"));
            tracing::warn!(error = %err, "token store write failed");
        }
    }
}

fn resolved(token: &AuthToken) {
    log_debug(&format!("chat token resolved ({})", token.source.label()));
    tracing::info!(source = token.source.label(), "chat token resolved");
}

fn log_device_code(code: &DeviceCode) {
    eprintln!(
        "To enable chat control, open {} and enter code {}",
        code.verification_uri, code.user_code
    );
    log_debug("device flow started; waiting for operator approval");
}
