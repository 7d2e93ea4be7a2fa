//! OAuth device-flow client for the chat platform's identity service.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OAUTH_BASE: &str = "https://id.twitch.tv/oauth2";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("oauth request failed: {0}")]
    Transport(String),
    #[error("oauth endpoint returned {status}: {body}")]
    Unexpected { status: u16, body: String },
    #[error("oauth response could not be decoded: {0}")]
    Decode(String),
}

/// Result of a successful validate call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidatedToken {
    pub login: String,
    pub expires_in: u64,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// One poll of the device token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePoll {
    Granted(TokenGrant),
    Pending,
    SlowDown,
    Denied,
    Expired,
    InvalidClient,
}

/// Identity-service operations the auth manager needs. `Ok(None)` means the server
/// answered and said no; `Err` means it could not be asked.
pub trait OAuthClient {
    fn validate(&self, access_token: &str) -> Result<Option<ValidatedToken>, OAuthError>;
    fn refresh(&self, refresh_token: &str) -> Result<Option<TokenGrant>, OAuthError>;
    fn start_device_flow(&self, scopes: &[String]) -> Result<DeviceCode, OAuthError>;
    fn poll_device_token(
        &self,
        device_code: &str,
        scopes: &[String],
    ) -> Result<DevicePoll, OAuthError>;
}

/// Blocking HTTP client against the Twitch identity endpoints.
pub struct TwitchOAuth {
    http: Client,
    base: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TwitchOAuth {
    pub fn new(client_id: &str, client_secret: Option<&str>) -> Result<Self, OAuthError> {
        Self::with_base(DEFAULT_OAUTH_BASE, client_id, client_secret)
    }

    pub fn with_base(
        base: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| OAuthError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.map(str::to_string),
        })
    }

    fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(u16, String), OAuthError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base))
            .form(form)
            .send()
            .map_err(|err| OAuthError::Transport(err.to_string()))?;
        read_response(response)
    }
}

fn read_response(response: reqwest::blocking::Response) -> Result<(u16, String), OAuthError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| OAuthError::Transport(err.to_string()))?;
    Ok((status, body))
}

impl OAuthClient for TwitchOAuth {
    fn validate(&self, access_token: &str) -> Result<Option<ValidatedToken>, OAuthError> {
        let token = access_token.trim_start_matches("oauth:");
        let response = self
            .http
            .get(format!("{}/validate", self.base))
            .header("Authorization", format!("OAuth {token}"))
            .send()
            .map_err(|err| OAuthError::Transport(err.to_string()))?;
        let (status, body) = read_response(response)?;
        classify_validate(status, &body)
    }

    fn refresh(&self, refresh_token: &str) -> Result<Option<TokenGrant>, OAuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let (status, body) = self.post_form("token", &form)?;
        classify_refresh(status, &body)
    }

    fn start_device_flow(&self, scopes: &[String]) -> Result<DeviceCode, OAuthError> {
        let scopes = scopes.join(" ");
        let (status, body) = self.post_form(
            "device",
            &[("client_id", self.client_id.as_str()), ("scopes", scopes.as_str())],
        )?;
        if status != 200 {
            return Err(OAuthError::Unexpected { status, body });
        }
        serde_json::from_str(&body).map_err(|err| OAuthError::Decode(err.to_string()))
    }

    fn poll_device_token(
        &self,
        device_code: &str,
        scopes: &[String],
    ) -> Result<DevicePoll, OAuthError> {
        let scopes = scopes.join(" ");
        let (status, body) = self.post_form(
            "token",
            &[
                ("client_id", self.client_id.as_str()),
                ("scopes", scopes.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ],
        )?;
        classify_device_poll(status, &body)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

fn error_text(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    format!("{} {}", parsed.message, parsed.error).to_ascii_lowercase()
}

/// 200 with a login is valid; 401 is a definite "no".
pub fn classify_validate(status: u16, body: &str) -> Result<Option<ValidatedToken>, OAuthError> {
    match status {
        200 => serde_json::from_str(body)
            .map(Some)
            .map_err(|err| OAuthError::Decode(err.to_string())),
        401 => Ok(None),
        _ => Err(OAuthError::Unexpected {
            status,
            body: body.to_string(),
        }),
    }
}

/// 400/401 mean the refresh token is no longer usable.
pub fn classify_refresh(status: u16, body: &str) -> Result<Option<TokenGrant>, OAuthError> {
    match status {
        200 => serde_json::from_str(body)
            .map(Some)
            .map_err(|err| OAuthError::Decode(err.to_string())),
        400 | 401 => Ok(None),
        _ => Err(OAuthError::Unexpected {
            status,
            body: body.to_string(),
        }),
    }
}

pub fn classify_device_poll(status: u16, body: &str) -> Result<DevicePoll, OAuthError> {
    if status == 200 {
        return serde_json::from_str(body)
            .map(DevicePoll::Granted)
            .map_err(|err| OAuthError::Decode(err.to_string()));
    }
    if status != 400 && status != 401 {
        return Err(OAuthError::Unexpected {
            status,
            body: body.to_string(),
        });
    }
    let text = error_text(body);
    let poll = if text.contains("authorization_pending") {
        DevicePoll::Pending
    } else if text.contains("slow_down") {
        DevicePoll::SlowDown
    } else if text.contains("access_denied") || text.contains("authorization_declined") {
        DevicePoll::Denied
    } else if text.contains("expired_token") || text.contains("invalid device code") {
        DevicePoll::Expired
    } else if text.contains("invalid client") || text.contains("invalid_client") {
        DevicePoll::InvalidClient
    } else {
        return Err(OAuthError::Unexpected {
            status,
            body: body.to_string(),
        });
    };
    Ok(poll)
}
