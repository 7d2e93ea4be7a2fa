use super::*;
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Default)]
struct FakeState {
    valid: HashMap<String, (String, u64)>,
    refresh: HashMap<String, TokenGrant>,
    device: Option<DeviceCode>,
    polls: VecDeque<DevicePoll>,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeOAuth(Arc<Mutex<FakeState>>);

impl FakeOAuth {
    fn valid(self, token: &str, login: &str, expires_in: u64) -> Self {
        self.0
            .lock()
            .unwrap()
            .valid
            .insert(token.to_string(), (login.to_string(), expires_in));
        self
    }

    fn refreshes(self, refresh: &str, access: &str, next_refresh: &str) -> Self {
        self.0.lock().unwrap().refresh.insert(
            refresh.to_string(),
            TokenGrant {
                access_token: access.to_string(),
                refresh_token: Some(next_refresh.to_string()),
                expires_in: Some(14_000),
            },
        );
        self
    }

    fn device(self, interval: u64, expires_in: u64, polls: Vec<DevicePoll>) -> Self {
        {
            let mut state = self.0.lock().unwrap();
            state.device = Some(DeviceCode {
                device_code: "dev-code".to_string(),
                user_code: "ABCD-EFGH".to_string(),
                verification_uri: "https://www.twitch.tv/activate".to_string(),
                expires_in,
                interval,
            });
            state.polls = polls.into();
        }
        self
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|call| call == name)
    }
}

impl OAuthClient for FakeOAuth {
    fn validate(&self, access_token: &str) -> Result<Option<ValidatedToken>, OAuthError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push("validate".to_string());
        Ok(state
            .valid
            .get(access_token)
            .map(|(login, expires_in)| ValidatedToken {
                login: login.clone(),
                expires_in: *expires_in,
                client_id: "client".to_string(),
            }))
    }

    fn refresh(&self, refresh_token: &str) -> Result<Option<TokenGrant>, OAuthError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push("refresh".to_string());
        Ok(state.refresh.get(refresh_token).cloned())
    }

    fn start_device_flow(&self, _scopes: &[String]) -> Result<DeviceCode, OAuthError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push("device".to_string());
        state.device.clone().ok_or(OAuthError::Unexpected {
            status: 400,
            body: "invalid client".to_string(),
        })
    }

    fn poll_device_token(
        &self,
        _device_code: &str,
        _scopes: &[String],
    ) -> Result<DevicePoll, OAuthError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push("poll".to_string());
        Ok(state.polls.pop_front().unwrap_or(DevicePoll::Pending))
    }
}

#[derive(Clone)]
struct FakeClock {
    now: Rc<Cell<Instant>>,
    sleeps: Rc<Cell<u32>>,
    slept: Rc<Cell<Duration>>,
}

impl FakeClock {
    fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
            sleeps: Rc::new(Cell::new(0)),
            slept: Rc::new(Cell::new(Duration::ZERO)),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
        self.slept.set(duration);
    }
}

fn manager(client: &FakeOAuth, store: &Arc<MemoryStore>, clock: &FakeClock) -> ChatAuthManager {
    ChatAuthManager::new(
        Box::new(client.clone()),
        Box::new(Arc::clone(store)),
        Box::new(clock.clone()),
        vec!["chat:read".to_string(), "chat:edit".to_string()],
    )
    .with_presenter(|_| {})
}

fn stored(access: &str, refresh: Option<&str>, login: Option<&str>) -> StoredToken {
    StoredToken {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        login: login.map(str::to_string),
    }
}

fn granted(access: &str) -> DevicePoll {
    DevicePoll::Granted(TokenGrant {
        access_token: access.to_string(),
        refresh_token: Some("device-refresh".to_string()),
        expires_in: Some(14_000),
    })
}

#[test]
fn valid_stored_token_is_returned_without_writes() {
    let client = FakeOAuth::default().valid("good", "camuser", 3600);
    let store = Arc::new(MemoryStore::new(Some(stored("good", Some("r"), Some("camuser")))));
    let clock = FakeClock::new();
    let token = manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(token.source, TokenSource::Stored);
    assert_eq!(token.login, "camuser");
    assert_eq!(store.save_count(), 0);
    assert!(!client.called("refresh"));
}

#[test]
fn stored_token_with_new_login_is_persisted() {
    let client = FakeOAuth::default().valid("good", "renamed", 3600);
    let store = Arc::new(MemoryStore::new(Some(stored("good", None, Some("old")))));
    let clock = FakeClock::new();
    manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(store.current().unwrap().login.as_deref(), Some("renamed"));
}

#[test]
fn expired_access_with_valid_refresh_skips_device_flow() {
    let client = FakeOAuth::default()
        .valid("stale", "camuser", 0)
        .valid("fresh", "camuser", 14_000)
        .refreshes("r1", "fresh", "r2");
    let store = Arc::new(MemoryStore::new(Some(stored("stale", Some("r1"), Some("camuser")))));
    let clock = FakeClock::new();
    let token = manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(token.source, TokenSource::Refreshed);
    assert_eq!(token.access_token, "fresh");
    assert!(!client.called("device"));
    assert_eq!(store.current(), Some(stored("fresh", Some("r2"), Some("camuser"))));
}

#[test]
fn invalid_access_and_refresh_fall_back_to_device_flow() {
    let client = FakeOAuth::default()
        .valid("device-access", "camuser", 14_000)
        .device(5, 300, vec![DevicePoll::Pending, granted("device-access")]);
    let store = Arc::new(MemoryStore::new(Some(stored("bad", Some("bad-refresh"), None))));
    let clock = FakeClock::new();
    let token = manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(token.source, TokenSource::DeviceFlow);
    assert_eq!(token.login, "camuser");
    assert_eq!(
        client.calls(),
        vec!["validate", "refresh", "device", "poll", "poll", "validate"]
    );
    assert_eq!(clock.sleeps.get(), 2);
    assert_eq!(
        store.current().unwrap().refresh_token.as_deref(),
        Some("device-refresh")
    );
}

#[test]
fn first_run_goes_straight_to_device_flow() {
    let client = FakeOAuth::default()
        .valid("device-access", "camuser", 14_000)
        .device(5, 300, vec![granted("device-access")]);
    let store = Arc::new(MemoryStore::default());
    let clock = FakeClock::new();
    manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(client.calls()[0], "device");
    assert_eq!(store.save_count(), 1);
}

#[test]
fn slow_down_lengthens_the_poll_interval() {
    let client = FakeOAuth::default()
        .valid("device-access", "camuser", 14_000)
        .device(5, 300, vec![DevicePoll::SlowDown, granted("device-access")]);
    let store = Arc::new(MemoryStore::default());
    let clock = FakeClock::new();
    manager(&client, &store, &clock).ensure_token().unwrap();
    assert_eq!(clock.slept.get(), Duration::from_secs(10));
}

#[test]
fn device_flow_stops_at_its_deadline() {
    let client = FakeOAuth::default().device(5, 12, Vec::new());
    let store = Arc::new(MemoryStore::default());
    let clock = FakeClock::new();
    let err = manager(&client, &store, &clock).ensure_token().unwrap_err();
    assert!(matches!(err, AuthError::Expired));
    assert_eq!(store.save_count(), 0);
}

#[test]
fn terminal_device_errors_are_reported() {
    for (poll, fatal) in [
        (DevicePoll::Denied, false),
        (DevicePoll::Expired, false),
        (DevicePoll::InvalidClient, true),
    ] {
        let client = FakeOAuth::default().device(1, 60, vec![poll]);
        let store = Arc::new(MemoryStore::default());
        let clock = FakeClock::new();
        let err = manager(&client, &store, &clock).ensure_token().unwrap_err();
        assert_eq!(err.is_fatal(), fatal, "{err}");
    }
}

#[test]
fn device_flow_start_failure_means_no_token() {
    let client = FakeOAuth::default();
    let store = Arc::new(MemoryStore::default());
    let clock = FakeClock::new();
    let err = manager(&client, &store, &clock).ensure_token().unwrap_err();
    assert!(matches!(err, AuthError::NoTokenAvailable));
    assert!(!err.is_fatal());
}

#[test]
fn renew_uses_stored_token_or_refresh() {
    let client = FakeOAuth::default()
        .valid("stale", "camuser", 0)
        .valid("fresh", "camuser", 14_000)
        .refreshes("r1", "fresh", "r2");
    let store = Arc::new(MemoryStore::new(Some(stored("stale", Some("r1"), Some("camuser")))));
    let clock = FakeClock::new();
    let token = manager(&client, &store, &clock).renew_token().unwrap();
    assert_eq!(token.source, TokenSource::Refreshed);
    assert_eq!(token.access_token, "fresh");
}

#[test]
fn renew_never_starts_device_flow() {
    let client = FakeOAuth::default().device(5, 300, vec![granted("device-access")]);
    let store = Arc::new(MemoryStore::new(Some(stored("bad", Some("bad-refresh"), Some("camuser")))));
    let clock = FakeClock::new();
    let err = manager(&client, &store, &clock).renew_token().unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationRequired));
    assert!(!client.called("device"));
    assert_eq!(clock.sleeps.get(), 0);

    let empty = Arc::new(MemoryStore::default());
    let err = manager(&client, &empty, &clock).renew_token().unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationRequired));
    assert!(!client.called("device"));
}

#[test]
fn classifies_validate_responses() {
    let ok = classify_validate(200, r#"{"client_id":"c","login":"cam","scopes":[],"user_id":"1","expires_in":42}"#)
        .unwrap()
        .unwrap();
    assert_eq!(ok.login, "cam");
    assert_eq!(ok.expires_in, 42);
    assert_eq!(classify_validate(401, r#"{"status":401,"message":"invalid access token"}"#).unwrap(), None);
    assert!(classify_validate(500, "").is_err());
}

#[test]
fn classifies_refresh_responses() {
    let grant = classify_refresh(200, r#"{"access_token":"a","refresh_token":"b","expires_in":10,"scope":[],"token_type":"bearer"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(grant.refresh_token.as_deref(), Some("b"));
    assert_eq!(classify_refresh(400, r#"{"status":400,"message":"Invalid refresh token"}"#).unwrap(), None);
}

#[test]
fn classifies_device_poll_responses() {
    let pending = r#"{"status":400,"message":"authorization_pending"}"#;
    assert_eq!(classify_device_poll(400, pending).unwrap(), DevicePoll::Pending);
    assert_eq!(
        classify_device_poll(400, r#"{"status":400,"message":"slow_down"}"#).unwrap(),
        DevicePoll::SlowDown
    );
    assert_eq!(
        classify_device_poll(400, r#"{"status":400,"message":"invalid device code"}"#).unwrap(),
        DevicePoll::Expired
    );
    assert_eq!(
        classify_device_poll(400, r#"{"error":"access_denied"}"#).unwrap(),
        DevicePoll::Denied
    );
    assert_eq!(
        classify_device_poll(400, r#"{"status":400,"message":"invalid client"}"#).unwrap(),
        DevicePoll::InvalidClient
    );
    assert!(matches!(
        classify_device_poll(200, r#"{"access_token":"x","refresh_token":"y","expires_in":1}"#).unwrap(),
        DevicePoll::Granted(_)
    ));
    assert!(classify_device_poll(503, "").is_err());
}

fn temp_secrets(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("visca_zoom_{name}_{nanos}.json"))
}

#[test]
fn json_store_tolerates_missing_file() {
    let store = JsonFileStore::new(temp_secrets("missing"));
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn json_store_merges_with_unrelated_keys() {
    let path = temp_secrets("merge");
    fs::write(
        &path,
        r#"{"wifi":{"ssid":"studio"},"twitch":{"access_token":"old","refresh_token":"keep","extra":1}}"#,
    )
    .unwrap();
    let store = JsonFileStore::new(&path);
    store
        .save(&stored("new", Some("next"), Some("camuser")))
        .unwrap();

    let root: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(root["wifi"]["ssid"], "studio");
    assert_eq!(root["twitch"]["access_token"], "new");
    assert_eq!(root["twitch"]["refresh_token"], "next");
    assert_eq!(root["twitch"]["login"], "camuser");
    assert_eq!(root["twitch"]["extra"], 1);
    assert_eq!(
        store.load().unwrap(),
        Some(stored("new", Some("next"), Some("camuser")))
    );
    assert!(!path.with_extension("json.tmp").exists());
    let _ = fs::remove_file(&path);
}

#[test]
fn json_store_drops_old_refresh_token_when_grant_has_none() {
    let path = temp_secrets("no_refresh");
    fs::write(
        &path,
        r#"{"twitch":{"access_token":"old","refresh_token":"stale","login":"camuser"}}"#,
    )
    .unwrap();
    let store = JsonFileStore::new(&path);
    store
        .save(&stored("new", None, Some("camuser")))
        .unwrap();

    let root: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(root["twitch"].get("refresh_token").is_none());
    assert_eq!(
        store.load().unwrap(),
        Some(stored("new", None, Some("camuser")))
    );
    let _ = fs::remove_file(&path);
}

#[test]
fn json_store_refuses_to_clobber_corrupt_file() {
    let path = temp_secrets("corrupt");
    fs::write(&path, "not json").unwrap();
    let store = JsonFileStore::new(&path);
    assert!(store.load().is_err());
    assert!(store.save(&stored("x", None, None)).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    let _ = fs::remove_file(&path);
}

#[test]
fn corrupt_store_is_a_fatal_auth_error() {
    let path = temp_secrets("fatal");
    fs::write(&path, "[1,2]").unwrap();
    let mut manager = ChatAuthManager::new(
        Box::new(FakeOAuth::default()),
        Box::new(JsonFileStore::new(&path)),
        Box::new(FakeClock::new()),
        Vec::new(),
    );
    let err = manager.ensure_token().unwrap_err();
    assert!(err.is_fatal());
    let _ = fs::remove_file(&path);
}
