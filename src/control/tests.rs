use super::*;
use crate::arbiter::{ArbiterSettings, ZoomMapping};
use crate::camera::recording::RecordingLink;
use crate::chat::auth::{
    Clock, DeviceCode, DevicePoll, MemoryStore, OAuthClient, OAuthError, StoredToken,
    TokenGrant, ValidatedToken,
};
use crate::chat::{ChatAuthManager, ChatSession, ChatTarget, CommandFilter, SessionState};
use crate::visca::{encode_overlay_line, OverlayStyle};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, UdpSocket};
use std::sync::atomic::AtomicU16;
use std::sync::Arc;

const MAX: u16 = 4095;

#[derive(Clone, Default)]
struct SharedInput(Arc<AtomicU16>);

impl SharedInput {
    fn set(&self, value: u16) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl ManualInput for SharedInput {
    fn read(&mut self) -> u16 {
        self.0.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        "shared".to_string()
    }
}

fn overlay(zoom_slot: Option<OverlaySlot>) -> OverlaySettings {
    OverlaySettings {
        zoom_slot,
        label_slot: OverlaySlot::LABEL,
        name_slot: OverlaySlot::NAME,
        label: "ZOOM BY:".to_string(),
        style: OverlayStyle::default(),
    }
}

fn control(zoom_slot: Option<OverlaySlot>) -> (ControlLoop, RecordingLink, SharedInput) {
    let link = RecordingLink::default();
    let input = SharedInput::default();
    let arbiter = ZoomArbiter::new(ArbiterSettings {
        mapping: ZoomMapping::Inverted,
        input_max: MAX,
        override_window: Duration::from_secs(20),
    });
    let control = ControlLoop::new(
        arbiter,
        Box::new(link.clone()),
        Box::new(input.clone()),
        overlay(zoom_slot),
        Duration::from_millis(5),
    );
    (control, link, input)
}

fn level(value: i64) -> ZoomLevel {
    ZoomLevel::new(value).unwrap()
}

fn overlay_frames(text: &str, slot: OverlaySlot) -> Vec<ViscaFrame> {
    encode_overlay_line(text, slot, OverlayStyle::default()).to_vec()
}

fn udp_pair() -> (UdpCommandSource, UdpSocket, std::net::SocketAddr) {
    let source = UdpCommandSource::from_socket(UdpSocket::bind("127.0.0.1:0").unwrap()).unwrap();
    let addr = source.local_addr().unwrap();
    (source, UdpSocket::bind("127.0.0.1:0").unwrap(), addr)
}

/// Step until the arbiter enters an override or a second passes.
fn step_until_override(control: &mut ControlLoop, now: Instant) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while !control.arbiter().is_override() && Instant::now() < deadline {
        control.step(now);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(control.arbiter().is_override());
}

#[test]
fn manual_reading_sends_zoom_and_readout_once() {
    let (mut control, link, input) = control(Some(OverlaySlot::ZOOM));
    input.set(MAX);
    let now = Instant::now();
    control.step(now);

    let mut expected = vec![encode_zoom_absolute(ZoomLevel::MIN)];
    expected.extend(overlay_frames("1x", OverlaySlot::ZOOM));
    assert_eq!(link.frames(), expected);

    link.clear();
    control.step(now + Duration::from_millis(5));
    assert!(link.frames().is_empty());

    input.set(0);
    control.step(now + Duration::from_millis(10));
    let frames = link.frames();
    assert_eq!(frames[0], encode_zoom_absolute(ZoomLevel::MAX));
    assert_eq!(frames[1..], overlay_frames("30x", OverlaySlot::ZOOM)[..]);
}

#[test]
fn readout_can_be_disabled() {
    let (mut control, link, input) = control(None);
    input.set(MAX);
    control.step(Instant::now());
    assert_eq!(link.frames(), vec![encode_zoom_absolute(ZoomLevel::MIN)]);
}

#[test]
fn udp_override_shows_identity_and_clears_on_expiry() {
    let (control, link, input) = control(None);
    let (source, sender, addr) = udp_pair();
    let mut control = control.with_udp(source);
    input.set(MAX);
    let start = Instant::now();
    control.step(start);
    link.clear();

    sender.send_to(b"ZOOM 12 Hannes", addr).unwrap();
    step_until_override(&mut control, start);

    let mut expected = overlay_frames("ZOOM BY:", OverlaySlot::LABEL);
    expected.extend(overlay_frames("HANNES", OverlaySlot::NAME));
    expected.push(encode_zoom_absolute(level(12)));
    assert_eq!(link.frames(), expected);

    link.clear();
    control.step(start + Duration::from_secs(21));
    let mut expected = overlay_frames("", OverlaySlot::LABEL);
    expected.extend(overlay_frames("", OverlaySlot::NAME));
    expected.push(encode_zoom_absolute(ZoomLevel::MIN));
    assert_eq!(link.frames(), expected);
    assert!(!control.arbiter().is_override());
}

#[test]
fn udp_cancel_returns_to_manual() {
    let (control, _link, input) = control(None);
    let (source, sender, addr) = udp_pair();
    let mut control = control.with_udp(source);
    input.set(MAX);
    let now = Instant::now();

    sender.send_to(b"zoom 5", addr).unwrap();
    step_until_override(&mut control, now);

    sender.send_to(b"ZOOMOFF", addr).unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    while control.arbiter().is_override() && Instant::now() < deadline {
        control.step(now);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!control.arbiter().is_override());
}

#[test]
fn failed_send_is_retried_next_tick() {
    let (mut control, link, input) = control(Some(OverlaySlot::ZOOM));
    input.set(MAX);
    link.set_failing(true);
    control.step(Instant::now());
    assert!(link.frames().is_empty());

    link.set_failing(false);
    control.step(Instant::now());
    let frames = link.frames();
    assert_eq!(frames[0], encode_zoom_absolute(ZoomLevel::MIN));
    assert_eq!(frames.len(), 4);
}

#[test]
fn start_sends_init_burst_and_brightness() {
    let (mut control, link, _input) = control(None);
    control.start(true, Some(6)).unwrap();
    let frames = link.frames();
    let defaults = power_on_defaults();
    assert_eq!(frames[..defaults.len()], defaults[..]);
    assert_eq!(frames.last(), Some(&encode_brightness(6)));
}

#[test]
fn shutdown_clears_all_overlay_lines() {
    let (mut control, link, _input) = control(Some(OverlaySlot::ZOOM));
    control.shutdown();
    let mut expected = overlay_frames("", OverlaySlot::LABEL);
    expected.extend(overlay_frames("", OverlaySlot::NAME));
    expected.extend(overlay_frames("", OverlaySlot::ZOOM));
    assert_eq!(link.frames(), expected);
}

#[test]
fn run_exits_when_stop_is_set() {
    let (mut control, link, _input) = control(None);
    let stop = AtomicBool::new(true);
    control.run(&stop);
    // Only the shutdown clears went out.
    assert_eq!(link.frames().len(), 6);
}

struct StaticOAuth;

impl OAuthClient for StaticOAuth {
    fn validate(&self, _access_token: &str) -> Result<Option<ValidatedToken>, OAuthError> {
        Ok(Some(ValidatedToken {
            login: "camuser".to_string(),
            expires_in: 3600,
            client_id: "client".to_string(),
        }))
    }

    fn refresh(&self, _refresh_token: &str) -> Result<Option<TokenGrant>, OAuthError> {
        Ok(None)
    }

    fn start_device_flow(&self, _scopes: &[String]) -> Result<DeviceCode, OAuthError> {
        Ok(DeviceCode {
            device_code: "d".to_string(),
            user_code: "u".to_string(),
            verification_uri: "https://www.twitch.tv/activate".to_string(),
            expires_in: 60,
            interval: 1,
        })
    }

    fn poll_device_token(
        &self,
        _device_code: &str,
        _scopes: &[String],
    ) -> Result<DevicePoll, OAuthError> {
        Ok(DevicePoll::InvalidClient)
    }
}

struct InstantClock;

impl Clock for InstantClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) {}
}

fn chat_runtime(port: u16, stored: Option<StoredToken>) -> ChatRuntime {
    let auth = ChatAuthManager::new(
        Box::new(StaticOAuth),
        Box::new(MemoryStore::new(stored)),
        Box::new(InstantClock),
        vec!["chat:read".to_string()],
    )
    .with_presenter(|_| {});
    let session = ChatSession::new(
        ChatTarget {
            host: "127.0.0.1".to_string(),
            port,
            channel: "ch".to_string(),
            prefix: String::new(),
        },
        CommandFilter::new("R", Duration::from_secs(10)),
    );
    ChatRuntime::new(auth, session)
}

fn token() -> Option<StoredToken> {
    Some(StoredToken {
        access_token: "tok".to_string(),
        refresh_token: None,
        login: Some("camuser".to_string()),
    })
}

#[test]
fn chat_reward_drives_override() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (control, link, input) = control(None);
    let mut control = control.with_chat(chat_runtime(port, token()));
    input.set(MAX);
    control.start(false, None).unwrap();

    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(
            b":tmi.twitch.tv 001 camuser :Welcome\r\n@custom-reward-id=R;display-name=Fan :fan!fan@host PRIVMSG #ch :17\r\n",
        )
        .unwrap();
    step_until_override(&mut control, Instant::now());
    assert!(link.frames().contains(&encode_zoom_absolute(level(17))));
    assert!(link
        .frames()
        .ends_with(&[encode_zoom_absolute(level(17))]));
}

#[test]
fn chat_auth_failure_reverts_to_manual_and_schedules_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (control, _link, input) = control(None);
    let (source, sender, addr) = udp_pair();
    let mut control = control
        .with_chat(chat_runtime(port, token()))
        .with_udp(source);
    input.set(MAX);
    control.start(false, None).unwrap();
    let (mut stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut first = String::new();
    reader.read_line(&mut first).unwrap();
    assert_eq!(first.trim_end(), "PASS oauth:tok");

    sender.send_to(b"zoom 9 x", addr).unwrap();
    let now = Instant::now();
    step_until_override(&mut control, now);

    stream
        .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    while control.arbiter().is_override() && Instant::now() < deadline {
        control.step(now);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!control.arbiter().is_override());
    let chat = control.chat.as_ref().unwrap();
    assert_eq!(chat.state(), SessionState::Disconnected);
    assert!(chat.next_attempt().is_some_and(|at| at > now));
}

#[test]
fn fatal_auth_error_disables_chat_but_not_the_camera() {
    let (control, link, input) = control(None);
    let mut control = control.with_chat(chat_runtime(1, None));
    input.set(MAX);
    control.start(false, None).unwrap();
    assert!(control.chat.as_ref().unwrap().is_disabled());

    control.step(Instant::now());
    assert_eq!(link.frames(), vec![encode_zoom_absolute(ZoomLevel::MIN)]);
}

/// Accepts the first token, rejects every later validation, and never finishes a device
/// authorization.
#[derive(Clone, Default)]
struct RevokedOAuth {
    validations: Arc<AtomicU16>,
    device_starts: Arc<AtomicU16>,
    device_polls: Arc<AtomicU16>,
}

impl OAuthClient for RevokedOAuth {
    fn validate(&self, access_token: &str) -> Result<Option<ValidatedToken>, OAuthError> {
        if self.validations.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(None);
        }
        StaticOAuth.validate(access_token)
    }

    fn refresh(&self, _refresh_token: &str) -> Result<Option<TokenGrant>, OAuthError> {
        Ok(None)
    }

    fn start_device_flow(&self, scopes: &[String]) -> Result<DeviceCode, OAuthError> {
        self.device_starts.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceCode {
            expires_in: 1800,
            interval: 5,
            ..StaticOAuth.start_device_flow(scopes)?
        })
    }

    fn poll_device_token(
        &self,
        _device_code: &str,
        _scopes: &[String],
    ) -> Result<DevicePoll, OAuthError> {
        self.device_polls.fetch_add(1, Ordering::SeqCst);
        Ok(DevicePoll::Pending)
    }
}

/// Time only moves when the device flow sleeps.
struct SteppedClock {
    base: Instant,
    slept: std::cell::Cell<Duration>,
}

impl Clock for SteppedClock {
    fn now(&self) -> Instant {
        self.base + self.slept.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
    }
}

#[test]
fn revoked_token_in_the_loop_disables_chat_without_device_flow() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let oauth = RevokedOAuth::default();
    let auth = ChatAuthManager::new(
        Box::new(oauth.clone()),
        Box::new(MemoryStore::new(token())),
        Box::new(SteppedClock {
            base: Instant::now(),
            slept: std::cell::Cell::new(Duration::ZERO),
        }),
        vec!["chat:read".to_string()],
    )
    .with_presenter(|_| {});
    let session = ChatSession::new(
        ChatTarget {
            host: "127.0.0.1".to_string(),
            port,
            channel: "ch".to_string(),
            prefix: String::new(),
        },
        CommandFilter::new("R", Duration::from_secs(10)),
    );
    let (control, link, input) = control(None);
    let mut control = control.with_chat(ChatRuntime::new(auth, session));
    input.set(MAX);
    control.start(false, None).unwrap();

    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
        .unwrap();
    drop(stream);

    let now = Instant::now();
    let deadline = now + Duration::from_secs(1);
    while control.chat.as_ref().unwrap().state() != SessionState::Disconnected
        && Instant::now() < deadline
    {
        control.step(now);
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        control.chat.as_ref().unwrap().state(),
        SessionState::Disconnected
    );

    link.clear();
    input.set(0);
    let retry_at = now + Duration::from_secs(120);
    let started = Instant::now();
    control.step(retry_at);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(control.chat.as_ref().unwrap().is_disabled());
    assert_eq!(oauth.device_starts.load(Ordering::SeqCst), 0);
    assert_eq!(oauth.device_polls.load(Ordering::SeqCst), 0);
    assert_eq!(link.frames(), vec![encode_zoom_absolute(ZoomLevel::MAX)]);
}
