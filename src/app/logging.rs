use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 128 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_SINK: OnceLock<Mutex<Option<RotatingFile>>> = OnceLock::new();

/// Debug log written next to other temp files; truncated once it grows past 5 MiB.
pub fn log_file_path() -> PathBuf {
    env::var("VISCA_ZOOM_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("visca_zoom.log"))
}

/// Crash log (panic location only unless content logging is on).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("visca_zoom_crash.log")
}

/// Append-only file that starts over when the next write would exceed `max_bytes`.
struct RotatingFile {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    written: u64,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64) -> Option<Self> {
        let mut written = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if written > max_bytes {
            let _ = fs::remove_file(path);
            written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()?;
        Some(Self {
            path: path.to_path_buf(),
            file,
            max_bytes,
            written,
        })
    }

    fn append(&mut self, line: &str) {
        if self.written.saturating_add(line.len() as u64) > self.max_bytes {
            match fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
            {
                Ok(file) => {
                    self.file = file;
                    self.written = 0;
                }
                Err(_) => return,
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.written = self.written.saturating_add(line.len() as u64);
        }
    }
}

fn sink() -> &'static Mutex<Option<RotatingFile>> {
    LOG_SINK.get_or_init(|| Mutex::new(None))
}

fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

fn configure(enabled: bool, content_enabled: bool, path: &Path) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && content_enabled, Ordering::Relaxed);
    let mut guard = sink()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = if enabled {
        RotatingFile::open(path, LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Enable or disable the debug log from the CLI flags. `--no-logs` wins over everything.
pub fn init_logging(config: &AppConfig) {
    let enabled = config.logs && !config.no_logs;
    configure(enabled, config.log_content, &log_file_path());
}

pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] {msg}\n", timestamp());
    let mut guard = sink()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(file) = guard.as_mut() {
        file.append(&line);
    }
}

/// Log lines that carry viewer content (chat bodies, display names, raw IRC lines).
pub fn log_debug_content(msg: &str) {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(msg);
}

/// Panic hook body: location and version, payload only with content logging on.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        info.payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string())
    } else {
        "payload omitted".to_string()
    };
    let line = format!(
        "[{}] panic at {location}: {payload} (v{})\n",
        timestamp(),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(mut crash) = RotatingFile::open(&crash_log_path(), CRASH_LOG_MAX_BYTES) {
        crash.append(&line);
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool, path: &Path) {
    configure(enabled, content_enabled, path);
}
