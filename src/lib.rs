mod app;
pub mod arbiter;
pub mod camera;
pub mod chat;
pub mod config;
pub mod control;
pub mod input;
mod lock;
pub mod telemetry;
pub mod udp;
pub mod utf8_safe;
pub mod visca;

pub use app::logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub(crate) use lock::lock_or_recover;
