use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use visca_zoom::log_debug;

/// Set by SIGINT/SIGTERM; the control loop stops at the next tick.
pub(crate) static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub(crate) fn install_shutdown_handlers() -> Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            // SAFETY: handle_shutdown only stores to an atomic, which is async-signal-safe.
            let handler = handle_shutdown as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install handler for signal {signal}"));
                return Err(anyhow!("failed to install shutdown handler"));
            }
        }
    }
    Ok(())
}
