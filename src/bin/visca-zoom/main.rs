mod signals;

use std::panic;

use anyhow::{Context, Result};
use visca_zoom::config::AppConfig;
use visca_zoom::control::ControlLoop;
use visca_zoom::telemetry::init_tracing;
use visca_zoom::visca::{encode_zoom_absolute, lens_position, ZoomLevel};
use visca_zoom::{init_logging, log_debug, log_file_path, log_panic};

use signals::{install_shutdown_handlers, SHUTDOWN_REQUESTED};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;

    if config.print_frames {
        print_frames();
        return Ok(());
    }

    init_logging(&config);
    init_tracing(&config);
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));
    log_debug(&format!(
        "visca-zoom {} starting (log: {})",
        env!("CARGO_PKG_VERSION"),
        log_file_path().display()
    ));

    install_shutdown_handlers()?;
    let mut control = ControlLoop::from_config(&config).context("failed to set up controller")?;
    control.start(config.init_camera, config.brightness)?;
    control.run(&SHUTDOWN_REQUESTED);
    log_debug("visca-zoom stopped");
    Ok(())
}

fn print_frames() {
    for level in ZoomLevel::all() {
        println!(
            "{:>3}  {:#06X}  {}",
            level.to_string(),
            lens_position(level),
            encode_zoom_absolute(level).hex()
        );
    }
}
