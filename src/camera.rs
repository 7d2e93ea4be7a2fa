//! Transport for encoded VISCA frames.

use anyhow::{bail, Result};

use crate::config::AppConfig;
use crate::log_debug;
use crate::visca::ViscaFrame;

/// Anything that can carry frames to the camera.
pub trait CameraLink {
    fn send(&mut self, frame: &ViscaFrame) -> Result<()>;
    fn describe(&self) -> String;
}

/// Open the serial link when a port is configured, else a dry-run link that only logs.
pub fn open_link(config: &AppConfig) -> Result<Box<dyn CameraLink>> {
    match config.serial_port.as_deref() {
        Some(path) => open_serial(path, config.baud),
        None => {
            log_debug("no serial port configured; frames are only logged");
            Ok(Box::new(LogLink::default()))
        }
    }
}

#[cfg(feature = "serial")]
fn open_serial(path: &str, baud: u32) -> Result<Box<dyn CameraLink>> {
    Ok(Box::new(SerialLink::open(path, baud)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(path: &str, _baud: u32) -> Result<Box<dyn CameraLink>> {
    bail!("serial support not compiled in; cannot open {path}")
}

#[cfg(feature = "serial")]
pub use serial::SerialLink;

#[cfg(feature = "serial")]
mod serial {
    use super::CameraLink;
    use crate::log_debug;
    use crate::visca::ViscaFrame;
    use anyhow::{Context, Result};
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::Write;
    use std::time::Duration;

    const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

    /// VISCA over RS-232/TTL: 8 data bits, no parity, one stop bit.
    pub struct SerialLink {
        path: String,
        port: Box<dyn SerialPort>,
    }

    impl SerialLink {
        pub fn open(path: &str, baud: u32) -> Result<Self> {
            let port = serialport::new(path, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(WRITE_TIMEOUT)
                .open()
                .with_context(|| format!("failed to open serial port {path}"))?;
            log_debug(&format!("serial port {path} open at {baud} baud"));
            tracing::info!(path, baud, "camera serial link open");
            Ok(Self {
                path: path.to_string(),
                port,
            })
        }
    }

    impl CameraLink for SerialLink {
        fn send(&mut self, frame: &ViscaFrame) -> Result<()> {
            self.port
                .write_all(frame.as_bytes())
                .with_context(|| format!("write to {} failed", self.path))?;
            self.port
                .flush()
                .with_context(|| format!("flush of {} failed", self.path))?;
            Ok(())
        }

        fn describe(&self) -> String {
            format!("serial {}", self.path)
        }
    }
}

/// Dry-run link: frames go to the debug log and nowhere else.
#[derive(Debug, Default)]
pub struct LogLink {
    sent: usize,
}

impl LogLink {
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl CameraLink for LogLink {
    fn send(&mut self, frame: &ViscaFrame) -> Result<()> {
        if frame.is_empty() {
            bail!("refusing to send an empty frame");
        }
        self.sent += 1;
        log_debug(&format!("visca > {}", frame.hex()));
        Ok(())
    }

    fn describe(&self) -> String {
        "dry run (log only)".to_string()
    }
}
