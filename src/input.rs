//! Manual zoom input: the raw reading the arbiter rescales every tick.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::log_debug;

pub trait ManualInput {
    /// Current raw reading in `0..=max`.
    fn read(&mut self) -> u16;
    fn describe(&self) -> String;
}

/// Pick the ADC file when configured, otherwise a fixed reading.
pub fn open_input(config: &AppConfig) -> Box<dyn ManualInput> {
    match &config.adc_path {
        Some(path) => Box::new(IioAdcInput::new(path, config.adc_max, config.fixed_reading())),
        None => Box::new(FixedInput(config.fixed_reading())),
    }
}

/// Reads a decimal sample from a sysfs/IIO file such as
/// `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`. A failed read keeps the last good
/// value so a flaky ADC never jolts the lens.
pub struct IioAdcInput {
    path: PathBuf,
    max: u16,
    last: u16,
    failing: bool,
}

impl IioAdcInput {
    pub fn new(path: &Path, max: u16, initial: u16) -> Self {
        Self {
            path: path.to_path_buf(),
            max,
            last: initial.min(max),
            failing: false,
        }
    }

    fn sample(&self) -> Result<u16, String> {
        let text = fs::read_to_string(&self.path).map_err(|err| err.to_string())?;
        let value: i64 = text
            .trim()
            .parse()
            .map_err(|err| format!("unparseable sample {:?}: {err}", text.trim()))?;
        Ok(value.clamp(0, i64::from(self.max)) as u16)
    }
}

impl ManualInput for IioAdcInput {
    fn read(&mut self) -> u16 {
        match self.sample() {
            Ok(value) => {
                if self.failing {
                    log_debug("adc readings recovered");
                    self.failing = false;
                }
                self.last = value;
            }
            Err(err) => {
                if !self.failing {
                    log_debug(&format!(
                        "adc read from {} failed: {err}; holding {}",
                        self.path.display(),
                        self.last
                    ));
                    tracing::warn!(path = %self.path.display(), "adc read failed");
                    self.failing = true;
                }
            }
        }
        self.last
    }

    fn describe(&self) -> String {
        format!("adc {}", self.path.display())
    }
}

/// Constant reading, for setups without a potentiometer.
#[derive(Debug, Clone, Copy)]
pub struct FixedInput(pub u16);

impl ManualInput for FixedInput {
    fn read(&mut self) -> u16 {
        self.0
    }

    fn describe(&self) -> String {
        format!("fixed reading {}", self.0)
    }
}
