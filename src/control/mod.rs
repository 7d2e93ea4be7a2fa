//! The tick loop: gathers remote commands, asks the arbiter for the effective zoom, and
//! writes the resulting VISCA frames to the camera.

mod chat;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::arbiter::{ArbiterEvent, RemoteCommand, Tick, ZoomArbiter};
use crate::camera::{open_link, CameraLink};
use crate::config::{AppConfig, OverlaySettings};
use crate::input::{open_input, ManualInput};
use crate::udp::UdpCommandSource;
use crate::utf8_safe::overlay_name;
use crate::visca::{
    encode_brightness, encode_overlay_clear, encode_overlay_line, encode_zoom_absolute,
    power_on_defaults, OverlaySlot, ViscaFrame, ZoomLevel, OVERLAY_LINE_WIDTH,
};
use crate::log_debug;

pub use chat::ChatRuntime;

pub struct ControlLoop {
    arbiter: ZoomArbiter,
    camera: Box<dyn CameraLink>,
    input: Box<dyn ManualInput>,
    overlay: OverlaySettings,
    chat: Option<ChatRuntime>,
    udp: Option<UdpCommandSource>,
    tick_interval: Duration,
    shown_zoom: Option<ZoomLevel>,
    link_down: bool,
}

impl ControlLoop {
    pub fn new(
        arbiter: ZoomArbiter,
        camera: Box<dyn CameraLink>,
        input: Box<dyn ManualInput>,
        overlay: OverlaySettings,
        tick_interval: Duration,
    ) -> Self {
        Self {
            arbiter,
            camera,
            input,
            overlay,
            chat: None,
            udp: None,
            tick_interval,
            shown_zoom: None,
            link_down: false,
        }
    }

    /// Build everything the CLI asks for. Chat is skipped (not an error) when its settings
    /// are incomplete; a UDP port that cannot be bound is an error.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let camera = open_link(config)?;
        let input = open_input(config);
        log_debug(&format!(
            "camera: {}, input: {}, mapping: {}",
            camera.describe(),
            input.describe(),
            config.zoom_mapping.label()
        ));
        let mut control = Self::new(
            ZoomArbiter::new(config.arbiter_settings()),
            camera,
            input,
            config.overlay_settings(),
            config.tick_interval(),
        );
        if let Some(settings) = config.chat_settings() {
            control.chat = Some(
                ChatRuntime::from_settings(&settings).context("failed to set up chat client")?,
            );
        }
        if let Some(port) = config.udp_port {
            control.udp = Some(UdpCommandSource::bind(port)?);
        }
        Ok(control)
    }

    pub fn with_chat(mut self, chat: ChatRuntime) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_udp(mut self, udp: UdpCommandSource) -> Self {
        self.udp = Some(udp);
        self
    }

    pub fn arbiter(&self) -> &ZoomArbiter {
        &self.arbiter
    }

    /// Camera initialisation and the first chat connection. Blocking.
    pub fn start(&mut self, init_camera: bool, brightness: Option<u8>) -> Result<()> {
        let mut frames = Vec::new();
        if init_camera {
            frames.extend(power_on_defaults());
        }
        if let Some(level) = brightness {
            frames.push(encode_brightness(level));
        }
        for frame in &frames {
            self.camera
                .send(frame)
                .with_context(|| format!("camera init frame {} failed", frame.hex()))?;
        }
        if let Some(chat) = self.chat.as_mut() {
            chat.connect(Instant::now());
        }
        Ok(())
    }

    /// One pass: remote commands, arbitration, frames.
    pub fn step(&mut self, now: Instant) -> Tick {
        for command in self.collect_commands(now) {
            self.arbiter.apply(command, now);
        }
        let reading = self.input.read();
        let tick = self.arbiter.tick(reading, now);
        let mut failed = false;
        for event in &tick.events {
            for frame in self.frames_for(event) {
                failed |= !self.send(&frame);
            }
        }
        if let Some(slot) = self.overlay.zoom_slot {
            if self.shown_zoom != Some(tick.level) {
                let text = tick.level.to_string();
                let mut shown = true;
                for frame in encode_overlay_line(&text, slot, self.overlay.style) {
                    shown &= self.send(&frame);
                }
                if shown {
                    self.shown_zoom = Some(tick.level);
                }
                failed |= !shown;
            }
        }
        if failed {
            self.arbiter.resend_next_tick();
        }
        tick
    }

    fn collect_commands(&mut self, now: Instant) -> Vec<RemoteCommand> {
        let mut commands = Vec::new();
        if let Some(udp) = self.udp.as_mut() {
            commands.extend(udp.poll());
        }
        if let Some(chat) = self.chat.as_mut() {
            match chat.poll(now) {
                Ok(received) => commands.extend(received),
                Err(err) => {
                    log_debug(&format!("chat fault ({err}); reverting to manual zoom"));
                    self.arbiter.reset();
                }
            }
        }
        commands
    }

    fn frames_for(&self, event: &ArbiterEvent) -> Vec<ViscaFrame> {
        match event {
            ArbiterEvent::ZoomChanged(level) => vec![encode_zoom_absolute(*level)],
            ArbiterEvent::OverlayUpdate { identity } => {
                let name = overlay_name(identity, OVERLAY_LINE_WIDTH);
                let mut frames = Vec::with_capacity(6);
                frames.extend(encode_overlay_line(
                    &self.overlay.label,
                    self.overlay.label_slot,
                    self.overlay.style,
                ));
                frames.extend(encode_overlay_line(
                    &name,
                    self.overlay.name_slot,
                    self.overlay.style,
                ));
                frames
            }
            ArbiterEvent::OverlayClear => self.clear_frames(false),
        }
    }

    fn clear_frames(&self, include_zoom: bool) -> Vec<ViscaFrame> {
        let mut slots: Vec<OverlaySlot> = vec![self.overlay.label_slot, self.overlay.name_slot];
        if include_zoom {
            slots.extend(self.overlay.zoom_slot);
        }
        slots.into_iter().flat_map(encode_overlay_clear).collect()
    }

    /// `false` when the frame did not make it. Only the first failure in a row is logged.
    fn send(&mut self, frame: &ViscaFrame) -> bool {
        match self.camera.send(frame) {
            Ok(()) => {
                if self.link_down {
                    log_debug("camera link recovered");
                    tracing::info!("camera link recovered");
                    self.link_down = false;
                }
                true
            }
            Err(err) => {
                if !self.link_down {
                    log_debug(&format!("camera send failed: {err:#}"));
                    tracing::warn!(error = %err, "camera send failed");
                    self.link_down = true;
                }
                false
            }
        }
    }

    /// Tick until `stop` is set, then clean up.
    pub fn run(&mut self, stop: &AtomicBool) {
        log_debug(&format!(
            "control loop running every {}ms",
            self.tick_interval.as_millis()
        ));
        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.step(started);
            let elapsed = started.elapsed();
            if elapsed < self.tick_interval {
                thread::sleep(self.tick_interval - elapsed);
            }
        }
        self.shutdown();
    }

    /// Clear every overlay line this program writes and leave the chat channel.
    pub fn shutdown(&mut self) {
        log_debug("control loop stopping");
        for frame in self.clear_frames(true) {
            self.send(&frame);
        }
        self.shown_zoom = None;
        if let Some(chat) = self.chat.as_mut() {
            chat.disconnect();
        }
    }
}
