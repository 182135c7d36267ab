//! Backend built on stock system tools.
//!
//! Session lock, power-off, volume and the alert tone are delegated to
//! commands (`loginctl`, `systemctl`, `wpctl`, `osascript`, ...). Held
//! effects need in-process hooks and are unsupported here.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::BackendOptions;
use super::unsupported::{UnsupportedColorFilter, UnsupportedHook, UnsupportedInjector, UnsupportedPointer};
use crate::intervention::{
    AlertTone, AudioOutput, AudioState, Backend, EffectError, GrayscaleEffect, InputDelayEffect,
    PointerInversionEffect, SessionControl,
};

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }

    /// First element is the program. `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Run to completion and return stdout.
    pub async fn run(&self) -> Result<String, EffectError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| EffectError::Command {
                program: self.program.clone(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(EffectError::Command {
                program: self.program.clone(),
                message: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn default_lock_command() -> Option<CommandLine> {
    if cfg!(target_os = "linux") {
        Some(CommandLine::new("loginctl", &["lock-session"]))
    } else if cfg!(target_os = "macos") {
        Some(CommandLine::new("pmset", &["displaysleepnow"]))
    } else if cfg!(windows) {
        Some(CommandLine::new("rundll32.exe", &["user32.dll,LockWorkStation"]))
    } else {
        None
    }
}

pub fn default_power_off_command() -> Option<CommandLine> {
    if cfg!(target_os = "linux") {
        Some(CommandLine::new("systemctl", &["poweroff"]))
    } else if cfg!(target_os = "macos") {
        Some(CommandLine::new(
            "osascript",
            &["-e", "tell application \"System Events\" to shut down"],
        ))
    } else if cfg!(windows) {
        Some(CommandLine::new("shutdown", &["/s", "/f", "/t", "0"]))
    } else {
        None
    }
}

pub fn default_tone_command() -> Option<CommandLine> {
    if cfg!(target_os = "linux") {
        Some(CommandLine::new(
            "paplay",
            &["/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga"],
        ))
    } else if cfg!(target_os = "macos") {
        Some(CommandLine::new("afplay", &["/System/Library/Sounds/Sosumi.aiff"]))
    } else if cfg!(windows) {
        Some(CommandLine::new(
            "powershell",
            &["-NoProfile", "-Command", "[console]::beep(1000,600)"],
        ))
    } else {
        None
    }
}

pub fn backend(options: &BackendOptions) -> Backend {
    let lock = options
        .lock_command
        .as_deref()
        .and_then(CommandLine::from_argv)
        .or_else(default_lock_command);
    let power_off = options
        .power_off_command
        .as_deref()
        .and_then(CommandLine::from_argv)
        .or_else(default_power_off_command);
    let tone = options
        .tone_command
        .as_deref()
        .and_then(CommandLine::from_argv)
        .or_else(default_tone_command);

    Backend {
        name: "command",
        audio: Arc::new(CommandAudio::detect()),
        tone: Arc::new(CommandTone {
            command: tone,
            repeats: options.tone_repeats,
        }),
        session: Arc::new(CommandSession { lock, power_off }),
        effects: vec![
            Box::new(InputDelayEffect::new(
                Box::new(UnsupportedHook),
                Arc::new(UnsupportedInjector),
                options.key_delay,
            )),
            Box::new(GrayscaleEffect::new(Box::new(UnsupportedColorFilter))),
            Box::new(PointerInversionEffect::new(
                Arc::new(UnsupportedPointer),
                options.pointer.clone(),
            )),
        ],
    }
}

pub struct CommandSession {
    lock: Option<CommandLine>,
    power_off: Option<CommandLine>,
}

#[async_trait]
impl SessionControl for CommandSession {
    async fn lock(&self) -> Result<(), EffectError> {
        let command = self.lock.as_ref().ok_or(EffectError::Unsupported("session lock"))?;
        command.run().await.map(|_| ())
    }

    async fn power_off(&self) -> Result<(), EffectError> {
        let command = self
            .power_off
            .as_ref()
            .ok_or(EffectError::Unsupported("power off"))?;
        command.run().await.map(|_| ())
    }
}

pub struct CommandTone {
    command: Option<CommandLine>,
    repeats: u32,
}

#[async_trait]
impl AlertTone for CommandTone {
    async fn play(&self) -> Result<(), EffectError> {
        let command = self.command.as_ref().ok_or(EffectError::Unsupported("alert tone"))?;
        for _ in 0..self.repeats.max(1) {
            command.run().await?;
        }
        Ok(())
    }
}

/// Volume control through the desktop's mixer tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAudio {
    /// PipeWire `wpctl`.
    Wpctl,
    /// macOS `osascript`.
    Osascript,
    None,
}

const WPCTL_SINK: &str = "@DEFAULT_AUDIO_SINK@";

impl CommandAudio {
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            Self::Wpctl
        } else if cfg!(target_os = "macos") {
            Self::Osascript
        } else {
            Self::None
        }
    }
}

#[async_trait]
impl AudioOutput for CommandAudio {
    async fn snapshot(&self) -> Result<AudioState, EffectError> {
        match self {
            Self::Wpctl => {
                let out = CommandLine::new("wpctl", &["get-volume", WPCTL_SINK]).run().await?;
                parse_wpctl_volume(&out)
                    .ok_or_else(|| EffectError::platform("parse wpctl output", out.trim()))
            }
            Self::Osascript => {
                let out = CommandLine::new(
                    "osascript",
                    &[
                        "-e",
                        "set s to get volume settings",
                        "-e",
                        "return ((output volume of s) as text) & \",\" & ((output muted of s) as text)",
                    ],
                )
                .run()
                .await?;
                parse_osascript_volume(&out)
                    .ok_or_else(|| EffectError::platform("parse osascript output", out.trim()))
            }
            Self::None => Err(EffectError::Unsupported("audio control")),
        }
    }

    async fn apply(&self, state: AudioState) -> Result<(), EffectError> {
        let volume = state.volume.clamp(0.0, 1.0);
        match self {
            Self::Wpctl => {
                let level = format!("{volume:.2}");
                CommandLine::new("wpctl", &["set-volume", WPCTL_SINK, &level])
                    .run()
                    .await?;
                let mute = if state.muted { "1" } else { "0" };
                CommandLine::new("wpctl", &["set-mute", WPCTL_SINK, mute])
                    .run()
                    .await?;
                Ok(())
            }
            Self::Osascript => {
                let set_volume = format!("set volume output volume {}", (volume * 100.0).round() as u32);
                let set_muted = format!("set volume output muted {}", state.muted);
                CommandLine::new("osascript", &["-e", &set_volume, "-e", &set_muted])
                    .run()
                    .await?;
                Ok(())
            }
            Self::None => Err(EffectError::Unsupported("audio control")),
        }
    }
}

/// `Volume: 0.40` or `Volume: 0.40 [MUTED]`.
pub fn parse_wpctl_volume(output: &str) -> Option<AudioState> {
    let rest = output.trim().strip_prefix("Volume:")?.trim();
    let mut parts = rest.split_whitespace();
    let volume: f32 = parts.next()?.parse().ok()?;
    let muted = parts.any(|part| part == "[MUTED]");
    Some(AudioState { volume, muted })
}

/// `40,false` from the osascript query.
pub fn parse_osascript_volume(output: &str) -> Option<AudioState> {
    let (volume, muted) = output.trim().split_once(',')?;
    let volume: f32 = volume.trim().parse().ok()?;
    let muted = match muted.trim() {
        "true" => true,
        "false" | "missing value" => false,
        _ => return None,
    };
    Some(AudioState {
        volume: volume / 100.0,
        muted,
    })
}
