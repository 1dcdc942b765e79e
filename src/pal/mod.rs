//! Per-platform commands and parsers.
//!
//! The parsers only deal with captured text, so all of them are available on every host. Only
//! [Platform::current] depends on the target the crate is built for.

pub mod linux;
pub mod macos;
pub mod windows;

use std::{fmt, process::Output, str::FromStr};

use serde::Serialize;

use crate::{
    Error, Result,
    device::{Device, Devices, Snapshot},
    text::stringify,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    /// Platform the crate was built for.
    pub fn current() -> Result<Self> {
        if cfg!(target_os = "macos") {
            Ok(Self::MacOs)
        } else if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else if cfg!(target_os = "windows") {
            Ok(Self::Windows)
        } else {
            Err(Error::UnsupportedPlatform(std::env::consts::OS.to_string()))
        }
    }

    /// Shell command whose output [Self::parse] understands.
    pub const fn command(self) -> &'static str {
        match self {
            Self::MacOs => macos::COMMAND,
            Self::Linux => linux::COMMAND,
            Self::Windows => windows::COMMAND,
        }
    }

    pub fn parse<F>(self, output: &str, filter: F) -> Result<Snapshot>
    where
        F: Fn(&Device, &str, &Devices) -> bool,
    {
        match self {
            Self::MacOs => macos::parse(output, filter),
            Self::Linux => linux::parse(output, filter),
            Self::Windows => windows::parse(output, filter),
        }
    }

    const fn shell(self) -> (&'static str, &'static str) {
        match self {
            Self::Windows => ("cmd", "/C"),
            Self::MacOs | Self::Linux => ("sh", "-c"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MacOs => write!(f, "macOS"),
            Self::Linux => write!(f, "Linux"),
            Self::Windows => write!(f, "Windows"),
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            "windows" | "win32" => Ok(Self::Windows),
            _ => Err(Error::UnsupportedPlatform(s.to_string())),
        }
    }
}

fn check_output(platform: Platform, output: Output) -> Result<String> {
    if !output.status.success() {
        return Err(Error::Execution {
            command: platform.command(),
            status: output.status.code(),
            stderr: stringify(&output.stderr).trim().to_string(),
        });
    }

    Ok(stringify(&output.stdout))
}

/// Run the platform command and capture its stdout.
pub(crate) fn execute(platform: Platform) -> Result<String> {
    let (shell, flag) = platform.shell();
    tracing::info!("Running {}", platform.command());

    let output = std::process::Command::new(shell)
        .args([flag, platform.command()])
        .output()?;

    check_output(platform, output)
}

#[cfg(feature = "tokio")]
pub(crate) async fn execute_async(platform: Platform) -> Result<String> {
    let (shell, flag) = platform.shell();
    tracing::info!("Running {}", platform.command());

    let output = tokio::process::Command::new(shell)
        .args([flag, platform.command()])
        .output()
        .await?;

    check_output(platform, output)
}
