//! Snapshot of the local storage devices and their volumes.
//!
//! The snapshot is built by running the platform's own command line tools and parsing their
//! output into one [Device] / [Volume] model:
//!
//! - MacOS: `diskutil info -all`
//! - Linux: `df -T`, `fdisk -l` and `lsblk -P`
//! - Windows: `wmic logicaldisk`
//!
//! # Usage
//!
//! ```no_run
//! use bb_filesystem::DeviceFilter;
//!
//! let snapshot = bb_filesystem::filesystem_sync(&DeviceFilter::All).unwrap();
//! for (id, device) in snapshot.devices {
//!     println!("{id}: {:?} bytes, {} volumes", device.size, device.volumes.len());
//! }
//! ```
//!
//! Captured output can also be parsed directly, which is what the parsers are tested with:
//!
//! ```
//! use bb_filesystem::{DeviceFilter, Platform};
//!
//! let csv = "Caption,Description,DeviceID,DriveType,FileSystem,FreeSpace,Name,Size,VolumeName\n\
//!            C:,Local Fixed Disk,C:,3,NTFS,100,C:,400,System\n";
//! let snapshot = bb_filesystem::parse(Platform::Windows, csv, &DeviceFilter::All).unwrap();
//! assert_eq!(snapshot.devices["C:"].volumes[0].space.used, Some(300));
//! ```

use std::io;

use thiserror::Error;

mod device;
mod filter;
mod merge;
pub mod pal;
mod text;

pub use device::{Device, Devices, Snapshot, Space, Volume, Volumes};
pub use filter::DeviceFilter;
pub use merge::infer_sizes;
pub use pal::Platform;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
/// Errors for this crate
pub enum Error {
    /// Command output did not have the expected structure
    #[error("Failed to parse {platform} {block}: {reason} (line: {line:?})")]
    Parse {
        platform: Platform,
        block: String,
        line: String,
        reason: String,
    },
    #[error("Command `{command}` failed with exit code {status:?}: {stderr}")]
    Execution {
        command: &'static str,
        status: Option<i32>,
        stderr: String,
    },
    #[error("IO Error: {0}")]
    IoError(#[from] io::Error),
    #[error("Unsupported OS: {0}")]
    UnsupportedPlatform(String),
    #[error("Invalid device filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

impl Error {
    pub(crate) fn parse(
        platform: Platform,
        block: impl ToString,
        line: impl ToString,
        reason: impl ToString,
    ) -> Self {
        Self::Parse {
            platform,
            block: block.to_string(),
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Parse captured command output of `platform`.
pub fn parse(platform: Platform, output: &str, filter: &DeviceFilter) -> Result<Snapshot> {
    platform.parse(output, |device, id, all| filter.keep(device, id, all))
}

/// Run the command of the current platform and parse its output, blocking until it exits.
pub fn filesystem_sync(filter: &DeviceFilter) -> Result<Snapshot> {
    let platform = Platform::current()?;
    let output = pal::execute(platform)?;
    parse(platform, &output, filter)
}

/// Run the command of the current platform without blocking the runtime and parse its output.
#[cfg(feature = "tokio")]
pub async fn filesystem(filter: &DeviceFilter) -> Result<Snapshot> {
    let platform = Platform::current()?;
    let output = pal::execute_async(platform).await?;
    parse(platform, &output, filter)
}
