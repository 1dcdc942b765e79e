//! Parser for the combined output of `df -T`, `fdisk -l` and `lsblk -P`.
//!
//! The three sections are parsed strictly in that order: df creates the mounted volumes with
//! their usage, fdisk adds the disks and the partition tables, and lsblk fills in flags, labels
//! and unmounted filesystems on records the earlier stages may already have created.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

use crate::{
    Error, Result,
    device::{Device, Devices, Snapshot, Space, Volume},
    merge::Accumulator,
    pal::Platform,
    text::{flag, non_empty, non_empty_lines, normalize_eol, node_id, split_blocks, split_eol_n},
};

pub const COMMAND: &str = concat!(
    "df -T && ",
    "echo \"\" && echo \"**********\" && echo \"\" && ",
    "fdisk -l && ",
    "echo \"\" && echo \"**********\" && echo \"\" && ",
    "lsblk -o kname,fstype,mountpoint,label,ro,rm,model,type -P"
);

/// df reports sizes in 1K blocks
const DF_BLOCK: u64 = 1024;

/// In-memory filesystems that df lists but that live on no block device.
const DF_SKIPPED_TYPES: [&str; 2] = ["tmpfs", "devtmpfs"];

static FDISK_DISK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Disk\s(.*):\s.*,\s(\d+)\sbytes,\s(\d+)\ssectors").unwrap()
});
static FDISK_SECTOR_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Sector size.*:\s(\d+)\sbytes\s/\s(\d+)\sbytes").unwrap()
});
static FDISK_PARTITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(?:\*\s+)?(\d+)\s+(\d+)\s+(\d+)\s+(\S+)\s+(.+)$").unwrap()
});
/// DOS tables carry an extra `Id` column before the type
static FDISK_PARTITION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(?:\*\s+)?(\d+)\s+(\d+)\s+(\d+)\s+(\S+)\s+([0-9a-fA-F]{1,2})\s+(.+)$")
        .unwrap()
});
static LSBLK_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Z:-]+)="([^"]*)""#).unwrap());

/// Normalized filesystem tag for a Linux filesystem type.
pub fn filesystem(fs: &str) -> String {
    match fs {
        "vfat" => "FAT32".to_string(),
        _ => fs.to_string(),
    }
}

fn error(block: &str, line: &str, reason: impl ToString) -> Error {
    Error::parse(Platform::Linux, block, line, reason)
}

fn number(block: &str, line: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| error(block, line, format!("{value:?} is not a number")))
}

/// Split a df row on whitespace. A field ending in `\` is an escaped space and continues into
/// the next one.
pub fn split_df_line(line: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();

    for field in line.split_whitespace() {
        match fields.last_mut() {
            Some(last) if last.ends_with('\\') => {
                last.pop();
                last.push(' ');
                last.push_str(field);
            }
            _ => fields.push(field.to_string()),
        }
    }

    fields
}

/// Mounted filesystems with their usage.
fn parse_df(mut acc: Accumulator, text: &str) -> Result<Accumulator> {
    let mut lines = non_empty_lines(text);

    match lines.next() {
        Some(header) if header.trim_start().starts_with("Filesystem") => {}
        Some(line) => return Err(error("df", line, "missing table header")),
        None => return Err(error("df", "", "empty output")),
    }

    for line in lines {
        let fields = split_df_line(line);
        let [node, fs, size, used, available, _, mount_point @ ..] = fields.as_slice() else {
            return Err(error("df", line, "expected 7 columns"));
        };
        if mount_point.is_empty() {
            return Err(error("df", line, "expected 7 columns"));
        }
        if DF_SKIPPED_TYPES.contains(&fs.as_str()) {
            continue;
        }

        let id = node_id(node);
        let mut volume = Volume::partition(id, Some(node.clone()));
        volume.mounted = Some(true);
        volume.mount_point = Some(mount_point.join(" "));
        volume.fs = Some(filesystem(fs));
        volume.space = Space::scaled(
            number("df", line, size)?,
            number("df", line, available)?,
            number("df", line, used)?,
            DF_BLOCK,
        )
        .ok_or_else(|| error("df", line, "size out of range"))?;

        acc.volumes.insert(id.to_string(), volume);
    }

    Ok(acc)
}

fn parse_fdisk_disk(acc: &mut Accumulator, lines: &[&str]) -> Result<()> {
    let Some(pos) = lines.iter().position(|l| l.starts_with("Disk /")) else {
        return Err(error("fdisk disk header", lines[0], "missing disk line"));
    };
    let head = lines[pos];
    let caps = FDISK_DISK
        .captures(head)
        .ok_or_else(|| error("fdisk disk header", head, "expected size and sectors"))?;

    let node = &caps[1];
    let size = number("fdisk disk header", head, &caps[2])?;
    let sectors = number("fdisk disk header", head, &caps[3])?;
    let id = node_id(node).to_string();
    tracing::debug!("fdisk: {node} has {size} bytes in {sectors} sectors");

    let device = acc
        .devices
        .entry(id.clone())
        .or_insert_with(|| Device::whole_disk(&id, Some(node.to_string())));
    device.size = Some(size);

    for line in &lines[pos + 1..] {
        if !line.starts_with("Sector") {
            continue;
        }
        let caps = FDISK_SECTOR_SIZE
            .captures(line)
            .ok_or_else(|| error("fdisk disk header", line, "expected sector sizes"))?;
        let logical = number("fdisk disk header", line, &caps[1])?;
        let physical = number("fdisk disk header", line, &caps[2])?;
        let (Ok(logical), Ok(physical)) = (u32::try_from(logical), u32::try_from(physical)) else {
            return Err(error("fdisk disk header", line, "sector size out of range"));
        };

        device.block_size = Some(physical);
        if logical != physical {
            acc.logical_block_sizes.insert(id.clone(), logical);
        }
    }

    Ok(())
}

fn parse_fdisk_partitions(acc: &mut Accumulator, lines: &[&str]) -> Result<()> {
    let header = lines[0];
    if !header.trim_start().starts_with("Device") {
        tracing::debug!("fdisk: skipping notice {header:?}");
        return Ok(());
    }
    let with_id = header.split_whitespace().any(|c| c == "Id");
    let row = if with_id {
        &*FDISK_PARTITION_ID
    } else {
        &*FDISK_PARTITION
    };

    for line in &lines[1..] {
        let caps = row
            .captures(line.trim())
            .ok_or_else(|| error("fdisk partition table", line, "unexpected row"))?;
        let node = &caps[1];
        let sectors = number("fdisk partition table", line, &caps[4])?;
        let kind = caps[caps.len() - 1].trim().to_string();
        let id = node_id(node).to_string();

        let volume = acc
            .volumes
            .entry(id.clone())
            .or_insert_with(|| Volume::partition(&id, Some(node.to_string())));
        volume.blocks = Some(sectors);
        volume.partition_type = Some(if with_id {
            caps[6].to_string()
        } else {
            kind.clone()
        });
        volume.description = Some(kind);
    }

    Ok(())
}

/// Disks, their sector sizes and their partition tables.
///
/// Blocks are separated by a blank line. A disk header block starts with `Disk ` and may be
/// followed by its partition table block; disks without a partition table have none.
fn parse_fdisk(mut acc: Accumulator, text: &str) -> Result<Accumulator> {
    for block in split_eol_n(text, 2) {
        let lines: Vec<&str> = non_empty_lines(block).collect();
        if lines.is_empty() {
            continue;
        }

        if lines.iter().any(|l| l.starts_with("Disk /")) {
            parse_fdisk_disk(&mut acc, &lines)?;
        } else {
            parse_fdisk_partitions(&mut acc, &lines)?;
        }
    }

    Ok(acc)
}

/// Undo the `\xNN` escapes lsblk uses for spaces and quotes.
fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            let decoded = value
                .get(i + 2..i + 4)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Flags, labels and filesystems of every block device.
fn parse_lsblk(mut acc: Accumulator, text: &str) -> Result<Accumulator> {
    for line in non_empty_lines(text) {
        let row: HashMap<&str, String> = LSBLK_PAIR
            .captures_iter(line)
            .map(|c| {
                let (_, [key, value]) = c.extract();
                (key, unescape(value))
            })
            .collect();
        let column = |key: &str| row.get(key).map(String::as_str).unwrap_or_default();

        let id = column("KNAME");
        let kind = column("TYPE");
        if id.is_empty() || kind.is_empty() {
            return Err(error("lsblk", line, "missing KNAME or TYPE"));
        }
        let id = node_id(id).to_string();
        let read_only = flag(column("RO"));
        let label = non_empty(column("LABEL"));

        if kind == "disk" {
            let device = acc
                .devices
                .entry(id.clone())
                .or_insert_with(|| Device::whole_disk(&id, None));
            device.read_only = Some(read_only);
            device.removable = Some(flag(column("RM")));
            if device.description.is_none() {
                device.description = label.or_else(|| non_empty(column("MODEL")));
            }
        } else {
            let volume = acc
                .volumes
                .entry(id.clone())
                .or_insert_with(|| Volume::partition(&id, None));
            volume.read_only = Some(read_only);
            if let Some(fs) = non_empty(column("FSTYPE")) {
                volume.fs = Some(filesystem(&fs));
            }
            if let Some(mount_point) = non_empty(column("MOUNTPOINT")) {
                volume.mount_point = Some(mount_point);
                volume.mounted = Some(true);
            } else if volume.mounted.is_none() {
                volume.mounted = Some(false);
            }
            if volume.description.is_none() {
                volume.description = label;
            }
        }
    }

    Ok(acc)
}

/// Parse the output of [COMMAND].
pub fn parse<F>(output: &str, filter: F) -> Result<Snapshot>
where
    F: Fn(&Device, &str, &Devices) -> bool,
{
    let output = normalize_eol(output);
    let sections = split_blocks(&output);
    let [df, fdisk, lsblk] = sections[..] else {
        return Err(error("output", "", "expected df, fdisk and lsblk sections"));
    };

    let acc = parse_df(Accumulator::default(), df)?;
    let acc = parse_fdisk(acc, fdisk)?;
    let acc = parse_lsblk(acc, lsblk)?;

    tracing::debug!(
        "linux: {} disks, {} volumes",
        acc.devices.len(),
        acc.volumes.len()
    );

    Ok(acc.finish(filter))
}
