//! Parser for `diskutil info -all`.
//!
//! diskutil prints one block of `Key: Value` lines per disk and per partition, with blocks
//! separated by a line of `*`. A block whose identifier is its own whole disk describes a
//! [Device], anything else describes a [Volume] living on that disk.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    Error, Result,
    device::{Device, Devices, Snapshot, Volume},
    merge::Accumulator,
    pal::Platform,
    text::{has_substr, leading_int, non_empty_lines, normalize_eol, split_blocks, yes_no},
};

pub const COMMAND: &str = "diskutil info -all";

static BYTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+) Bytes\)").unwrap());

/// Keys of the diskutil output that end up in the model. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DeviceIdentifier,
    DeviceNode,
    Whole,
    PartOfWhole,
    MediaName,
    VolumeName,
    Mounted,
    MountPoint,
    FileSystemPersonality,
    PartitionType,
    Protocol,
    DiskSize,
    DeviceBlockSize,
    VolumeTotalSpace,
    VolumeUsedSpace,
    VolumeAvailableSpace,
    AllocationBlockSize,
    ReadOnlyMedia,
    ReadOnlyVolume,
    RemovableMedia,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        let field = match key {
            "Device Identifier" => Self::DeviceIdentifier,
            "Device Node" => Self::DeviceNode,
            "Whole" => Self::Whole,
            "Part of Whole" => Self::PartOfWhole,
            "Device / Media Name" => Self::MediaName,
            "Volume Name" => Self::VolumeName,
            "Mounted" => Self::Mounted,
            "Mount Point" => Self::MountPoint,
            "File System Personality" => Self::FileSystemPersonality,
            "Partition Type" => Self::PartitionType,
            "Protocol" => Self::Protocol,
            "Disk Size" | "Total Size" => Self::DiskSize,
            "Device Block Size" => Self::DeviceBlockSize,
            "Volume Total Space" => Self::VolumeTotalSpace,
            "Volume Used Space" => Self::VolumeUsedSpace,
            "Volume Available Space" | "Volume Free Space" => Self::VolumeAvailableSpace,
            "Allocation Block Size" => Self::AllocationBlockSize,
            "Read-Only Media" => Self::ReadOnlyMedia,
            "Read-Only Volume" => Self::ReadOnlyVolume,
            "Removable Media" => Self::RemovableMedia,
            _ => return None,
        };
        Some(field)
    }
}

/// Normalized filesystem tag for a diskutil filesystem personality.
pub fn filesystem(personality: &str) -> Option<&'static str> {
    match personality {
        "ExFAT" => Some("ExFAT"),
        "MS-DOS" => Some("FAT"),
        "MS-DOS FAT12" => Some("FAT12"),
        "MS-DOS FAT16" => Some("FAT16"),
        "MS-DOS FAT32" | "fat32" => Some("FAT32"),
        "HFS+"
        | "Case-sensitive HFS+"
        | "hfsx"
        | "Case-sensitive Journaled HFS+"
        | "jhfsx"
        | "Journaled HFS+"
        | "jhfs+" => Some("HFS+"),
        // "Free Space" and "free" included
        _ => None,
    }
}

/// Byte count of a size such as `121.3 GB (121332826112 Bytes) (exactly 236978176 512-Byte-Units)`.
pub fn bytes(value: &str) -> Option<u64> {
    BYTES.captures(value)?.get(1)?.as_str().parse().ok()
}

/// `Key: Value` split of a diskutil line. A key with nothing after the colon has an empty value.
fn key_value(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if let Some(key) = line.strip_suffix(':') {
        return Some((key.trim(), ""));
    }
    line.split_once(": ")
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn not_applicable(value: &str) -> Option<String> {
    if value.is_empty() || has_substr(value, "Not applicable") {
        None
    } else {
        Some(value.to_string())
    }
}

/// One diskutil block, split into its known fields.
struct Entry<'a> {
    index: usize,
    fields: Vec<(Field, &'a str, &'a str)>,
}

impl<'a> Entry<'a> {
    fn new(index: usize, block: &'a str) -> Self {
        let fields = non_empty_lines(block)
            .filter_map(key_value)
            .filter_map(|(key, value)| match Field::from_key(key) {
                Some(field) => Some((field, key, value)),
                None => {
                    tracing::trace!("Ignoring diskutil key {key:?}");
                    None
                }
            })
            .collect();

        Self { index, fields }
    }

    fn get(&self, field: Field) -> Option<&'a str> {
        self.fields
            .iter()
            .find(|(f, _, _)| *f == field)
            .map(|(_, _, value)| *value)
    }

    fn require(&self, field: Field, key: &str) -> Result<&'a str> {
        self.get(field)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.error("", format!("missing {key:?}")))
    }

    fn error(&self, line: &str, reason: impl ToString) -> Error {
        Error::parse(Platform::MacOs, format!("entry {}", self.index), line, reason)
    }

    fn bytes(&self, key: &str, value: &str) -> Result<u64> {
        bytes(value).ok_or_else(|| self.error(format!("{key}: {value}").as_str(), "no byte count"))
    }

    fn block_size(&self, key: &str, value: &str) -> Result<u32> {
        leading_int(value)
            .and_then(|x| u32::try_from(x).ok())
            .ok_or_else(|| self.error(format!("{key}: {value}").as_str(), "no block size"))
    }

    fn apply_device(&self, device: &mut Device) -> Result<()> {
        for &(field, key, value) in &self.fields {
            match field {
                Field::DeviceIdentifier => {
                    device.id = Some(value.to_string());
                    device.name.get_or_insert_with(|| value.to_string());
                }
                Field::DeviceNode => device.node = Some(value.to_string()),
                Field::Whole => device.whole = yes_no(value).unwrap_or(false),
                Field::PartOfWhole => device.parent = Some(value.to_string()),
                Field::MediaName => device.description = Some(value.to_string()),
                Field::Protocol => device.protocol = Some(value.to_string()),
                Field::DiskSize => device.size = Some(self.bytes(key, value)?),
                Field::DeviceBlockSize => device.block_size = Some(self.block_size(key, value)?),
                Field::ReadOnlyMedia => device.read_only = yes_no(value),
                Field::RemovableMedia => device.removable = Some(value != "Fixed"),
                _ => tracing::trace!("Ignoring volume key {key:?} on whole disk"),
            }
        }
        Ok(())
    }

    fn apply_volume(&self, volume: &mut Volume) -> Result<()> {
        for &(field, key, value) in &self.fields {
            match field {
                Field::DeviceIdentifier => volume.id = Some(value.to_string()),
                Field::DeviceNode => volume.node = Some(value.to_string()),
                Field::PartOfWhole => volume.parent = Some(value.to_string()),
                Field::VolumeName => volume.name = not_applicable(value),
                Field::Mounted => volume.mounted = yes_no(value),
                Field::MountPoint => volume.mount_point = not_applicable(value),
                Field::FileSystemPersonality => volume.fs = filesystem(value).map(str::to_string),
                Field::PartitionType => volume.partition_type = Some(value.to_string()),
                Field::MediaName => volume.description = Some(value.to_string()),
                Field::VolumeTotalSpace => volume.space.total = Some(self.bytes(key, value)?),
                Field::VolumeUsedSpace => volume.space.used = Some(self.bytes(key, value)?),
                Field::VolumeAvailableSpace => {
                    volume.space.available = Some(self.bytes(key, value)?)
                }
                Field::AllocationBlockSize => {
                    volume.block_size = Some(self.block_size(key, value)?)
                }
                Field::ReadOnlyVolume => volume.read_only = yes_no(value),
                _ => tracing::trace!("Ignoring disk key {key:?} on volume"),
            }
        }
        Ok(())
    }
}

fn parse_entry(acc: &mut Accumulator, entry: &Entry) -> Result<()> {
    let id = entry.require(Field::DeviceIdentifier, "Device Identifier")?;
    entry.require(Field::DeviceNode, "Device Node")?;

    let whole_disk = entry
        .get(Field::PartOfWhole)
        .filter(|x| !x.is_empty())
        .unwrap_or(id);
    let is_volume = whole_disk != id || entry.get(Field::Whole).and_then(yes_no) == Some(false);

    if is_volume {
        let volume = acc.volumes.entry(id.to_string()).or_insert_with(Volume::empty);
        entry.apply_volume(volume)
    } else {
        let device = acc.devices.entry(id.to_string()).or_insert_with(Device::empty);
        entry.apply_device(device)
    }
}

/// Parse the output of [COMMAND].
pub fn parse<F>(output: &str, filter: F) -> Result<Snapshot>
where
    F: Fn(&Device, &str, &Devices) -> bool,
{
    let output = normalize_eol(output);
    let mut acc = Accumulator::default();

    for (index, block) in split_blocks(&output)
        .into_iter()
        .filter(|block| !block.trim().is_empty())
        .enumerate()
    {
        parse_entry(&mut acc, &Entry::new(index, block))?;
    }

    tracing::debug!(
        "diskutil: {} disks, {} volumes",
        acc.devices.len(),
        acc.volumes.len()
    );

    Ok(acc.finish(filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISK0: &str = "
   Device Identifier:        disk0
   Device Node:              /dev/disk0
   Whole:                    Yes
   Part of Whole:            disk0
   Device / Media Name:      APPLE HDD ST2000DM999

   Volume Name:              Not applicable (no file system)
   Mounted:                  Not applicable (no file system)

   Protocol:                 SATA
   Disk Size:                2.0 TB (2000398934016 Bytes) (exactly 3907029168 512-Byte-Units)
   Device Block Size:        512 Bytes
   Read-Only Media:          No
   Removable Media:          Fixed
";

    const DISK0S1: &str = "
   Device Identifier:        disk0s1
   Device Node:              /dev/disk0s1
   Whole:                    No
   Part of Whole:            disk0

   Volume Name:              EFI
   Mounted:                  Yes
   Mount Point:              /Volumes/EFI

   Partition Type:           EFI
   File System Personality:  MS-DOS FAT32

   Disk Size:                209.7 MB (209715200 Bytes) (exactly 409600 512-Byte-Units)
   Volume Total Space:       209.7 MB (209715200 Bytes) (exactly 409600 512-Byte-Units)
   Volume Used Space:        209.7 MB (209715200 Bytes) (exactly 409600 512-Byte-Units)
   Volume Available Space:   0 B (0 Bytes) (exactly 0 512-Byte-Units)
   Allocation Block Size:    4096 Bytes

   Read-Only Volume:         No
";

    fn join(blocks: &[&str]) -> String {
        blocks.join("\n**********\n\n")
    }

    #[test]
    fn byte_counts() {
        assert_eq!(
            bytes("121.3 GB (121332826112 Bytes) (exactly 236978176 512-Byte-Units)"),
            Some(121332826112)
        );
        assert_eq!(bytes("121.3 GB"), None);
    }

    #[test]
    fn filesystem_tags() {
        assert_eq!(filesystem("ExFAT"), Some("ExFAT"));
        assert_eq!(filesystem("MS-DOS"), Some("FAT"));
        assert_eq!(filesystem("MS-DOS FAT12"), Some("FAT12"));
        assert_eq!(filesystem("MS-DOS FAT16"), Some("FAT16"));
        assert_eq!(filesystem("MS-DOS FAT32"), Some("FAT32"));
        assert_eq!(filesystem("fat32"), Some("FAT32"));
        for hfs in ["HFS+", "Case-sensitive HFS+", "hfsx", "Journaled HFS+", "jhfs+", "jhfsx"] {
            assert_eq!(filesystem(hfs), Some("HFS+"));
        }
        for other in ["Free Space", "free", "random", "ext4", "vfat"] {
            assert_eq!(filesystem(other), None);
        }
    }

    #[test]
    fn key_value_lines() {
        assert_eq!(
            key_value("   Device / Media Name:      APPLE SSD"),
            Some(("Device / Media Name", "APPLE SSD"))
        );
        assert_eq!(
            key_value("   Mount Point:              /Volumes/A: B"),
            Some(("Mount Point", "/Volumes/A: B"))
        );
        assert_eq!(key_value("   Mount Point:"), Some(("Mount Point", "")));
        assert_eq!(key_value("**********"), None);
    }

    #[test]
    fn whole_disk_and_partition() {
        let snapshot = parse(&join(&[DISK0, DISK0S1]), |_, _, _| true).unwrap();

        assert_eq!(snapshot.devices.len(), 1);
        let disk = &snapshot.devices["disk0"];
        assert_eq!(disk.node.as_deref(), Some("/dev/disk0"));
        assert!(disk.whole);
        assert_eq!(disk.size, Some(2000398934016));
        assert_eq!(disk.block_size, Some(512));
        assert_eq!(disk.protocol.as_deref(), Some("SATA"));
        assert_eq!(disk.description.as_deref(), Some("APPLE HDD ST2000DM999"));
        assert_eq!(disk.removable, Some(false));
        assert_eq!(disk.read_only, Some(false));

        assert_eq!(disk.volumes.len(), 1);
        let volume = &disk.volumes[0];
        assert_eq!(volume.id.as_deref(), Some("disk0s1"));
        assert_eq!(volume.parent.as_deref(), Some("disk0"));
        assert_eq!(volume.name.as_deref(), Some("EFI"));
        assert_eq!(volume.fs.as_deref(), Some("FAT32"));
        assert_eq!(volume.partition_type.as_deref(), Some("EFI"));
        assert_eq!(volume.mounted, Some(true));
        assert_eq!(volume.mount_point.as_deref(), Some("/Volumes/EFI"));
        assert_eq!(volume.block_size, Some(4096));
        assert_eq!(volume.read_only, Some(false));
        assert_eq!(volume.space.total, Some(209715200));
        assert_eq!(volume.space.used, Some(209715200));
        assert_eq!(volume.space.available, Some(0));
    }

    #[test]
    fn not_applicable_values() {
        let block = "
   Device Identifier:        disk0s2
   Device Node:              /dev/disk0s2
   Whole:                    No
   Part of Whole:            disk0
   Volume Name:              Not applicable (no file system)
   Mount Point:              Not applicable (not mounted)
   Read-Only Volume:         Not applicable (not mounted)
   File System Personality:  Free Space
";
        let snapshot = parse(&join(&[DISK0, block]), |_, _, _| true).unwrap();
        let volume = &snapshot.devices["disk0"].volumes[0];
        assert_eq!(volume.name, None);
        assert_eq!(volume.mount_point, None);
        assert_eq!(volume.read_only, None);
        assert_eq!(volume.fs, None);
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let block = "
   Device Node:              /dev/disk3
   Whole:                    Yes
";
        let err = parse(&join(&[DISK0, block]), |_, _, _| true).unwrap_err();
        match err {
            Error::Parse { block, reason, .. } => {
                assert_eq!(block, "entry 1");
                assert!(reason.contains("Device Identifier"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_size_is_an_error() {
        let block = DISK0.replace("(2000398934016 Bytes)", "");
        assert!(matches!(
            parse(&block, |_, _, _| true),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let block = format!("{DISK0}   SMART Status:             Verified\n   Solid State:              No\n");
        let snapshot = parse(&block, |_, _, _| true).unwrap();
        assert_eq!(snapshot.devices["disk0"].size, Some(2000398934016));
    }
}
