//! Parser for `wmic logicaldisk ... /format:csv`.
//!
//! Every logical disk is reported as its own device carrying exactly one volume, so there is no
//! merge step and no orphan volumes on Windows.

use crate::{
    Error, Result,
    device::{Device, Devices, Snapshot, Space, Volume},
    merge::{apply_filter, infer_sizes},
    pal::Platform,
    text::{non_empty, non_empty_lines, normalize_eol},
};

pub const COMMAND: &str = "wmic logicaldisk get Caption,Description,DeviceID,DriveType,FileSystem,FreeSpace,Name,Size,VolumeName /format:csv";

/// Column order of [COMMAND] when no header row is present.
const COLUMNS: [&str; 9] = [
    "Caption",
    "Description",
    "DeviceID",
    "DriveType",
    "FileSystem",
    "FreeSpace",
    "Name",
    "Size",
    "VolumeName",
];

/// `DriveType` of removable drives.
const REMOVABLE_DISK: &str = "2";

/// Column positions resolved from the header row.
struct Layout {
    width: usize,
    index: [usize; COLUMNS.len()],
}

impl Layout {
    /// Layout of a header row, e.g. `Node,Caption,Description,...`.
    fn from_header(line: &str) -> Result<Self> {
        let names: Vec<&str> = line.split(',').map(str::trim).collect();
        let mut index = [0; COLUMNS.len()];

        for (slot, column) in index.iter_mut().zip(COLUMNS) {
            *slot = names.iter().position(|n| *n == column).ok_or_else(|| {
                Error::parse(
                    Platform::Windows,
                    "header",
                    line,
                    format!("missing column {column}"),
                )
            })?;
        }

        Ok(Self {
            width: names.len(),
            index,
        })
    }

    /// Layout when the output starts directly with data rows. A leading `Node` column is
    /// tolerated.
    fn positional(width: usize) -> Self {
        let offset = usize::from(width == COLUMNS.len() + 1);
        Self {
            width: COLUMNS.len() + offset,
            index: std::array::from_fn(|i| i + offset),
        }
    }

    /// Split a data row. wmic does not quote values, so the last column keeps any commas of a
    /// volume label.
    fn row<'a>(&self, line: &'a str) -> Option<Row<'a>> {
        let fields: Vec<&str> = line.splitn(self.width, ',').map(str::trim).collect();
        if fields.len() != self.width {
            return None;
        }
        Some(Row(self.index.map(|i| fields[i])))
    }
}

struct Row<'a>([&'a str; COLUMNS.len()]);

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> &'a str {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.0[i])
            .unwrap_or_default()
    }

    /// Numeric column. Malformed numbers count as 0.
    fn number(&self, column: &str) -> u64 {
        self.get(column).parse().unwrap_or(0)
    }

    fn into_device(self) -> Device {
        let device_id = self.get("DeviceID");
        let name = self.get("Name");
        let total = self.number("Size");
        let available = self.number("FreeSpace");

        let volume = Volume {
            id: non_empty(device_id),
            node: non_empty(device_id),
            parent: non_empty(device_id),
            name: non_empty(self.get("VolumeName")),
            mounted: Some(true),
            mount_point: non_empty(name),
            fs: non_empty(self.get("FileSystem")),
            space: Space::new(total, available, total.saturating_sub(available)),
            ..Volume::empty()
        };

        Device {
            id: non_empty(device_id),
            node: non_empty(self.get("Caption")),
            whole: true,
            parent: non_empty(device_id),
            name: non_empty(name),
            size: Some(total),
            description: non_empty(self.get("Description")),
            removable: Some(self.get("DriveType") == REMOVABLE_DISK),
            volumes: vec![volume],
            ..Device::empty()
        }
    }
}

/// Parse the output of [COMMAND].
pub fn parse<F>(output: &str, filter: F) -> Result<Snapshot>
where
    F: Fn(&Device, &str, &Devices) -> bool,
{
    let output = normalize_eol(output);
    let mut lines = non_empty_lines(&output).peekable();

    let layout = match lines.peek() {
        Some(line) if line.contains("DeviceID") => {
            let layout = Layout::from_header(line)?;
            lines.next();
            layout
        }
        Some(line) => Layout::positional(line.split(',').count()),
        None => return Ok(Snapshot::default()),
    };

    let mut devices = Devices::new();
    for line in lines {
        let row = layout.row(line).ok_or_else(|| {
            Error::parse(
                Platform::Windows,
                "row",
                line,
                format!("expected {} fields", layout.width),
            )
        })?;
        let key = row.get("Name");
        if key.is_empty() {
            return Err(Error::parse(Platform::Windows, "row", line, "missing Name"));
        }

        devices.insert(key.to_string(), row.into_device());
    }

    infer_sizes(&mut devices);
    tracing::debug!("windows: {} logical disks", devices.len());

    Ok(Snapshot {
        devices: apply_filter(devices, filter),
        ..Snapshot::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cd_rom_row() {
        let snapshot = parse(
            "D:,CD-ROM Disc,D:,3,CDFS,0,D:,445445,VolName",
            |_, _, _| true,
        )
        .unwrap();

        let disk = &snapshot.devices["D:"];
        assert_eq!(disk.size, Some(445445));
        assert_eq!(disk.removable, Some(false));
        assert_eq!(disk.volumes.len(), 1);

        let volume = &disk.volumes[0];
        assert_eq!(volume.space.used, Some(445445));
        assert_eq!(volume.space.available, Some(0));
        assert_eq!(volume.fs.as_deref(), Some("CDFS"));
        assert_eq!(volume.name.as_deref(), Some("VolName"));
        assert_eq!(volume.mount_point.as_deref(), Some("D:"));
        assert!(snapshot.orphans.is_empty());
    }

    #[test]
    fn csv_with_node_column() {
        let output = "\r\r\n\
Node,Caption,Description,DeviceID,DriveType,FileSystem,FreeSpace,Name,Size,VolumeName\r\r\n\
PC,C:,Local Fixed Disk,C:,3,NTFS,20000,C:,50000,Windows\r\r\n\
PC,E:,Removable Disk,E:,2,FAT32,,E:,,\r\r\n";
        let snapshot = parse(output, |_, _, _| true).unwrap();

        assert_eq!(
            snapshot.devices.keys().collect::<Vec<_>>(),
            ["C:", "E:"]
        );
        let c = &snapshot.devices["C:"];
        assert_eq!(c.description.as_deref(), Some("Local Fixed Disk"));
        assert_eq!(c.volumes[0].space.used, Some(30000));

        let e = &snapshot.devices["E:"];
        assert_eq!(e.removable, Some(true));
        assert_eq!(e.size, Some(0));
        assert_eq!(e.volumes[0].name, None);
        assert_eq!(e.volumes[0].space, Space::new(0, 0, 0));
    }

    #[test]
    fn malformed_row_is_an_error() {
        let output = "\
Caption,Description,DeviceID,DriveType,FileSystem,FreeSpace,Name,Size,VolumeName
C:,Local Fixed Disk,C:,3,NTFS,100,C:,400,System
garbage
";
        match parse(output, |_, _, _| true) {
            Err(Error::Parse { block, line, .. }) => {
                assert_eq!(block, "row");
                assert_eq!(line, "garbage");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn volume_label_with_commas() {
        let output = "\
Node,Caption,Description,DeviceID,DriveType,FileSystem,FreeSpace,Name,Size,VolumeName
PC,C:,Local Fixed Disk,C:,3,NTFS,100,C:,400,Backup, Photos
";
        let snapshot = parse(output, |_, _, _| true).unwrap();
        let c = &snapshot.devices["C:"];
        assert_eq!(c.volumes[0].name.as_deref(), Some("Backup, Photos"));
        assert_eq!(c.volumes[0].space.used, Some(300));
    }

    #[test]
    fn missing_column_is_an_error() {
        let output = "Caption,DeviceID,Name\nC:,C:,C:\n";
        assert!(matches!(
            parse(output, |_, _, _| true),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn filtered_by_drive_letter() {
        let output = "\
C:,Local Fixed Disk,C:,3,NTFS,100,C:,400,System
E:,Removable Disk,E:,2,FAT32,10,E:,20,Stick
";
        let snapshot = parse(output, |d, _, _| d.removable == Some(true)).unwrap();
        assert_eq!(snapshot.devices.keys().collect::<Vec<_>>(), ["E:"]);
    }
}
