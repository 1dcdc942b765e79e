use indexmap::IndexMap;
use serde::Serialize;

/// Devices keyed by their platform identifier, in discovery order.
pub type Devices = IndexMap<String, Device>;

/// Volumes keyed by their platform identifier, in discovery order.
pub type Volumes = IndexMap<String, Volume>;

/// Space accounting of a volume, in bytes.
///
/// Either all three values are known or none of them are.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Space {
    pub total: Option<u64>,
    pub available: Option<u64>,
    pub used: Option<u64>,
}

impl Space {
    pub const fn new(total: u64, available: u64, used: u64) -> Self {
        Self {
            total: Some(total),
            available: Some(available),
            used: Some(used),
        }
    }

    /// Space reported in blocks of `unit` bytes. `None` when a value does not fit in bytes.
    pub fn scaled(total: u64, available: u64, used: u64, unit: u64) -> Option<Self> {
        Some(Self::new(
            total.checked_mul(unit)?,
            available.checked_mul(unit)?,
            used.checked_mul(unit)?,
        ))
    }

    pub const fn is_known(&self) -> bool {
        self.total.is_some() && self.available.is_some() && self.used.is_some()
    }

    /// Fill in the missing value when two out of three are known, otherwise forget the partial
    /// information.
    pub(crate) fn complete(&mut self) {
        *self = match (self.total, self.available, self.used) {
            (Some(t), Some(a), Some(u)) => Self::new(t, a, u),
            (Some(t), Some(a), None) => Self::new(t, a, t.saturating_sub(a)),
            (Some(t), None, Some(u)) => Self::new(t, t.saturating_sub(u), u),
            (None, Some(a), Some(u)) => match a.checked_add(u) {
                Some(t) => Self::new(t, a, u),
                None => Self::default(),
            },
            _ => Self::default(),
        }
    }
}

/// A mounted or mountable partition / filesystem.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: Option<String>,
    pub node: Option<String>,
    /// Identifier of the whole disk this volume lives on
    pub parent: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub partition_type: Option<String>,
    pub block_size: Option<u32>,
    /// Number of sectors / blocks
    pub blocks: Option<u64>,
    /// Volume is read-only
    pub read_only: Option<bool>,
    /// Volume is mounted
    pub mounted: Option<bool>,
    pub mount_point: Option<String>,
    /// Normalized filesystem tag
    pub fs: Option<String>,
    pub space: Space,
}

impl Volume {
    /// Zero-valued volume.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Volume named after its identifier, as the Linux tools report them.
    pub fn partition(id: impl ToString, node: Option<String>) -> Self {
        let id = id.to_string();
        Self {
            node: Some(node.unwrap_or_else(|| format!("/dev/{id}"))),
            name: Some(id.clone()),
            id: Some(id),
            ..Default::default()
        }
    }
}

/// A physical or logical disk.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Option<String>,
    pub node: Option<String>,
    /// Device is the entire disk, not a partition
    pub whole: bool,
    /// Identifier of the whole disk this device belongs to (or itself)
    pub parent: Option<String>,
    pub name: Option<String>,
    /// Total capacity in bytes
    pub size: Option<u64>,
    pub description: Option<String>,
    /// Transport protocol. Only reported on MacOS
    pub protocol: Option<String>,
    pub block_size: Option<u32>,
    /// Device is read-only
    pub read_only: Option<bool>,
    /// Device is removable from the running system
    pub removable: Option<bool>,
    pub volumes: Vec<Volume>,
}

impl Device {
    /// Zero-valued device.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whole disk named after its identifier, as the Linux tools report them.
    pub fn whole_disk(id: impl ToString, node: Option<String>) -> Self {
        let id = id.to_string();
        Self {
            node: Some(node.unwrap_or_else(|| format!("/dev/{id}"))),
            name: Some(id.clone()),
            parent: Some(id.clone()),
            id: Some(id),
            whole: true,
            ..Default::default()
        }
    }
}

/// Result of a single parse pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub devices: Devices,
    /// Volumes that could not be attributed to any device. Always empty on Windows.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub orphans: Volumes,
}
