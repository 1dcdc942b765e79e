use std::collections::HashMap;

use crate::device::{Device, Devices, Snapshot, Volumes};

/// Records collected by a parse pass before volumes are attached to their devices.
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    pub(crate) devices: Devices,
    pub(crate) volumes: Volumes,
    /// Logical sector size of a device, when it differs from the physical one. Overrides the
    /// block size of every volume attached to that device.
    pub(crate) logical_block_sizes: HashMap<String, u32>,
}

impl Accumulator {
    /// Attach volumes, infer missing sizes and apply the user filter.
    pub(crate) fn finish<F>(self, filter: F) -> Snapshot
    where
        F: Fn(&Device, &str, &Devices) -> bool,
    {
        let (mut devices, orphans) = self.merge();
        infer_sizes(&mut devices);
        Snapshot {
            devices: apply_filter(devices, filter),
            orphans,
        }
    }

    /// Give every device the volumes whose identifier starts with the device identifier. The
    /// longest matching identifier wins, so `disk10s1` goes to `disk10` and not `disk1`.
    fn merge(self) -> (Devices, Volumes) {
        let Self {
            mut devices,
            volumes,
            logical_block_sizes,
        } = self;
        let mut orphans = Volumes::new();

        for (id, mut volume) in volumes {
            volume.space.complete();

            let owner = devices
                .keys()
                .filter(|key| id.starts_with(key.as_str()))
                .max_by_key(|key| key.len())
                .cloned();

            let Some(owner) = owner else {
                tracing::debug!("Volume {id} does not belong to any device");
                orphans.insert(id, volume);
                continue;
            };

            if let Some(block_size) = logical_block_sizes.get(&owner) {
                volume.block_size = Some(*block_size);
            }
            if volume.parent.is_none() {
                volume.parent = Some(owner.clone());
            }
            if let Some(device) = devices.get_mut(&owner) {
                device.volumes.push(volume);
            }
        }

        (devices, orphans)
    }
}

/// Fill every unknown device size with the total space of its volumes.
pub fn infer_sizes(devices: &mut Devices) {
    for device in devices.values_mut() {
        if device.size.is_none() {
            device.size = Some(
                device
                    .volumes
                    .iter()
                    .map(|v| v.space.total.unwrap_or(0))
                    .sum(),
            );
        }
    }
}

/// Keep only the devices accepted by `filter`. Volumes go with their device.
pub(crate) fn apply_filter<F>(devices: Devices, filter: F) -> Devices
where
    F: Fn(&Device, &str, &Devices) -> bool,
{
    let keep: Vec<bool> = devices
        .iter()
        .map(|(id, device)| filter(device, id, &devices))
        .collect();

    devices
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}
