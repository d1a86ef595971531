//! Expands shared and persistent volume declarations into per-machine
//! storage device descriptors.
//!
//! Device names carry a fixed prefix (`sv-` for shared volumes, `pd-` for
//! persistent data) so generated devices can never collide with devices an
//! operator declares by hand.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::document::{Document, Volume};
use crate::errors::ResolutionError;

pub const SHARED_PREFIX: &str = "sv-";
pub const PERSISTENT_PREFIX: &str = "pd-";

/// One storage device attached to one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// `sv-<volume>` or `pd-<volume>`.
    pub device: String,
    pub source: PathBuf,
    pub mount: PathBuf,
    pub readonly: bool,
    pub shift_owner: bool,
}

/// Expands both volume maps. Returns per-machine device lists sorted by
/// device name, or every collision found.
pub fn expand_volumes(
    doc: &Document,
) -> Result<BTreeMap<String, Vec<DeviceSpec>>, Vec<ResolutionError>> {
    let mut errors = Vec::new();

    // The two maps share one namespace once prefixed, but a name used in
    // both sections is still rejected so orphan reports stay unambiguous.
    for name in doc.shared_volumes.keys() {
        if doc.persistent_data.contains_key(name) {
            errors.push(ResolutionError(format!(
                "volume name '{name}' is declared under both shared_volumes and persistent_data"
            )));
        }
    }

    let mut devices: BTreeMap<String, Vec<DeviceSpec>> = BTreeMap::new();
    expand_section(doc, &doc.shared_volumes, SHARED_PREFIX, &mut devices, &mut errors);
    expand_section(doc, &doc.persistent_data, PERSISTENT_PREFIX, &mut devices, &mut errors);

    for (machine_name, machine_devices) in &mut devices {
        machine_devices.sort_by(|a, b| a.device.cmp(&b.device));

        let mut mounts: BTreeMap<&PathBuf, &str> = BTreeMap::new();
        for spec in machine_devices.iter() {
            if let Some(other) = mounts.insert(&spec.mount, spec.device.as_str()) {
                errors.push(ResolutionError(format!(
                    "machine '{machine_name}': devices '{other}' and '{}' both mount at '{}'",
                    spec.device,
                    spec.mount.display()
                )));
            }
        }
    }

    if errors.is_empty() {
        Ok(devices)
    } else {
        Err(errors)
    }
}

fn expand_section(
    doc: &Document,
    volumes: &BTreeMap<String, Volume>,
    prefix: &str,
    devices: &mut BTreeMap<String, Vec<DeviceSpec>>,
    errors: &mut Vec<ResolutionError>,
) {
    for (volume_name, volume) in volumes {
        for consumer in &volume.consumers {
            let Some(domain) = doc.domains.get(&consumer.domain) else {
                errors.push(ResolutionError(format!(
                    "volume '{volume_name}': unknown consumer domain '{}'",
                    consumer.domain
                )));
                continue;
            };

            for machine_name in domain.machines.keys() {
                devices
                    .entry(machine_name.clone())
                    .or_default()
                    .push(DeviceSpec {
                        device: format!("{prefix}{volume_name}"),
                        source: volume.source.clone(),
                        mount: consumer.mount.clone(),
                        readonly: consumer.readonly,
                        shift_owner: consumer.shift_owner,
                    });
            }
        }
    }
}
