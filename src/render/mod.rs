//! Pure rendering of the output file tree.
//!
//! Rendering maps the resolved model (document + allocation + budgets +
//! resolution) to the managed payload of every logical output file. It
//! touches no filesystem; `plan` turns payloads into a write plan and
//! applies it. Key order is deterministic everywhere so an unchanged
//! document renders byte-identical payloads.

pub mod plan;
pub mod region;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::allocate::Allocation;
use crate::document::Document;
use crate::errors::RenderError;
use crate::resolve::{DeviceSpec, Resolution};
use crate::resources::MachineResources;

/// Everything the renderer consumes, produced by the earlier stages.
pub struct RenderInput<'a> {
    pub doc: &'a Document,
    pub allocation: &'a Allocation,
    pub budgets: &'a BTreeMap<String, MachineResources>,
    pub resolution: &'a Resolution,
}

/// One logical output file: its path relative to the output directory and
/// its freshly rendered managed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub rel_path: PathBuf,
    pub payload: String,
}

/// Renders every output file for the resolved model.
pub fn render(input: &RenderInput) -> Result<Vec<RenderedFile>, RenderError> {
    let mut files = Vec::new();

    files.push(RenderedFile {
        rel_path: PathBuf::from("group_vars/all.yml"),
        payload: to_yaml(&global_vars(input))?,
    });

    for (domain_name, domain) in &input.doc.domains {
        files.push(RenderedFile {
            rel_path: PathBuf::from(format!("inventory/{domain_name}.yml")),
            payload: to_yaml(&inventory(input, domain_name))?,
        });
        files.push(RenderedFile {
            rel_path: PathBuf::from(format!("group_vars/{domain_name}.yml")),
            payload: to_yaml(&domain_vars(input, domain_name, domain))?,
        });
        for machine_name in domain.machines.keys() {
            files.push(RenderedFile {
                rel_path: PathBuf::from(format!("host_vars/{machine_name}.yml")),
                payload: to_yaml(&host_vars(input, domain_name, machine_name))?,
            });
        }
    }

    Ok(files)
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, RenderError> {
    Ok(serde_yaml::to_string(value)?)
}

#[derive(Serialize)]
struct InventoryFile {
    all: InventoryAll,
}

#[derive(Serialize)]
struct InventoryAll {
    children: BTreeMap<String, InventoryGroup>,
}

#[derive(Serialize)]
struct InventoryGroup {
    hosts: BTreeMap<String, InventoryHost>,
}

#[derive(Serialize)]
struct InventoryHost {
    ansible_host: String,
}

fn inventory(input: &RenderInput, domain_name: &str) -> InventoryFile {
    let hosts = input.doc.domains[domain_name]
        .machines
        .keys()
        .map(|machine_name| {
            let address = input
                .allocation
                .addresses
                .get(machine_name)
                .map(|addr| addr.to_string())
                .unwrap_or_default();
            (
                machine_name.clone(),
                InventoryHost {
                    ansible_host: address,
                },
            )
        })
        .collect();

    InventoryFile {
        all: InventoryAll {
            children: BTreeMap::from([(domain_name.to_string(), InventoryGroup { hosts })]),
        },
    }
}

#[derive(Serialize)]
struct GlobalVars {
    topogen_zone_base: u8,
    topogen_zones: BTreeMap<String, ZoneVars>,
    topogen_firewall_rules: Vec<RuleVars>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots_schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots_expiry: Option<String>,
}

#[derive(Serialize)]
struct ZoneVars {
    trust_level: String,
    cidr: String,
    gateway: String,
}

#[derive(Serialize)]
struct RuleVars {
    from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_machine: Option<String>,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_machine: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<u16>,
    protocol: String,
    comment: String,
}

fn global_vars(input: &RenderInput) -> GlobalVars {
    let zones = input
        .allocation
        .zones
        .iter()
        .map(|(domain_name, zone)| {
            (
                domain_name.clone(),
                ZoneVars {
                    trust_level: zone.trust_level.to_string(),
                    cidr: zone.cidr(),
                    gateway: zone.gateway().to_string(),
                },
            )
        })
        .collect();

    let rules = input
        .resolution
        .rules
        .iter()
        .map(|rule| RuleVars {
            from: rule.from.domain.clone(),
            from_machine: rule.from.machine.clone(),
            to: rule.to.domain.clone(),
            to_machine: rule.to.machine.clone(),
            ports: rule.ports.clone(),
            protocol: rule.protocol.to_string(),
            comment: rule.description.clone(),
        })
        .collect();

    GlobalVars {
        topogen_zone_base: input.doc.global.zone_base,
        topogen_zones: zones,
        topogen_firewall_rules: rules,
        snapshots_schedule: input.doc.global.snapshots_schedule.clone(),
        snapshots_expiry: input.doc.global.snapshots_expiry.clone(),
    }
}

#[derive(Serialize)]
struct DomainVars {
    trust_level: String,
    cidr: String,
    gateway: String,
    ephemeral: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    profiles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots_schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots_expiry: Option<String>,
}

fn domain_vars(
    input: &RenderInput,
    domain_name: &str,
    domain: &crate::document::Domain,
) -> DomainVars {
    let zone = &input.allocation.zones[domain_name];
    DomainVars {
        trust_level: zone.trust_level.to_string(),
        cidr: zone.cidr(),
        gateway: zone.gateway().to_string(),
        ephemeral: domain.ephemeral,
        profiles: domain.profiles.clone(),
        snapshots_schedule: domain.snapshots_schedule.clone(),
        snapshots_expiry: domain.snapshots_expiry.clone(),
    }
}

#[derive(Serialize)]
struct HostVars {
    domain: String,
    machine_type: String,
    ip: String,
    cpus: u32,
    memory_mb: u64,
    gpu: bool,
    ephemeral: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,
    boot_autostart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_priority: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    storage_devices: Vec<DeviceVars>,
}

#[derive(Serialize)]
struct DeviceVars {
    device: String,
    source: String,
    mount: String,
    readonly: bool,
    shift_owner: bool,
}

fn host_vars(input: &RenderInput, domain_name: &str, machine_name: &str) -> HostVars {
    let domain = &input.doc.domains[domain_name];
    let machine = &domain.machines[machine_name];
    let budget = &input.budgets[machine_name];

    let devices = input
        .resolution
        .devices
        .get(machine_name)
        .map(|specs| specs.iter().map(device_vars).collect())
        .unwrap_or_default();

    HostVars {
        domain: domain_name.to_string(),
        machine_type: machine.kind.to_string(),
        ip: input
            .allocation
            .addresses
            .get(machine_name)
            .map(|addr| addr.to_string())
            .unwrap_or_default(),
        cpus: budget.cpus,
        memory_mb: budget.memory_mb,
        gpu: machine.gpu,
        ephemeral: machine.ephemeral.unwrap_or(domain.ephemeral),
        roles: machine.roles.clone(),
        boot_autostart: machine.boot_autostart,
        boot_priority: machine.boot_priority,
        storage_devices: devices,
    }
}

fn device_vars(spec: &DeviceSpec) -> DeviceVars {
    DeviceVars {
        device: spec.device.clone(),
        source: spec.source.display().to_string(),
        mount: spec.mount.display().to_string(),
        readonly: spec.readonly,
        shift_owner: spec.shift_owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocate::allocate;
    use crate::document::Document;
    use crate::resolve::resolve;
    use crate::resources::distribute;

    fn model(yaml: &str) -> (Document, Allocation, BTreeMap<String, MachineResources>, Resolution) {
        let doc: Document = serde_yaml::from_str(yaml).unwrap();
        let allocation = allocate(&doc).unwrap();
        let budgets = distribute(&doc).unwrap();
        let resolution = resolve(&doc).unwrap();
        (doc, allocation, budgets, resolution)
    }

    const SITE: &str = r#"
domains:
  work:
    trust_level: trusted
    subnet_id: 1
    ephemeral: true
    machines:
      dev:
        roles: [workstation]
shared_volumes:
  media:
    source: /srv/media
    consumers:
      - domain: work
        mount: /mnt/media
        readonly: true
"#;

    #[test]
    fn renders_one_file_per_logical_target() {
        let (doc, allocation, budgets, resolution) = model(SITE);
        let input = RenderInput {
            doc: &doc,
            allocation: &allocation,
            budgets: &budgets,
            resolution: &resolution,
        };
        let files = render(&input).unwrap();
        let paths: Vec<String> = files
            .iter()
            .map(|f| f.rel_path.display().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "group_vars/all.yml",
                "inventory/work.yml",
                "group_vars/work.yml",
                "host_vars/dev.yml",
            ]
        );
    }

    #[test]
    fn rendering_is_a_pure_function_of_the_model() {
        let (doc, allocation, budgets, resolution) = model(SITE);
        let input = RenderInput {
            doc: &doc,
            allocation: &allocation,
            budgets: &budgets,
            resolution: &resolution,
        };
        assert_eq!(render(&input).unwrap(), render(&input).unwrap());
    }

    #[test]
    fn host_vars_carry_address_budget_and_devices() {
        let (doc, allocation, budgets, resolution) = model(SITE);
        let input = RenderInput {
            doc: &doc,
            allocation: &allocation,
            budgets: &budgets,
            resolution: &resolution,
        };
        let files = render(&input).unwrap();
        let host = files
            .iter()
            .find(|f| f.rel_path.ends_with("dev.yml"))
            .unwrap();
        assert!(host.payload.contains("ip: 10.110.1.1"));
        assert!(host.payload.contains("sv-media"));
        assert!(host.payload.contains("ephemeral: true"));
        assert!(host.payload.contains("workstation"));
    }

    #[test]
    fn global_vars_list_zones_and_rules() {
        let yaml = format!(
            "{SITE}network_policies:\n  - from: work\n    to: work\n    description: loop\n"
        );
        let (doc, allocation, budgets, resolution) = model(&yaml);
        let input = RenderInput {
            doc: &doc,
            allocation: &allocation,
            budgets: &budgets,
            resolution: &resolution,
        };
        let files = render(&input).unwrap();
        let all = &files[0];
        assert!(all.payload.contains("10.110.1.0/24"));
        assert!(all.payload.contains("comment: loop"));
    }
}
