//! Weight-proportional CPU and memory distribution.
//!
//! Machines with an explicit `cpus` or `memory_mb` keep their override; the
//! override is carved out of the declared capacity before the remainder is
//! split across the other machines proportionally to weight. Rounding is
//! downward, with the leftover handed to the highest-weight machine so the
//! sum never exceeds capacity.

use std::collections::BTreeMap;

use crate::document::{Document, Machine, MachineKind, ResourceScope};
use crate::errors::ResourcePolicyError;

/// Defaults used when the document declares no resource policy.
const DEFAULT_CONTAINER_CPUS: u32 = 2;
const DEFAULT_CONTAINER_MEMORY_MB: u64 = 2048;
const DEFAULT_VM_CPUS: u32 = 2;
const DEFAULT_VM_MEMORY_MB: u64 = 4096;

/// Final per-machine budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineResources {
    pub cpus: u32,
    pub memory_mb: u64,
}

/// Computes every machine's CPU and memory budget.
pub fn distribute(doc: &Document) -> Result<BTreeMap<String, MachineResources>, ResourcePolicyError> {
    let Some(policy) = &doc.global.resources else {
        return Ok(defaults_only(doc));
    };

    let mut budgets = BTreeMap::new();
    match policy.scope {
        ResourceScope::Global => {
            let mut pool: Vec<(&str, &Machine)> = doc
                .machines()
                .map(|(_, machine_name, machine)| (machine_name, machine))
                .collect();
            // Machine names are globally unique; sort so the leftover
            // tie-break is by name, not by owning domain.
            pool.sort_by_key(|&(machine_name, _)| machine_name);
            distribute_pool("document", &pool, policy.cpu_capacity, policy.memory_mb_capacity, &mut budgets)?;
        }
        ResourceScope::PerDomain => {
            for (domain_name, domain) in &doc.domains {
                let pool: Vec<(&str, &Machine)> = domain
                    .machines
                    .iter()
                    .map(|(machine_name, machine)| (machine_name.as_str(), machine))
                    .collect();
                distribute_pool(
                    domain_name,
                    &pool,
                    policy.cpu_capacity,
                    policy.memory_mb_capacity,
                    &mut budgets,
                )?;
            }
        }
    }
    Ok(budgets)
}

fn defaults_only(doc: &Document) -> BTreeMap<String, MachineResources> {
    doc.machines()
        .map(|(_, machine_name, machine)| {
            let (cpus, memory_mb) = match machine.kind {
                MachineKind::Container => (DEFAULT_CONTAINER_CPUS, DEFAULT_CONTAINER_MEMORY_MB),
                MachineKind::VirtualMachine => (DEFAULT_VM_CPUS, DEFAULT_VM_MEMORY_MB),
            };
            (
                machine_name.to_string(),
                MachineResources {
                    cpus: machine.cpus.unwrap_or(cpus),
                    memory_mb: machine.memory_mb.unwrap_or(memory_mb),
                },
            )
        })
        .collect()
}

fn distribute_pool(
    scope_name: &str,
    pool: &[(&str, &Machine)],
    cpu_capacity: u32,
    memory_mb_capacity: u64,
    budgets: &mut BTreeMap<String, MachineResources>,
) -> Result<(), ResourcePolicyError> {
    let cpus = split(
        scope_name,
        "cpu",
        cpu_capacity as u64,
        pool,
        |machine| machine.cpus.map(u64::from),
    )?;
    let memory = split(
        scope_name,
        "memory",
        memory_mb_capacity,
        pool,
        |machine| machine.memory_mb,
    )?;

    for &(machine_name, _) in pool {
        budgets.insert(
            machine_name.to_string(),
            MachineResources {
                cpus: cpus[machine_name] as u32,
                memory_mb: memory[machine_name],
            },
        );
    }
    Ok(())
}

/// Splits one capacity dimension over the pool. Overridden machines keep
/// their declared amount; the rest share what is left by weight.
fn split<'a>(
    scope_name: &str,
    dimension: &str,
    capacity: u64,
    pool: &[(&'a str, &'a Machine)],
    override_of: impl Fn(&Machine) -> Option<u64>,
) -> Result<BTreeMap<&'a str, u64>, ResourcePolicyError> {
    let mut amounts: BTreeMap<&str, u64> = BTreeMap::new();

    let mut reserved: u64 = 0;
    let mut shared: Vec<(&str, u64)> = Vec::new();
    for &(machine_name, machine) in pool {
        match override_of(machine) {
            Some(amount) => {
                reserved += amount;
                amounts.insert(machine_name, amount);
            }
            None => shared.push((machine_name, u64::from(machine.weight))),
        }
    }

    if reserved > capacity {
        return Err(ResourcePolicyError(format!(
            "{scope_name}: explicit {dimension} overrides total {reserved}, exceeding the declared capacity of {capacity}"
        )));
    }

    let remaining = capacity - reserved;
    let total_weight: u64 = shared.iter().map(|(_, weight)| weight).sum();
    if total_weight == 0 {
        return Ok(amounts);
    }

    let mut handed_out: u64 = 0;
    for &(machine_name, weight) in &shared {
        let amount = remaining * weight / total_weight;
        handed_out += amount;
        amounts.insert(machine_name, amount);
    }

    // Rounding leftover goes to the highest-weight machine; ties break to
    // the first in ascending name order, which `shared` already follows.
    let leftover = remaining - handed_out;
    if leftover > 0 {
        let mut heaviest: Option<(&str, u64)> = None;
        for &(machine_name, weight) in &shared {
            if heaviest.map_or(true, |(_, best)| weight > best) {
                heaviest = Some((machine_name, weight));
            }
        }
        if let Some((machine_name, _)) = heaviest {
            if let Some(amount) = amounts.get_mut(machine_name) {
                *amount += leftover;
            }
        }
    }

    Ok(amounts)
}
