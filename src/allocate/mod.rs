//! Deterministic IPv4 address allocation.
//!
//! Every domain maps to exactly one /24 derived from its trust level and
//! subnet id: `10.(zone_base + trust_offset).(subnet_id).0/24`. Within a
//! domain, machines without a static `ip` receive the lowest unused host
//! address in ascending machine-name order. Assignment depends only on
//! (trust level, subnet id, machine name), never on iteration order, so an
//! unrelated document edit never reshuffles existing addresses.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use crate::document::{Document, TrustLevel};
use crate::errors::AllocationError;

/// Host addresses that are never handed to machines.
const NETWORK_HOST: u8 = 0;
const GATEWAY_HOST: u8 = 254;
const BROADCAST_HOST: u8 = 255;

/// A domain's computed /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub trust_level: TrustLevel,
    pub subnet_id: u8,
    pub second_octet: u8,
}

impl Zone {
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::new(10, self.second_octet, self.subnet_id, 0)
    }

    pub fn cidr(&self) -> String {
        format!("10.{}.{}.0/24", self.second_octet, self.subnet_id)
    }

    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::new(10, self.second_octet, self.subnet_id, GATEWAY_HOST)
    }

    pub fn host(&self, last_octet: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, self.second_octet, self.subnet_id, last_octet)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let [a, b, c, _] = addr.octets();
        a == 10 && b == self.second_octet && c == self.subnet_id
    }
}

/// The allocator's output: one zone per domain, one address per machine.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub zones: BTreeMap<String, Zone>,
    pub addresses: BTreeMap<String, Ipv4Addr>,
}

/// Derives every zone and assigns every machine address, collecting all
/// collisions instead of stopping at the first.
pub fn allocate(doc: &Document) -> Result<Allocation, Vec<AllocationError>> {
    let mut errors = Vec::new();
    let mut allocation = Allocation::default();
    let mut cidr_owners: BTreeMap<Ipv4Addr, String> = BTreeMap::new();

    // Static overrides are checked for duplicates across the whole document
    // up front, so the same literal address written in two domains is always
    // reported as a duplicate rather than as two unrelated CIDR mismatches.
    let mut static_owners: BTreeMap<Ipv4Addr, &str> = BTreeMap::new();
    for (_, machine_name, machine) in doc.machines() {
        let Some(addr) = machine.ip.as_ref().and_then(|raw| raw.parse::<Ipv4Addr>().ok()) else {
            continue;
        };
        if let Some(other) = static_owners.insert(addr, machine_name) {
            errors.push(AllocationError(format!(
                "duplicate address {addr}: machines '{other}' and '{machine_name}' both declare it"
            )));
        }
    }

    for (domain_name, domain) in &doc.domains {
        // Unknown trust levels were already reported by validation.
        let Ok(trust_level) = domain.trust_level.parse::<TrustLevel>() else {
            continue;
        };
        let zone = Zone {
            trust_level,
            subnet_id: domain.subnet_id,
            // Validation guarantees zone_base + 40 fits in the octet.
            second_octet: doc.global.zone_base + trust_level.octet_offset(),
        };

        if let Some(owner) = cidr_owners.insert(zone.network(), domain_name.clone()) {
            errors.push(AllocationError(format!(
                "domain '{domain_name}' derives CIDR {} already owned by domain '{owner}'",
                zone.cidr()
            )));
            continue;
        }
        allocation.zones.insert(domain_name.clone(), zone);

        allocate_domain(domain_name, doc, &zone, &mut allocation, &mut errors);
    }

    if errors.is_empty() {
        Ok(allocation)
    } else {
        Err(errors)
    }
}

fn allocate_domain(
    domain_name: &str,
    doc: &Document,
    zone: &Zone,
    allocation: &mut Allocation,
    errors: &mut Vec<AllocationError>,
) {
    let domain = &doc.domains[domain_name];
    let mut used: BTreeSet<u8> = BTreeSet::new();

    // Static overrides first: they reserve their host before any dynamic
    // machine is placed. BTreeMap iteration gives ascending name order.
    for (machine_name, machine) in &domain.machines {
        let Some(raw) = &machine.ip else { continue };
        let Ok(addr) = raw.parse::<Ipv4Addr>() else {
            // Unparseable addresses were already reported by validation.
            continue;
        };

        if !zone.contains(addr) {
            errors.push(AllocationError(format!(
                "machine '{machine_name}': static ip {addr} falls outside domain '{domain_name}' CIDR {}",
                zone.cidr()
            )));
            continue;
        }
        let host = addr.octets()[3];
        if matches!(host, NETWORK_HOST | GATEWAY_HOST | BROADCAST_HOST) {
            errors.push(AllocationError(format!(
                "machine '{machine_name}': static ip {addr} uses a reserved host address"
            )));
            continue;
        }
        if !used.insert(host) {
            // Already reported by the document-wide duplicate scan.
            continue;
        }
        allocation.addresses.insert(machine_name.clone(), addr);
    }

    for (machine_name, machine) in &domain.machines {
        if machine.ip.is_some() {
            continue;
        }
        match lowest_free_host(&used) {
            Some(host) => {
                used.insert(host);
                allocation
                    .addresses
                    .insert(machine_name.clone(), zone.host(host));
            }
            None => errors.push(AllocationError(format!(
                "domain '{domain_name}' has no free host address left for machine '{machine_name}'"
            ))),
        }
    }
}

fn lowest_free_host(used: &BTreeSet<u8>) -> Option<u8> {
    (1..GATEWAY_HOST).find(|host| !used.contains(host))
}
