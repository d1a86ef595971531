//! In-memory model of the topology document.
//!
//! The document is the single source of truth an operator writes: isolated
//! domains, the machines inside them, and cross-cutting declarations
//! (network policies, shared and persistent volumes). The generator never
//! mutates it; every downstream stage derives values from it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

pub mod loader;

/// A complete topology document, after fragment merging (if any).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub domains: BTreeMap<String, Domain>,
    #[serde(default)]
    pub network_policies: Vec<NetworkPolicy>,
    #[serde(default)]
    pub shared_volumes: BTreeMap<String, Volume>,
    #[serde(default)]
    pub persistent_data: BTreeMap<String, Volume>,
}

/// Document-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Global {
    /// Base for the second IPv4 octet; trust-level offsets are added to it.
    #[serde(default = "default_zone_base")]
    pub zone_base: u8,
    #[serde(default)]
    pub resources: Option<ResourcePolicy>,
    #[serde(default)]
    pub snapshots_schedule: Option<String>,
    #[serde(default)]
    pub snapshots_expiry: Option<String>,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            zone_base: default_zone_base(),
            resources: None,
            snapshots_schedule: None,
            snapshots_expiry: None,
        }
    }
}

fn default_zone_base() -> u8 {
    100
}

/// Declared CPU/memory budget shared by machines according to their weight.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePolicy {
    #[serde(default)]
    pub scope: ResourceScope,
    pub cpu_capacity: u32,
    pub memory_mb_capacity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceScope {
    /// Each domain's machines share one capacity-sized pool.
    #[default]
    PerDomain,
    /// Every machine in the document shares a single pool.
    Global,
}

/// A named isolation unit holding machines.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Domain {
    /// Security classification; must name one of [`TrustLevel`]'s variants.
    /// Kept as a string so an unknown level is a field-addressed validation
    /// error rather than a parse failure.
    pub trust_level: String,
    /// Third IPv4 octet of the domain's /24.
    pub subnet_id: u8,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub machines: BTreeMap<String, Machine>,
    #[serde(default)]
    pub snapshots_schedule: Option<String>,
    #[serde(default)]
    pub snapshots_expiry: Option<String>,
}

/// A single container or virtual machine inside a domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Machine {
    #[serde(rename = "type", default)]
    pub kind: MachineKind,
    /// Static address override; bypasses allocation but is still checked
    /// against the domain CIDR and for collisions.
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub gpu: bool,
    #[serde(default)]
    pub ephemeral: Option<bool>,
    /// Share of the domain's resource budget relative to its siblings.
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub boot_autostart: bool,
    #[serde(default)]
    pub boot_priority: Option<u32>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineKind {
    #[default]
    Container,
    VirtualMachine,
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineKind::Container => write!(f, "container"),
            MachineKind::VirtualMachine => write!(f, "virtual-machine"),
        }
    }
}

/// The closed set of domain security classifications, in ascending
/// second-octet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustLevel {
    Admin,
    Trusted,
    SemiTrusted,
    Untrusted,
    Disposable,
}

impl TrustLevel {
    pub const ALL: &'static [TrustLevel] = &[
        TrustLevel::Admin,
        TrustLevel::Trusted,
        TrustLevel::SemiTrusted,
        TrustLevel::Untrusted,
        TrustLevel::Disposable,
    ];

    /// Offset added to `zone_base` to form the second octet of every
    /// domain at this level. Each level owns a ten-subnet band.
    pub fn octet_offset(self) -> u8 {
        match self {
            TrustLevel::Admin => 0,
            TrustLevel::Trusted => 10,
            TrustLevel::SemiTrusted => 20,
            TrustLevel::Untrusted => 30,
            TrustLevel::Disposable => 40,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Admin => "admin",
            TrustLevel::Trusted => "trusted",
            TrustLevel::SemiTrusted => "semi-trusted",
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Disposable => "disposable",
        }
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| {
                let known = TrustLevel::ALL
                    .iter()
                    .map(|level| level.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("unknown trust_level '{s}'; expected one of: {known}")
            })
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exception to default-deny inter-domain traffic.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkPolicy {
    /// Domain or machine name.
    pub from: String,
    /// Domain or machine name.
    pub to: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub bidirectional: bool,
    /// Mandatory; carried into generated rules as the audit comment.
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Any,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Any => write!(f, "any"),
        }
    }
}

/// A host path exposed into the machines of consumer domains.
///
/// Used for both `shared_volumes` and `persistent_data`; the two maps only
/// differ in device-name prefix and lifecycle semantics downstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Volume {
    /// Host path backing the volume.
    pub source: PathBuf,
    pub consumers: Vec<VolumeConsumer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeConsumer {
    pub domain: String,
    /// Absolute mount path inside each machine of the consumer domain.
    pub mount: PathBuf,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub shift_owner: bool,
}

impl Document {
    /// All machine names paired with their owning domain, in deterministic
    /// (domain, machine) name order.
    pub fn machines(&self) -> impl Iterator<Item = (&str, &str, &Machine)> {
        self.domains.iter().flat_map(|(domain_name, domain)| {
            domain
                .machines
                .iter()
                .map(move |(machine_name, machine)| {
                    (domain_name.as_str(), machine_name.as_str(), machine)
                })
        })
    }

    /// Looks up the domain owning `machine_name`, if any.
    pub fn domain_of_machine(&self, machine_name: &str) -> Option<&str> {
        self.domains
            .iter()
            .find(|(_, domain)| domain.machines.contains_key(machine_name))
            .map(|(name, _)| name.as_str())
    }
}
