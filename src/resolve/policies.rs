//! Expands network-policy declarations into per-domain-pair allow rules.
//!
//! Traffic between domains is default-deny; every policy is an explicit
//! exception. Unidirectional unless `bidirectional: true`, which emits the
//! reversed rule as well. A machine-scoped policy already covered by a
//! domain-level rule over the same pair is reported as a warning, not an
//! error.

use crate::document::{Document, Protocol};

/// One side of an allow rule. Domain-level when `machine` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEndpoint {
    pub domain: String,
    pub machine: Option<String>,
}

impl RuleEndpoint {
    fn covers(&self, other: &RuleEndpoint) -> bool {
        self.domain == other.domain && (self.machine.is_none() || self.machine == other.machine)
    }
}

/// A single expanded allow rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub from: RuleEndpoint,
    pub to: RuleEndpoint,
    pub ports: Vec<u16>,
    pub protocol: Protocol,
    /// Audit comment carried verbatim from the policy declaration.
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyExpansion {
    pub rules: Vec<FlowRule>,
    pub warnings: Vec<String>,
}

/// Expands every policy of an already-validated document. Reference
/// resolution failures were caught by validation; unknown names are skipped
/// here rather than re-reported.
pub fn expand_policies(doc: &Document) -> PolicyExpansion {
    let mut expansion = PolicyExpansion::default();

    for policy in &doc.network_policies {
        let (Some(from), Some(to)) = (endpoint(doc, &policy.from), endpoint(doc, &policy.to))
        else {
            continue;
        };

        expansion.rules.push(FlowRule {
            from: from.clone(),
            to: to.clone(),
            ports: policy.ports.clone(),
            protocol: policy.protocol,
            description: policy.description.clone(),
        });
        if policy.bidirectional {
            expansion.rules.push(FlowRule {
                from: to,
                to: from,
                ports: policy.ports.clone(),
                protocol: policy.protocol,
                description: policy.description.clone(),
            });
        }
    }

    // Sort per domain pair so rule order never depends on declaration
    // shuffling; description breaks ties for full determinism.
    expansion.rules.sort_by(|a, b| {
        (&a.from.domain, &a.to.domain, &a.description).cmp(&(
            &b.from.domain,
            &b.to.domain,
            &b.description,
        ))
    });

    expansion.warnings = overlap_warnings(&expansion.rules);
    expansion
}

fn endpoint(doc: &Document, name: &str) -> Option<RuleEndpoint> {
    if doc.domains.contains_key(name) {
        return Some(RuleEndpoint {
            domain: name.to_string(),
            machine: None,
        });
    }
    doc.domain_of_machine(name).map(|domain| RuleEndpoint {
        domain: domain.to_string(),
        machine: Some(name.to_string()),
    })
}

/// A narrower rule is covered when a distinct rule with domain-level
/// endpoints spans the same pair and a compatible protocol.
fn overlap_warnings(rules: &[FlowRule]) -> Vec<String> {
    let mut warnings = Vec::new();
    for rule in rules {
        if rule.from.machine.is_none() && rule.to.machine.is_none() {
            continue;
        }
        let covered_by = rules.iter().find(|broader| {
            !std::ptr::eq(*broader, rule)
                && broader.from.machine.is_none()
                && broader.to.machine.is_none()
                && broader.from.covers(&rule.from)
                && broader.to.covers(&rule.to)
                && (broader.protocol == rule.protocol || broader.protocol == Protocol::Any)
        });
        if let Some(broader) = covered_by {
            warnings.push(format!(
                "rule '{}' ({} -> {}) is already covered by the domain-level rule '{}'",
                rule.description,
                endpoint_label(&rule.from),
                endpoint_label(&rule.to),
                broader.description
            ));
        }
    }
    warnings
}

fn endpoint_label(endpoint: &RuleEndpoint) -> String {
    match &endpoint.machine {
        Some(machine) => format!("{}/{machine}", endpoint.domain),
        None => endpoint.domain.clone(),
    }
}
