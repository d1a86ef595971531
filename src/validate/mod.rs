//! Structural and semantic validation of a loaded document.
//!
//! `validate` is a pure function: it inspects the document, collects every
//! violated constraint, and returns the complete list. The pipeline halts
//! before any filesystem write when the list is non-empty, so the operator
//! sees all problems in one pass.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use crate::document::{Document, TrustLevel, Volume};
use crate::errors::ValidationError;

const MAX_BOOT_PRIORITY: u32 = 99;

/// Checks every document constraint and returns all violations found.
pub fn validate(doc: &Document) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_names(doc, &mut errors);
    check_domains(doc, &mut errors);
    check_machines(doc, &mut errors);
    check_network_policies(doc, &mut errors);
    check_volumes(doc, "shared_volumes", &doc.shared_volumes, &mut errors);
    check_volumes(doc, "persistent_data", &doc.persistent_data, &mut errors);
    check_snapshots(doc, &mut errors);

    errors
}

/// DNS-label safety: lowercase alphanumerics and hyphens, no leading or
/// trailing hyphen, at most 63 characters.
pub fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn check_names(doc: &Document, errors: &mut Vec<ValidationError>) {
    for name in doc.domains.keys() {
        if !is_dns_label(name) {
            errors.push(ValidationError::new(
                format!("domains.{name}"),
                "domain name must be a lowercase DNS label",
            ));
        }
    }

    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (domain_name, machine_name, _) in doc.machines() {
        if !is_dns_label(machine_name) {
            errors.push(ValidationError::new(
                format!("domains.{domain_name}.machines.{machine_name}"),
                "machine name must be a lowercase DNS label",
            ));
        }
        if let Some(previous) = seen.insert(machine_name, domain_name) {
            errors.push(ValidationError::new(
                format!("domains.{domain_name}.machines.{machine_name}"),
                format!("duplicate machine name; already declared in domain '{previous}'"),
            ));
        }
    }
}

fn check_domains(doc: &Document, errors: &mut Vec<ValidationError>) {
    // Every trust level's offset must still fit in the second octet.
    let max_base = u8::MAX - TrustLevel::Disposable.octet_offset();
    if doc.global.zone_base > max_base {
        errors.push(ValidationError::new(
            "global.zone_base".to_string(),
            format!(
                "zone_base {} pushes the highest trust level past octet 255; maximum is {max_base}",
                doc.global.zone_base
            ),
        ));
    }

    // CIDR uniqueness is derived: same trust level and same subnet_id.
    let mut cidrs: BTreeMap<(TrustLevel, u8), &str> = BTreeMap::new();

    for (name, domain) in &doc.domains {
        let level = match domain.trust_level.parse::<TrustLevel>() {
            Ok(level) => level,
            Err(reason) => {
                errors.push(ValidationError::new(
                    format!("domains.{name}.trust_level"),
                    reason,
                ));
                continue;
            }
        };

        if let Some(previous) = cidrs.insert((level, domain.subnet_id), name) {
            errors.push(ValidationError::new(
                format!("domains.{name}.subnet_id"),
                format!(
                    "derives the same CIDR as domain '{previous}' (trust_level {level}, subnet_id {})",
                    domain.subnet_id
                ),
            ));
        }
    }
}

fn check_machines(doc: &Document, errors: &mut Vec<ValidationError>) {
    for (domain_name, machine_name, machine) in doc.machines() {
        let field = |attr: &str| format!("domains.{domain_name}.machines.{machine_name}.{attr}");

        if machine.weight == 0 {
            errors.push(ValidationError::new(
                field("weight"),
                "weight must be at least 1",
            ));
        }

        if let Some(priority) = machine.boot_priority {
            if priority > MAX_BOOT_PRIORITY {
                errors.push(ValidationError::new(
                    field("boot_priority"),
                    format!("must be between 0 and {MAX_BOOT_PRIORITY}, got {priority}"),
                ));
            }
        }

        if let Some(ip) = &machine.ip {
            if ip.parse::<Ipv4Addr>().is_err() {
                errors.push(ValidationError::new(
                    field("ip"),
                    format!("'{ip}' is not a valid IPv4 address"),
                ));
            }
        }
    }
}

fn check_network_policies(doc: &Document, errors: &mut Vec<ValidationError>) {
    for (index, policy) in doc.network_policies.iter().enumerate() {
        let field = |attr: &str| format!("network_policies[{index}].{attr}");

        for (attr, endpoint) in [("from", &policy.from), ("to", &policy.to)] {
            let known = doc.domains.contains_key(endpoint)
                || doc.domain_of_machine(endpoint).is_some();
            if !known {
                errors.push(ValidationError::new(
                    field(attr),
                    format!("'{endpoint}' is neither a declared domain nor a declared machine"),
                ));
            }
        }

        if policy.description.trim().is_empty() {
            errors.push(ValidationError::new(
                field("description"),
                "description is mandatory; it becomes the audit comment on generated rules",
            ));
        }
    }
}

fn check_volumes(
    doc: &Document,
    section: &str,
    volumes: &BTreeMap<String, Volume>,
    errors: &mut Vec<ValidationError>,
) {
    for (name, volume) in volumes {
        if !is_dns_label(name) {
            errors.push(ValidationError::new(
                format!("{section}.{name}"),
                "volume name must be a lowercase DNS label",
            ));
        }

        let mut seen_domains = BTreeSet::new();
        for (index, consumer) in volume.consumers.iter().enumerate() {
            let field = |attr: &str| format!("{section}.{name}.consumers[{index}].{attr}");

            if !doc.domains.contains_key(&consumer.domain) {
                errors.push(ValidationError::new(
                    field("domain"),
                    format!("unknown consumer domain '{}'", consumer.domain),
                ));
            }
            if !seen_domains.insert(consumer.domain.as_str()) {
                errors.push(ValidationError::new(
                    field("domain"),
                    format!("domain '{}' consumes this volume twice", consumer.domain),
                ));
            }
            if !consumer.mount.is_absolute() {
                errors.push(ValidationError::new(
                    field("mount"),
                    format!("mount path '{}' must be absolute", consumer.mount.display()),
                ));
            }
        }
    }
}

fn check_snapshots(doc: &Document, errors: &mut Vec<ValidationError>) {
    let mut check = |field: String, schedule: Option<&String>, expiry: Option<&String>| {
        if let Some(schedule) = schedule {
            if let Err(reason) = check_cron_expression(schedule) {
                errors.push(ValidationError::new(
                    format!("{field}.snapshots_schedule"),
                    reason,
                ));
            }
        }
        if let Some(expiry) = expiry {
            if let Err(reason) = check_expiry(expiry) {
                errors.push(ValidationError::new(
                    format!("{field}.snapshots_expiry"),
                    reason,
                ));
            }
        }
    };

    check(
        "global".to_string(),
        doc.global.snapshots_schedule.as_ref(),
        doc.global.snapshots_expiry.as_ref(),
    );
    for (name, domain) in &doc.domains {
        check(
            format!("domains.{name}"),
            domain.snapshots_schedule.as_ref(),
            domain.snapshots_expiry.as_ref(),
        );
    }
}

/// Accepts five whitespace-separated cron fields built from digits, `*`,
/// `,`, `-`, and `/`. Field-range semantics are left to the consumer; this
/// only guards against obviously malformed expressions.
fn check_cron_expression(expression: &str) -> Result<(), String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "cron expression must have 5 fields, got {} in '{expression}'",
            fields.len()
        ));
    }
    for field in fields {
        let valid = field
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | ',' | '-' | '/'));
        if !valid || field.is_empty() {
            return Err(format!("invalid cron field '{field}' in '{expression}'"));
        }
    }
    Ok(())
}

/// Duration grammar: a positive integer followed by h, d, w, or m.
fn check_expiry(expiry: &str) -> Result<(), String> {
    let valid = expiry
        .strip_suffix(['h', 'd', 'w', 'm'])
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(format!(
            "'{expiry}' does not match the duration grammar <number><h|d|w|m>"
        ))
    }
}
