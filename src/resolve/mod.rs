//! Cross-cutting expansion of volume and network-policy declarations.
//!
//! Volume declarations become per-machine storage device lists; network
//! policies become per-domain-pair allow rules. Both resolvers collect every
//! problem they find instead of stopping at the first.

pub mod policies;
pub mod volumes;

pub use policies::{expand_policies, FlowRule, PolicyExpansion};
pub use volumes::{expand_volumes, DeviceSpec};

use std::collections::BTreeMap;

use crate::document::Document;
use crate::errors::ResolutionError;

/// Output of both resolvers, keyed for the renderer.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Machine name to storage devices, ascending device-name order.
    pub devices: BTreeMap<String, Vec<DeviceSpec>>,
    /// Flattened allow rules in document order.
    pub rules: Vec<FlowRule>,
    /// Non-fatal findings, surfaced in the run report.
    pub warnings: Vec<String>,
}

/// Runs both resolvers over an already-validated document.
pub fn resolve(doc: &Document) -> Result<Resolution, Vec<ResolutionError>> {
    let mut errors = Vec::new();

    let devices = match expand_volumes(doc) {
        Ok(devices) => devices,
        Err(mut volume_errors) => {
            errors.append(&mut volume_errors);
            BTreeMap::new()
        }
    };

    let expansion = expand_policies(doc);

    if errors.is_empty() {
        Ok(Resolution {
            devices,
            rules: expansion.rules,
            warnings: expansion.warnings,
        })
    } else {
        Err(errors)
    }
}
