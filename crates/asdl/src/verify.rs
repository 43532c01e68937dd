//! Stateless integrity verifier over the atomized graph.
//!
//! Runs only when atomization produced zero error diagnostics, so upstream
//! failures are never re-reported. The checks cover graph invariants the
//! atomizer guarantees by construction; a finding here indicates a compiler
//! bug surfaced as a diagnostic instead of a panic because the input that
//! triggered it is still user-serviceable.

use ahash::AHashSet;

use crate::{
    atomize::{AtomizedModule, AtomizedProgramGraph},
    diagnostics::Diagnostic,
    traverse::{ModuleTarget, select_module},
};

/// Checks name uniqueness, endpoint references, and port membership.
pub fn verify_atomized(graph: &AtomizedProgramGraph) -> Vec<Diagnostic> {
    let mut diags = vec![];
    for module in &graph.modules {
        verify_module(graph, module, &mut diags);
    }
    diags
}

fn verify_module(graph: &AtomizedProgramGraph, module: &AtomizedModule, diags: &mut Vec<Diagnostic>) {
    let mut net_names: AHashSet<&str> = AHashSet::new();
    for net in &module.nets {
        if net.name.starts_with('$') {
            diags.push(Diagnostic::error(
                "IR-050",
                format!("net '{}' of '{}' stores a leading '$'", net.name, module.symbol),
            ));
        }
        if !net_names.insert(net.name.as_str()) {
            diags.push(Diagnostic::error(
                "IR-050",
                format!("duplicate net name '{}' in module '{}'", net.name, module.symbol),
            ));
        }
    }

    let mut instance_names: AHashSet<&str> = AHashSet::new();
    for instance in &module.instances {
        if !instance_names.insert(instance.name.as_str()) {
            diags.push(Diagnostic::error(
                "IR-051",
                format!("duplicate instance name '{}' in module '{}'", instance.name, module.symbol),
            ));
        }
    }

    for instance in &module.instances {
        let target = select_module(graph, &instance.ref_file_id, &instance.ref_symbol);
        let Some(target) = target else {
            diags.push(Diagnostic::error(
                "IR-052",
                format!(
                    "instance '{}' of '{}' references unknown target '{}'",
                    instance.name, module.symbol, instance.ref_symbol
                ),
            ));
            continue;
        };
        let target_ports: Vec<&str> = match target {
            ModuleTarget::Module(target) => target.ports.iter().map(String::as_str).collect(),
            ModuleTarget::Device(target) => target.ports.iter().map(String::as_str).collect(),
        };
        for (pin, net) in &instance.conns {
            if !target_ports.contains(&pin.as_str()) {
                diags.push(Diagnostic::error(
                    "IR-053",
                    format!(
                        "pin '{pin}' of instance '{}' is not a port of '{}'",
                        instance.name, instance.ref_symbol
                    ),
                ));
            }
            if !net_names.contains(net.as_str()) {
                diags.push(Diagnostic::error(
                    "IR-054",
                    format!(
                        "pin '{pin}' of instance '{}' connects to undeclared net '{net}'",
                        instance.name
                    ),
                ));
            }
        }
    }

    let mut port_names: AHashSet<&str> = AHashSet::new();
    for port in &module.ports {
        if !port_names.insert(port.as_str()) {
            diags.push(Diagnostic::error(
                "IR-055",
                format!("duplicate port '{port}' in module '{}'", module.symbol),
            ));
        }
    }
}
