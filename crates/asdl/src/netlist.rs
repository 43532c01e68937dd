//! NetlistIR: the emission-oriented projection of the atomized graph.
//!
//! Only modules reachable by transitive instance references from the final
//! resolved top are projected. Symbols realize to emitted subckt names
//! (`cell`, `cell_<view>`) with deterministic `__2`, `__3`… ordinals on
//! collision; unreachable colliders do not influence allocation.

use ahash::AHashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    atomize::{AtomizedModule, AtomizedPatternOrigin, AtomizedProgramGraph},
    backend::extract_placeholders,
    diagnostics::Diagnostic,
    traverse::{ModuleTarget, select_module, traverse_hierarchy},
};

/// One backend entry of a device: its template and the placeholders the
/// template mentions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Backend {
    pub name: String,
    pub template: String,
    pub placeholders: Vec<String>,
}

/// A primitive device in emission form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    pub name: String,
    pub ports: Vec<String>,
    pub backends: IndexMap<String, Backend>,
    pub parameters: IndexMap<String, String>,
}

/// One instance inside a NetlistIR module.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Instance {
    pub name: String,
    /// Emitted name of the target module, or the device symbol.
    pub reference: String,
    pub is_device: bool,
    /// pin → net, authored binding order.
    pub conns: IndexMap<String, String>,
    pub parameters: IndexMap<String, String>,
    pub pattern_origin: Option<AtomizedPatternOrigin>,
}

/// One emitted module.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub name: String,
    pub ports: Vec<String>,
    pub nets: Vec<String>,
    pub instances: Vec<Instance>,
    pub parameters: IndexMap<String, String>,
    pub pattern_origin: Option<AtomizedPatternOrigin>,
}

/// The emission-ready design.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Design {
    pub modules: Vec<Module>,
    pub devices: Vec<Device>,
    /// Emitted name of the final resolved top.
    pub top: String,
}

impl Design {
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.name == name)
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.name == name)
    }
}

/// Emitted-name map produced during realization:
/// `(file_id, symbol)` → emitted subckt name.
pub type RealizedNames = AHashMap<(String, String), String>;

/// Sanitizes a view identifier into the emitted-name charset.
fn sanitize(view: &str) -> String {
    view.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Base emitted name for a module symbol: `cell` and `cell@default` emit
/// `cell`, `cell@view` emits `cell_<view>`.
fn base_emitted_name(symbol: &str) -> String {
    match symbol.split_once('@') {
        None => symbol.to_owned(),
        Some((cell, "default")) => cell.to_owned(),
        Some((cell, view)) => format!("{cell}_{}", sanitize(view)),
    }
}

/// Lowers the atomized graph to NetlistIR, given the final resolved top.
pub fn lower_netlist(
    graph: &AtomizedProgramGraph,
    top: &AtomizedModule,
) -> (Option<(Design, RealizedNames)>, Vec<Diagnostic>) {
    let mut diags = vec![];

    // reachable modules in traversal order (top first, then first-visit
    // DFS-pre order); reachable devices alongside
    let walked = traverse_hierarchy(graph, top, true);
    let mut reachable: Vec<&AtomizedModule> = vec![top];
    let mut reachable_devices: Vec<(String, String)> = vec![];
    for entry in &walked.entries {
        match select_module(graph, &entry.ref_file_id, &entry.module_symbol) {
            Some(ModuleTarget::Module(target)) => {
                if !reachable
                    .iter()
                    .any(|module| module.file_id == target.file_id && module.symbol == target.symbol)
                {
                    reachable.push(target);
                }
            }
            Some(ModuleTarget::Device(device)) => {
                let key = (device.file_id.clone(), device.symbol.clone());
                if !reachable_devices.contains(&key) {
                    reachable_devices.push(key);
                }
            }
            None => {}
        }
    }

    // name realization with ordinal collision suffixes in traversal order
    let mut realized = RealizedNames::new();
    let mut name_counts: AHashMap<String, u32> = AHashMap::new();
    for module in &reachable {
        let base = base_emitted_name(&module.symbol);
        let count = name_counts.entry(base.clone()).or_insert(0);
        *count += 1;
        let emitted = if *count == 1 { base } else { format!("{base}__{count}") };
        realized.insert((module.file_id.clone(), module.symbol.clone()), emitted);
    }

    let mut design = Design {
        top: realized[&(top.file_id.clone(), top.symbol.clone())].clone(),
        ..Design::default()
    };

    for module in &reachable {
        design.modules.push(project_module(graph, module, &realized, &mut diags));
    }

    for (file_id, symbol) in &reachable_devices {
        match project_device(graph, file_id, symbol) {
            Ok(device) => design.devices.push(device),
            Err(diag) => diags.push(diag),
        }
    }

    if crate::diagnostics::has_errors(&diags) {
        return (None, diags);
    }
    debug!(modules = design.modules.len(), devices = design.devices.len(), top = %design.top, "netlist lowered");
    (Some((design, realized)), diags)
}

fn project_module(
    graph: &AtomizedProgramGraph,
    module: &AtomizedModule,
    realized: &RealizedNames,
    diags: &mut Vec<Diagnostic>,
) -> Module {
    let mut instances = vec![];
    for instance in &module.instances {
        let (reference, is_device) = match select_module(graph, &instance.ref_file_id, &instance.ref_symbol) {
            Some(ModuleTarget::Module(target)) => {
                let key = (target.file_id.clone(), target.symbol.clone());
                match realized.get(&key) {
                    Some(emitted) => (emitted.clone(), false),
                    None => {
                        diags.push(Diagnostic::error(
                            "EMIT-005",
                            format!(
                                "instance '{}' targets '{}', which was never realized",
                                instance.name, target.symbol
                            ),
                        ));
                        continue;
                    }
                }
            }
            Some(ModuleTarget::Device(device)) => (device.symbol.clone(), true),
            None => {
                diags.push(Diagnostic::error(
                    "EMIT-005",
                    format!("instance '{}' targets unknown symbol '{}'", instance.name, instance.ref_symbol),
                ));
                continue;
            }
        };
        instances.push(Instance {
            name: instance.name.clone(),
            reference,
            is_device,
            conns: instance.conns.clone(),
            parameters: instance.parameters.clone(),
            pattern_origin: Some(instance.origin.clone()),
        });
    }

    Module {
        name: realized[&(module.file_id.clone(), module.symbol.clone())].clone(),
        ports: module.ports.clone(),
        nets: module.nets.iter().map(|net| net.name.clone()).collect(),
        instances,
        parameters: module.parameters.clone(),
        pattern_origin: None,
    }
}

fn project_device(graph: &AtomizedProgramGraph, file_id: &str, symbol: &str) -> Result<Device, Diagnostic> {
    let device = graph.device_by_symbol(file_id, symbol).ok_or_else(|| {
        Diagnostic::error("EMIT-005", format!("device '{symbol}' disappeared during lowering"))
    })?;
    let templates = graph
        .registries
        .backend_templates
        .get(&(file_id.to_owned(), symbol.to_owned()))
        .ok_or_else(|| {
            Diagnostic::error(
                "EMIT-005",
                format!("no backend template registry entry for device '{symbol}'"),
            )
        })?;

    let mut backends = IndexMap::new();
    for (backend_name, template) in templates {
        backends.insert(
            backend_name.clone(),
            Backend {
                name: backend_name.clone(),
                template: template.clone(),
                placeholders: extract_placeholders(template),
            },
        );
    }
    Ok(Device {
        name: device.symbol.clone(),
        ports: device.ports.clone(),
        backends,
        parameters: device.parameters.clone(),
    })
}
