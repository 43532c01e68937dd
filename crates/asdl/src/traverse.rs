//! The single hierarchy walker.
//!
//! View binding, query, emission, and reachability all depend on this one
//! DFS-preorder implementation and on the centralized module-selection and
//! top-resolution policies; nothing else in the crate walks the hierarchy.

use crate::{
    atomize::{AtomizedModule, AtomizedProgramGraph},
    diagnostics::Diagnostic,
    graph::DeviceDef,
};

/// Hierarchy path separator. Paths address fully flattened instances, e.g.
/// `row0.cell3`.
pub const PATH_SEPARATOR: char = '.';

/// Top-module inference policy.
///
/// `Strict` (emission) demands an explicit `top` or exactly one module in
/// the entry file and reports `EMIT-001` otherwise; `Permissive`
/// (traversal/query) degrades to walk notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TopPolicy {
    Strict,
    Permissive,
}

/// What an instance reference resolved to.
#[derive(Debug, Clone, Copy)]
pub enum ModuleTarget<'a> {
    Module(&'a AtomizedModule),
    Device(&'a DeviceDef),
}

/// Centralized module selection.
///
/// Order: exact `(file_id, symbol)` match (module, then device); same-cell
/// match within the file (unique winner, else last declared); exact symbol
/// anywhere in the program (unique winner, else last declared). Every
/// consumer of instance references resolves through here.
pub fn select_module<'a>(graph: &'a AtomizedProgramGraph, file_id: &str, symbol: &str) -> Option<ModuleTarget<'a>> {
    if let Some(module) = graph.module_by_symbol(file_id, symbol) {
        return Some(ModuleTarget::Module(module));
    }
    if let Some(device) = graph.device_by_symbol(file_id, symbol) {
        return Some(ModuleTarget::Device(device));
    }

    if !symbol.contains('@') {
        let in_file: Vec<&AtomizedModule> = graph
            .modules
            .iter()
            .filter(|module| {
                module.file_id == file_id && module.symbol.split('@').next() == Some(symbol)
            })
            .collect();
        if let Some(module) = in_file.last().copied() {
            return Some(ModuleTarget::Module(module));
        }
        if let Some(device) = graph
            .devices
            .iter()
            .filter(|device| device.file_id == file_id && device.symbol == symbol)
            .next_back()
        {
            return Some(ModuleTarget::Device(device));
        }
    }

    let anywhere: Vec<&AtomizedModule> = graph.modules.iter().filter(|module| module.symbol == symbol).collect();
    anywhere.last().copied().map(ModuleTarget::Module)
}

/// One row of the hierarchy index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalEntry {
    /// Parent path, empty for instances of the top module.
    pub path: String,
    /// Instance leaf name.
    pub instance: String,
    /// Authored target symbol of the instance.
    pub module_symbol: String,
    /// File the target resolved into.
    pub ref_file_id: String,
    /// True when the target is a device rather than a module.
    pub is_device: bool,
    /// Identity of the module this instance belongs to.
    pub parent_file_id: String,
    pub parent_symbol: String,
}

impl TraversalEntry {
    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.instance.clone()
        } else {
            format!("{}{PATH_SEPARATOR}{}", self.path, self.instance)
        }
    }
}

/// Result of a hierarchy walk: DFS-pre entries plus walk-level notes
/// (cycles, unresolved references). Notes are not diagnostics; they never
/// gate anything.
#[derive(Debug, Default)]
pub struct Traversal {
    pub entries: Vec<TraversalEntry>,
    pub notes: Vec<String>,
}

/// Deterministic DFS-preorder walk from `top`.
///
/// Cycle stop is ancestry-based: when a module already occurs on the
/// root-to-here path, a walk note is recorded and the walker does not
/// descend. With `include_devices` false the index holds module entries
/// only (the shape view binding matches rules against).
pub fn traverse_hierarchy(graph: &AtomizedProgramGraph, top: &AtomizedModule, include_devices: bool) -> Traversal {
    let mut traversal = Traversal::default();
    let mut ancestry = vec![(top.file_id.clone(), top.symbol.clone())];
    walk(graph, top, "", include_devices, &mut ancestry, &mut traversal);
    traversal
}

fn walk(
    graph: &AtomizedProgramGraph,
    module: &AtomizedModule,
    path: &str,
    include_devices: bool,
    ancestry: &mut Vec<(String, String)>,
    traversal: &mut Traversal,
) {
    for instance in &module.instances {
        let full_path = if path.is_empty() {
            instance.name.clone()
        } else {
            format!("{path}{PATH_SEPARATOR}{}", instance.name)
        };
        match select_module(graph, &instance.ref_file_id, &instance.ref_symbol) {
            Some(ModuleTarget::Device(_)) => {
                if include_devices {
                    traversal.entries.push(TraversalEntry {
                        path: path.to_owned(),
                        instance: instance.name.clone(),
                        module_symbol: instance.ref_symbol.clone(),
                        ref_file_id: instance.ref_file_id.clone(),
                        is_device: true,
                        parent_file_id: module.file_id.clone(),
                        parent_symbol: module.symbol.clone(),
                    });
                }
            }
            Some(ModuleTarget::Module(target)) => {
                traversal.entries.push(TraversalEntry {
                    path: path.to_owned(),
                    instance: instance.name.clone(),
                    module_symbol: instance.ref_symbol.clone(),
                    ref_file_id: instance.ref_file_id.clone(),
                    is_device: false,
                    parent_file_id: module.file_id.clone(),
                    parent_symbol: module.symbol.clone(),
                });
                let key = (target.file_id.clone(), target.symbol.clone());
                if ancestry.contains(&key) {
                    traversal
                        .notes
                        .push(format!("cycle through '{}' at '{full_path}'; not descending", target.symbol));
                    continue;
                }
                ancestry.push(key);
                walk(graph, target, &full_path, include_devices, ancestry, traversal);
                ancestry.pop();
            }
            None => {
                traversal
                    .notes
                    .push(format!("unresolved reference '{}' at '{full_path}'", instance.ref_symbol));
            }
        }
    }
}

/// Centralized top-module inference.
///
/// An explicit `top` always wins. Without one, `Strict` demands exactly one
/// module defined in the entry file (otherwise `EMIT-001`); `Permissive`
/// falls back to the unique module or reports the ambiguity as a walk note
/// and returns nothing.
pub fn resolve_top_module<'a>(
    graph: &'a AtomizedProgramGraph,
    policy: TopPolicy,
) -> (Option<&'a AtomizedModule>, Vec<Diagnostic>, Vec<String>) {
    let mut notes = vec![];
    let entry = graph.entry.clone();

    if let Some(symbol) = graph.tops.get(&entry) {
        match select_module(graph, &entry, symbol) {
            Some(ModuleTarget::Module(module)) if module.file_id == entry => {
                return (Some(module), vec![], notes);
            }
            _ => {
                let diag = Diagnostic::error(
                    "EMIT-001",
                    format!("declared top '{symbol}' does not name a module in the entry file"),
                );
                return match policy {
                    TopPolicy::Strict => (None, vec![diag], notes),
                    TopPolicy::Permissive => {
                        notes.push(diag.message);
                        (None, vec![], notes)
                    }
                };
            }
        }
    }

    let entry_modules: Vec<&AtomizedModule> = graph.modules.iter().filter(|module| module.file_id == entry).collect();
    match entry_modules.as_slice() {
        [only] => (Some(*only), vec![], notes),
        [] => {
            let diag = Diagnostic::error("EMIT-001", "the entry file defines no modules");
            match policy {
                TopPolicy::Strict => (None, vec![diag], notes),
                TopPolicy::Permissive => {
                    notes.push(diag.message);
                    (None, vec![], notes)
                }
            }
        }
        many => {
            let symbols: Vec<&str> = many.iter().map(|module| module.symbol.as_str()).collect();
            let message = format!(
                "no explicit top and the entry file defines {} modules ({}); declare `top`",
                many.len(),
                symbols.join(", ")
            );
            match policy {
                TopPolicy::Strict => (None, vec![Diagnostic::error("EMIT-001", message)], notes),
                TopPolicy::Permissive => {
                    notes.push(message);
                    (None, vec![], notes)
                }
            }
        }
    }
}
