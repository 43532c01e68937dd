//! Read-only query projections with frozen v0 JSON shapes.
//!
//! Envelope: `{schema_version: 1, kind, payload}` with
//! `kind ∈ {"query.tree", "query.bindings"}`. Payload field order is fixed
//! and, for identical inputs, the serialized envelope is byte-identical
//! across runs.

use ahash::AHashMap;
use serde_json::json;

use crate::{
    atomize::{AtomizedModule, AtomizedProgramGraph},
    netlist::RealizedNames,
    traverse::{ModuleTarget, select_module, traverse_hierarchy},
    viewbind::ViewBinding,
};

/// Builds the `query.tree` envelope.
///
/// Rows come from the shared traversal with devices included, in DFS-pre
/// order. `resolved` is null until a view binding is supplied; `emitted` is
/// null until realized names are supplied.
pub fn query_tree(
    graph: &AtomizedProgramGraph,
    top: &AtomizedModule,
    binding: Option<&ViewBinding>,
    realized: Option<&RealizedNames>,
) -> serde_json::Value {
    // (path, instance) -> resolved symbol from the binding rows
    let resolved_by_key: AHashMap<(&str, &str), &str> = binding
        .map(|binding| {
            binding
                .entries
                .iter()
                .map(|entry| ((entry.path.as_str(), entry.instance.as_str()), entry.resolved.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let walked = traverse_hierarchy(graph, top, true);
    let mut payload = vec![];
    for entry in &walked.entries {
        let resolved = resolved_by_key.get(&(entry.path.as_str(), entry.instance.as_str())).copied();
        let emitted = realized.and_then(|realized| {
            let symbol = resolved.unwrap_or(entry.module_symbol.as_str());
            match select_module(graph, &entry.ref_file_id, symbol) {
                Some(ModuleTarget::Module(target)) => realized
                    .get(&(target.file_id.clone(), target.symbol.clone()))
                    .map(String::as_str),
                // devices emit under their own symbol
                Some(ModuleTarget::Device(_)) => Some(entry.module_symbol.as_str()),
                None => None,
            }
        });
        payload.push(json!({
            "path": entry.path,
            "instance": entry.instance,
            "authored_ref": entry.module_symbol,
            "resolved": resolved,
            "emitted": emitted,
        }));
    }

    json!({
        "schema_version": 1,
        "kind": "query.tree",
        "payload": payload,
    })
}

/// Builds the `query.bindings` envelope: rows sorted by `(path, instance)`.
pub fn query_bindings(binding: &ViewBinding) -> serde_json::Value {
    let mut rows: Vec<&crate::viewbind::ResolvedViewBindingEntry> = binding.entries.iter().collect();
    rows.sort_by(|a, b| (&a.path, &a.instance).cmp(&(&b.path, &b.instance)));

    let payload: Vec<serde_json::Value> = rows
        .iter()
        .map(|entry| {
            json!({
                "path": entry.path,
                "instance": entry.instance,
                "authored_ref": entry.authored,
                "resolved": entry.resolved,
                "rule_id": entry.rule_id,
            })
        })
        .collect();

    json!({
        "schema_version": 1,
        "kind": "query.bindings",
        "payload": payload,
    })
}
