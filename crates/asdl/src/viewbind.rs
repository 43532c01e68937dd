//! View binding: baseline `view_order` selection plus ordered rule
//! overrides over the flattened hierarchy index.
//!
//! Runs after atomization (so rule `path` predicates address fully
//! flattened paths) and before NetlistIR projection. The resolved mapping
//! is always applied to downstream emission; the sidecar JSON is written
//! only on request.

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    atomize::AtomizedProgramGraph,
    diagnostics::Diagnostic,
    traverse::{PATH_SEPARATOR, TraversalEntry, traverse_hierarchy},
};

/// Match predicates of one override rule. Absent fields match everything;
/// an absent `path` restricts the rule to root scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuleMatch {
    pub path: Option<String>,
    pub instance: Option<String>,
    pub module: Option<String>,
}

/// One ordered override rule.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViewRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "match", default)]
    pub matcher: RuleMatch,
    pub bind: String,
}

/// One named profile: baseline preference order plus override rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViewProfile {
    pub view_order: Vec<String>,
    #[serde(default)]
    pub rules: Vec<ViewRule>,
}

/// A view configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViewConfig {
    pub profiles: IndexMap<String, ViewProfile>,
}

/// Loads a view configuration from YAML text. Shape errors are `VIEW-005`.
pub fn load_view_config(text: &str) -> Result<ViewConfig, Diagnostic> {
    serde_yaml::from_str(text).map_err(|err| Diagnostic::error("VIEW-005", format!("malformed view config: {err}")))
}

/// One resolved row, in hierarchy-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedViewBindingEntry {
    /// Parent path ("" for instances of the top module).
    pub path: String,
    pub instance: String,
    /// Authored target symbol before binding.
    pub authored: String,
    /// Selected module symbol after baseline + overrides.
    pub resolved: String,
    /// `id` of the winning rule, or `None` for baseline resolutions.
    pub rule_id: Option<String>,
}

impl ResolvedViewBindingEntry {
    fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.instance.clone()
        } else {
            format!("{}{PATH_SEPARATOR}{}", self.path, self.instance)
        }
    }
}

/// The resolved binding: rows in index order plus the index rows they were
/// derived from, aligned one-to-one for application.
#[derive(Debug, Default)]
pub struct ViewBinding {
    pub entries: Vec<ResolvedViewBindingEntry>,
    pub index: Vec<TraversalEntry>,
}

/// Resolves view bindings for every module instance reachable from `top`.
pub fn bind_views(
    graph: &AtomizedProgramGraph,
    config: &ViewConfig,
    profile_name: &str,
    top: &crate::atomize::AtomizedModule,
) -> (ViewBinding, Vec<Diagnostic>) {
    let mut diags = vec![];
    let Some(profile) = config.profiles.get(profile_name) else {
        diags.push(Diagnostic::error(
            "VIEW-001",
            format!("view profile '{profile_name}' is not defined in the view config"),
        ));
        return (ViewBinding::default(), diags);
    };

    let walked = traverse_hierarchy(graph, top, false);

    let mut binding = ViewBinding::default();
    for entry in &walked.entries {
        match resolve_baseline(graph, profile, entry) {
            Some(resolved) => {
                binding.entries.push(ResolvedViewBindingEntry {
                    path: entry.path.clone(),
                    instance: entry.instance.clone(),
                    authored: entry.module_symbol.clone(),
                    resolved,
                    rule_id: None,
                });
                binding.index.push(entry.clone());
            }
            None => {
                diags.push(Diagnostic::error(
                    "VIEW-002",
                    format!(
                        "no view in [{}] resolves '{}' for instance '{}'",
                        profile.view_order.join(", "),
                        entry.module_symbol,
                        entry.instance
                    ),
                ));
            }
        }
    }

    for (position, rule) in profile.rules.iter().enumerate() {
        let rule_id = rule.id.clone().unwrap_or_else(|| format!("rule{position}"));

        if let Some(path) = &rule.matcher.path {
            let exists = binding.entries.iter().any(|entry| &entry.full_path() == path);
            if !exists {
                diags.push(Diagnostic::error(
                    "VIEW-004",
                    format!("rule '{rule_id}' matches path '{path}', which names no indexed instance"),
                ));
                continue;
            }
        }

        for slot in 0..binding.entries.len() {
            if !rule_matches(&rule.matcher, &binding.entries[slot], &binding.index[slot]) {
                continue;
            }
            let target_file = &binding.index[slot].ref_file_id;
            if graph.module_by_symbol(target_file, &rule.bind).is_none() {
                diags.push(Diagnostic::error(
                    "VIEW-003",
                    format!("rule '{rule_id}' binds '{}', which names no module", rule.bind),
                ));
                continue;
            }
            binding.entries[slot].resolved = rule.bind.clone();
            binding.entries[slot].rule_id = Some(rule_id.clone());
        }
    }

    debug!(entries = binding.entries.len(), profile = profile_name, "view binding resolved");
    (binding, diags)
}

/// Baseline selection: an explicit authored view is kept; otherwise the
/// first view in `view_order` whose `cell@view` symbol exists wins, with
/// plain `cell` standing in for the `default` view.
fn resolve_baseline(graph: &AtomizedProgramGraph, profile: &ViewProfile, entry: &TraversalEntry) -> Option<String> {
    let authored = &entry.module_symbol;
    if authored.contains('@') {
        return graph
            .module_by_symbol(&entry.ref_file_id, authored)
            .map(|module| module.symbol.clone());
    }
    for view in &profile.view_order {
        let decorated = format!("{authored}@{view}");
        if graph.module_by_symbol(&entry.ref_file_id, &decorated).is_some() {
            return Some(decorated);
        }
        if view == "default" && graph.module_by_symbol(&entry.ref_file_id, authored).is_some() {
            return Some(authored.clone());
        }
    }
    None
}

fn rule_matches(matcher: &RuleMatch, entry: &ResolvedViewBindingEntry, index_entry: &TraversalEntry) -> bool {
    match &matcher.path {
        // no path predicate: root scope only
        None => {
            if !entry.path.is_empty() {
                return false;
            }
        }
        Some(path) => {
            let full = entry.full_path();
            let in_subtree = full == *path || full.starts_with(&format!("{path}{PATH_SEPARATOR}"));
            if !in_subtree {
                return false;
            }
        }
    }
    if let Some(instance) = &matcher.instance {
        if &entry.instance != instance {
            return false;
        }
    }
    if let Some(module) = &matcher.module {
        let authored = &index_entry.module_symbol;
        let cell = authored.split('@').next().unwrap_or(authored);
        if authored != module && cell != module {
            return false;
        }
    }
    true
}

/// Rewrites instance references in the graph to the resolved symbols.
///
/// Two hierarchy paths that share the same underlying instance (the parent
/// module is instantiated more than once) must agree on the resolution;
/// disagreement is reported as `VIEW-006` rather than silently realizing
/// one of the two.
pub fn apply_bindings(graph: &mut AtomizedProgramGraph, binding: &ViewBinding) -> Vec<Diagnostic> {
    let mut diags = vec![];
    // (parent file, parent symbol, instance leaf) -> resolved symbol
    let mut chosen: IndexMap<(String, String, String), (String, String)> = IndexMap::new();
    for (entry, index_entry) in binding.entries.iter().zip(&binding.index) {
        let key = (
            index_entry.parent_file_id.clone(),
            index_entry.parent_symbol.clone(),
            entry.instance.clone(),
        );
        match chosen.get(&key) {
            Some((existing, _)) if existing == &entry.resolved => {}
            Some((existing, first_path)) => diags.push(Diagnostic::error(
                "VIEW-006",
                format!(
                    "instance '{}' of module '{}' is bound to '{existing}' at '{first_path}' but '{}' at '{}'; \
                     shared instances must resolve to one view",
                    entry.instance,
                    index_entry.parent_symbol,
                    entry.resolved,
                    entry.full_path()
                ),
            )),
            None => {
                chosen.insert(key, (entry.resolved.clone(), entry.full_path()));
            }
        }
    }
    if !diags.is_empty() {
        return diags;
    }

    for ((parent_file, parent_symbol, instance_name), (resolved, _)) in chosen {
        let Some(module) = graph
            .modules
            .iter_mut()
            .find(|module| module.file_id == parent_file && module.symbol == parent_symbol)
        else {
            continue;
        };
        if let Some(instance) = module.instances.iter_mut().find(|instance| instance.name == instance_name) {
            instance.ref_symbol = resolved;
        }
    }
    diags
}

/// Serializes the sidecar JSON: `{schema_version: 1, profile, entries}`.
pub fn sidecar_json(profile: &str, entries: &[ResolvedViewBindingEntry]) -> serde_json::Value {
    serde_json::json!({
        "schema_version": 1,
        "profile": profile,
        "entries": entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "path": entry.path,
                    "instance": entry.instance,
                    "resolved": entry.resolved,
                    "rule_id": entry.rule_id,
                })
            })
            .collect::<Vec<_>>(),
    })
}
