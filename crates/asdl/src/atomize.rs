//! PatternedGraph → AtomizedProgramGraph: every pattern expression is
//! expanded to literal atoms, endpoint bindings are resolved, and module
//! variables are substituted into instance parameter values.
//!
//! The transform is pure. Cascade suppression applies throughout: when
//! expansion errors on an instance or net, dependent endpoint and parameter
//! diagnostics for that entity are skipped.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    diagnostics::{Diagnostic, SourceSpan},
    graph::{DeviceDef, ProgramGraph, Registries, StableId},
    pattern::{BindError, ExpandError, ExpandedAtom, SuffixPart, bind_atoms, expand_atoms, split_endpoint},
    resolver::FileId,
};

/// Provenance of one literal atom: the expression it came from and its
/// position inside that expression's expansion.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AtomizedPatternOrigin {
    pub expr: StableId,
    pub segment_index: u32,
    pub atom_index: u32,
    pub base_name: String,
    pub parts: SmallVec<[SuffixPart; 4]>,
}

impl AtomizedPatternOrigin {
    fn from_atom(expr: StableId, atom: &ExpandedAtom) -> Self {
        Self {
            expr,
            segment_index: atom.segment_index,
            atom_index: atom.atom_index,
            base_name: atom.base_name.clone(),
            parts: atom.parts.clone(),
        }
    }
}

/// A net flattened to a single literal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomizedNet {
    pub name: String,
    pub is_port: bool,
    pub origin: AtomizedPatternOrigin,
    /// Upstream [`crate::graph::NetBundle`] this atom came from.
    pub net_id: StableId,
}

/// An instance flattened to a single literal name with literal parameter
/// values and pin connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomizedInstance {
    pub name: String,
    /// Target symbol; view binding may rewrite this before NetlistIR
    /// projection.
    pub ref_symbol: String,
    pub ref_file_id: FileId,
    /// pin → net literal name.
    pub conns: IndexMap<String, String>,
    pub parameters: IndexMap<String, String>,
    pub origin: AtomizedPatternOrigin,
    pub instance_id: StableId,
}

/// One module with all patterns flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomizedModule {
    pub id: StableId,
    pub symbol: String,
    pub file_id: FileId,
    /// Literal port net names in port order.
    pub ports: Vec<String>,
    pub parameters: IndexMap<String, String>,
    pub variables: IndexMap<String, String>,
    pub nets: Vec<AtomizedNet>,
    pub instances: Vec<AtomizedInstance>,
}

/// The fully flattened program. Upstream registries are retained so
/// NetlistIR lowering can reconstruct provenance and backend templates.
#[derive(Debug, Default)]
pub struct AtomizedProgramGraph {
    pub entry: FileId,
    pub modules: Vec<AtomizedModule>,
    pub devices: Vec<DeviceDef>,
    pub registries: Registries,
    pub tops: AHashMap<FileId, String>,
}

impl AtomizedProgramGraph {
    pub fn module_by_symbol(&self, file_id: &str, symbol: &str) -> Option<&AtomizedModule> {
        self.modules
            .iter()
            .find(|module| module.file_id == file_id && module.symbol == symbol)
    }

    pub fn device_by_symbol(&self, file_id: &str, symbol: &str) -> Option<&DeviceDef> {
        self.devices
            .iter()
            .find(|device| device.file_id == file_id && device.symbol == symbol)
    }
}

/// Module-variable substitution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VarError {
    Undefined(String),
    Recursive(String),
}

/// Replaces `{var}` tokens from the module's `parameters` map, depth-first.
/// Braces that do not wrap an identifier pass through verbatim.
fn substitute_vars(
    text: &str,
    table: &IndexMap<String, String>,
    active: &mut Vec<String>,
) -> Result<String, VarError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        if crate::ast::is_identifier(name) {
            if active.iter().any(|seen| seen == name) {
                return Err(VarError::Recursive(name.to_owned()));
            }
            let value = table.get(name).ok_or_else(|| VarError::Undefined(name.to_owned()))?;
            active.push(name.to_owned());
            let substituted = substitute_vars(value, table, active)?;
            active.pop();
            out.push_str(&substituted);
        } else {
            out.push('{');
            out.push_str(name);
            out.push('}');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Runs atomization over the whole program.
pub fn atomize(graph: &ProgramGraph) -> (AtomizedProgramGraph, Vec<Diagnostic>) {
    let mut diags = vec![];
    let mut atomizer = Atomizer { graph, diags: &mut diags };
    let modules = graph
        .modules
        .iter()
        .map(|module| atomizer.atomize_module(module))
        .collect();

    let out = AtomizedProgramGraph {
        entry: graph.entry.clone(),
        modules,
        devices: graph.devices.clone(),
        registries: clone_registries(&graph.registries),
        tops: graph.tops.clone(),
    };
    debug!(modules = out.modules.len(), "atomization complete");
    (out, diags)
}

fn clone_registries(registries: &Registries) -> Registries {
    Registries {
        exprs: registries.exprs.clone(),
        expr_kinds: registries.expr_kinds.clone(),
        spans: registries.spans.clone(),
        backend_templates: registries.backend_templates.clone(),
        schematic_hints: registries.schematic_hints.clone(),
    }
}

struct Atomizer<'a> {
    graph: &'a ProgramGraph,
    diags: &'a mut Vec<Diagnostic>,
}

impl Atomizer<'_> {
    fn expand_registered(&mut self, expr_id: StableId) -> Option<Vec<ExpandedAtom>> {
        let registered = self.graph.registries.expr(expr_id);
        match expand_atoms(&registered.expr) {
            Ok(atoms) => Some(atoms),
            Err(err @ ExpandError::TooLarge { .. }) => {
                self.diags
                    .push(Diagnostic::error("IR-007", err.to_string()).with_span(registered.span.clone()));
                None
            }
            Err(err @ ExpandError::UnsubstitutedRef { .. }) => {
                self.diags
                    .push(Diagnostic::error("IR-002", err.to_string()).with_span(registered.span.clone()));
                None
            }
        }
    }

    fn span_of_expr(&self, expr_id: StableId) -> Option<SourceSpan> {
        self.graph.registries.expr(expr_id).span.clone()
    }

    fn atomize_module(&mut self, module: &crate::graph::ModuleGraph) -> AtomizedModule {
        let mut out = AtomizedModule {
            id: module.id,
            symbol: module.symbol.clone(),
            file_id: module.file_id.clone(),
            ports: vec![],
            parameters: module.parameters.clone(),
            variables: module.variables.clone(),
            nets: vec![],
            instances: vec![],
        };

        // net expansion, with literal-collision suppression
        let mut net_expansions: AHashMap<StableId, Vec<ExpandedAtom>> = AHashMap::new();
        let mut seen_net_names: AHashSet<String> = AHashSet::new();
        let mut failed_nets: AHashSet<StableId> = AHashSet::new();
        for net_id in module.nets.iter().copied() {
            let net = self.graph.net(net_id);
            let Some(atoms) = self.expand_registered(net.name_expr) else {
                failed_nets.insert(net_id);
                continue;
            };
            for atom in &atoms {
                if !seen_net_names.insert(atom.text.clone()) {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-014",
                            format!("net name '{}' collides with an earlier atom in module '{}'", atom.text, module.symbol),
                        )
                        .with_span(self.span_of_expr(net.name_expr)),
                    );
                    continue;
                }
                out.nets.push(AtomizedNet {
                    name: atom.text.clone(),
                    is_port: net.is_port,
                    origin: AtomizedPatternOrigin::from_atom(net.name_expr, atom),
                    net_id,
                });
            }
            net_expansions.insert(net_id, atoms);
        }

        // port order follows the patterned port list, flattened
        for net_id in &module.ports {
            if let Some(atoms) = net_expansions.get(net_id) {
                for atom in atoms {
                    out.ports.push(atom.text.clone());
                }
            }
        }

        // instance expansion with parameter substitution
        let mut instance_index: AHashMap<String, usize> = AHashMap::new();
        let mut failed_instances: AHashSet<StableId> = AHashSet::new();
        for instance_id in module.instances.iter().copied() {
            let instance = self.graph.instance(instance_id);
            let Some(atoms) = self.expand_registered(instance.name_expr) else {
                failed_instances.insert(instance_id);
                continue;
            };
            let parameters = self.expand_parameters(module, instance, atoms.len());
            let Some(parameters) = parameters else {
                failed_instances.insert(instance_id);
                continue;
            };
            for (position, atom) in atoms.iter().enumerate() {
                if instance_index.contains_key(&atom.text) {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-014",
                            format!(
                                "instance name '{}' collides with an earlier atom in module '{}'",
                                atom.text, module.symbol
                            ),
                        )
                        .with_span(self.span_of_expr(instance.name_expr)),
                    );
                    continue;
                }
                let mut atom_parameters = IndexMap::new();
                for (name, values) in &parameters {
                    let value = if values.len() == 1 { &values[0] } else { &values[position] };
                    atom_parameters.insert(name.clone(), value.clone());
                }
                instance_index.insert(atom.text.clone(), out.instances.len());
                out.instances.push(AtomizedInstance {
                    name: atom.text.clone(),
                    ref_symbol: instance.ref_symbol.clone(),
                    ref_file_id: instance.ref_file_id.clone(),
                    conns: IndexMap::new(),
                    parameters: atom_parameters,
                    origin: AtomizedPatternOrigin::from_atom(instance.name_expr, atom),
                    instance_id,
                });
            }
        }

        // endpoint binding
        for net_id in module.nets.iter().copied() {
            if failed_nets.contains(&net_id) {
                continue;
            }
            let net = self.graph.net(net_id);
            let net_atoms = &net_expansions[&net_id];
            let net_expr = &self.graph.registries.expr(net.name_expr).expr;
            let net_single = !net_expr.has_splice();

            for endpoint_id in net.endpoints.iter().copied() {
                let endpoint = self.graph.endpoint(endpoint_id);
                let Some(endpoint_atoms) = self.expand_registered(endpoint.port_expr) else {
                    continue;
                };
                let endpoint_expr = &self.graph.registries.expr(endpoint.port_expr).expr;
                let endpoint_single = !endpoint_expr.has_splice();
                let endpoint_span = self.span_of_expr(endpoint.port_expr);

                let pairs = match bind_atoms(net_atoms, net_single, &endpoint_atoms, endpoint_single) {
                    Ok(pairs) => pairs,
                    Err(err @ BindError::LengthMismatch { .. }) => {
                        self.diags.push(
                            Diagnostic::error("IR-005", format!("endpoint '{}': {err}", endpoint_expr.text))
                                .with_span(endpoint_span)
                                .with_note(self.span_of_expr(net.name_expr), "net declared here"),
                        );
                        continue;
                    }
                    Err(err @ (BindError::AxisLength { .. } | BindError::AxisOrder { .. })) => {
                        self.diags.push(
                            Diagnostic::error("IR-006", format!("endpoint '{}': {err}", endpoint_expr.text))
                                .with_span(endpoint_span)
                                .with_note(self.span_of_expr(net.name_expr), "net declared here"),
                        );
                        continue;
                    }
                };

                for (net_pos, endpoint_pos) in pairs {
                    let net_name = &net_atoms[net_pos].text;
                    let endpoint_atom = &endpoint_atoms[endpoint_pos];
                    let Some((instance_name, pin)) = split_endpoint(&endpoint_atom.text) else {
                        self.diags.push(
                            Diagnostic::error(
                                "IR-004",
                                format!("endpoint atom '{}' is not of the form 'instance.pin'", endpoint_atom.text),
                            )
                            .with_span(endpoint_span.clone()),
                        );
                        continue;
                    };
                    let Some(&slot) = instance_index.get(instance_name) else {
                        // suppressed when the instance failed to expand
                        if !self.instance_failed(module, &failed_instances, instance_name) {
                            self.diags.push(
                                Diagnostic::error(
                                    "IR-004",
                                    format!(
                                        "endpoint '{}' references unknown instance '{instance_name}'",
                                        endpoint_atom.text
                                    ),
                                )
                                .with_span(endpoint_span.clone()),
                            );
                        }
                        continue;
                    };
                    let conns = &mut out.instances[slot].conns;
                    match conns.get(pin) {
                        Some(existing) if existing == net_name => {}
                        Some(existing) => self.diags.push(
                            Diagnostic::error(
                                "IR-008",
                                format!(
                                    "pin '{pin}' of instance '{instance_name}' binds both '{existing}' and '{net_name}'"
                                ),
                            )
                            .with_span(endpoint_span.clone()),
                        ),
                        None => {
                            conns.insert(pin.to_owned(), net_name.clone());
                        }
                    }
                }
            }
        }

        out
    }

    /// True when `instance_name` plausibly belongs to an instance whose
    /// expansion already failed, in which case dependent diagnostics are
    /// suppressed to avoid cascades.
    fn instance_failed(
        &self,
        module: &crate::graph::ModuleGraph,
        failed: &AHashSet<StableId>,
        instance_name: &str,
    ) -> bool {
        module.instances.iter().any(|instance_id| {
            failed.contains(instance_id) && {
                let expr = &self.graph.registries.expr(self.graph.instance(*instance_id).name_expr).expr;
                instance_name.starts_with(
                    expr.segments
                        .first()
                        .and_then(|segment| segment.parts.first())
                        .and_then(|part| match part {
                            crate::pattern::SegmentPart::Literal(text) => Some(text.as_str()),
                            crate::pattern::SegmentPart::Group(_) => None,
                        })
                        .unwrap_or(""),
                )
            }
        })
    }

    /// Substitutes module variables into every parameter value, re-parses,
    /// and expands. Returns per-parameter value lists: a single entry
    /// broadcasts, otherwise the length matches `instance_len`.
    fn expand_parameters(
        &mut self,
        module: &crate::graph::ModuleGraph,
        instance: &crate::graph::InstanceBundle,
        instance_len: usize,
    ) -> Option<IndexMap<String, Vec<String>>> {
        let mut out = IndexMap::new();
        let mut ok = true;
        for (name, expr_id) in &instance.param_exprs {
            let registered = self.graph.registries.expr(*expr_id);
            let span = registered.span.clone();
            let raw = registered.expr.text.clone();

            let substituted = match substitute_vars(&raw, &module.parameters, &mut vec![]) {
                Ok(text) => text,
                Err(VarError::Undefined(variable)) => {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-012",
                            format!("undefined module variable '{variable}' in parameter '{name}'"),
                        )
                        .with_span(span),
                    );
                    ok = false;
                    continue;
                }
                Err(VarError::Recursive(variable)) => {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-013",
                            format!("module variable '{variable}' recursively references itself"),
                        )
                        .with_span(span),
                    );
                    ok = false;
                    continue;
                }
            };

            let parsed = match crate::pattern::parse_pattern(&substituted) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-020",
                            format!("parameter '{name}' after substitution ('{substituted}'): {}", err.message),
                        )
                        .with_span(span),
                    );
                    ok = false;
                    continue;
                }
            };
            let atoms = match expand_atoms(&parsed) {
                Ok(atoms) => atoms,
                Err(err) => {
                    self.diags
                        .push(Diagnostic::error("IR-007", format!("parameter '{name}': {err}")).with_span(span));
                    ok = false;
                    continue;
                }
            };
            if atoms.len() != 1 && atoms.len() != instance_len {
                self.diags.push(
                    Diagnostic::error(
                        "IR-009",
                        format!(
                            "parameter '{name}' expands to {} values but the instance expands to {instance_len}",
                            atoms.len()
                        ),
                    )
                    .with_span(span),
                );
                ok = false;
                continue;
            }
            out.insert(name.clone(), atoms.into_iter().map(|atom| atom.text).collect());
        }
        ok.then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn variable_substitution_is_textual_and_nested() {
        let vars = table(&[("L", "0.2u"), ("WL", "w{L}")]);
        assert_eq!(substitute_vars("L={L}", &vars, &mut vec![]).unwrap(), "L=0.2u");
        assert_eq!(substitute_vars("{WL}", &vars, &mut vec![]).unwrap(), "w0.2u");
    }

    #[test]
    fn undefined_variable_is_reported_by_name() {
        let err = substitute_vars("{MISSING}", &table(&[]), &mut vec![]).unwrap_err();
        assert_eq!(err, VarError::Undefined("MISSING".to_owned()));
    }

    #[test]
    fn recursive_variable_is_detected() {
        let vars = table(&[("A", "{B}"), ("B", "{A}")]);
        let err = substitute_vars("{A}", &vars, &mut vec![]).unwrap_err();
        assert!(matches!(err, VarError::Recursive(_)));
    }

    #[test]
    fn non_identifier_braces_pass_through() {
        let vars = table(&[]);
        assert_eq!(substitute_vars("a{1,2}b", &vars, &mut vec![]).unwrap(), "a{1,2}b");
        assert_eq!(substitute_vars("open{", &vars, &mut vec![]).unwrap(), "open{");
    }
}
