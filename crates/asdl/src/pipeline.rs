//! End-to-end compilation driver.
//!
//! Stages run in order — parse/resolve → graph build → atomize → (verify) →
//! (view bind) → netlist lowering → emission — each gated on the absence of
//! error-severity diagnostics from earlier stages. Warnings pass through.
//! Environment variables are read once into an [`EnvSnapshot`] at entry and
//! never mutated.

use std::path::PathBuf;

use tracing::info_span;

use crate::{
    atomize::{AtomizedProgramGraph, atomize},
    backend::{BackendConfig, emit_netlist},
    build::build_graph,
    diagnostics::{Diagnostic, has_errors},
    dump::{render_atomized, render_patterned},
    netlist::{Design, RealizedNames, lower_netlist},
    resolver::{resolve_program, split_lib_path},
    traverse::{TopPolicy, resolve_top_module},
    verify::verify_atomized,
    viewbind::{ViewBinding, apply_bindings, bind_views, load_view_config},
};

/// Immutable snapshot of the environment, taken once at pipeline entry.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    pub lib_path: Vec<PathBuf>,
    pub backend_config: Option<PathBuf>,
}

impl EnvSnapshot {
    /// Reads `ASDL_LIB_PATH` and `ASDL_BACKEND_CONFIG`.
    pub fn capture() -> Self {
        Self {
            lib_path: std::env::var("ASDL_LIB_PATH")
                .map(|value| split_lib_path(&value))
                .unwrap_or_default(),
            backend_config: std::env::var("ASDL_BACKEND_CONFIG").ok().map(PathBuf::from),
        }
    }
}

/// Intermediate stages a caller can ask to have rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DumpStage {
    Patterned,
    Atomized,
}

/// Everything the driver needs for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub entry: PathBuf,
    /// CLI-supplied library roots, searched before `ASDL_LIB_PATH` entries.
    pub lib_roots: Vec<PathBuf>,
    pub backend_config: Option<PathBuf>,
    /// Backend name selecting device templates, e.g. `ngspice`.
    pub backend: String,
    pub view_config: Option<PathBuf>,
    pub view_profile: Option<String>,
    pub top_as_subckt: bool,
    /// Post-atomization integrity verification. Dumps are produced even
    /// when this is off.
    pub verify: bool,
    pub dumps: Vec<DumpStage>,
}

impl CompileOptions {
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Self {
            entry: entry.into(),
            lib_roots: vec![],
            backend_config: None,
            backend: "ngspice".to_owned(),
            view_config: None,
            view_profile: None,
            top_as_subckt: false,
            verify: true,
            dumps: vec![],
        }
    }
}

/// Result of one pipeline run. Later-stage fields stay `None` when an
/// earlier stage gated.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub atomized: Option<AtomizedProgramGraph>,
    pub binding: Option<ViewBinding>,
    pub design: Option<Design>,
    pub realized: Option<RealizedNames>,
    pub netlist: Option<String>,
    /// Output filename suffix from the backend config.
    pub extension: Option<String>,
    pub dumps: Vec<(DumpStage, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn succeeded(&self) -> bool {
        !has_errors(&self.diagnostics)
    }
}

/// Runs the pipeline.
pub fn compile(options: &CompileOptions, env: &EnvSnapshot) -> CompileOutput {
    let mut out = CompileOutput::default();

    let mut lib_roots = options.lib_roots.clone();
    lib_roots.extend(env.lib_path.iter().cloned());

    let resolved = {
        let _span = info_span!("resolve").entered();
        let (resolved, mut diags) = resolve_program(&options.entry, &lib_roots);
        out.diagnostics.append(&mut diags);
        resolved
    };
    let Some(resolved) = resolved else { return out };
    if has_errors(&out.diagnostics) {
        return out;
    }

    let graph = {
        let _span = info_span!("build_graph").entered();
        let (graph, mut diags) = build_graph(&resolved);
        out.diagnostics.append(&mut diags);
        graph
    };
    if options.dumps.contains(&DumpStage::Patterned) {
        out.dumps.push((DumpStage::Patterned, render_patterned(&graph)));
    }
    if has_errors(&out.diagnostics) {
        return out;
    }

    let mut atomized = {
        let _span = info_span!("atomize").entered();
        let (atomized, mut diags) = atomize(&graph);
        out.diagnostics.append(&mut diags);
        atomized
    };
    if options.dumps.contains(&DumpStage::Atomized) {
        out.dumps.push((DumpStage::Atomized, render_atomized(&atomized)));
    }
    if has_errors(&out.diagnostics) {
        out.atomized = Some(atomized);
        return out;
    }

    // the verifier is gated on a clean atomization
    if options.verify {
        let mut diags = verify_atomized(&atomized);
        out.diagnostics.append(&mut diags);
        if has_errors(&out.diagnostics) {
            out.atomized = Some(atomized);
            return out;
        }
    }

    // view binding runs before projection when a config + profile is given
    if let (Some(config_path), Some(profile)) = (&options.view_config, &options.view_profile) {
        let _span = info_span!("bind_views").entered();
        let config_text = match std::fs::read_to_string(config_path) {
            Ok(text) => text,
            Err(err) => {
                out.diagnostics.push(Diagnostic::error(
                    "VIEW-005",
                    format!("cannot read view config '{}': {err}", config_path.display()),
                ));
                out.atomized = Some(atomized);
                return out;
            }
        };
        let config = match load_view_config(&config_text) {
            Ok(config) => config,
            Err(diag) => {
                out.diagnostics.push(diag);
                out.atomized = Some(atomized);
                return out;
            }
        };
        let (top, mut top_diags, _) = resolve_top_module(&atomized, TopPolicy::Strict);
        out.diagnostics.append(&mut top_diags);
        let Some(top) = top else {
            out.atomized = Some(atomized);
            return out;
        };
        let top = top.clone();
        let (binding, mut diags) = bind_views(&atomized, &config, profile, &top);
        out.diagnostics.append(&mut diags);
        if has_errors(&out.diagnostics) {
            out.binding = Some(binding);
            out.atomized = Some(atomized);
            return out;
        }
        let mut diags = apply_bindings(&mut atomized, &binding);
        out.diagnostics.append(&mut diags);
        out.binding = Some(binding);
        if has_errors(&out.diagnostics) {
            out.atomized = Some(atomized);
            return out;
        }
    }

    let lowered = {
        let _span = info_span!("lower").entered();
        let (top, mut top_diags, _) = resolve_top_module(&atomized, TopPolicy::Strict);
        out.diagnostics.append(&mut top_diags);
        match top {
            Some(top) => {
                let top = top.clone();
                let (lowered, mut diags) = lower_netlist(&atomized, &top);
                out.diagnostics.append(&mut diags);
                lowered
            }
            None => None,
        }
    };
    out.atomized = Some(atomized);
    let Some((design, realized)) = lowered else { return out };
    out.realized = Some(realized);

    let backend_config_path = options.backend_config.clone().or_else(|| env.backend_config.clone());
    if let Some(config_path) = backend_config_path {
        let _span = info_span!("emit").entered();
        let config_text = match std::fs::read_to_string(&config_path) {
            Ok(text) => text,
            Err(err) => {
                out.diagnostics.push(Diagnostic::error(
                    "EMIT-006",
                    format!("cannot read backend config '{}': {err}", config_path.display()),
                ));
                out.design = Some(design);
                return out;
            }
        };
        match BackendConfig::load(&config_text) {
            Ok(config) => {
                let (netlist, mut diags) = emit_netlist(&design, &config, &options.backend, options.top_as_subckt);
                out.diagnostics.append(&mut diags);
                out.netlist = netlist;
                out.extension = Some(config.extension.clone());
            }
            Err(mut diags) => out.diagnostics.append(&mut diags),
        }
    }
    out.design = Some(design);
    out
}
