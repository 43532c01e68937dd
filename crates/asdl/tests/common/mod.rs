//! Shared fixtures for the integration tests.
#![allow(dead_code, reason = "not every test binary uses every helper")]

use ahash::AHashMap;
use asdl::{
    AtomizedProgramGraph, BackendConfig, Diagnostic, NameEnv, ProgramDb, ResolvedProgram, atomize, build_graph,
    has_errors, parse_source,
};

pub const ENTRY: &str = "/virtual/entry.asdl";

/// A minimal ngspice-flavored backend config used across the emission tests.
pub const NGSPICE_CONFIG: &str = "\
extension: \".spice\"
comment_prefix: \"*\"
system_devices:
  __netlist_header__: \"* design {name}\"
  __netlist_footer__: \"* end\"
  __subckt_header__: \".subckt {name} {ports}\"
  __subckt_header_params__: \".subckt {name} {ports} PARAMS: {params}\"
  __subckt_footer__: \".ends\"
  __subckt_call__: \"X{name} {ports} {ref}\"
  __subckt_call_params__: \"X{name} {ports} {ref} PARAMS: {params}\"
";

/// Wraps one in-memory source as a resolved single-file program.
pub fn single_program(source: &str) -> ResolvedProgram {
    let (document, diags) = parse_source(source, ENTRY);
    assert!(!has_errors(&diags), "unexpected parse diagnostics: {diags:#?}");
    let document = document.expect("document parses");
    let schema = asdl::ast::validate_document(&document);
    assert!(!has_errors(&schema), "unexpected schema diagnostics: {schema:#?}");

    let mut db = ProgramDb::default();
    db.documents.insert(ENTRY.to_owned(), document);
    let mut envs = AHashMap::new();
    envs.insert(ENTRY.to_owned(), NameEnv::new());
    ResolvedProgram {
        db,
        envs,
        entry: ENTRY.to_owned(),
    }
}

/// Parse → build → atomize, returning the atomization diagnostics.
pub fn atomized(source: &str) -> (AtomizedProgramGraph, Vec<Diagnostic>) {
    let resolved = single_program(source);
    let (graph, diags) = build_graph(&resolved);
    assert!(!has_errors(&diags), "unexpected build diagnostics: {diags:#?}");
    atomize(&graph)
}

/// Parse → build, for tests asserting on builder diagnostics.
pub fn built(source: &str) -> Vec<Diagnostic> {
    let resolved = single_program(source);
    let (_, diags) = build_graph(&resolved);
    diags
}

/// Parse → build → atomize, asserting every stage is clean.
pub fn atomized_clean(source: &str) -> AtomizedProgramGraph {
    let (graph, diags) = atomized(source);
    assert!(!has_errors(&diags), "unexpected atomize diagnostics: {diags:#?}");
    graph
}

pub fn ngspice_config() -> BackendConfig {
    BackendConfig::load(NGSPICE_CONFIG).expect("fixture config is valid")
}

pub fn codes(diags: &[Diagnostic]) -> Vec<&str> {
    diags.iter().map(|diag| diag.code.as_str()).collect()
}
