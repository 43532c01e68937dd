#![doc = include_str!("../../../README.md")]

pub mod ast;
mod atomize;
mod backend;
mod build;
pub mod diagnostics;
mod dump;
mod graph;
mod netlist;
mod parse;
mod pattern;
mod pipeline;
mod query;
pub mod rcfile;
mod resolver;
mod traverse;
mod verify;
mod viewbind;

pub use crate::{
    atomize::{AtomizedInstance, AtomizedModule, AtomizedNet, AtomizedPatternOrigin, AtomizedProgramGraph, atomize},
    backend::{BackendConfig, REQUIRED_SYSTEM_DEVICES, emit_netlist, extract_placeholders},
    build::build_graph,
    diagnostics::{Diagnostic, NO_SPAN_NOTE, Note, Severity, SourceSpan, has_errors, sort_stable},
    dump::{render_atomized, render_patterned},
    graph::{
        DeviceDef, EndpointBundle, ExprKind, IdKind, InstanceBundle, ModuleGraph, NetBundle, ProgramGraph,
        RegisteredExpr, Registries, StableId,
    },
    netlist::{Backend, Design, Device, Instance, Module, RealizedNames, lower_netlist},
    parse::parse_source,
    pattern::{
        AxisCoord, BindError, ExpandError, ExpandedAtom, GroupKind, GroupSpec, MAX_EXPANSION_ATOMS, NamedSubstError,
        PatternExpr, PatternParseError, Segment, SegmentPart, SuffixPart, bind_atoms, expand_atoms, expand_named,
        parse_pattern, split_endpoint,
    },
    pipeline::{CompileOptions, CompileOutput, DumpStage, EnvSnapshot, compile},
    query::{query_bindings, query_tree},
    resolver::{FileId, NameEnv, ProgramDb, ResolvedProgram, file_id_for, normalize_path, resolve_program, split_lib_path},
    traverse::{
        ModuleTarget, PATH_SEPARATOR, TopPolicy, Traversal, TraversalEntry, resolve_top_module, select_module,
        traverse_hierarchy,
    },
    verify::verify_atomized,
    viewbind::{
        ResolvedViewBindingEntry, RuleMatch, ViewBinding, ViewConfig, ViewProfile, ViewRule, apply_bindings,
        bind_views, load_view_config, sidecar_json,
    },
};
