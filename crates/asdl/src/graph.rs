//! The pattern-preserving program graph and its registries.
//!
//! Bundles hold only stable IDs and symbol references; provenance (pattern
//! expressions, spans, origins, schematic hints) lives in external
//! registries keyed by ID. That keeps bundle equality structural and graph
//! cloning cheap.

use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    diagnostics::SourceSpan,
    pattern::PatternExpr,
    resolver::FileId,
};

/// Entity kind carried inside a [`StableId`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum IdKind {
    Module,
    Device,
    Net,
    Endpoint,
    Instance,
    Expr,
}

/// Deterministic opaque identifier, formatted `<kind>:<seq>`.
///
/// Sequences are allocated by one [`IdAllocator`] per graph build, walking
/// documents in resolution order, so identical inputs produce identical IDs.
/// IDs are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct StableId {
    pub kind: IdKind,
    pub seq: u32,
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.seq)
    }
}

/// Allocates [`StableId`]s, one monotone counter per kind.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: AHashMap<IdKind, u32>,
}

impl IdAllocator {
    pub fn next(&mut self, kind: IdKind) -> StableId {
        let counter = self.counters.entry(kind).or_insert(0);
        let seq = *counter;
        *counter = counter.checked_add(1).expect("stable id counter overflow is a compiler bug");
        StableId { kind, seq }
    }
}

/// Classification of a registered pattern expression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ExprKind {
    Net,
    Instance,
    Endpoint,
    Param,
}

/// A registered pattern expression with the span it was authored at.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisteredExpr {
    pub expr: PatternExpr,
    pub span: Option<SourceSpan>,
}

/// External registries of the program graph, keyed by stable ID.
#[derive(Debug, Default)]
pub struct Registries {
    /// `expr_id` → parsed pattern expression (`PatternExpressionRegistry`).
    pub exprs: IndexMap<StableId, RegisteredExpr>,
    /// `expr_id` → what the expression names (`PatternExprKindIndex`).
    pub expr_kinds: AHashMap<StableId, ExprKind>,
    /// `entity_id` → authored span (`SourceSpanIndex`).
    pub spans: AHashMap<StableId, SourceSpan>,
    /// `(file_id, device_symbol)` → backend → template
    /// (`BackendTemplateRegistry`).
    pub backend_templates: AHashMap<(FileId, String), IndexMap<String, String>>,
    /// `net_id` → authored endpoint group lengths over the flattened
    /// endpoint list (`SchematicHints`). Documentation only; binding always
    /// runs over the flat list.
    pub schematic_hints: AHashMap<StableId, Vec<u32>>,
}

impl Registries {
    pub fn expr(&self, id: StableId) -> &RegisteredExpr {
        self.exprs.get(&id).expect("expression registry entry exists for allocated id")
    }

    pub fn span_of(&self, id: StableId) -> Option<SourceSpan> {
        self.spans.get(&id).cloned()
    }
}

/// A declared net: its name expression and attached endpoints, in authored
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetBundle {
    pub id: StableId,
    pub name_expr: StableId,
    pub endpoints: Vec<StableId>,
    /// True when the net was authored `$`-prefixed (or promoted on first
    /// creation through an inline pin binding or instance default). The `$`
    /// itself is never stored in the name.
    pub is_port: bool,
}

/// One endpoint: membership of `instance.pin` (as a pattern expression) in a
/// net's connection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointBundle {
    pub id: StableId,
    pub net: StableId,
    pub port_expr: StableId,
}

/// A declared instance: its name expression, resolved target, and raw
/// parameter expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceBundle {
    pub id: StableId,
    pub name_expr: StableId,
    /// Authored target symbol without the namespace qualifier.
    pub ref_symbol: String,
    /// File the target resolved into.
    pub ref_file_id: FileId,
    /// parameter name → registered value expression, authored order.
    pub param_exprs: IndexMap<String, StableId>,
}

/// A device definition (primitive with per-backend templates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDef {
    pub id: StableId,
    pub symbol: String,
    pub file_id: FileId,
    pub ports: Vec<String>,
    pub parameters: IndexMap<String, String>,
}

/// One lowered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGraph {
    pub id: StableId,
    /// Full symbol text (`cell` or `cell@view`).
    pub symbol: String,
    pub file_id: FileId,
    /// Net IDs in port order: authored `ports:` first, then `$` nets in
    /// source order, then `$` nets introduced by `instance_defaults`.
    pub ports: Vec<StableId>,
    pub parameters: IndexMap<String, String>,
    pub variables: IndexMap<String, String>,
    pub nets: Vec<StableId>,
    pub instances: Vec<StableId>,
}

/// The lowered program: module and device bundles plus entity tables and
/// registries.
#[derive(Debug, Default)]
pub struct ProgramGraph {
    pub entry: FileId,
    pub modules: Vec<ModuleGraph>,
    pub devices: Vec<DeviceDef>,
    pub nets: IndexMap<StableId, NetBundle>,
    pub endpoints: IndexMap<StableId, EndpointBundle>,
    pub instances: IndexMap<StableId, InstanceBundle>,
    pub registries: Registries,
    /// Per-file explicit `top:` entry, when authored.
    pub tops: AHashMap<FileId, String>,
}

impl ProgramGraph {
    pub fn module_by_symbol(&self, file_id: &str, symbol: &str) -> Option<&ModuleGraph> {
        self.modules
            .iter()
            .find(|module| module.file_id == file_id && module.symbol == symbol)
    }

    pub fn device_by_symbol(&self, file_id: &str, symbol: &str) -> Option<&DeviceDef> {
        self.devices
            .iter()
            .find(|device| device.file_id == file_id && device.symbol == symbol)
    }

    pub fn net(&self, id: StableId) -> &NetBundle {
        self.nets.get(&id).expect("net bundle exists for allocated id")
    }

    pub fn instance(&self, id: StableId) -> &InstanceBundle {
        self.instances.get(&id).expect("instance bundle exists for allocated id")
    }

    pub fn endpoint(&self, id: StableId) -> &EndpointBundle {
        self.endpoints.get(&id).expect("endpoint bundle exists for allocated id")
    }
}
