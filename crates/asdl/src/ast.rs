//! Typed surface representation of one ASDL document.
//!
//! The YAML front-end (`parse`) produces these structures; schema rules that
//! go beyond YAML shape (identifier grammar, symbol grammar, duplicate
//! symbols) are enforced here and reported as `AST-*` diagnostics.

use std::{fmt, sync::LazyLock};

use indexmap::IndexMap;
use regex::Regex;

use crate::diagnostics::{Diagnostic, SourceSpan};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// True for a simple identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text)
}

/// A module symbol: `cell` or `cell@view`, both sides simple identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ModuleSymbol {
    pub cell: String,
    pub view: Option<String>,
}

impl ModuleSymbol {
    /// Parses `cell` / `cell@view`. Returns `None` on grammar violations.
    pub fn parse(text: &str) -> Option<Self> {
        match text.split_once('@') {
            Some((cell, view)) if is_identifier(cell) && is_identifier(view) => Some(Self {
                cell: cell.to_owned(),
                view: Some(view.to_owned()),
            }),
            Some(_) => None,
            None if is_identifier(text) => Some(Self {
                cell: text.to_owned(),
                view: None,
            }),
            None => None,
        }
    }
}

impl fmt::Display for ModuleSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.view {
            Some(view) => write!(f, "{}@{view}", self.cell),
            None => f.write_str(&self.cell),
        }
    }
}

/// One `imports:` entry: a namespace bound to a relative, absolute, or
/// logical path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImportDecl {
    pub path: String,
    pub span: Option<SourceSpan>,
}

/// A declared net: its endpoint list, preserved as authored list-of-lists.
/// The inner grouping feeds `SchematicHints` only; binding always runs over
/// the flattened list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetDecl {
    pub endpoint_groups: Vec<Vec<String>>,
    pub span: Option<SourceSpan>,
}

/// An `instances:` entry value.
///
/// The inline form packs the ref, optional `(pin:net ...)` bindings, and
/// `key=value` parameters into one string; the structured form separates the
/// ref from an ordered parameter map.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InstanceValue {
    Inline(String),
    Structured {
        reference: String,
        parameters: IndexMap<String, String>,
    },
}

impl InstanceValue {
    pub fn reference_text(&self) -> &str {
        match self {
            Self::Inline(text) => text,
            Self::Structured { reference, .. } => reference,
        }
    }
}

/// One `instances:` entry with its authored location.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InstanceDecl {
    pub value: InstanceValue,
    pub span: Option<SourceSpan>,
}

/// One `instance_defaults:` entry. A trailing `!` on the authored key
/// suppresses the override warning and is stripped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DefaultBinding {
    pub value: String,
    pub suppress_override_warning: bool,
    pub span: Option<SourceSpan>,
}

/// One `modules:` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModuleDecl {
    pub doc: Option<String>,
    /// Explicitly authored port names; `$`-prefixed nets extend this list in
    /// source order during lowering.
    pub ports: Vec<String>,
    /// Module-level `{var}` table, insertion-ordered.
    pub parameters: IndexMap<String, String>,
    /// Declarative variables, propagated unchanged through every stage.
    pub variables: IndexMap<String, String>,
    pub nets: IndexMap<String, NetDecl>,
    pub instances: IndexMap<String, InstanceDecl>,
    /// Named pattern macros referenced as `<@name>`.
    pub patterns: IndexMap<String, String>,
    pub instance_defaults: IndexMap<String, DefaultBinding>,
    pub span: Option<SourceSpan>,
}

/// One `devices:` declaration: a primitive with per-backend templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceDecl {
    pub doc: Option<String>,
    pub ports: Vec<String>,
    pub parameters: IndexMap<String, String>,
    /// backend name → instance template.
    pub backends: IndexMap<String, String>,
    pub span: Option<SourceSpan>,
}

/// A parsed ASDL document, order-preserving throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AsdlDocument {
    pub imports: IndexMap<String, ImportDecl>,
    pub modules: IndexMap<String, ModuleDecl>,
    pub devices: IndexMap<String, DeviceDecl>,
    pub top: Option<String>,
    pub doc: Option<String>,
}

impl AsdlDocument {
    pub fn is_import_only(&self) -> bool {
        self.modules.is_empty() && self.devices.is_empty()
    }
}

/// Schema validation beyond YAML shape. Returns `AST-*` diagnostics; an
/// empty result means the document is structurally sound.
pub fn validate_document(doc: &AsdlDocument) -> Vec<Diagnostic> {
    let mut diags = vec![];

    for namespace in doc.imports.keys() {
        if !is_identifier(namespace) {
            let span = doc.imports[namespace].span.clone();
            diags.push(
                Diagnostic::error("AST-003", format!("invalid import namespace '{namespace}'")).with_span(span),
            );
        }
    }

    for (symbol, module) in &doc.modules {
        if ModuleSymbol::parse(symbol).is_none() {
            diags.push(
                Diagnostic::error(
                    "AST-002",
                    format!("invalid module symbol '{symbol}': expected 'cell' or 'cell@view'"),
                )
                .with_span(module.span.clone()),
            );
        }
        for port in &module.ports {
            if !is_identifier(port) {
                diags.push(
                    Diagnostic::error("AST-001", format!("invalid port name '{port}'")).with_span(module.span.clone()),
                );
            }
        }
        for name in module.parameters.keys().chain(module.variables.keys()) {
            if !is_identifier(name) {
                diags.push(
                    Diagnostic::error("AST-001", format!("invalid parameter name '{name}'"))
                        .with_span(module.span.clone()),
                );
            }
        }
        for name in module.patterns.keys() {
            if !is_identifier(name) {
                diags.push(
                    Diagnostic::error("AST-001", format!("invalid pattern macro name '{name}'"))
                        .with_span(module.span.clone()),
                );
            }
        }
        for (key, net) in &module.nets {
            for group in &net.endpoint_groups {
                for endpoint in group {
                    if !endpoint.contains('.') {
                        diags.push(
                            Diagnostic::error(
                                "AST-006",
                                format!("endpoint '{endpoint}' of net '{key}' is not of the form 'instance.pin'"),
                            )
                            .with_span(net.span.clone()),
                        );
                    }
                }
            }
        }
    }

    for (symbol, device) in &doc.devices {
        if !is_identifier(symbol) {
            diags.push(
                Diagnostic::error("AST-002", format!("invalid device symbol '{symbol}'"))
                    .with_span(device.span.clone()),
            );
        }
        for port in &device.ports {
            if !is_identifier(port) {
                diags.push(
                    Diagnostic::error("AST-001", format!("invalid port name '{port}'")).with_span(device.span.clone()),
                );
            }
        }
    }

    // duplicate symbols across kinds; same-kind duplicates cannot survive the
    // ordered maps so the cross-kind overlap is the remaining case
    for symbol in doc.modules.keys() {
        if doc.devices.contains_key(symbol) {
            let span = doc.devices[symbol].span.clone();
            diags.push(
                Diagnostic::error(
                    "AST-012",
                    format!("symbol '{symbol}' is declared more than once in this document"),
                )
                .with_span(span),
            );
        }
    }

    diags
}
