//! YAML surface front-end: source text in, [`AsdlDocument`] out.
//!
//! Deserialization runs in two steps: `serde_yaml` fills permissive raw
//! structs, then a lowering pass validates shapes and produces the typed
//! AST. Spans are recovered by a line scanner keyed on the authored key
//! text; nodes the scanner cannot anchor stay spanless and render with
//! `NO_SPAN_NOTE`.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::{
    ast::{AsdlDocument, DefaultBinding, DeviceDecl, ImportDecl, InstanceDecl, InstanceValue, ModuleDecl, NetDecl},
    diagnostics::{Diagnostic, SourceSpan},
};

#[derive(Debug, Default, serde::Deserialize)]
struct RawDocument {
    doc: Option<String>,
    #[serde(default)]
    imports: IndexMap<String, String>,
    #[serde(default)]
    modules: IndexMap<String, RawModule>,
    #[serde(default)]
    devices: IndexMap<String, RawDevice>,
    top: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawModule {
    doc: Option<String>,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    parameters: IndexMap<String, Value>,
    #[serde(default)]
    variables: IndexMap<String, Value>,
    #[serde(default)]
    nets: IndexMap<String, RawNetValue>,
    #[serde(default)]
    instances: IndexMap<String, RawInstance>,
    #[serde(default)]
    patterns: IndexMap<String, String>,
    #[serde(default)]
    instance_defaults: IndexMap<String, Value>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum RawNetValue {
    Endpoints(Vec<RawNetItem>),
    /// Rejected with a hint; kept as a variant so the error is ours, not
    /// serde's.
    Scalar(Value),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum RawNetItem {
    One(String),
    Group(Vec<String>),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum RawInstance {
    Inline(String),
    Structured(RawStructuredInstance),
}

#[derive(Debug, serde::Deserialize)]
struct RawStructuredInstance {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    parameters: IndexMap<String, Value>,
    /// Legacy alias, always rejected: the canonical key is `parameters`.
    params: Option<Value>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawDevice {
    doc: Option<String>,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    parameters: IndexMap<String, Value>,
    #[serde(default)]
    backends: IndexMap<String, String>,
}

/// Moving-cursor scanner that anchors authored keys to source positions.
///
/// Keys are looked up in document order; each hit advances the cursor so a
/// key text appearing in several scopes resolves to successive occurrences.
struct SpanScanner<'a> {
    file: &'a str,
    /// `(line_index, col_index, key_text)` per mapping-looking line.
    keys: Vec<(u32, u32, String)>,
    cursor: usize,
}

impl<'a> SpanScanner<'a> {
    fn new(source: &str, file: &'a str) -> Self {
        let mut keys = vec![];
        for (line_index, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
                continue;
            }
            let Some(colon) = trimmed.find(':') else { continue };
            let mut key = trimmed[..colon].trim_end();
            key = key
                .strip_prefix('"')
                .and_then(|k| k.strip_suffix('"'))
                .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
                .unwrap_or(key);
            if key.is_empty() {
                continue;
            }
            let col = line.len() - trimmed.len();
            keys.push((
                u32::try_from(line_index).unwrap_or(u32::MAX),
                u32::try_from(col).unwrap_or(u32::MAX),
                key.to_owned(),
            ));
        }
        Self { file, keys, cursor: 0 }
    }

    fn find(&mut self, key: &str) -> Option<SourceSpan> {
        let hit = self.keys[self.cursor..].iter().position(|(_, _, text)| text == key)?;
        let (line, col, text) = &self.keys[self.cursor + hit];
        let span = SourceSpan {
            file: self.file.to_owned(),
            line: line + 1,
            col: col + 1,
            end_line: line + 1,
            end_col: col + 1 + u32::try_from(text.len()).unwrap_or(0),
        };
        self.cursor += hit + 1;
        Some(span)
    }

    /// Looks a key up without consuming it, for spans revisited out of order.
    fn peek(&self, key: &str) -> Option<SourceSpan> {
        let hit = self.keys[self.cursor..].iter().position(|(_, _, text)| text == key)?;
        let (line, col, text) = &self.keys[self.cursor + hit];
        Some(SourceSpan {
            file: self.file.to_owned(),
            line: line + 1,
            col: col + 1,
            end_line: line + 1,
            end_col: col + 1 + u32::try_from(text.len()).unwrap_or(0),
        })
    }
}

/// Renders a YAML scalar as the string the pipeline works with.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_map(
    raw: &IndexMap<String, Value>,
    owner: &str,
    section: &str,
    span: Option<&SourceSpan>,
    diags: &mut Vec<Diagnostic>,
) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for (key, value) in raw {
        match scalar_string(value) {
            Some(text) => {
                out.insert(key.clone(), text);
            }
            None => diags.push(
                Diagnostic::error(
                    "PARSE-002",
                    format!("{section} entry '{key}' of '{owner}' must be a scalar"),
                )
                .with_span(span.cloned()),
            ),
        }
    }
    out
}

/// Parses one ASDL source file into the typed AST.
///
/// YAML syntax errors yield `PARSE-001` and no document; shape errors yield
/// `PARSE-002`/`PARSE-003`/`AST-005` but still produce a document with the
/// offending entries dropped, so later stages can report further problems in
/// the same run.
pub fn parse_source(source: &str, file: &str) -> (Option<AsdlDocument>, Vec<Diagnostic>) {
    let mut diags = vec![];
    let raw: RawDocument = match serde_yaml::from_str(source) {
        Ok(raw) => raw,
        Err(err) => {
            let span = err
                .location()
                .map(|loc| SourceSpan::point(file, u32::try_from(loc.line()).unwrap_or(0), u32::try_from(loc.column()).unwrap_or(0)));
            diags.push(Diagnostic::error("PARSE-001", format!("YAML syntax error: {err}")).with_span(span));
            return (None, diags);
        }
    };

    let mut scanner = SpanScanner::new(source, file);
    let mut doc = AsdlDocument {
        doc: raw.doc,
        top: raw.top,
        ..AsdlDocument::default()
    };

    for (namespace, path) in raw.imports {
        let span = scanner.find(&namespace);
        doc.imports.insert(namespace, ImportDecl { path, span });
    }

    for (symbol, raw_module) in raw.modules {
        let span = scanner.find(&symbol);
        let module = lower_module(&symbol, raw_module, span, &mut scanner, &mut diags);
        doc.modules.insert(symbol, module);
    }

    for (symbol, raw_device) in raw.devices {
        let span = scanner.find(&symbol);
        doc.devices.insert(
            symbol.clone(),
            DeviceDecl {
                doc: raw_device.doc,
                ports: raw_device.ports,
                parameters: scalar_map(&raw_device.parameters, &symbol, "parameters", span.as_ref(), &mut diags),
                backends: raw_device.backends,
                span,
            },
        );
    }

    (Some(doc), diags)
}

fn lower_module(
    symbol: &str,
    raw: RawModule,
    span: Option<SourceSpan>,
    scanner: &mut SpanScanner<'_>,
    diags: &mut Vec<Diagnostic>,
) -> ModuleDecl {
    let mut module = ModuleDecl {
        doc: raw.doc,
        ports: raw.ports,
        parameters: scalar_map(&raw.parameters, symbol, "parameters", span.as_ref(), diags),
        variables: scalar_map(&raw.variables, symbol, "variables", span.as_ref(), diags),
        patterns: raw.patterns,
        span: span.clone(),
        ..ModuleDecl::default()
    };

    for (key, value) in raw.nets {
        let net_span = scanner.find(&key);
        match value {
            RawNetValue::Endpoints(items) => {
                let endpoint_groups = items
                    .into_iter()
                    .map(|item| match item {
                        RawNetItem::One(endpoint) => vec![endpoint],
                        RawNetItem::Group(group) => group,
                    })
                    .collect();
                module.nets.insert(
                    key,
                    NetDecl {
                        endpoint_groups,
                        span: net_span,
                    },
                );
            }
            RawNetValue::Scalar(_) => diags.push(
                Diagnostic::error(
                    "PARSE-003",
                    format!("net '{key}' endpoints must be a YAML list of 'instance.pin' strings"),
                )
                .with_span(net_span)
                .with_note(None, "write `NET: [inst.pin, ...]` or grouped `NET: [[a.x, b.y], [c.z]]`"),
            ),
        }
    }

    for (key, value) in raw.instances {
        let inst_span = scanner.find(&key);
        let lowered = match value {
            RawInstance::Inline(text) => InstanceValue::Inline(text),
            RawInstance::Structured(structured) => {
                if structured.params.is_some() {
                    diags.push(
                        Diagnostic::error(
                            "AST-005",
                            format!("instance '{key}' uses the 'params' alias; the canonical key is 'parameters'"),
                        )
                        .with_span(inst_span.clone()),
                    );
                }
                let parameters = scalar_map(&structured.parameters, &key, "parameters", inst_span.as_ref(), diags);
                InstanceValue::Structured {
                    reference: structured.reference,
                    parameters,
                }
            }
        };
        module.instances.insert(
            key,
            InstanceDecl {
                value: lowered,
                span: inst_span,
            },
        );
    }

    for (key, value) in raw.instance_defaults {
        let default_span = scanner.peek(&key).or_else(|| span.clone());
        let (name, suppress) = match key.strip_suffix('!') {
            Some(stripped) => (stripped.to_owned(), true),
            None => (key.clone(), false),
        };
        match scalar_string(&value) {
            Some(text) => {
                module.instance_defaults.insert(
                    name,
                    DefaultBinding {
                        value: text,
                        suppress_override_warning: suppress,
                        span: default_span,
                    },
                );
            }
            None => diags.push(
                Diagnostic::error(
                    "PARSE-002",
                    format!("instance_defaults entry '{name}' of '{symbol}' must be a scalar"),
                )
                .with_span(default_span),
            ),
        }
    }

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
doc: inverter library
modules:
  inv:
    parameters: {L: 0.2u, W: 5u}
    nets:
      $VDD: []
      OUT: [[MN.D], [MP.D]]
    instances:
      MN: \"nfet (G:IN S:VSS) L={L}\"
      MP: {ref: pfet, parameters: {W: 2u}}
top: inv
";

    #[test]
    fn sample_parses_with_spans() {
        let (doc, diags) = parse_source(SAMPLE, "inv.asdl");
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        let doc = doc.unwrap();
        let module = &doc.modules["inv"];
        assert_eq!(module.parameters["L"], "0.2u");
        assert_eq!(module.nets["OUT"].endpoint_groups, vec![vec!["MN.D".to_owned()], vec![
            "MP.D".to_owned()
        ]]);
        assert!(
            matches!(&module.instances["MP"].value, InstanceValue::Structured { reference, .. } if reference == "pfet")
        );
        let net_span = module.nets["$VDD"].span.as_ref().expect("span scanned");
        assert_eq!(net_span.line, 6);
        assert_eq!(doc.top.as_deref(), Some("inv"));
    }

    #[test]
    fn yaml_syntax_error_is_parse_001() {
        let (doc, diags) = parse_source("modules: [unclosed", "bad.asdl");
        assert!(doc.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "PARSE-001");
    }

    #[test]
    fn string_net_value_is_rejected_with_hint() {
        let source = "modules:\n  m:\n    nets:\n      OUT: MN.D\n";
        let (doc, diags) = parse_source(source, "m.asdl");
        assert!(doc.is_some());
        let diag = diags.iter().find(|d| d.code == "PARSE-003").expect("PARSE-003 raised");
        assert!(!diag.notes.is_empty(), "hint note expected");
    }

    #[test]
    fn params_alias_is_rejected() {
        let source = "modules:\n  m:\n    instances:\n      X: {ref: dev, params: {a: 1}}\n";
        let (_, diags) = parse_source(source, "m.asdl");
        assert!(diags.iter().any(|d| d.code == "AST-005"), "got: {diags:?}");
    }

    #[test]
    fn defaults_bang_suffix_suppresses_override_warning() {
        let source = "modules:\n  m:\n    instance_defaults:\n      \"B!\": VSS\n      M: 1\n";
        let (doc, diags) = parse_source(source, "m.asdl");
        assert!(diags.is_empty(), "{diags:?}");
        let module = &doc.unwrap().modules["m"];
        assert!(module.instance_defaults["B"].suppress_override_warning);
        assert!(!module.instance_defaults["M"].suppress_override_warning);
        assert_eq!(module.instance_defaults["M"].value, "1");
    }
}
