//! Config-driven backend emission.
//!
//! All simulator-specific syntax lives in template strings; the engine
//! itself branches only on parameter presence (`__subckt_header__` vs
//! `__subckt_header_params__`, `__subckt_call__` vs
//! `__subckt_call_params__`). Unknown placeholders are `EMIT-003`.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::{
    diagnostics::Diagnostic,
    netlist::{Design, Instance, Module},
};

/// Template names every backend config must provide.
pub const REQUIRED_SYSTEM_DEVICES: [&str; 6] = [
    "__netlist_header__",
    "__netlist_footer__",
    "__subckt_header__",
    "__subckt_header_params__",
    "__subckt_call__",
    "__subckt_call_params__",
];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Placeholder names a template mentions, in first-occurrence order.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut out = vec![];
    for capture in PLACEHOLDER.captures_iter(template) {
        let name = capture[1].to_owned();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawDeviceTemplate {
    template: String,
}

/// A loaded backend configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackendConfig {
    /// Verbatim output filename suffix, e.g. `".spice"`.
    pub extension: String,
    pub comment_prefix: String,
    pub system_devices: IndexMap<String, String>,
    /// device symbol → backend name → instance template. Overrides the
    /// templates authored on device declarations.
    #[serde(default)]
    devices: IndexMap<String, IndexMap<String, RawDeviceTemplate>>,
}

impl BackendConfig {
    /// Parses a backend config document and checks the required system
    /// device set. Shape errors are `EMIT-006`; a missing system device is
    /// `EMIT-002` and fatal.
    pub fn load(text: &str) -> Result<Self, Vec<Diagnostic>> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|err| vec![Diagnostic::error("EMIT-006", format!("malformed backend config: {err}"))])?;
        let missing: Vec<&str> = REQUIRED_SYSTEM_DEVICES
            .iter()
            .copied()
            .filter(|name| !config.system_devices.contains_key(*name))
            .collect();
        if missing.is_empty() {
            Ok(config)
        } else {
            Err(missing
                .iter()
                .map(|name| Diagnostic::error("EMIT-002", format!("backend config is missing system device '{name}'")))
                .collect())
        }
    }

    fn device_template(&self, device: &str, backend: &str) -> Option<&str> {
        self.devices
            .get(device)
            .and_then(|backends| backends.get(backend))
            .map(|entry| entry.template.as_str())
    }
}

/// Collapses runs of spaces and tabs and trims line ends, so empty `{ports}`
/// or `{params}` substitutions leave no stray blanks. Newlines survive.
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    if text.ends_with('\n') {
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Substitutes `{key}` placeholders from `context`. Unknown placeholders are
/// `EMIT-003` with the template text in a note.
fn render_template(template: &str, context: &IndexMap<String, String>) -> Result<String, Diagnostic> {
    let mut unknown = vec![];
    let rendered = PLACEHOLDER.replace_all(template, |capture: &regex::Captures<'_>| {
        let name = &capture[1];
        match context.get(name) {
            Some(value) => value.clone(),
            None => {
                unknown.push(name.to_owned());
                String::new()
            }
        }
    });
    if let Some(name) = unknown.first() {
        return Err(
            Diagnostic::error("EMIT-003", format!("unknown placeholder '{{{name}}}'"))
                .with_note(None, format!("in template: {template}")),
        );
    }
    Ok(collapse_whitespace(&rendered))
}

/// `key=value` pairs, space-delimited, in deterministic (sorted) key order.
fn format_params(parameters: &IndexMap<String, String>) -> String {
    let mut keys: Vec<&String> = parameters.keys().collect();
    keys.sort();
    keys.iter()
        .map(|key| format!("{key}={}", parameters[key.as_str()]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Emission entry point: renders `design` for `backend` using `config`.
///
/// Subckt blocks are emitted dependencies-first (DFS-post from the top,
/// deduplicated) with the top last. With `top_as_subckt` false the top
/// module's instances are rendered flat, without a subckt wrapper.
pub fn emit_netlist(
    design: &Design,
    config: &BackendConfig,
    backend: &str,
    top_as_subckt: bool,
) -> (Option<String>, Vec<Diagnostic>) {
    let mut diags = vec![];
    let mut out = String::new();

    let top_context = IndexMap::from([("name".to_owned(), design.top.clone())]);
    match render_template(&config.system_devices["__netlist_header__"], &top_context) {
        Ok(text) => {
            out.push_str(&text);
            out.push('\n');
        }
        Err(diag) => diags.push(diag),
    }

    // dependencies-first block order
    let order = emission_order(design);
    for module_name in &order {
        let module = design.module(module_name).expect("ordered module exists");
        let is_top = module_name == &design.top;
        if is_top && !top_as_subckt {
            continue;
        }
        match render_module(design, module, config, backend) {
            Ok(text) => out.push_str(&text),
            Err(mut errs) => diags.append(&mut errs),
        }
    }

    if !top_as_subckt {
        if let Some(top) = design.module(&design.top) {
            for instance in &top.instances {
                match render_instance(design, instance, config, backend) {
                    Ok(line) => {
                        out.push_str(&line);
                        out.push('\n');
                    }
                    Err(diag) => diags.push(diag),
                }
            }
        }
    }

    match render_template(&config.system_devices["__netlist_footer__"], &top_context) {
        Ok(text) => {
            out.push_str(&text);
            out.push('\n');
        }
        Err(diag) => diags.push(diag),
    }

    if crate::diagnostics::has_errors(&diags) {
        return (None, diags);
    }
    debug!(backend, bytes = out.len(), "netlist emitted");
    (Some(out), diags)
}

/// DFS-postorder over module references from the top: every module's
/// dependencies precede it, the top comes last.
fn emission_order(design: &Design) -> Vec<String> {
    let mut order = vec![];
    let mut visited = vec![];
    visit(design, &design.top, &mut visited, &mut order);
    order
}

fn visit(design: &Design, name: &str, visited: &mut Vec<String>, order: &mut Vec<String>) {
    if visited.iter().any(|seen| seen == name) {
        return;
    }
    visited.push(name.to_owned());
    if let Some(module) = design.module(name) {
        for instance in &module.instances {
            if !instance.is_device {
                visit(design, &instance.reference, visited, order);
            }
        }
        order.push(name.to_owned());
    }
}

fn render_module(
    design: &Design,
    module: &Module,
    config: &BackendConfig,
    backend: &str,
) -> Result<String, Vec<Diagnostic>> {
    let mut out = String::new();
    let mut context = IndexMap::from([
        ("name".to_owned(), module.name.clone()),
        ("ports".to_owned(), module.ports.join(" ")),
    ]);
    let header = if module.parameters.is_empty() {
        &config.system_devices["__subckt_header__"]
    } else {
        context.insert("params".to_owned(), format_params(&module.parameters));
        for (key, value) in &module.parameters {
            context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        &config.system_devices["__subckt_header_params__"]
    };
    out.push_str(&render_template(header, &context).map_err(|diag| vec![diag])?);
    out.push('\n');

    let mut errs = vec![];
    for instance in &module.instances {
        match render_instance(design, instance, config, backend) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(diag) => errs.push(diag),
        }
    }
    if !errs.is_empty() {
        return Err(errs);
    }

    // optional closer (`.ends`-style); configs that need one declare it
    if let Some(trailer) = config.system_devices.get("__subckt_footer__") {
        out.push_str(&render_template(trailer, &context).map_err(|diag| vec![diag])?);
        out.push('\n');
    }
    Ok(out)
}

/// Nets connected to the target's ports, in target port order.
fn ordered_ports(design: &Design, instance: &Instance) -> Result<Vec<String>, Diagnostic> {
    let port_list: Vec<String> = if instance.is_device {
        design
            .device(&instance.reference)
            .map(|device| device.ports.clone())
            .unwrap_or_default()
    } else {
        design
            .module(&instance.reference)
            .map(|module| module.ports.clone())
            .unwrap_or_default()
    };
    let mut nets = vec![];
    for port in &port_list {
        match instance.conns.get(port) {
            Some(net) => nets.push(net.clone()),
            None => {
                return Err(Diagnostic::error(
                    "EMIT-007",
                    format!("port '{port}' of instance '{}' is unconnected", instance.name),
                ));
            }
        }
    }
    Ok(nets)
}

fn render_instance(
    design: &Design,
    instance: &Instance,
    config: &BackendConfig,
    backend: &str,
) -> Result<String, Diagnostic> {
    let ports = ordered_ports(design, instance)?;

    if instance.is_device {
        let device = design.device(&instance.reference).ok_or_else(|| {
            Diagnostic::error("EMIT-005", format!("device '{}' missing from design", instance.reference))
        })?;
        // merged parameters: device defaults, then instance overrides
        let mut merged = device.parameters.clone();
        for (key, value) in &instance.parameters {
            merged.insert(key.clone(), value.clone());
        }
        let template = config
            .device_template(&device.name, backend)
            .or_else(|| device.backends.get(backend).map(|entry| entry.template.as_str()))
            .ok_or_else(|| {
                Diagnostic::error(
                    "EMIT-004",
                    format!("device '{}' has no template for backend '{backend}'", device.name),
                )
            })?;
        let mut context = IndexMap::from([
            ("name".to_owned(), instance.name.clone()),
            ("ports".to_owned(), ports.join(" ")),
            ("ref".to_owned(), device.name.clone()),
            ("params".to_owned(), format_params(&merged)),
        ]);
        for (key, value) in &merged {
            context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        return render_template(template, &context);
    }

    let mut context = IndexMap::from([
        ("name".to_owned(), instance.name.clone()),
        ("ports".to_owned(), ports.join(" ")),
        ("ref".to_owned(), instance.reference.clone()),
    ]);
    let template = if instance.parameters.is_empty() {
        &config.system_devices["__subckt_call__"]
    } else {
        context.insert("params".to_owned(), format_params(&instance.parameters));
        for (key, value) in &instance.parameters {
            context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        &config.system_devices["__subckt_call_params__"]
    };
    render_template(template, &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_extract_in_first_occurrence_order() {
        assert_eq!(extract_placeholders("M{name} {ports} {name} L={L}"), ["name", "ports", "L"]);
    }

    #[test]
    fn whitespace_collapses_but_newlines_survive() {
        assert_eq!(collapse_whitespace("a   b \nc\t d "), "a b\nc d");
    }

    #[test]
    fn unknown_placeholder_is_emit_003() {
        let context = IndexMap::from([("name".to_owned(), "x".to_owned())]);
        let err = render_template("{name} {nope}", &context).unwrap_err();
        assert_eq!(err.code, "EMIT-003");
    }

    #[test]
    fn params_format_deterministically_by_key() {
        let parameters = IndexMap::from([
            ("W".to_owned(), "5u".to_owned()),
            ("L".to_owned(), "1u".to_owned()),
        ]);
        assert_eq!(format_params(&parameters), "L=1u W=5u");
    }

    #[test]
    fn missing_system_device_is_fatal() {
        let errs = BackendConfig::load("extension: .sp\ncomment_prefix: '*'\nsystem_devices: {}\n").unwrap_err();
        assert_eq!(errs.len(), REQUIRED_SYSTEM_DEVICES.len());
        assert!(errs.iter().all(|diag| diag.code == "EMIT-002"));
    }
}
