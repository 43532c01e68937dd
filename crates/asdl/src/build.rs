//! AST → PatternedGraph lowering.
//!
//! Documents are walked in resolution order; within a module, nets are
//! lowered first (authored order), then instances, then `instance_defaults`.
//! Every pattern expression is named-pattern substituted and registered at
//! lowering time so atomization never sees a `<@name>`.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    ast::{AsdlDocument, DeviceDecl, InstanceDecl, InstanceValue, ModuleDecl, ModuleSymbol},
    diagnostics::{Diagnostic, SourceSpan},
    graph::{
        DeviceDef, EndpointBundle, ExprKind, IdAllocator, IdKind, InstanceBundle, ModuleGraph, NetBundle, ProgramGraph,
        RegisteredExpr, StableId,
    },
    pattern::{PatternExpr, Segment, SegmentPart, expand_named, parse_pattern},
    resolver::{FileId, ResolvedProgram},
};

/// Splits `text` on whitespace, honoring single-quoted runs.
///
/// Supports `key='value with spaces'` and the empty quoted string `key=''`.
/// Quotes are stripped from the returned tokens.
pub(crate) fn tokenize_quoted(text: &str) -> Result<Vec<String>, String> {
    let mut tokens = vec![];
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err("unterminated quoted string".to_owned()),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parsed inline instance expression: target, optional pin bindings, params.
#[derive(Debug, PartialEq, Eq)]
struct InlineInstance {
    reference: String,
    /// `(pin:net ...)` entries in authored order.
    pins: Vec<(String, String)>,
    /// `key=value` entries in authored order.
    parameters: IndexMap<String, String>,
}

fn parse_inline_instance(text: &str) -> Result<InlineInstance, String> {
    let (paren_body, remainder) = match text.find('(') {
        Some(open) => {
            let close = text[open..]
                .find(')')
                .map(|offset| open + offset)
                .ok_or_else(|| "unterminated '(' in instance expression".to_owned())?;
            let body = text[open + 1..close].to_owned();
            let mut remainder = text[..open].to_owned();
            remainder.push(' ');
            remainder.push_str(&text[close + 1..]);
            (Some(body), remainder)
        }
        None => (None, text.to_owned()),
    };

    let mut pins = vec![];
    if let Some(body) = paren_body {
        for entry in body.split([' ', ',', '\t']).filter(|entry| !entry.is_empty()) {
            let (pin, net) = entry
                .split_once(':')
                .ok_or_else(|| format!("pin binding '{entry}' is not of the form 'pin:net'"))?;
            if pin.is_empty() || net.is_empty() {
                return Err(format!("pin binding '{entry}' has an empty side"));
            }
            pins.push((pin.to_owned(), net.to_owned()));
        }
    }

    let tokens = tokenize_quoted(&remainder)?;
    let mut iter = tokens.into_iter();
    let reference = iter.next().ok_or_else(|| "missing target reference".to_owned())?;
    if reference.contains('=') {
        return Err(format!("expected target reference before parameters, found '{reference}'"));
    }

    let mut parameters = IndexMap::new();
    for token in iter {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("expected 'key=value', found '{token}'"))?;
        if key.is_empty() {
            return Err(format!("empty parameter key in '{token}'"));
        }
        parameters.insert(key.to_owned(), value.to_owned());
    }

    Ok(InlineInstance {
        reference,
        pins,
        parameters,
    })
}

/// Appends a `.pin` literal to every segment of an instance name
/// expression, yielding the endpoint expression for an inline pin binding.
fn instance_pin_expr(instance_expr: &PatternExpr, pin: &str) -> PatternExpr {
    let suffix = format!(".{pin}");
    let segments = instance_expr
        .segments
        .iter()
        .map(|segment| {
            let mut parts = segment.parts.clone();
            parts.push(SegmentPart::Literal(suffix.clone()));
            Segment { parts }
        })
        .collect();
    PatternExpr {
        segments,
        text: format!("{}{suffix}", instance_expr.text),
    }
}

/// Port names a target declares, read from its AST declaration.
///
/// Mirrors every promotion source the lowering applies to the target
/// itself: the authored `ports:` list, literal `$` net keys, `$` nets
/// created by inline pin bindings in the target's instance expressions, and
/// `$` values in the target's own `instance_defaults`. Patterned port
/// declarations are skipped (a defaults key is always a literal). The scan
/// works on the raw AST so classification does not depend on whether the
/// target happens to be lowered yet.
fn target_port_names(resolved: &ResolvedProgram, file_id: &str, symbol: &str) -> Option<Vec<String>> {
    let document = resolved.db.get(file_id)?;
    if let Some(device) = document.devices.get(symbol) {
        return Some(device.ports.clone());
    }
    let module = document
        .modules
        .get(symbol)
        .or_else(|| find_module_by_cell(document, symbol).map(|(_, decl)| decl))?;

    let mut ports = module.ports.clone();
    let mut promote = |name: &str| {
        if crate::ast::is_identifier(name) && !ports.iter().any(|port| port == name) {
            ports.push(name.to_owned());
        }
    };
    for key in module.nets.keys() {
        if let Some(name) = key.strip_prefix('$') {
            promote(name);
        }
    }
    // inline `(pin:$NET ...)` bindings promote on first creation
    for instance in module.instances.values() {
        let text = instance.value.reference_text();
        let Some(open) = text.find('(') else { continue };
        let Some(close) = text[open..].find(')').map(|offset| open + offset) else {
            continue;
        };
        for entry in text[open + 1..close].split([' ', ',', '\t']).filter(|entry| !entry.is_empty()) {
            if let Some((_, net)) = entry.split_once(':') {
                if let Some(name) = net.strip_prefix('$') {
                    promote(name);
                }
            }
        }
    }
    // `$` values in the target's own defaults promote on first creation
    for binding in module.instance_defaults.values() {
        if let Some(name) = binding.value.strip_prefix('$') {
            promote(name);
        }
    }
    Some(ports)
}

fn find_module_by_cell<'a>(document: &'a AsdlDocument, cell: &str) -> Option<(&'a str, &'a ModuleDecl)> {
    document
        .modules
        .iter()
        .find(|(symbol, _)| ModuleSymbol::parse(symbol).is_some_and(|parsed| parsed.cell == cell))
        .map(|(symbol, decl)| (symbol.as_str(), decl))
}

/// Lowers all documents of a resolved program into a [`ProgramGraph`].
pub fn build_graph(resolved: &ResolvedProgram) -> (ProgramGraph, Vec<Diagnostic>) {
    let mut builder = Builder {
        resolved,
        graph: ProgramGraph {
            entry: resolved.entry.clone(),
            ..ProgramGraph::default()
        },
        ids: IdAllocator::default(),
        diags: vec![],
    };
    for (file_id, document) in &resolved.db.documents {
        builder.lower_document(file_id, document);
    }
    debug!(
        modules = builder.graph.modules.len(),
        devices = builder.graph.devices.len(),
        "patterned graph built"
    );
    (builder.graph, builder.diags)
}

struct Builder<'a> {
    resolved: &'a ResolvedProgram,
    graph: ProgramGraph,
    ids: IdAllocator,
    diags: Vec<Diagnostic>,
}

/// Per-module lowering state.
struct ModuleCx {
    /// literal net-name text (after `$` strip) → net id, for find-or-create.
    net_by_text: IndexMap<String, StableId>,
    /// endpoint expression texts seen so far, for overlap detection.
    endpoint_texts: AHashSet<String>,
    /// explicit `ports:` entries, in authored order.
    explicit_ports: Vec<StableId>,
    /// `$` nets in creation order (source nets, inline promotions, defaults).
    promoted_ports: Vec<StableId>,
    named: AHashMap<String, PatternExpr>,
}

impl Builder<'_> {
    fn lower_document(&mut self, file_id: &str, document: &AsdlDocument) {
        for (symbol, device) in &document.devices {
            self.lower_device(file_id, symbol, device);
        }
        for (symbol, module) in &document.modules {
            self.lower_module(file_id, symbol, module);
        }
        if let Some(top) = &document.top {
            self.graph.tops.insert(file_id.to_owned(), top.clone());
        }
    }

    fn lower_device(&mut self, file_id: &str, symbol: &str, device: &DeviceDecl) {
        let id = self.ids.next(IdKind::Device);
        if let Some(span) = &device.span {
            self.graph.registries.spans.insert(id, span.clone());
        }
        self.graph
            .registries
            .backend_templates
            .insert((file_id.to_owned(), symbol.to_owned()), device.backends.clone());
        self.graph.devices.push(DeviceDef {
            id,
            symbol: symbol.to_owned(),
            file_id: file_id.to_owned(),
            ports: device.ports.clone(),
            parameters: device.parameters.clone(),
        });
    }

    fn lower_module(&mut self, file_id: &str, symbol: &str, module: &ModuleDecl) {
        let module_id = self.ids.next(IdKind::Module);
        if let Some(span) = &module.span {
            self.graph.registries.spans.insert(module_id, span.clone());
        }

        let mut cx = ModuleCx {
            net_by_text: IndexMap::new(),
            endpoint_texts: AHashSet::new(),
            explicit_ports: vec![],
            promoted_ports: vec![],
            named: AHashMap::new(),
        };

        // named pattern macros register first so later substitution succeeds
        for (name, text) in &module.patterns {
            match parse_pattern(text) {
                Ok(expr) => {
                    cx.named.insert(name.clone(), expr);
                }
                Err(err) => self.diags.push(
                    Diagnostic::error("IR-020", format!("pattern macro '{name}': {}", err.message))
                        .with_span(module.span.clone()),
                ),
            }
        }

        let mut net_ids = vec![];
        for (key, decl) in &module.nets {
            if let Some(net_id) = self.lower_net(symbol, key, decl, &mut cx) {
                net_ids.push(net_id);
            }
        }

        // explicit ports precede `$` nets in port order
        for port in &module.ports {
            let (net_id, _) = self.find_or_create_net(port, module.span.as_ref(), &mut cx, &mut net_ids);
            self.graph.nets.get_mut(&net_id).expect("net just resolved").is_port = true;
            cx.explicit_ports.push(net_id);
            // an explicit port that also appears as a `$` net keeps its
            // earlier slot in promoted_ports; drop it to avoid doubling
            cx.promoted_ports.retain(|promoted| *promoted != net_id);
        }

        let mut instance_ids = vec![];
        for (key, decl) in &module.instances {
            if let Some(instance_id) = self.lower_instance(file_id, symbol, key, decl, &mut cx, &mut net_ids) {
                instance_ids.push(instance_id);
            }
        }

        self.apply_instance_defaults(module, &instance_ids, &mut cx, &mut net_ids);

        let mut ports = cx.explicit_ports.clone();
        ports.extend(cx.promoted_ports.iter().copied());

        self.graph.modules.push(ModuleGraph {
            id: module_id,
            symbol: symbol.to_owned(),
            file_id: file_id.to_owned(),
            ports,
            parameters: module.parameters.clone(),
            variables: module.variables.clone(),
            nets: net_ids,
            instances: instance_ids,
        });
    }

    /// Registers a pattern expression after named-pattern substitution.
    fn register_expr(
        &mut self,
        text: &str,
        kind: ExprKind,
        span: Option<&SourceSpan>,
        cx: &ModuleCx,
    ) -> Option<StableId> {
        let parsed = match parse_pattern(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.diags
                    .push(Diagnostic::error("IR-020", format!("'{text}': {}", err.message)).with_span(span.cloned()));
                return None;
            }
        };
        let substituted = match expand_named(&parsed, &cx.named) {
            Ok(expr) => expr,
            Err(err) => {
                self.diags
                    .push(Diagnostic::error("IR-002", err.to_string()).with_span(span.cloned()));
                return None;
            }
        };
        Some(self.register_parsed(substituted, kind, span))
    }

    fn register_parsed(&mut self, expr: PatternExpr, kind: ExprKind, span: Option<&SourceSpan>) -> StableId {
        let expr_id = self.ids.next(IdKind::Expr);
        self.graph.registries.exprs.insert(
            expr_id,
            RegisteredExpr {
                expr,
                span: span.cloned(),
            },
        );
        self.graph.registries.expr_kinds.insert(expr_id, kind);
        if let Some(span) = span {
            self.graph.registries.spans.insert(expr_id, span.clone());
        }
        expr_id
    }

    fn lower_net(
        &mut self,
        module_symbol: &str,
        key: &str,
        decl: &crate::ast::NetDecl,
        cx: &mut ModuleCx,
    ) -> Option<StableId> {
        let (name_text, is_port) = match key.strip_prefix('$') {
            Some(stripped) => (stripped, true),
            None => (key, false),
        };
        let expr_id = self.register_expr(name_text, ExprKind::Net, decl.span.as_ref(), cx)?;
        let expr = &self.graph.registries.expr(expr_id).expr;
        if expr.has_splice() {
            self.diags.push(
                Diagnostic::error(
                    "IR-003",
                    format!("net '{key}' of module '{module_symbol}' uses a splice; splices are forbidden in net names"),
                )
                .with_span(decl.span.clone()),
            );
            return None;
        }

        let net_id = self.ids.next(IdKind::Net);
        if let Some(span) = &decl.span {
            self.graph.registries.spans.insert(net_id, span.clone());
        }
        cx.net_by_text.insert(name_text.to_owned(), net_id);

        let mut endpoints = vec![];
        let mut hint_slices = vec![];
        for group in &decl.endpoint_groups {
            hint_slices.push(u32::try_from(group.len()).unwrap_or(u32::MAX));
            for endpoint_text in group {
                if let Some(endpoint_id) = self.lower_endpoint(endpoint_text, net_id, decl.span.as_ref(), cx) {
                    endpoints.push(endpoint_id);
                }
            }
        }
        self.graph.registries.schematic_hints.insert(net_id, hint_slices);

        self.graph.nets.insert(
            net_id,
            NetBundle {
                id: net_id,
                name_expr: expr_id,
                endpoints,
                is_port,
            },
        );
        if is_port {
            cx.promoted_ports.push(net_id);
        }
        Some(net_id)
    }

    fn lower_endpoint(
        &mut self,
        text: &str,
        net_id: StableId,
        span: Option<&SourceSpan>,
        cx: &mut ModuleCx,
    ) -> Option<StableId> {
        let expr_id = self.register_expr(text, ExprKind::Endpoint, span, cx)?;
        if !cx.endpoint_texts.insert(self.graph.registries.expr(expr_id).expr.text.clone()) {
            self.diags.push(
                Diagnostic::error("IR-008", format!("endpoint '{text}' is attached more than once")).with_span(span.cloned()),
            );
            return None;
        }
        let endpoint_id = self.ids.next(IdKind::Endpoint);
        if let Some(span) = span {
            self.graph.registries.spans.insert(endpoint_id, span.clone());
        }
        self.graph.endpoints.insert(
            endpoint_id,
            EndpointBundle {
                id: endpoint_id,
                net: net_id,
                port_expr: expr_id,
            },
        );
        Some(endpoint_id)
    }

    /// Looks up a net by literal name, creating it when absent. `$` names
    /// promote to ports on first creation only; an existing net is never
    /// re-promoted. Returns the net and whether it was newly created.
    fn find_or_create_net(
        &mut self,
        raw_name: &str,
        span: Option<&SourceSpan>,
        cx: &mut ModuleCx,
        net_ids: &mut Vec<StableId>,
    ) -> (StableId, bool) {
        let (name, wants_port) = match raw_name.strip_prefix('$') {
            Some(stripped) => (stripped, true),
            None => (raw_name, false),
        };
        if let Some(net_id) = cx.net_by_text.get(name) {
            return (*net_id, false);
        }
        let expr_id = self.register_parsed(PatternExpr::literal(name), ExprKind::Net, span);
        let net_id = self.ids.next(IdKind::Net);
        if let Some(span) = span {
            self.graph.registries.spans.insert(net_id, span.clone());
        }
        cx.net_by_text.insert(name.to_owned(), net_id);
        self.graph.nets.insert(
            net_id,
            NetBundle {
                id: net_id,
                name_expr: expr_id,
                endpoints: vec![],
                is_port: wants_port,
            },
        );
        net_ids.push(net_id);
        if wants_port {
            cx.promoted_ports.push(net_id);
        }
        (net_id, true)
    }

    fn lower_instance(
        &mut self,
        file_id: &str,
        module_symbol: &str,
        key: &str,
        decl: &InstanceDecl,
        cx: &mut ModuleCx,
        net_ids: &mut Vec<StableId>,
    ) -> Option<StableId> {
        let span = decl.span.clone();
        let name_expr_id = self.register_expr(key, ExprKind::Instance, span.as_ref(), cx)?;

        let (reference, pins, parameters) = match &decl.value {
            InstanceValue::Inline(text) => match parse_inline_instance(text) {
                Ok(inline) => (inline.reference, inline.pins, inline.parameters),
                Err(message) => {
                    self.diags.push(
                        Diagnostic::error(
                            "IR-001",
                            format!("malformed instance expression for '{key}' in '{module_symbol}': {message}"),
                        )
                        .with_span(span.clone()),
                    );
                    return None;
                }
            },
            InstanceValue::Structured { reference, parameters } => {
                match parse_inline_instance(reference) {
                    Ok(inline) => {
                        let mut merged = inline.parameters;
                        // structured `parameters:` override inline ones
                        for (parameter, value) in parameters {
                            merged.insert(parameter.clone(), value.clone());
                        }
                        (inline.reference, inline.pins, merged)
                    }
                    Err(message) => {
                        self.diags.push(
                            Diagnostic::error(
                                "IR-001",
                                format!("malformed instance reference for '{key}' in '{module_symbol}': {message}"),
                            )
                            .with_span(span.clone()),
                        );
                        return None;
                    }
                }
            }
        };

        let (ref_symbol, ref_file_id) = self.resolve_ref(file_id, &reference, key, span.as_ref())?;

        let instance_id = self.ids.next(IdKind::Instance);
        let mut param_exprs = IndexMap::new();
        for (parameter, value) in &parameters {
            if let Some(expr_id) = self.register_expr_raw(value, ExprKind::Param, span.as_ref()) {
                param_exprs.insert(parameter.clone(), expr_id);
            }
        }

        // inline pin bindings fold into net endpoint lists
        let instance_expr = self.graph.registries.expr(name_expr_id).expr.clone();
        for (pin, net_name) in &pins {
            if !crate::ast::is_identifier(net_name.strip_prefix('$').unwrap_or(net_name)) {
                self.diags.push(
                    Diagnostic::error(
                        "IR-015",
                        format!(
                            "pin binding '{pin}:{net_name}' of instance '{key}' must name a literal net; \
                             author patterned connectivity on the net's endpoint list"
                        ),
                    )
                    .with_span(span.clone()),
                );
                continue;
            }
            let (net_id, _) = self.find_or_create_net(net_name, span.as_ref(), cx, net_ids);
            let endpoint_expr = instance_pin_expr(&instance_expr, pin);
            if !cx.endpoint_texts.insert(endpoint_expr.text.clone()) {
                self.diags.push(
                    Diagnostic::error(
                        "IR-008",
                        format!("pin '{pin}' of instance '{key}' is already bound through a net endpoint list"),
                    )
                    .with_span(span.clone()),
                );
                continue;
            }
            let expr_id = self.register_parsed(endpoint_expr, ExprKind::Endpoint, span.as_ref());
            let endpoint_id = self.ids.next(IdKind::Endpoint);
            self.graph.endpoints.insert(
                endpoint_id,
                EndpointBundle {
                    id: endpoint_id,
                    net: net_id,
                    port_expr: expr_id,
                },
            );
            let net = self.graph.nets.get_mut(&net_id).expect("net just resolved");
            net.endpoints.push(endpoint_id);
        }

        self.graph.instances.insert(
            instance_id,
            InstanceBundle {
                id: instance_id,
                name_expr: name_expr_id,
                ref_symbol,
                ref_file_id,
                param_exprs,
            },
        );
        Some(instance_id)
    }

    /// Registers a parameter value expression without named-pattern
    /// substitution (module variables are substituted at atomization, then
    /// the text is re-parsed).
    fn register_expr_raw(&mut self, text: &str, kind: ExprKind, span: Option<&SourceSpan>) -> Option<StableId> {
        match parse_pattern(text) {
            Ok(expr) => Some(self.register_parsed(expr, kind, span)),
            Err(err) => {
                self.diags
                    .push(Diagnostic::error("IR-020", format!("'{text}': {}", err.message)).with_span(span.cloned()));
                None
            }
        }
    }

    /// Resolves an instance reference to `(symbol, file_id)`.
    ///
    /// Qualified refs go through the file's `NameEnv`; unqualified refs
    /// search the current document. The authored symbol text is preserved —
    /// view selection over `cell@view` candidates happens later, in
    /// traversal or view binding.
    fn resolve_ref(
        &mut self,
        file_id: &str,
        reference: &str,
        instance_key: &str,
        span: Option<&SourceSpan>,
    ) -> Option<(String, FileId)> {
        let (namespace, symbol) = match reference.split_once('.') {
            Some((namespace, symbol)) => (Some(namespace), symbol),
            None => (None, reference),
        };

        let target_file: FileId = match namespace {
            Some(namespace) => {
                let env = self.resolved.envs.get(file_id);
                match env.and_then(|env| env.get(namespace)) {
                    Some(target) => target.clone(),
                    None => {
                        self.diags.push(
                            Diagnostic::error(
                                "IR-010",
                                format!(
                                    "instance '{instance_key}' references unknown namespace '{namespace}' in '{reference}'"
                                ),
                            )
                            .with_span(span.cloned()),
                        );
                        return None;
                    }
                }
            }
            None => file_id.to_owned(),
        };

        let document = self.resolved.db.get(&target_file)?;
        let cell = symbol.split('@').next().unwrap_or(symbol);
        let found = document.modules.contains_key(symbol)
            || document.devices.contains_key(symbol)
            || find_module_by_cell(document, cell).is_some()
            || document.devices.contains_key(cell);

        if !found {
            let (code, message) = if namespace.is_some() {
                (
                    "IR-010",
                    format!("instance '{instance_key}': '{reference}' does not resolve in its namespace"),
                )
            } else {
                (
                    "IR-011",
                    format!("instance '{instance_key}': '{reference}' does not name a module or device in this file"),
                )
            };
            self.diags.push(Diagnostic::error(code, message).with_span(span.cloned()));
            return None;
        }
        Some((symbol.to_owned(), target_file))
    }

    fn apply_instance_defaults(
        &mut self,
        module: &ModuleDecl,
        instance_ids: &[StableId],
        cx: &mut ModuleCx,
        net_ids: &mut Vec<StableId>,
    ) {
        for (name, binding) in &module.instance_defaults {
            for instance_id in instance_ids {
                let instance = self.graph.instance(*instance_id).clone();
                let target_ports =
                    target_port_names(self.resolved, &instance.ref_file_id, &instance.ref_symbol).unwrap_or_default();
                let instance_expr = self.graph.registries.expr(instance.name_expr).expr.clone();

                if target_ports.iter().any(|port| port == name) {
                    // pin binding default
                    if !crate::ast::is_identifier(binding.value.strip_prefix('$').unwrap_or(&binding.value)) {
                        self.diags.push(
                            Diagnostic::error(
                                "IR-015",
                                format!("default pin binding '{name}:{}' must name a literal net", binding.value),
                            )
                            .with_span(binding.span.clone()),
                        );
                        continue;
                    }
                    let endpoint_expr = instance_pin_expr(&instance_expr, name);
                    if cx.endpoint_texts.contains(&endpoint_expr.text) {
                        if !binding.suppress_override_warning {
                            self.diags.push(
                                Diagnostic::warning(
                                    "LINT-002",
                                    format!(
                                        "instance '{}' overrides default binding '{name}'; append '!' to the default key to silence",
                                        instance_expr.text
                                    ),
                                )
                                .with_span(binding.span.clone()),
                            );
                        }
                        continue;
                    }
                    let (net_id, _) = self.find_or_create_net(&binding.value, binding.span.as_ref(), cx, net_ids);
                    cx.endpoint_texts.insert(endpoint_expr.text.clone());
                    let expr_id = self.register_parsed(endpoint_expr, ExprKind::Endpoint, binding.span.as_ref());
                    let endpoint_id = self.ids.next(IdKind::Endpoint);
                    self.graph.endpoints.insert(
                        endpoint_id,
                        EndpointBundle {
                            id: endpoint_id,
                            net: net_id,
                            port_expr: expr_id,
                        },
                    );
                    self.graph
                        .nets
                        .get_mut(&net_id)
                        .expect("net just resolved")
                        .endpoints
                        .push(endpoint_id);
                } else {
                    // parameter default
                    if instance.param_exprs.contains_key(name) {
                        if !binding.suppress_override_warning {
                            self.diags.push(
                                Diagnostic::warning(
                                    "LINT-002",
                                    format!(
                                        "instance '{}' overrides default parameter '{name}'; append '!' to the default key to silence",
                                        instance_expr.text
                                    ),
                                )
                                .with_span(binding.span.clone()),
                            );
                        }
                        continue;
                    }
                    if let Some(expr_id) = self.register_expr_raw(&binding.value, ExprKind::Param, binding.span.as_ref()) {
                        self.graph
                            .instances
                            .get_mut(instance_id)
                            .expect("instance just created")
                            .param_exprs
                            .insert(name.clone(), expr_id);
                    }
                }
            }
        }
    }
}
