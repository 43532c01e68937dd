//! Deterministic textual renderings of the intermediate graphs, used by the
//! pipeline dump hooks. The output is a debugging aid with a stable shape;
//! it is not a parseable interchange format.

use std::fmt::Write as _;

use crate::{atomize::AtomizedProgramGraph, graph::ProgramGraph};

/// Renders the patterned graph, expressions unexpanded.
pub fn render_patterned(graph: &ProgramGraph) -> String {
    let mut out = String::new();
    for device in &graph.devices {
        let _ = writeln!(out, "device {} [{}]", device.symbol, device.file_id);
        let _ = writeln!(out, "  ports: {}", device.ports.join(" "));
    }
    for module in &graph.modules {
        let _ = writeln!(out, "module {} [{}]", module.symbol, module.file_id);
        let ports: Vec<&str> = module
            .ports
            .iter()
            .map(|net_id| graph.registries.expr(graph.net(*net_id).name_expr).expr.text.as_str())
            .collect();
        let _ = writeln!(out, "  ports: {}", ports.join(" "));
        for net_id in &module.nets {
            let net = graph.net(*net_id);
            let name = &graph.registries.expr(net.name_expr).expr.text;
            let endpoints: Vec<&str> = net
                .endpoints
                .iter()
                .map(|endpoint_id| {
                    graph
                        .registries
                        .expr(graph.endpoint(*endpoint_id).port_expr)
                        .expr
                        .text
                        .as_str()
                })
                .collect();
            let marker = if net.is_port { "$" } else { "" };
            let _ = writeln!(out, "  net {marker}{name}: {}", endpoints.join(" "));
        }
        for instance_id in &module.instances {
            let instance = graph.instance(*instance_id);
            let name = &graph.registries.expr(instance.name_expr).expr.text;
            let params: Vec<String> = instance
                .param_exprs
                .iter()
                .map(|(key, expr_id)| format!("{key}={}", graph.registries.expr(*expr_id).expr.text))
                .collect();
            let _ = writeln!(out, "  instance {name} -> {} {}", instance.ref_symbol, params.join(" "));
        }
    }
    out
}

/// Renders the atomized graph, everything literal.
pub fn render_atomized(graph: &AtomizedProgramGraph) -> String {
    let mut out = String::new();
    for module in &graph.modules {
        let _ = writeln!(out, "module {} [{}]", module.symbol, module.file_id);
        let _ = writeln!(out, "  ports: {}", module.ports.join(" "));
        for net in &module.nets {
            let marker = if net.is_port { "$" } else { "" };
            let _ = writeln!(out, "  net {marker}{}", net.name);
        }
        for instance in &module.instances {
            let conns: Vec<String> = instance
                .conns
                .iter()
                .map(|(pin, net)| format!("{pin}:{net}"))
                .collect();
            let params: Vec<String> = instance
                .parameters
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            let _ = writeln!(
                out,
                "  instance {} -> {} ({}) {}",
                instance.name,
                instance.ref_symbol,
                conns.join(" "),
                params.join(" ")
            );
        }
    }
    out
}
