//! NetlistIR lowering and backend-template emission.

mod common;

use asdl::{TopPolicy, emit_netlist, lower_netlist, resolve_top_module};
use common::{atomized_clean, codes, ngspice_config};
use pretty_assertions::assert_eq;

const DIFF_PAIR: &str = "\
modules:
  m:
    nets:
      $VDD: [[\"MN_<P,N>.S\"]]
      IN: [[\"MN_<P,N>.G\"]]
      OUT: [[\"MN_<P,N>.D\"]]
    instances:
      MN_<P,N>: nfet
devices:
  nfet:
    ports: [D, G, S]
    backends:
      ngspice: \"M{name} {ports} nfet L=1u W=5u\"
top: m
";

fn lowered(source: &str) -> (asdl::Design, asdl::RealizedNames) {
    let graph = atomized_clean(source);
    let (top, diags, _) = resolve_top_module(&graph, TopPolicy::Strict);
    assert!(diags.is_empty(), "top resolution: {diags:#?}");
    let top = top.expect("top resolves").clone();
    let (result, diags) = lower_netlist(&graph, &top);
    assert!(diags.is_empty(), "lowering: {diags:#?}");
    result.expect("design lowered")
}

#[test]
fn device_instances_emit_through_their_template() {
    let (design, _) = lowered(DIFF_PAIR);
    let (netlist, diags) = emit_netlist(&design, &ngspice_config(), "ngspice", false);
    assert!(diags.is_empty(), "{diags:#?}");
    let netlist = netlist.unwrap();
    assert!(
        netlist.contains("MMN_P OUT IN VDD nfet L=1u W=5u\nMMN_N OUT IN VDD nfet L=1u W=5u"),
        "got:\n{netlist}"
    );
}

#[test]
fn flat_top_has_no_subckt_wrapper_but_header_and_footer_apply() {
    let (design, _) = lowered(DIFF_PAIR);
    let (netlist, _) = emit_netlist(&design, &ngspice_config(), "ngspice", false);
    let netlist = netlist.unwrap();
    assert!(netlist.starts_with("* design m\n"), "got:\n{netlist}");
    assert!(netlist.ends_with("* end\n"), "got:\n{netlist}");
    assert!(!netlist.contains(".subckt m"), "flat top must not be wrapped:\n{netlist}");
}

#[test]
fn top_as_subckt_wraps_the_top() {
    let (design, _) = lowered(DIFF_PAIR);
    let (netlist, _) = emit_netlist(&design, &ngspice_config(), "ngspice", true);
    let netlist = netlist.unwrap();
    assert!(netlist.contains(".subckt m VDD"), "got:\n{netlist}");
    assert!(netlist.contains(".ends"), "got:\n{netlist}");
}

#[test]
fn reachable_only_emission_drops_orphans() {
    let source = "\
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: used
  used:
    nets:
      $CK: []
  orphan:
    nets:
      $CK: []
top: top
";
    let (design, _) = lowered(source);
    let names: Vec<&str> = design.modules.iter().map(|module| module.name.as_str()).collect();
    assert_eq!(names, ["top", "used"]);
}

#[test]
fn colliding_realizations_get_ordinals_in_traversal_order() {
    // `stage` and `stage@default` both realize to the emitted name `stage`
    let source = "\
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: stage
      U2: stage@default
  stage:
    nets:
      $CK: []
  stage@default:
    nets:
      $CK: []
top: top
";
    let (design, _) = lowered(source);
    let names: Vec<&str> = design.modules.iter().map(|module| module.name.as_str()).collect();
    assert_eq!(names, ["top", "stage", "stage__2"]);
    assert!(!names.iter().any(|name| name.contains("__3")));
}

#[test]
fn view_symbols_realize_with_sanitized_suffix() {
    let source = "\
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: cell@fast
  cell@fast:
    nets:
      $CK: []
top: top
";
    let (design, _) = lowered(source);
    assert!(design.module("cell_fast").is_some(), "got: {:?}", design.modules);
}

#[test]
fn parameter_presence_selects_the_params_templates() {
    let source = "\
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: \"leaf (CK:CK) M=2\"
  leaf:
    parameters: {W: 5u}
    nets:
      $CK: []
top: top
";
    let (design, _) = lowered(source);
    let (netlist, diags) = emit_netlist(&design, &ngspice_config(), "ngspice", true);
    assert!(diags.is_empty(), "{diags:#?}");
    let netlist = netlist.unwrap();
    // module `leaf` has parameters -> header params template
    assert!(netlist.contains(".subckt leaf CK PARAMS: W=5u"), "got:\n{netlist}");
    // module `top` has none -> plain header
    assert!(netlist.contains(".subckt top CK\n"), "got:\n{netlist}");
    // instance U1 carries a parameter -> call params template
    assert!(netlist.contains("XU1 CK leaf PARAMS: M=2"), "got:\n{netlist}");
}

#[test]
fn dependencies_emit_before_their_parents() {
    let source = "\
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: \"mid (CK:CK)\"
  mid:
    nets:
      $CK: []
    instances:
      U2: \"leaf (CK:CK)\"
  leaf:
    nets:
      $CK: []
top: top
";
    let (design, _) = lowered(source);
    let (netlist, _) = emit_netlist(&design, &ngspice_config(), "ngspice", true);
    let netlist = netlist.unwrap();
    let leaf = netlist.find(".subckt leaf").expect("leaf emitted");
    let mid = netlist.find(".subckt mid").expect("mid emitted");
    let top = netlist.find(".subckt top").expect("top emitted");
    assert!(leaf < mid && mid < top, "emission order wrong:\n{netlist}");
}

#[test]
fn missing_backend_template_is_emit_004() {
    let (design, _) = lowered(DIFF_PAIR);
    let (netlist, diags) = emit_netlist(&design, &ngspice_config(), "xyce", false);
    assert!(netlist.is_none());
    assert!(codes(&diags).contains(&"EMIT-004"), "got: {diags:#?}");
}

#[test]
fn unknown_placeholder_is_emit_003() {
    let source = "\
modules:
  m:
    nets:
      OUT: [[\"MN.D\"]]
    instances:
      MN: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name} {ports} {bogus}\"
top: m
";
    let (design, _) = lowered(source);
    let (netlist, diags) = emit_netlist(&design, &ngspice_config(), "ngspice", false);
    assert!(netlist.is_none());
    assert!(codes(&diags).contains(&"EMIT-003"), "got: {diags:#?}");
}

#[test]
fn instance_parameters_override_device_defaults_in_merged_params() {
    let source = "\
modules:
  m:
    nets:
      OUT: [[\"MN.D\"]]
    instances:
      MN: \"nfet W=9u\"
devices:
  nfet:
    ports: [D]
    parameters: {L: 1u, W: 5u}
    backends:
      ngspice: \"M{name} {ports} nfet {params}\"
top: m
";
    let (design, _) = lowered(source);
    let (netlist, diags) = emit_netlist(&design, &ngspice_config(), "ngspice", false);
    assert!(diags.is_empty(), "{diags:#?}");
    assert!(netlist.unwrap().contains("MMN OUT nfet L=1u W=9u"));
}

#[test]
fn strict_top_requires_uniqueness_without_a_declaration() {
    let source = "\
modules:
  a:
    nets:
      $CK: []
  b:
    nets:
      $CK: []
";
    let graph = atomized_clean(source);
    let (top, diags, _) = resolve_top_module(&graph, TopPolicy::Strict);
    assert!(top.is_none());
    assert!(codes(&diags).contains(&"EMIT-001"), "got: {diags:#?}");

    let (top, diags, notes) = resolve_top_module(&graph, TopPolicy::Permissive);
    assert!(top.is_none());
    assert!(diags.is_empty(), "permissive must not error: {diags:#?}");
    assert!(!notes.is_empty(), "permissive reports a walk note");
}
