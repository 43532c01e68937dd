//! Pattern atomization, endpoint binding, and module-variable substitution.

mod common;

use asdl::{Severity, has_errors, verify_atomized};
use common::{atomized, atomized_clean, built, codes};
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

#[test]
fn patterned_instance_atomizes_to_literal_pair() {
    let graph = atomized_clean(DIFF_PAIR);
    let module = &graph.modules[0];

    let names: Vec<&str> = module.instances.iter().map(|inst| inst.name.as_str()).collect();
    assert_eq!(names, ["MN_P", "MN_N"]);

    for instance in &module.instances {
        assert_eq!(instance.conns.get("D").map(String::as_str), Some("OUT"));
        assert_eq!(instance.conns.get("G").map(String::as_str), Some("IN"));
        assert_eq!(instance.conns.get("S").map(String::as_str), Some("VDD"));
    }
}

#[test]
fn dollar_nets_become_ports_without_the_sigil() {
    let graph = atomized_clean(DIFF_PAIR);
    let module = &graph.modules[0];
    assert_eq!(module.ports, ["VDD"]);
    assert!(module.nets.iter().all(|net| !net.name.starts_with('$')));
}

#[test]
fn verifier_is_clean_on_a_clean_module() {
    let graph = atomized_clean(DIFF_PAIR);
    let diags = verify_atomized(&graph);
    assert!(diags.is_empty(), "verifier found: {diags:#?}");
}

#[test]
fn module_variables_substitute_before_parameter_expansion() {
    let source = "\
modules:
  m:
    parameters: {L: 0.2u, W: 5u}
    nets:
      $VSS: [[\"MN_<1:2>.S\"]]
    instances:
      MN_<1:2>: \"nfet L={L} W={W} NF=<1:2>\"
devices:
  nfet:
    ports: [S]
    backends:
      ngspice: \"M{name} {ports} nfet\"
top: m
";
    let graph = atomized_clean(source);
    let module = &graph.modules[0];
    assert_eq!(module.instances.len(), 2);

    let first = &module.instances[0];
    assert_eq!(first.name, "MN_1");
    assert_eq!(first.parameters.get("L").map(String::as_str), Some("0.2u"));
    assert_eq!(first.parameters.get("W").map(String::as_str), Some("5u"));
    assert_eq!(first.parameters.get("NF").map(String::as_str), Some("1"));

    let second = &module.instances[1];
    assert_eq!(second.name, "MN_2");
    assert_eq!(second.parameters.get("NF").map(String::as_str), Some("2"));
}

#[test]
fn undefined_module_variable_is_exactly_one_ir_012() {
    let source = "\
modules:
  m:
    parameters: {W: 5u}
    nets:
      $VSS: [[\"MN_<1:2>.S\"]]
    instances:
      MN_<1:2>: \"nfet L={L} W={W}\"
devices:
  nfet:
    ports: [S]
    backends:
      ngspice: \"M{name} {ports} nfet\"
top: m
";
    let (_, diags) = atomized(source);
    let errors: Vec<_> = diags.iter().filter(|diag| diag.severity == Severity::Error).collect();
    assert_eq!(errors.len(), 1, "expected exactly one error, got: {errors:#?}");
    assert_eq!(errors[0].code, "IR-012");
    assert!(errors[0].message.contains('L'), "message should name the variable: {}", errors[0].message);
    assert!(errors[0].span.is_some(), "the diagnostic should carry the parameter span");
}

#[test]
fn spliced_net_name_is_rejected_at_build() {
    let source = "\
modules:
  m:
    nets:
      FOO;BAR: []
    instances:
      X: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let diags = built(source);
    assert!(codes(&diags).contains(&"IR-003"), "got: {diags:#?}");
    let diag = diags.iter().find(|diag| diag.code == "IR-003").unwrap();
    assert!(diag.span.is_some(), "IR-003 should carry the net key span");
}

#[test]
fn net_endpoint_length_mismatch_is_ir_005() {
    let source = "\
modules:
  m:
    nets:
      D<1:3>: [[\"X<1:2>.D\"]]
    instances:
      X<1:2>: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let (_, diags) = atomized(source);
    assert!(codes(&diags).contains(&"IR-005"), "got: {diags:#?}");
}

#[test]
fn tagged_axis_mismatch_is_ir_006() {
    let source = "\
modules:
  m:
    nets:
      D<r=1:2>: [[\"X<r=1:3>.D\"]]
    instances:
      X<r=1:3>: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let (_, diags) = atomized(source);
    assert!(codes(&diags).contains(&"IR-006"), "got: {diags:#?}");
}

#[test]
fn named_pattern_macro_expands_through_instances() {
    let source = "\
modules:
  m:
    patterns:
      pair: \"<P|N>\"
    nets:
      OUT: [[\"MN_<@pair>.D\"]]
    instances:
      MN_<@pair>: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let graph = atomized_clean(source);
    let names: Vec<&str> = graph.modules[0].instances.iter().map(|inst| inst.name.as_str()).collect();
    assert_eq!(names, ["MN_P", "MN_N"]);
}

#[test]
fn undefined_named_pattern_is_ir_002() {
    let source = "\
modules:
  m:
    nets:
      OUT: []
    instances:
      MN_<@nope>: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let diags = built(source);
    assert!(codes(&diags).contains(&"IR-002"), "got: {diags:#?}");
}

#[test]
fn oversized_expansion_is_ir_007_and_suppresses_cascades() {
    let source = "\
modules:
  m:
    nets:
      OUT: [[\"X<0:200><0:200>.D\"]]
    instances:
      X<0:200><0:200>: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let (_, diags) = atomized(source);
    let errors: Vec<&str> = codes(&diags)
        .into_iter()
        .filter(|code| code.starts_with("IR"))
        .collect();
    assert!(errors.contains(&"IR-007"), "got: {errors:?}");
    assert!(
        !errors.contains(&"IR-004"),
        "endpoint cascade should be suppressed after the instance failed: {errors:?}"
    );
}

#[test]
fn instance_defaults_bind_pins_and_promote_ports() {
    let source = "\
modules:
  m:
    nets:
      OUT: [[\"MN.D\"]]
    instances:
      MN: nfet
    instance_defaults:
      B: $VSS
devices:
  nfet:
    ports: [D, B]
    backends:
      ngspice: \"M{name} {ports} nfet\"
top: m
";
    let graph = atomized_clean(source);
    let module = &graph.modules[0];
    assert_eq!(module.ports, ["VSS"], "the defaults-created $ net promotes to a port");
    assert_eq!(module.instances[0].conns.get("B").map(String::as_str), Some("VSS"));
}

#[test]
fn default_keys_classify_against_ports_the_target_promotes_itself() {
    // `leaf` has no nets or ports of its own; its VSS port only exists
    // through its own `instance_defaults` promotion. The parent's defaults
    // key must still classify as a pin binding, not a parameter.
    let source = "\
modules:
  parent:
    instances:
      U1: leaf
    instance_defaults:
      VSS: $GND
  leaf:
    instances:
      X: dev
    instance_defaults:
      B: $VSS
devices:
  dev:
    ports: [B]
    backends:
      ngspice: \"M{name} {ports} dev\"
top: parent
";
    let graph = atomized_clean(source);
    let diags = verify_atomized(&graph);
    assert!(diags.is_empty(), "verifier found: {diags:#?}");

    let parent = &graph.modules[0];
    assert_eq!(parent.ports, ["GND"], "the parent's defaults-created $ net promotes");
    let u1 = &parent.instances[0];
    assert_eq!(u1.conns.get("VSS").map(String::as_str), Some("GND"));
    assert!(u1.parameters.is_empty(), "VSS must wire as a pin, not register as a parameter");

    let leaf = &graph.modules[1];
    assert_eq!(leaf.ports, ["VSS"]);
    assert_eq!(leaf.instances[0].conns.get("B").map(String::as_str), Some("VSS"));
}

#[test]
fn overriding_a_default_warns_unless_suppressed() {
    let template = "\
modules:
  m:
    nets:
      OUT: [[\"MN.D\"]]
      MYB: [[\"MN.B\"]]
    instances:
      MN: nfet
    instance_defaults:
      KEY: $VSS
devices:
  nfet:
    ports: [D, B]
    backends:
      ngspice: \"M{name} {ports} nfet\"
top: m
";
    let plain = built(&template.replace("KEY", "B"));
    assert!(codes(&plain).contains(&"LINT-002"), "got: {plain:#?}");
    assert!(!has_errors(&plain), "the override warning must not be an error");

    let suppressed = built(&template.replace("KEY", "\"B!\""));
    assert!(!codes(&suppressed).contains(&"LINT-002"), "got: {suppressed:#?}");
}

#[test]
fn endpoint_against_undeclared_pin_is_caught_by_the_verifier() {
    let source = "\
modules:
  m:
    nets:
      OUT: [[\"MN.Q\"]]
    instances:
      MN: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    let graph = atomized_clean(source);
    let diags = verify_atomized(&graph);
    assert!(codes(&diags).contains(&"IR-053"), "got: {diags:#?}");
}

#[test]
fn endpoint_atomization_commutes_with_splitting() {
    // expanding the whole endpoint expression then splitting on '.' yields
    // the same set as splitting first and expanding the instance side
    let whole: Vec<(String, String)> = asdl::expand_atoms(&asdl::parse_pattern("MN_IN_<N|P>.D").unwrap())
        .unwrap()
        .iter()
        .map(|atom| {
            let (instance, pin) = asdl::split_endpoint(&atom.text).unwrap();
            (instance.to_owned(), pin.to_owned())
        })
        .collect();
    let split_first: Vec<(String, String)> = asdl::expand_atoms(&asdl::parse_pattern("MN_IN_<N|P>").unwrap())
        .unwrap()
        .iter()
        .map(|atom| (atom.text.clone(), "D".to_owned()))
        .collect();
    assert_eq!(whole, split_first);
}

#[test]
fn scalar_endpoint_broadcasts_across_a_patterned_net() {
    let source = "\
modules:
  m:
    nets:
      D<1:3>: [[\"X.D\"]]
    instances:
      X: nfet
devices:
  nfet:
    ports: [D]
    backends:
      ngspice: \"M{name}\"
top: m
";
    // a single pin cannot carry three nets; binding accepts it (K == 1
    // broadcasts) and the conflict surfaces as IR-008
    let (_, diags) = atomized(source);
    assert!(codes(&diags).contains(&"IR-008"), "got: {diags:#?}");
}
