//! View binding: baseline selection, rule overrides, sidecar shape.

mod common;

use asdl::{
    TopPolicy, apply_bindings, bind_views, load_view_config, query_bindings, resolve_top_module, sidecar_json,
};
use common::{atomized_clean, codes};
use pretty_assertions::assert_eq;

const SHIFT_ROWS: &str = "\
modules:
  sr_top:
    nets:
      $CK: []
    instances:
      row0: shift_row
      row1: shift_row
  shift_row@behave:
    nets:
      $CK: []
  shift_row@sim:
    nets:
      $CK: []
top: sr_top
";

const PROFILE: &str = "\
profiles:
  P:
    view_order: [behave, default]
    rules:
      - match: {path: \"row0\"}
        bind: shift_row@sim
";

#[test]
fn baseline_and_rule_override_resolve_in_index_order() {
    let graph = atomized_clean(SHIFT_ROWS);
    let config = load_view_config(PROFILE).unwrap();
    let (top, diags, _) = resolve_top_module(&graph, TopPolicy::Strict);
    assert!(diags.is_empty(), "{diags:#?}");
    let top = top.unwrap().clone();

    let (binding, diags) = bind_views(&graph, &config, "P", &top);
    assert!(diags.is_empty(), "{diags:#?}");

    assert_eq!(binding.entries.len(), 2);
    let row0 = &binding.entries[0];
    assert_eq!(row0.path, "");
    assert_eq!(row0.instance, "row0");
    assert_eq!(row0.resolved, "shift_row@sim");
    assert_eq!(row0.rule_id.as_deref(), Some("rule0"));

    let row1 = &binding.entries[1];
    assert_eq!(row1.path, "");
    assert_eq!(row1.instance, "row1");
    assert_eq!(row1.resolved, "shift_row@behave");
    assert_eq!(row1.rule_id, None);
}

#[test]
fn sidecar_json_has_the_frozen_shape() {
    let graph = atomized_clean(SHIFT_ROWS);
    let config = load_view_config(PROFILE).unwrap();
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (binding, _) = bind_views(&graph, &config, "P", &top);

    let json = sidecar_json("P", &binding.entries);
    assert_eq!(json["schema_version"], 1);
    assert_eq!(json["profile"], "P");
    assert_eq!(json["entries"][0]["instance"], "row0");
    assert_eq!(json["entries"][0]["resolved"], "shift_row@sim");
    assert_eq!(json["entries"][0]["rule_id"], "rule0");
    assert_eq!(json["entries"][1]["rule_id"], serde_json::Value::Null);
}

#[test]
fn applied_bindings_rewrite_instance_refs() {
    let graph = atomized_clean(SHIFT_ROWS);
    let config = load_view_config(PROFILE).unwrap();
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (binding, _) = bind_views(&graph, &config, "P", &top);

    let mut graph = graph;
    let diags = apply_bindings(&mut graph, &binding);
    assert!(diags.is_empty(), "{diags:#?}");

    let top_module = graph.module_by_symbol(common::ENTRY, "sr_top").unwrap();
    assert_eq!(top_module.instances[0].ref_symbol, "shift_row@sim");
    assert_eq!(top_module.instances[1].ref_symbol, "shift_row@behave");
}

#[test]
fn missing_profile_is_view_001() {
    let graph = atomized_clean(SHIFT_ROWS);
    let config = load_view_config(PROFILE).unwrap();
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (_, diags) = bind_views(&graph, &config, "NOPE", &top);
    assert!(codes(&diags).contains(&"VIEW-001"), "got: {diags:#?}");
}

#[test]
fn unresolvable_baseline_is_view_002() {
    let config = load_view_config("profiles:\n  P:\n    view_order: [fast]\n").unwrap();
    let graph = atomized_clean(SHIFT_ROWS);
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (_, diags) = bind_views(&graph, &config, "P", &top);
    assert!(codes(&diags).contains(&"VIEW-002"), "got: {diags:#?}");
}

#[test]
fn rule_path_naming_nothing_is_view_004() {
    let config = load_view_config(
        "profiles:\n  P:\n    view_order: [behave]\n    rules:\n      - match: {path: \"rowX\"}\n        bind: shift_row@sim\n",
    )
    .unwrap();
    let graph = atomized_clean(SHIFT_ROWS);
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (_, diags) = bind_views(&graph, &config, "P", &top);
    assert!(codes(&diags).contains(&"VIEW-004"), "got: {diags:#?}");
}

#[test]
fn rule_bind_naming_nothing_is_view_003() {
    let config = load_view_config(
        "profiles:\n  P:\n    view_order: [behave]\n    rules:\n      - match: {path: \"row0\"}\n        bind: nothing@here\n",
    )
    .unwrap();
    let graph = atomized_clean(SHIFT_ROWS);
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (_, diags) = bind_views(&graph, &config, "P", &top);
    assert!(codes(&diags).contains(&"VIEW-003"), "got: {diags:#?}");
}

#[test]
fn later_rules_override_earlier_ones() {
    let config = load_view_config(
        "profiles:\n  P:\n    view_order: [behave]\n    rules:\n      - id: first\n        match: {instance: row0}\n        bind: shift_row@sim\n      - id: second\n        match: {instance: row0}\n        bind: shift_row@behave\n",
    )
    .unwrap();
    let graph = atomized_clean(SHIFT_ROWS);
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (binding, diags) = bind_views(&graph, &config, "P", &top);
    assert!(diags.is_empty(), "{diags:#?}");
    assert_eq!(binding.entries[0].resolved, "shift_row@behave");
    assert_eq!(binding.entries[0].rule_id.as_deref(), Some("second"));
}

#[test]
fn explicit_authored_views_survive_baseline() {
    let source = "\
modules:
  t:
    nets:
      $CK: []
    instances:
      u0: cell@sim
  cell@behave:
    nets:
      $CK: []
  cell@sim:
    nets:
      $CK: []
top: t
";
    let config = load_view_config("profiles:\n  P:\n    view_order: [behave]\n").unwrap();
    let graph = atomized_clean(source);
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (binding, diags) = bind_views(&graph, &config, "P", &top);
    assert!(diags.is_empty(), "{diags:#?}");
    assert_eq!(binding.entries[0].resolved, "cell@sim");
}

#[test]
fn bindings_query_rows_sort_by_path_then_instance() {
    let graph = atomized_clean(SHIFT_ROWS);
    let config = load_view_config(PROFILE).unwrap();
    let (top, _, _) = resolve_top_module(&graph, TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (binding, _) = bind_views(&graph, &config, "P", &top);

    let envelope = query_bindings(&binding);
    assert_eq!(envelope["kind"], "query.bindings");
    assert_eq!(envelope["schema_version"], 1);
    let payload = envelope["payload"].as_array().unwrap();
    assert_eq!(payload[0]["instance"], "row0");
    assert_eq!(payload[0]["authored_ref"], "shift_row");
    assert_eq!(payload[1]["instance"], "row1");
    assert_eq!(payload[1]["resolved"], "shift_row@behave");
}
