//! Import resolution over real directory trees.

mod common;

use std::fs;
use std::path::Path;

use asdl::{Severity, has_errors, resolve_program, split_lib_path};
use common::codes;
use pretty_assertions::assert_eq;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const LEAF: &str = "\
modules:
  leaf:
    nets:
      $CK: []
";

#[test]
fn relative_imports_resolve_and_dedupe_by_file_id() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("lib/leaf.asdl"), LEAF);
    write(
        &dir.path().join("entry.asdl"),
        "\
imports:
  lib: ./lib/leaf.asdl
  alt: ./lib/../lib/leaf.asdl
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: \"lib.leaf (CK:CK)\"
      U2: \"alt.leaf (CK:CK)\"
top: top
",
    );

    let (resolved, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    assert!(!has_errors(&diags), "{diags:#?}");
    let resolved = resolved.unwrap();
    // both namespaces collapse to the same file_id; the file parses once
    assert_eq!(resolved.db.documents.len(), 2);
    let env = &resolved.envs[&resolved.entry];
    assert_eq!(env["lib"], env["alt"]);
}

#[test]
fn ambiguous_logical_import_lists_candidates_in_root_order() {
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    write(&root_a.path().join("lib/x.asdl"), LEAF);
    write(&root_b.path().join("lib/x.asdl"), LEAF);

    let entry_dir = tempfile::tempdir().unwrap();
    write(
        &entry_dir.path().join("entry.asdl"),
        "\
imports:
  x: lib.x
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: \"x.leaf (CK:CK)\"
top: top
",
    );

    let roots = [root_a.path().to_path_buf(), root_b.path().to_path_buf()];
    let (_, diags) = resolve_program(&entry_dir.path().join("entry.asdl"), &roots);
    let ambiguous = diags.iter().find(|diag| diag.code == "AST-015").expect("AST-015 raised");
    assert_eq!(ambiguous.notes.len(), 2, "both candidates listed");
    assert!(
        ambiguous.notes[0].message.contains(&root_a.path().to_string_lossy().to_string()),
        "first candidate comes from the first root: {:#?}",
        ambiguous.notes
    );
}

#[test]
fn logical_import_resolves_through_the_first_matching_root() {
    let root = tempfile::tempdir().unwrap();
    write(&root.path().join("lib/x.asdl"), LEAF);
    let entry_dir = tempfile::tempdir().unwrap();
    write(
        &entry_dir.path().join("entry.asdl"),
        "\
imports:
  x: lib.x
modules:
  top:
    nets:
      $CK: []
    instances:
      U1: \"x.leaf (CK:CK)\"
top: top
",
    );

    let (resolved, diags) = resolve_program(&entry_dir.path().join("entry.asdl"), &[root.path().to_path_buf()]);
    assert!(!has_errors(&diags), "{diags:#?}");
    assert_eq!(resolved.unwrap().db.documents.len(), 2);
}

#[test]
fn missing_import_is_ast_010() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("entry.asdl"),
        "imports:\n  lib: ./nothing.asdl\nmodules:\n  top:\n    nets:\n      $CK: []\ntop: top\n",
    );
    let (_, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    assert!(codes(&diags).contains(&"AST-010"), "got: {diags:#?}");
}

#[test]
fn malformed_logical_path_is_ast_011() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("entry.asdl"),
        "imports:\n  lib: lib.2bad\nmodules:\n  top:\n    nets:\n      $CK: []\ntop: top\n",
    );
    let (_, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    assert!(codes(&diags).contains(&"AST-011"), "got: {diags:#?}");
}

#[test]
fn import_cycle_renders_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("a.asdl"),
        "imports:\n  b: ./b.asdl\nmodules:\n  ma:\n    nets:\n      $CK: []\n    instances:\n      U: \"b.mb (CK:CK)\"\n",
    );
    write(
        &dir.path().join("b.asdl"),
        "imports:\n  a: ./a.asdl\nmodules:\n  mb:\n    nets:\n      $CK: []\n    instances:\n      U: \"a.ma (CK:CK)\"\n",
    );
    let (_, diags) = resolve_program(&dir.path().join("a.asdl"), &[]);
    let cycle = diags.iter().find(|diag| diag.code == "AST-013").expect("AST-013 raised");
    assert!(cycle.message.contains("a.asdl"), "chain names the files: {}", cycle.message);
    assert!(cycle.message.contains('\u{2192}'), "chain uses arrows: {}", cycle.message);
}

#[test]
fn import_only_document_is_ast_014() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("lib.asdl"), LEAF);
    write(&dir.path().join("entry.asdl"), "imports:\n  lib: ./lib.asdl\n");
    let (_, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    assert!(codes(&diags).contains(&"AST-014"), "got: {diags:#?}");
}

#[test]
fn unused_namespace_is_lint_001_warning() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("lib.asdl"), LEAF);
    write(
        &dir.path().join("entry.asdl"),
        "imports:\n  lib: ./lib.asdl\nmodules:\n  top:\n    nets:\n      $CK: []\ntop: top\n",
    );
    let (_, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    let lint = diags.iter().find(|diag| diag.code == "LINT-001").expect("LINT-001 raised");
    assert_eq!(lint.severity, Severity::Warning);
    assert!(!has_errors(&diags), "warnings must not gate: {diags:#?}");
}

#[test]
fn lib_path_splits_on_colons_and_skips_empty_entries() {
    let roots = split_lib_path("/a:/b::/c");
    assert_eq!(roots.len(), 3);
    assert_eq!(roots[0], Path::new("/a"));
    assert_eq!(roots[2], Path::new("/c"));
}

#[test]
fn unreachable_collider_in_an_import_does_not_consume_an_ordinal() {
    let dir = tempfile::tempdir().unwrap();
    // the imported file declares a module that would realize to `stage`,
    // but nothing instantiates it
    write(
        &dir.path().join("lib.asdl"),
        "modules:\n  stage:\n    nets:\n      $CK: []\n",
    );
    write(
        &dir.path().join("entry.asdl"),
        "\
imports:
  lib: ./lib.asdl
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
",
    );

    let (resolved, diags) = resolve_program(&dir.path().join("entry.asdl"), &[]);
    // the unused `lib` namespace warns; nothing errors
    assert!(!has_errors(&diags), "{diags:#?}");
    let resolved = resolved.unwrap();
    let (graph, diags) = asdl::build_graph(&resolved);
    assert!(!has_errors(&diags), "{diags:#?}");
    let (atomized, diags) = asdl::atomize(&graph);
    assert!(!has_errors(&diags), "{diags:#?}");
    let (top, _, _) = asdl::resolve_top_module(&atomized, asdl::TopPolicy::Strict);
    let top = top.unwrap().clone();
    let (result, _) = asdl::lower_netlist(&atomized, &top);
    let (design, _) = result.unwrap();
    let names: Vec<&str> = design.modules.iter().map(|module| module.name.as_str()).collect();
    assert_eq!(names, ["top", "stage", "stage__2"], "no __3 from the unreachable collider");
}
