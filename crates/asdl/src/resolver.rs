//! Import resolution: path search, `ProgramDB`, per-file `NameEnv`, and
//! cycle detection.
//!
//! `file_id` is the canonical absolute path of a source file: `.` and `..`
//! are collapsed lexically, symlinks are preserved. The same file reached
//! under several namespaces is parsed once and deduplicated by `file_id`.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    ast::{AsdlDocument, validate_document},
    diagnostics::{Diagnostic, SourceSpan},
    parse::parse_source,
};

/// Canonical identifier of a source file.
pub type FileId = String;

/// Per-file mapping from import namespace to the resolved file.
pub type NameEnv = IndexMap<String, FileId>;

/// All parsed documents of one compilation, keyed by `file_id` in
/// deterministic resolution order: the entry file first, then imported
/// files in dependency order.
#[derive(Debug, Default)]
pub struct ProgramDb {
    pub documents: IndexMap<FileId, AsdlDocument>,
}

impl ProgramDb {
    pub fn get(&self, file_id: &str) -> Option<&AsdlDocument> {
        self.documents.get(file_id)
    }
}

/// Result of import resolution: the document database, the per-file
/// namespace environments, and the entry `file_id`.
#[derive(Debug)]
pub struct ResolvedProgram {
    pub db: ProgramDb,
    pub envs: AHashMap<FileId, NameEnv>,
    pub entry: FileId,
}

/// Collapses `.` and `..` lexically without touching the filesystem.
/// Symlinks survive; a `..` that would escape the root is dropped.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Produces the canonical `file_id` for `path`, resolving relative paths
/// against `base` (the importing file's directory, or the working directory
/// for the entry file).
pub fn file_id_for(path: &Path, base: &Path) -> FileId {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize_path(&absolute).to_string_lossy().into_owned()
}

/// How one `imports:` value is interpreted.
enum ImportKind {
    /// `./x.asdl` or `../x.asdl`, resolved against the importing file.
    Relative(PathBuf),
    /// An absolute filesystem path, used as-is.
    Absolute(PathBuf),
    /// A dotted logical path (`lib.x` → `lib/x.asdl`) or a root-relative
    /// file path, searched across the library roots in order.
    Logical(PathBuf),
}

fn classify_import(raw: &str) -> Result<ImportKind, String> {
    if raw.trim().is_empty() {
        return Err("import path is empty".to_owned());
    }
    if raw.starts_with("./") || raw.starts_with("../") {
        return Ok(ImportKind::Relative(PathBuf::from(raw)));
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Ok(ImportKind::Absolute(path.to_path_buf()));
    }
    if raw.ends_with(".asdl") {
        return Ok(ImportKind::Logical(PathBuf::from(raw)));
    }
    // dotted logical path: every segment must be an identifier
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.iter().any(|segment| !crate::ast::is_identifier(segment)) {
        return Err(format!("malformed logical import path '{raw}'"));
    }
    let mut path = PathBuf::new();
    for segment in &segments {
        path.push(segment);
    }
    path.set_extension("asdl");
    Ok(ImportKind::Logical(path))
}

/// Resolves all imports reachable from `entry`, parsing every reached file
/// exactly once.
///
/// `lib_roots` is the merged search list: CLI-supplied roots first, then
/// `ASDL_LIB_PATH` entries, already expanded and normalized by the caller.
pub fn resolve_program(entry: &Path, lib_roots: &[PathBuf]) -> (Option<ResolvedProgram>, Vec<Diagnostic>) {
    let mut diags = vec![];
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let entry_id = file_id_for(entry, &cwd);

    let mut db = ProgramDb::default();
    let mut envs: AHashMap<FileId, NameEnv> = AHashMap::new();
    let mut stack: Vec<FileId> = vec![];
    let mut visiting: AHashSet<FileId> = AHashSet::new();

    load_file(&entry_id, None, lib_roots, &mut db, &mut envs, &mut stack, &mut visiting, &mut diags);

    if db.documents.is_empty() {
        return (None, diags);
    }
    // the walk inserts post-order; the entry document leads the database
    if let Some(index) = db.documents.get_index_of(&entry_id) {
        db.documents.move_index(index, 0);
    }
    debug!(files = db.documents.len(), "import resolution complete");
    (
        Some(ResolvedProgram {
            db,
            envs,
            entry: entry_id,
        }),
        diags,
    )
}

#[expect(clippy::too_many_arguments, reason = "recursive walk threads its whole state")]
fn load_file(
    file_id: &str,
    import_span: Option<&SourceSpan>,
    lib_roots: &[PathBuf],
    db: &mut ProgramDb,
    envs: &mut AHashMap<FileId, NameEnv>,
    stack: &mut Vec<FileId>,
    visiting: &mut AHashSet<FileId>,
    diags: &mut Vec<Diagnostic>,
) {
    if db.documents.contains_key(file_id) {
        return;
    }
    if visiting.contains(file_id) {
        let chain_start = stack.iter().position(|id| id == file_id).unwrap_or(0);
        let mut chain: Vec<&str> = stack[chain_start..].iter().map(String::as_str).collect();
        chain.push(file_id);
        diags.push(
            Diagnostic::error("AST-013", format!("import cycle: {}", chain.join(" \u{2192} ")))
                .with_span(import_span.cloned()),
        );
        return;
    }

    let source = match fs::read_to_string(file_id) {
        Ok(source) => source,
        Err(err) => {
            diags.push(
                Diagnostic::error("AST-010", format!("cannot read '{file_id}': {err}"))
                    .with_span(import_span.cloned()),
            );
            return;
        }
    };
    // file handle is closed here; parsing proceeds over owned bytes

    let (document, mut parse_diags) = parse_source(&source, file_id);
    diags.append(&mut parse_diags);
    let Some(document) = document else { return };
    diags.extend(validate_document(&document));

    if document.is_import_only() {
        diags.push(
            Diagnostic::error(
                "AST-014",
                format!("'{file_id}' declares only imports; at least one module or device is required"),
            ),
        );
    }

    visiting.insert(file_id.to_owned());
    stack.push(file_id.to_owned());

    let base_dir = Path::new(file_id).parent().map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
    let mut env = NameEnv::new();
    for (namespace, import) in &document.imports {
        match resolve_import_target(&import.path, &base_dir, lib_roots, import.span.as_ref(), diags) {
            Some(target_id) => {
                debug!(namespace = %namespace, target = %target_id, "resolved import");
                env.insert(namespace.clone(), target_id.clone());
                load_file(&target_id, import.span.as_ref(), lib_roots, db, envs, stack, visiting, diags);
            }
            None => {}
        }
    }

    warn_unused_namespaces(&document, &env, diags);

    stack.pop();
    visiting.remove(file_id);
    envs.insert(file_id.to_owned(), env);
    db.documents.insert(file_id.to_owned(), document);
}

fn resolve_import_target(
    raw: &str,
    base_dir: &Path,
    lib_roots: &[PathBuf],
    span: Option<&SourceSpan>,
    diags: &mut Vec<Diagnostic>,
) -> Option<FileId> {
    let kind = match classify_import(raw) {
        Ok(kind) => kind,
        Err(message) => {
            diags.push(Diagnostic::error("AST-011", message).with_span(span.cloned()));
            return None;
        }
    };
    match kind {
        ImportKind::Relative(path) => {
            let target = file_id_for(&path, base_dir);
            if Path::new(&target).is_file() {
                Some(target)
            } else {
                diags.push(
                    Diagnostic::error("AST-010", format!("imported file '{target}' does not exist"))
                        .with_span(span.cloned()),
                );
                None
            }
        }
        ImportKind::Absolute(path) => {
            let target = normalize_path(&path).to_string_lossy().into_owned();
            if Path::new(&target).is_file() {
                Some(target)
            } else {
                diags.push(
                    Diagnostic::error("AST-010", format!("imported file '{target}' does not exist"))
                        .with_span(span.cloned()),
                );
                None
            }
        }
        ImportKind::Logical(suffix) => {
            let mut matches: Vec<FileId> = vec![];
            for root in lib_roots {
                let candidate = normalize_path(&root.join(&suffix));
                if candidate.is_file() {
                    matches.push(candidate.to_string_lossy().into_owned());
                }
            }
            match matches.len() {
                0 => {
                    diags.push(
                        Diagnostic::error(
                            "AST-010",
                            format!("logical import '{raw}' not found under any library root"),
                        )
                        .with_span(span.cloned()),
                    );
                    None
                }
                1 => Some(matches.remove(0)),
                _ => {
                    let mut diag = Diagnostic::error(
                        "AST-015",
                        format!("logical import '{raw}' is ambiguous across library roots"),
                    )
                    .with_span(span.cloned());
                    for hit in &matches {
                        diag = diag.with_note(None, format!("candidate: {hit}"));
                    }
                    diags.push(diag);
                    None
                }
            }
        }
    }
}

/// Raises `LINT-001` for imported namespaces no instance reference uses.
fn warn_unused_namespaces(document: &AsdlDocument, env: &NameEnv, diags: &mut Vec<Diagnostic>) {
    let mut used: AHashSet<&str> = AHashSet::new();
    for module in document.modules.values() {
        for instance in module.instances.values() {
            let text = instance.value.reference_text();
            let head = text.split_whitespace().next().unwrap_or(text);
            if let Some((namespace, _)) = head.split_once('.') {
                used.insert(namespace);
            }
        }
    }
    for namespace in env.keys() {
        if !used.contains(namespace.as_str()) {
            let span = document.imports.get(namespace).and_then(|import| import.span.clone());
            diags.push(
                Diagnostic::warning("LINT-001", format!("imported namespace '{namespace}' is never referenced"))
                    .with_span(span),
            );
        }
    }
}

/// Expands `~`, `${VAR}`, and `$VAR` in a search-path entry and collapses
/// `.`/`..`. Unset variables expand to nothing, matching shell behavior.
pub fn expand_path_entry(entry: &str) -> PathBuf {
    let mut text = entry.to_owned();
    if let Some(rest) = text.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                text = format!("{home}{rest}");
            }
        }
    }
    let mut expanded = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch != '$' {
            expanded.push(ch);
            continue;
        }
        let rest = &text[index + 1..];
        if let Some(inner) = rest.strip_prefix('{') {
            if let Some(close) = inner.find('}') {
                let name = &inner[..close];
                expanded.push_str(&std::env::var(name).unwrap_or_default());
                for _ in 0..close + 2 {
                    chars.next();
                }
                continue;
            }
        }
        let name_len = rest
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        if name_len == 0 {
            expanded.push('$');
            continue;
        }
        let name = &rest[..name_len];
        expanded.push_str(&std::env::var(name).unwrap_or_default());
        for _ in 0..name_len {
            chars.next();
        }
    }
    normalize_path(Path::new(&expanded))
}

/// Splits a colon-separated `ASDL_LIB_PATH` value into expanded roots.
pub fn split_lib_path(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(expand_path_entry)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn logical_import_maps_dots_to_directories() {
        match classify_import("lib.x").unwrap() {
            ImportKind::Logical(path) => assert_eq!(path, PathBuf::from("lib/x.asdl")),
            _ => panic!("expected logical import"),
        }
    }

    #[test]
    fn malformed_logical_path_is_rejected() {
        assert!(classify_import("lib.2bad").is_err());
        assert!(classify_import("").is_err());
    }

    #[test]
    fn relative_prefixes_classify_as_relative() {
        assert!(matches!(classify_import("./x.asdl").unwrap(), ImportKind::Relative(_)));
        assert!(matches!(classify_import("../x.asdl").unwrap(), ImportKind::Relative(_)));
    }
}
