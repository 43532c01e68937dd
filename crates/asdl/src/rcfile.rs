//! `.asdlrc` loader.
//!
//! The rc file supplies default library roots, a backend config path, and
//! environment defaults. The core never mutates the process environment;
//! the CLI shell merges `env` entries for keys that are still unset before
//! invoking the pipeline.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::{diagnostics::Diagnostic, resolver::normalize_path};

#[derive(Debug, Clone, serde::Deserialize)]
struct RawRcFile {
    schema_version: u32,
    #[serde(default)]
    lib_roots: Vec<String>,
    #[serde(default)]
    backend_config: Option<String>,
    #[serde(default)]
    env: IndexMap<String, String>,
}

/// A loaded `.asdlrc` with paths resolved against the rc file's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RcConfig {
    pub lib_roots: Vec<PathBuf>,
    pub backend_config: Option<PathBuf>,
    /// Environment defaults; applied only to keys that are unset.
    pub env: IndexMap<String, String>,
}

/// Expands `${ASDLRC_DIR}` and `${VAR}` in one rc path entry and resolves
/// relative results against the rc directory.
fn resolve_rc_path(entry: &str, rc_dir: &Path) -> PathBuf {
    let expanded = entry.replace("${ASDLRC_DIR}", &rc_dir.to_string_lossy());
    let expanded = crate::resolver::expand_path_entry(&expanded);
    if expanded.is_absolute() {
        normalize_path(&expanded)
    } else {
        normalize_path(&rc_dir.join(expanded))
    }
}

/// Loads and validates an `.asdlrc` document.
pub fn load_rc(path: &Path) -> Result<RcConfig, Diagnostic> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| Diagnostic::error("AST-010", format!("cannot read '{}': {err}", path.display())))?;
    let raw: RawRcFile = serde_yaml::from_str(&text)
        .map_err(|err| Diagnostic::error("AST-011", format!("malformed .asdlrc '{}': {err}", path.display())))?;
    if raw.schema_version != 1 {
        return Err(Diagnostic::error(
            "AST-011",
            format!(".asdlrc schema_version {} is not supported (expected 1)", raw.schema_version),
        ));
    }
    let rc_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(RcConfig {
        lib_roots: raw.lib_roots.iter().map(|entry| resolve_rc_path(entry, rc_dir)).collect(),
        backend_config: raw.backend_config.as_deref().map(|entry| resolve_rc_path(entry, rc_dir)),
        env: raw.env,
    })
}
