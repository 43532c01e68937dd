use std::{cmp::Ordering, fmt};

/// Placeholder note attached when a diagnostic has no source span.
///
/// Older AST entries (and YAML nodes the span scanner cannot anchor) carry no
/// location. Rendering marks the gap with this note instead of fabricating a
/// position.
pub const NO_SPAN_NOTE: &str = "no source location recorded";

/// A half-open region of a source file, 1-based lines and columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceSpan {
    /// Canonical path of the file the span points into.
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    /// A span covering a single point, used when only a start position is known.
    pub fn point(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
            end_line: line,
            end_col: col,
        }
    }

    /// Sort key used by [`sort_stable`]: `(file, line, col)`.
    fn order_key(&self) -> (&str, u32, u32) {
        (&self.file, self.line, self.col)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Severity of a [`Diagnostic`]. Only `Error` gates later pipeline stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A secondary message attached to a diagnostic, optionally anchored to a span.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Note {
    pub span: Option<SourceSpan>,
    pub message: String,
}

/// A single structured report produced by any compiler stage.
///
/// Codes are namespaced strings (`PARSE-NNN`, `AST-NNN`, `IR-NNN`, `EMIT-NNN`,
/// `LINT-NNN`, `VIEW-NNN`). Diagnostics are plain values returned alongside
/// results; user-input problems never become panics or `Err` returns.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub span: Option<SourceSpan>,
    pub message: String,
    /// Ordered secondary notes; rendering preserves this order.
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity,
            span: None,
            message: message.into(),
            notes: vec![],
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    #[must_use]
    pub fn with_span(mut self, span: impl Into<Option<SourceSpan>>) -> Self {
        self.span = span.into();
        self
    }

    #[must_use]
    pub fn with_note(mut self, span: Option<SourceSpan>, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            span,
            message: message.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{span}: {}[{}] {}", self.severity, self.code, self.message)?,
            None => write!(f, "{}[{}] {} ({NO_SPAN_NOTE})", self.severity, self.code, self.message)?,
        }
        for note in &self.notes {
            match &note.span {
                Some(span) => write!(f, "\n  note: {span}: {}", note.message)?,
                None => write!(f, "\n  note: {}", note.message)?,
            }
        }
        Ok(())
    }
}

/// Orders diagnostics by `(file, line, col, code)` with spanless entries last.
///
/// The sort is stable, so diagnostics sharing a position keep their emission
/// order. Every renderer goes through this so output is deterministic.
pub fn sort_stable(diags: &mut [Diagnostic]) {
    diags.sort_by(|a, b| match (&a.span, &b.span) {
        (Some(sa), Some(sb)) => sa.order_key().cmp(&sb.order_key()).then_with(|| a.code.cmp(&b.code)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.code.cmp(&b.code),
    });
}

/// True when any diagnostic in the slice has error severity.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}
