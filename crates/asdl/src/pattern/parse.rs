use std::fmt;

use super::{GroupKind, GroupSpec, PatternExpr, Segment, SegmentPart};

/// A pattern expression shape error, positioned by byte offset into the
/// authored text. The graph builder converts these into `IR-02x` diagnostics
/// anchored at the expression's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternParseError {
    pub message: String,
    pub offset: usize,
}

impl PatternParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for PatternParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

fn is_ident(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses a pattern expression.
///
/// Segments are split on top-level `;`; each segment interleaves literal
/// runs with `<...>` groups. Group bodies are ranges (`a:b`, `a:b:step`),
/// enum alternations (`x|y|z`, comma also accepted), or named references
/// (`@name`), with an optional `tag=` axis prefix on ranges and enums.
pub fn parse_pattern(text: &str) -> Result<PatternExpr, PatternParseError> {
    if text.is_empty() {
        return Err(PatternParseError::new("empty pattern expression", 0));
    }

    let mut segments = vec![];
    let mut parts: Vec<SegmentPart> = vec![];
    let mut literal = String::new();
    let mut segment_start = 0usize;

    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                if !literal.is_empty() {
                    parts.push(SegmentPart::Literal(std::mem::take(&mut literal)));
                }
                let close = find_group_end(text, i)?;
                let body = &text[i + 1..close];
                parts.push(SegmentPart::Group(parse_group(body, i + 1)?));
                i = close + 1;
            }
            b'>' => {
                return Err(PatternParseError::new("unbalanced '>' outside a group", i));
            }
            b';' => {
                if !literal.is_empty() {
                    parts.push(SegmentPart::Literal(std::mem::take(&mut literal)));
                }
                if parts.is_empty() {
                    return Err(PatternParseError::new("empty splice segment", segment_start));
                }
                segments.push(Segment {
                    parts: std::mem::take(&mut parts),
                });
                i += 1;
                segment_start = i;
            }
            _ => {
                // multi-byte chars pass through untouched as literal text
                let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
                literal.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(SegmentPart::Literal(literal));
    }
    if parts.is_empty() {
        return Err(PatternParseError::new("empty splice segment", segment_start));
    }
    segments.push(Segment { parts });

    Ok(PatternExpr {
        segments,
        text: text.to_owned(),
    })
}

/// Finds the byte offset of the `>` closing the group opened at `open`.
/// Nested groups are not part of the grammar.
fn find_group_end(text: &str, open: usize) -> Result<usize, PatternParseError> {
    for (offset, byte) in text.as_bytes().iter().enumerate().skip(open + 1) {
        match byte {
            b'>' => return Ok(offset),
            b'<' => return Err(PatternParseError::new("nested '<' inside a group", offset)),
            _ => {}
        }
    }
    Err(PatternParseError::new("unbalanced '<': missing '>'", open))
}

fn parse_group(body: &str, offset: usize) -> Result<GroupSpec, PatternParseError> {
    if body.is_empty() {
        return Err(PatternParseError::new("empty pattern group '<>'", offset));
    }

    if let Some(name) = body.strip_prefix('@') {
        if !is_ident(name) {
            return Err(PatternParseError::new(
                format!("invalid named pattern reference '<@{name}>'"),
                offset,
            ));
        }
        return Ok(GroupSpec {
            tag: None,
            kind: GroupKind::NamedRef(name.to_owned()),
        });
    }

    // optional axis tag: `tag=` with an identifier prefix
    let (tag, rest) = match body.split_once('=') {
        Some((prefix, rest)) if is_ident(prefix) => (Some(prefix.to_owned()), rest),
        _ => (None, body),
    };
    if rest.is_empty() {
        return Err(PatternParseError::new("empty pattern group body after axis tag", offset));
    }

    let kind = if rest.contains(':') {
        parse_range(rest, offset)?
    } else {
        parse_enum(rest, offset)?
    };
    Ok(GroupSpec { tag, kind })
}

fn parse_range(body: &str, offset: usize) -> Result<GroupKind, PatternParseError> {
    let fields: Vec<&str> = body.split(':').collect();
    if fields.len() > 3 {
        return Err(PatternParseError::new(
            format!("range '<{body}>' has too many ':' fields"),
            offset,
        ));
    }
    let parse_int = |field: &str| {
        field
            .trim()
            .parse::<i64>()
            .map_err(|_| PatternParseError::new(format!("invalid range bound '{field}' in '<{body}>'"), offset))
    };
    let start = parse_int(fields[0])?;
    let stop = parse_int(fields[1])?;
    let step = if fields.len() == 3 { parse_int(fields[2])? } else { 1 };
    if step <= 0 {
        return Err(PatternParseError::new(
            format!("range step must be positive in '<{body}>'"),
            offset,
        ));
    }
    Ok(GroupKind::Range { start, stop, step })
}

fn parse_enum(body: &str, offset: usize) -> Result<GroupKind, PatternParseError> {
    let separator = if body.contains('|') { '|' } else { ',' };
    let alts: Vec<String> = body.split(separator).map(|alt| alt.trim().to_owned()).collect();
    if alts.iter().any(String::is_empty) {
        return Err(PatternParseError::new(
            format!("empty alternative in enum group '<{body}>'"),
            offset,
        ));
    }
    Ok(GroupKind::Enum(alts))
}
