//! Pattern expression algebra.
//!
//! A pattern expression is an authored string over literals, numeric ranges
//! (`<a:b>` or `<a:b:step>`), enum alternations (`<x|y|z>`), splices (`;`),
//! and named-pattern macros (`<@name>`). Parsing produces a [`PatternExpr`];
//! expansion flattens it to literal [`ExpandedAtom`]s; binding pairs the
//! atoms of a net with the atoms of an endpoint expression attached to it.

mod bind;
mod expand;
mod parse;

pub use bind::{BindError, bind_atoms};
pub use expand::{ExpandError, MAX_EXPANSION_ATOMS, NamedSubstError, expand_atoms, expand_named};
pub use parse::{PatternParseError, parse_pattern};

use std::fmt;

use smallvec::SmallVec;

/// One typed element of an atom's suffix.
///
/// Range elements stay integers so provenance survives formatting (`<1:2>`
/// yields `Int(1)`, `Int(2)`, not strings).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SuffixPart {
    Str(String),
    Int(i64),
}

impl fmt::Display for SuffixPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// The body of one `<...>` group.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GroupKind {
    /// Inclusive numeric range. `step` is always positive; direction comes
    /// from comparing `start` and `stop`.
    Range { start: i64, stop: i64, step: i64 },
    /// Enumerated alternatives in authored order.
    Enum(Vec<String>),
    /// Unsubstituted `<@name>` reference. Must be substituted via
    /// [`expand_named`] before expansion.
    NamedRef(String),
}

impl GroupKind {
    /// Number of atoms this group contributes to the Cartesian product.
    ///
    /// # Panics
    /// Panics on an unsubstituted [`GroupKind::NamedRef`]; substitution is a
    /// registration-time obligation of the graph builder.
    pub fn len(&self) -> usize {
        match self {
            Self::Range { start, stop, step } => {
                let span = (stop - start).unsigned_abs();
                usize::try_from(span / step.unsigned_abs() + 1).expect("range length fits usize")
            }
            Self::Enum(alts) => alts.len(),
            Self::NamedRef(name) => panic!("named pattern <@{name}> must be substituted before expansion"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th element of this group as a typed suffix part.
    pub fn part_at(&self, index: usize) -> SuffixPart {
        match self {
            Self::Range { start, stop, step } => {
                let offset = i64::try_from(index).expect("group index fits i64") * step;
                let value = if start <= stop { start + offset } else { start - offset };
                SuffixPart::Int(value)
            }
            Self::Enum(alts) => SuffixPart::Str(alts[index].clone()),
            Self::NamedRef(name) => panic!("named pattern <@{name}> must be substituted before expansion"),
        }
    }
}

/// A `<...>` group with its optional axis tag.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroupSpec {
    /// Explicit `<tag=...>` tag, or the owning named pattern's name for
    /// groups introduced by `<@name>` substitution. Untagged groups are
    /// anonymous and match positionally.
    pub tag: Option<String>,
    pub kind: GroupKind,
}

/// One piece of a segment: literal text or a group.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SegmentPart {
    Literal(String),
    Group(GroupSpec),
}

/// One `;`-delimited piece of a pattern expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    pub parts: Vec<SegmentPart>,
}

impl Segment {
    pub fn groups(&self) -> impl Iterator<Item = &GroupSpec> {
        self.parts.iter().filter_map(|part| match part {
            SegmentPart::Group(group) => Some(group),
            SegmentPart::Literal(_) => None,
        })
    }
}

/// A parsed pattern expression: one or more segments joined by `;`.
///
/// `;` is pure concatenation. The expansion length of the expression is the
/// sum over segments of the Cartesian product size of their groups.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PatternExpr {
    pub segments: Vec<Segment>,
    /// The authored text, kept verbatim for diagnostics and dumps.
    pub text: String,
}

impl PatternExpr {
    /// A single-segment expression holding one literal and nothing else.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![Segment {
                parts: vec![SegmentPart::Literal(text.clone())],
            }],
            text,
        }
    }

    pub fn has_splice(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn has_groups(&self) -> bool {
        self.segments.iter().any(|segment| segment.groups().next().is_some())
    }

    /// True when the expression expands to exactly its own text.
    pub fn is_literal(&self) -> bool {
        !self.has_splice() && !self.has_groups()
    }

    /// Ordered axis IDs of every group in the expression, `None` for
    /// anonymous groups. Used for broadcast matching during binding.
    pub fn axes(&self) -> Vec<Option<String>> {
        self.segments
            .iter()
            .flat_map(|segment| segment.groups().map(|group| group.tag.clone()))
            .collect()
    }

    /// True if any unsubstituted `<@name>` reference remains.
    pub fn has_named_refs(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.groups().any(|group| matches!(group.kind, GroupKind::NamedRef(_))))
    }
}

impl fmt::Display for PatternExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Position of an atom along one group of its segment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AxisCoord {
    /// Axis ID of the group, `None` for anonymous groups.
    pub axis: Option<String>,
    /// Index of this atom along the group.
    pub index: u32,
    /// Total length of the group.
    pub len: u32,
}

/// One literal atom produced by expanding a pattern expression, with its
/// origin inside the expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExpandedAtom {
    /// The full literal text (`base_name` followed by rendered parts).
    pub text: String,
    /// Literal prefix up to the segment's first group.
    pub base_name: String,
    /// Typed suffix elements after `base_name`, in authored order.
    pub parts: SmallVec<[SuffixPart; 4]>,
    /// Index of the owning segment within the expression.
    pub segment_index: u32,
    /// Index of this atom within its segment's Cartesian product.
    pub atom_index: u32,
    /// Per-group coordinates, used for tagged-axis broadcast.
    pub coords: SmallVec<[AxisCoord; 4]>,
}

/// Splits an expanded endpoint atom on its last `.` into `(instance, pin)`.
///
/// Expansion runs over the whole endpoint expression before splitting, so
/// `MN_IN_<N|P>.D` atomizes to `(MN_IN_N, D)` and `(MN_IN_P, D)`. Returns
/// `None` when the atom has no `.` or either side is empty.
pub fn split_endpoint(text: &str) -> Option<(&str, &str)> {
    let (instance, pin) = text.rsplit_once('.')?;
    if instance.is_empty() || pin.is_empty() {
        return None;
    }
    Some((instance, pin))
}
