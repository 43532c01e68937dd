use std::fmt;

use ahash::AHashMap;
use smallvec::SmallVec;

use super::{AxisCoord, ExpandedAtom, GroupKind, GroupSpec, PatternExpr, Segment, SegmentPart, SuffixPart};

/// Hard ceiling on the number of atoms a single expression may expand to.
pub const MAX_EXPANSION_ATOMS: usize = 10_000;

/// Expansion failure. `TooLarge` maps to `IR-007`; `UnsubstitutedRef` maps
/// to `IR-002` (it indicates a `<@name>` that survived registration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    TooLarge { size: usize },
    UnsubstitutedRef { name: String },
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size } => {
                write!(f, "pattern expands to {size} atoms, over the limit of {MAX_EXPANSION_ATOMS}")
            }
            Self::UnsubstitutedRef { name } => write!(f, "named pattern '<@{name}>' was never substituted"),
        }
    }
}

/// Expands an expression into literal atoms.
///
/// Deterministic order: outer segment index first, then the per-segment
/// Cartesian product with the leftmost group as the outermost loop. The
/// total across all segments is capped at [`MAX_EXPANSION_ATOMS`].
pub fn expand_atoms(expr: &PatternExpr) -> Result<Vec<ExpandedAtom>, ExpandError> {
    let mut total: usize = 0;
    for segment in &expr.segments {
        let mut size: usize = 1;
        for group in segment.groups() {
            if let GroupKind::NamedRef(name) = &group.kind {
                return Err(ExpandError::UnsubstitutedRef { name: name.clone() });
            }
            size = size.saturating_mul(group.kind.len());
        }
        total = total.saturating_add(size);
    }
    if total > MAX_EXPANSION_ATOMS {
        return Err(ExpandError::TooLarge { size: total });
    }

    let mut atoms = Vec::with_capacity(total);
    for (segment_index, segment) in expr.segments.iter().enumerate() {
        expand_segment(segment, u32::try_from(segment_index).expect("segment index fits u32"), &mut atoms);
    }
    Ok(atoms)
}

fn expand_segment(segment: &Segment, segment_index: u32, atoms: &mut Vec<ExpandedAtom>) {
    let groups: Vec<&GroupSpec> = segment.groups().collect();
    let lens: Vec<usize> = groups.iter().map(|group| group.kind.len()).collect();
    let count: usize = lens.iter().product();

    // odometer over group indices, leftmost group outermost
    let mut indices = vec![0usize; groups.len()];
    for atom_index in 0..count {
        atoms.push(realize_atom(segment, segment_index, atom_index, &indices, &groups, &lens));
        for pos in (0..indices.len()).rev() {
            indices[pos] += 1;
            if indices[pos] < lens[pos] {
                break;
            }
            indices[pos] = 0;
        }
    }
}

fn realize_atom(
    segment: &Segment,
    segment_index: u32,
    atom_index: usize,
    indices: &[usize],
    groups: &[&GroupSpec],
    lens: &[usize],
) -> ExpandedAtom {
    let mut base_name = String::new();
    let mut parts: SmallVec<[SuffixPart; 4]> = SmallVec::new();
    let mut seen_group = false;
    let mut group_pos = 0usize;

    for part in &segment.parts {
        match part {
            SegmentPart::Literal(text) => {
                if seen_group {
                    parts.push(SuffixPart::Str(text.clone()));
                } else {
                    base_name.push_str(text);
                }
            }
            SegmentPart::Group(group) => {
                seen_group = true;
                parts.push(group.kind.part_at(indices[group_pos]));
                group_pos += 1;
            }
        }
    }

    let mut text = base_name.clone();
    for part in &parts {
        text.push_str(&part.to_string());
    }

    let coords: SmallVec<[AxisCoord; 4]> = groups
        .iter()
        .zip(indices)
        .zip(lens)
        .map(|((group, index), len)| AxisCoord {
            axis: group.tag.clone(),
            index: u32::try_from(*index).expect("group index fits u32"),
            len: u32::try_from(*len).expect("group length fits u32"),
        })
        .collect();

    ExpandedAtom {
        text,
        base_name,
        parts,
        segment_index,
        atom_index: u32::try_from(atom_index).expect("atom index fits u32"),
        coords,
    }
}

/// Named-pattern substitution failure, mapped to `IR-002` by the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedSubstError {
    Undefined { name: String },
    /// The macro itself references another macro; substitution is one level
    /// deep with no recursion.
    Nested { name: String },
    /// A multi-segment macro was referenced from inside a segment that has
    /// other parts; splicing it in has no defined meaning there.
    Misplaced { name: String },
}

impl fmt::Display for NamedSubstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined { name } => write!(f, "undefined named pattern '<@{name}>'"),
            Self::Nested { name } => write!(f, "named pattern '{name}' references another named pattern"),
            Self::Misplaced { name } => {
                write!(f, "multi-segment named pattern '{name}' cannot be embedded mid-segment")
            }
        }
    }
}

/// Substitutes `<@name>` references from the module's named-pattern table.
///
/// One level only: substituted content must not itself contain named
/// references. Groups pulled in from a macro inherit the macro's name as
/// their axis ID unless they carry an explicit tag.
pub fn expand_named(expr: &PatternExpr, named: &AHashMap<String, PatternExpr>) -> Result<PatternExpr, NamedSubstError> {
    if !expr.has_named_refs() {
        return Ok(expr.clone());
    }

    let mut segments = Vec::with_capacity(expr.segments.len());
    for segment in &expr.segments {
        let lone_ref = segment.parts.len() == 1
            && matches!(
                &segment.parts[0],
                SegmentPart::Group(GroupSpec {
                    kind: GroupKind::NamedRef(_),
                    ..
                })
            );
        if lone_ref {
            let SegmentPart::Group(GroupSpec {
                kind: GroupKind::NamedRef(name),
                ..
            }) = &segment.parts[0]
            else {
                unreachable!("guarded by lone_ref");
            };
            // the macro is the whole segment: splice its segments in verbatim
            let macro_expr = lookup(named, name)?;
            for macro_segment in &macro_expr.segments {
                segments.push(tag_segment(macro_segment, name));
            }
            continue;
        }

        let mut parts = Vec::with_capacity(segment.parts.len());
        for part in &segment.parts {
            match part {
                SegmentPart::Group(GroupSpec {
                    kind: GroupKind::NamedRef(name),
                    ..
                }) => {
                    let macro_expr = lookup(named, name)?;
                    if macro_expr.segments.len() > 1 {
                        return Err(NamedSubstError::Misplaced { name: name.clone() });
                    }
                    for macro_part in &tag_segment(&macro_expr.segments[0], name).parts {
                        parts.push(macro_part.clone());
                    }
                }
                other => parts.push(other.clone()),
            }
        }
        segments.push(Segment { parts });
    }

    Ok(PatternExpr {
        segments,
        text: expr.text.clone(),
    })
}

fn lookup<'a>(named: &'a AHashMap<String, PatternExpr>, name: &str) -> Result<&'a PatternExpr, NamedSubstError> {
    let macro_expr = named.get(name).ok_or_else(|| NamedSubstError::Undefined {
        name: name.to_owned(),
    })?;
    if macro_expr.has_named_refs() {
        return Err(NamedSubstError::Nested { name: name.to_owned() });
    }
    Ok(macro_expr)
}

/// Clones a macro segment, defaulting untagged groups to the macro's name.
fn tag_segment(segment: &Segment, macro_name: &str) -> Segment {
    let parts = segment
        .parts
        .iter()
        .map(|part| match part {
            SegmentPart::Group(group) if group.tag.is_none() => SegmentPart::Group(GroupSpec {
                tag: Some(macro_name.to_owned()),
                kind: group.kind.clone(),
            }),
            other => other.clone(),
        })
        .collect();
    Segment { parts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse_pattern;

    fn texts(expr: &str) -> Vec<String> {
        expand_atoms(&parse_pattern(expr).unwrap())
            .unwrap()
            .into_iter()
            .map(|atom| atom.text)
            .collect()
    }

    #[test]
    fn literal_expands_to_itself() {
        assert_eq!(texts("VDD"), ["VDD"]);
    }

    #[test]
    fn enum_expansion_order_is_authored_order() {
        assert_eq!(texts("MN_<P|N>"), ["MN_P", "MN_N"]);
    }

    #[test]
    fn range_is_inclusive_and_directional() {
        assert_eq!(texts("B<1:3>"), ["B1", "B2", "B3"]);
        assert_eq!(texts("B<3:1>"), ["B3", "B2", "B1"]);
        assert_eq!(texts("B<0:6:2>"), ["B0", "B2", "B4", "B6"]);
    }

    #[test]
    fn cartesian_product_leftmost_group_outermost() {
        assert_eq!(texts("R<0:1>C<a|b>"), ["R0Ca", "R0Cb", "R1Ca", "R1Cb"]);
    }

    #[test]
    fn splice_concatenates_segments() {
        assert_eq!(texts("OUT;OUT"), ["OUT", "OUT"]);
        assert_eq!(texts("A<1:2>;B"), ["A1", "A2", "B"]);
    }

    #[test]
    fn trailing_literal_becomes_suffix_part() {
        let atoms = expand_atoms(&parse_pattern("A<1:2>B").unwrap()).unwrap();
        assert_eq!(atoms[0].text, "A1B");
        assert_eq!(atoms[0].base_name, "A");
        assert_eq!(
            atoms[0].parts.as_slice(),
            [SuffixPart::Int(1), SuffixPart::Str("B".into())]
        );
    }

    #[test]
    fn expansion_is_idempotent_over_atom_text() {
        // re-parsing an expanded atom's text yields a literal atom equal to it
        for atom in expand_atoms(&parse_pattern("MN_<P|N>").unwrap()).unwrap() {
            assert_eq!(texts(&atom.text), [atom.text.clone()]);
        }
    }

    #[test]
    fn oversized_expansion_is_rejected() {
        let err = expand_atoms(&parse_pattern("A<0:200>B<0:200>").unwrap()).unwrap_err();
        assert!(matches!(err, ExpandError::TooLarge { .. }));
    }

    #[test]
    fn named_substitution_tags_axis_with_macro_name() {
        let mut named = AHashMap::new();
        named.insert("pair".to_owned(), parse_pattern("<P|N>").unwrap());
        let expr = expand_named(&parse_pattern("MN_<@pair>").unwrap(), &named).unwrap();
        let group = expr.segments[0].groups().next().unwrap();
        assert_eq!(group.tag.as_deref(), Some("pair"));
        let atoms = expand_atoms(&expr).unwrap();
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms[0].text, "MN_P");
    }

    #[test]
    fn undefined_named_pattern_is_an_error() {
        let err = expand_named(&parse_pattern("X<@nope>").unwrap(), &AHashMap::new()).unwrap_err();
        assert_eq!(
            err,
            NamedSubstError::Undefined {
                name: "nope".to_owned()
            }
        );
    }

    #[test]
    fn substitution_is_single_level() {
        let mut named = AHashMap::new();
        named.insert("a".to_owned(), parse_pattern("<@b>").unwrap());
        named.insert("b".to_owned(), parse_pattern("<1:2>").unwrap());
        let err = expand_named(&parse_pattern("X<@a>").unwrap(), &named).unwrap_err();
        assert!(matches!(err, NamedSubstError::Nested { .. }));
    }
}
