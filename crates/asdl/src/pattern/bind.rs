use std::fmt;

use super::ExpandedAtom;

/// Binding failure between a net expansion and an endpoint expansion.
/// `LengthMismatch` maps to `IR-005`; the axis variants map to `IR-006`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    LengthMismatch { net_len: usize, endpoint_len: usize },
    AxisLength { axis: String, net_len: u32, endpoint_len: u32 },
    AxisOrder { axis: String },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { net_len, endpoint_len } => write!(
                f,
                "endpoint expands to {endpoint_len} atoms but the net expands to {net_len}"
            ),
            Self::AxisLength {
                axis,
                net_len,
                endpoint_len,
            } => write!(
                f,
                "axis '{axis}' has length {net_len} on the net but {endpoint_len} on the endpoint"
            ),
            Self::AxisOrder { axis } => write!(
                f,
                "endpoint axis '{axis}' is ordered differently from the net's axis order"
            ),
        }
    }
}

/// Ordered tagged axes of an expansion: `(axis, len)` per tagged group.
/// Derived from the first atom; every atom of a single-segment expansion
/// shares the same group structure.
fn tagged_axes(atoms: &[ExpandedAtom]) -> Vec<(String, u32)> {
    atoms.first().map_or_else(Vec::new, |atom| {
        atom.coords
            .iter()
            .filter_map(|coord| coord.axis.clone().map(|axis| (axis, coord.len)))
            .collect()
    })
}

fn coord_along<'a>(atom: &'a ExpandedAtom, axis: &str) -> Option<u32> {
    atom.coords
        .iter()
        .find(|coord| coord.axis.as_deref() == Some(axis))
        .map(|coord| coord.index)
}

/// Pairs net atoms with endpoint atoms.
///
/// Returns `(net_atom_index, endpoint_atom_index)` pairs in deterministic
/// net-major order. Rules, in precedence order:
///
/// 1. A scalar net (one atom) accepts every endpoint atom.
/// 2. When both sides are single-segment and share tagged axis IDs, shared
///    axes must match in length exactly, missing axes on either side
///    broadcast, and the endpoint's shared-axis order must be a subsequence
///    of the net's.
/// 3. Otherwise equal expansion lengths zip pairwise by index, and a scalar
///    endpoint broadcasts to every net atom.
///
/// Splices never align across segments; an expression with splices only ever
/// participates through rule 3's total-length comparison.
pub fn bind_atoms(
    net: &[ExpandedAtom],
    net_single_segment: bool,
    endpoint: &[ExpandedAtom],
    endpoint_single_segment: bool,
) -> Result<Vec<(usize, usize)>, BindError> {
    if net.len() == 1 {
        return Ok((0..endpoint.len()).map(|ep| (0, ep)).collect());
    }

    if net_single_segment && endpoint_single_segment {
        let net_axes = tagged_axes(net);
        let endpoint_axes = tagged_axes(endpoint);
        let shared: Vec<&(String, u32)> = endpoint_axes
            .iter()
            .filter(|(axis, _)| net_axes.iter().any(|(net_axis, _)| net_axis == axis))
            .collect();
        if !shared.is_empty() {
            return bind_by_axes(net, endpoint, &net_axes, &shared);
        }
    }

    if endpoint.len() == net.len() {
        return Ok((0..net.len()).map(|index| (index, index)).collect());
    }
    if endpoint.len() == 1 {
        return Ok((0..net.len()).map(|index| (index, 0)).collect());
    }
    Err(BindError::LengthMismatch {
        net_len: net.len(),
        endpoint_len: endpoint.len(),
    })
}

fn bind_by_axes(
    net: &[ExpandedAtom],
    endpoint: &[ExpandedAtom],
    net_axes: &[(String, u32)],
    shared: &[&(String, u32)],
) -> Result<Vec<(usize, usize)>, BindError> {
    // shared axis lengths must match exactly
    for (axis, endpoint_len) in shared.iter().copied() {
        let (_, net_len) = net_axes
            .iter()
            .find(|(net_axis, _)| net_axis == axis)
            .expect("shared axis exists on the net");
        if net_len != endpoint_len {
            return Err(BindError::AxisLength {
                axis: axis.clone(),
                net_len: *net_len,
                endpoint_len: *endpoint_len,
            });
        }
    }

    // the endpoint's shared axes must appear as a subsequence of the net's order
    let mut net_cursor = 0usize;
    for (axis, _) in shared.iter().copied() {
        let found = net_axes[net_cursor..].iter().position(|(net_axis, _)| net_axis == axis);
        match found {
            Some(offset) => net_cursor += offset + 1,
            None => return Err(BindError::AxisOrder { axis: axis.clone() }),
        }
    }

    let mut pairs = vec![];
    for (net_index, net_atom) in net.iter().enumerate() {
        for (endpoint_index, endpoint_atom) in endpoint.iter().enumerate() {
            let matches = shared.iter().all(|(axis, _)| {
                let net_coord = coord_along(net_atom, axis).expect("net carries shared axis");
                let endpoint_coord = coord_along(endpoint_atom, axis).expect("endpoint carries shared axis");
                net_coord == endpoint_coord
            });
            if matches {
                pairs.push((net_index, endpoint_index));
            }
        }
    }
    Ok(pairs)
}
