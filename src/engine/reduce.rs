//! Logical spot identity and per-identity reduction of reservation windows.
//!
//! Variants of one physical location ("Prison -1", "Prison -2 (NORTH)") share
//! a logical identity ("Prison"). Duration accounting counts time once per
//! logical spot, so booking two floors at once costs the same as one.

use crate::model::*;

/// Directional and floor markers stripped from spot names.
const VARIANT_MARKERS: [&str; 14] = [
    "(NORTH)", "(EAST)", "(SOUTH)", "(WEST)", "(RIGHT)", "(LEFT)", "-1", "-2", "-3", "-4", "-5",
    "-6", "-7", "-8",
];

/// Spot name with variant markers removed and whitespace normalized.
pub fn logical_spot_name(name: &str) -> String {
    let stripped = VARIANT_MARKERS
        .iter()
        .fold(name.to_string(), |acc, marker| acc.replace(marker, ""));
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Substring containment either way. An empty identity only matches itself.
pub fn same_logical_spot(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    a.contains(b) || b.contains(a)
}

/// One reduced window of a logical spot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSpan {
    pub logical_spot: String,
    pub span: Span,
    /// Reservations folded into this window.
    pub ids: Vec<ReservationId>,
}

/// Fold reservations into the fewest windows per logical spot.
///
/// Entries join the first logical spot their identity matches. Within a
/// logical spot, overlapping windows fold into one; disjoint windows stay
/// separate. No entry is ever dropped.
pub fn reduce_by_longest_per_spot(entries: &[ReservationWithSpot]) -> Vec<LogicalSpan> {
    let mut groups: Vec<(String, Vec<(Span, ReservationId)>)> = Vec::new();
    for entry in entries {
        let identity = logical_spot_name(&entry.spot.name);
        let member = (entry.span(), entry.reservation.id);
        match groups
            .iter_mut()
            .find(|(existing, _)| same_logical_spot(existing, &identity))
        {
            Some((_, members)) => members.push(member),
            None => groups.push((identity, vec![member])),
        }
    }

    groups
        .into_iter()
        .flat_map(|(logical_spot, members)| fold_windows(logical_spot, members))
        .collect()
}

fn fold_windows(logical_spot: String, mut members: Vec<(Span, ReservationId)>) -> Vec<LogicalSpan> {
    members.sort_by_key(|(span, _)| (span.start, span.end));
    let mut folded: Vec<LogicalSpan> = Vec::new();
    for (span, id) in members {
        if let Some(last) = folded.last_mut()
            && span.start < last.span.end
        {
            last.span.end = last.span.end.max(span.end);
            last.ids.push(id);
            continue;
        }
        folded.push(LogicalSpan {
            logical_spot: logical_spot.clone(),
            span,
            ids: vec![id],
        });
    }
    folded
}

pub fn total_duration(reduced: &[LogicalSpan]) -> Ms {
    reduced.iter().map(|l| l.span.duration_ms()).sum()
}
