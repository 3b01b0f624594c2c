use crate::limits::MERGE_GAP_TOLERANCE_MS;
use crate::model::*;

/// How a new window combines with the author's own reservations on one spot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub span: Span,
    /// In input order; the first survives with `span`, the rest are deleted.
    pub merged_ids: Vec<ReservationId>,
    pub unaffected: Vec<ReservationWithSpot>,
}

impl MergePlan {
    /// Fewer than two reservations touched: nothing to bridge.
    pub fn is_noop(&self) -> bool {
        self.merged_ids.len() < 2
    }

    pub fn survivor(&self) -> Option<ReservationId> {
        self.merged_ids.first().copied()
    }

    pub fn absorbed(&self) -> &[ReservationId] {
        self.merged_ids.get(1..).unwrap_or(&[])
    }
}

/// Distance between two windows; zero when they touch or overlap.
fn gap_between(a: Span, b: Span) -> Ms {
    if b.start >= a.end {
        b.start - a.end
    } else if a.start >= b.end {
        a.start - b.end
    } else {
        0
    }
}

/// Fold every same-spot reservation within the gap tolerance of `candidate`
/// into one window. Other spots, and same-spot reservations further away,
/// are passed through as unaffected.
pub fn calculate_merge(
    upcoming: &[ReservationWithSpot],
    spot_name: &str,
    candidate: Span,
) -> MergePlan {
    let mut span = candidate;
    let mut merged_ids = Vec::new();
    let mut unaffected = Vec::new();

    for entry in upcoming {
        if entry.spot.name != spot_name
            || gap_between(candidate, entry.span()) > MERGE_GAP_TOLERANCE_MS
        {
            unaffected.push(entry.clone());
            continue;
        }
        span = span.union(&entry.span());
        merged_ids.push(entry.reservation.id);
    }

    MergePlan {
        span,
        merged_ids,
        unaffected,
    }
}
