use crate::limits::OVERBOOK_GRACE_MS;
use crate::model::*;

use super::EngineError;

/// Why an overbooking was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    ElevatedPrivilege,
    /// A single running reservation whose holder is presumed gone.
    AbandonedReservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing in the way.
    Proceed,
    /// Conflicts exist and will be removed or clipped.
    Overbook(Allowance),
}

fn unchanged(conflicts: &[Reservation]) -> Vec<ClippedOrRemovedReservation> {
    conflicts
        .iter()
        .cloned()
        .map(ClippedOrRemovedReservation::unchanged)
        .collect()
}

/// Decide whether a request may proceed over `conflicts` (already filtered to
/// the target spot, guild and window).
///
/// Order: no conflicts → proceed; not overbooking → deny; own reservation in
/// the way → [`EngineError::SelfOverbook`]; elevated privilege → allow; one
/// running conflict → allow as abandoned; a conflict younger than the grace
/// period → [`EngineError::GracePeriodNotElapsed`]; otherwise deny.
pub fn evaluate(
    conflicts: &[Reservation],
    requester: &Member,
    overbook: bool,
    elevated: bool,
    now: Ms,
) -> Result<Verdict, EngineError> {
    if conflicts.is_empty() {
        return Ok(Verdict::Proceed);
    }
    if !overbook {
        return Err(EngineError::InsufficientPermissions {
            conflicts: unchanged(conflicts),
        });
    }
    if conflicts.iter().any(|c| c.author_id == requester.id) {
        return Err(EngineError::SelfOverbook);
    }
    if elevated {
        return Ok(Verdict::Overbook(Allowance::ElevatedPrivilege));
    }
    if let [only] = conflicts
        && only.has_started(now)
        && !only.has_ended(now)
    {
        return Ok(Verdict::Overbook(Allowance::AbandonedReservation));
    }
    if let Some(young) = conflicts
        .iter()
        .find(|c| now < c.start_at + OVERBOOK_GRACE_MS)
    {
        return Err(EngineError::GracePeriodNotElapsed {
            start_at: young.start_at,
        });
    }
    Err(EngineError::InsufficientPermissions {
        conflicts: unchanged(conflicts),
    })
}
