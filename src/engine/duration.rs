use crate::limits::{
    CANDIDATE_ID, MAX_RESERVATION_LENGTH_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS,
};
use crate::model::*;

use super::EngineError;
use super::reduce::{LogicalSpan, reduce_by_longest_per_spot, total_duration};

/// Absolute cap for one reservation. Returns the validated window.
pub fn validate_duration(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let valid = MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS;
    if let Some(ms) = [start, end].into_iter().find(|ms| !valid.contains(ms)) {
        return Err(EngineError::TimestampOutOfRange(ms));
    }
    if end <= start {
        return Err(EngineError::EmptyWindow);
    }
    let duration = end - start;
    if duration > MAX_RESERVATION_LENGTH_MS {
        return Err(EngineError::DurationExceeded { duration });
    }
    Ok(Span::new(start, end))
}

/// Rolling cap over the author's upcoming reservations on the candidate's
/// logical spot, candidate included. Floor and direction variants of a spot
/// count as one spot; overlapping windows count once.
pub fn validate_rolling_duration(
    upcoming: &[ReservationWithSpot],
    candidate_spot: &Spot,
    candidate: Span,
    author: &Member,
    guild_id: GuildId,
) -> Result<(), EngineError> {
    let mut combined = upcoming.to_vec();
    combined.push(ReservationWithSpot {
        reservation: Reservation {
            id: CANDIDATE_ID,
            author: author.display_name.clone(),
            author_id: author.id,
            guild_id,
            spot_id: candidate_spot.id,
            start_at: candidate.start,
            end_at: candidate.end,
            created_at: candidate.start,
        },
        spot: candidate_spot.clone(),
    });

    let reduced = reduce_by_longest_per_spot(&combined);
    let Some(candidate_group) = reduced
        .iter()
        .find(|l| l.ids.contains(&CANDIDATE_ID))
        .map(|l| l.logical_spot.clone())
    else {
        return Ok(());
    };
    let same_spot: Vec<LogicalSpan> = reduced
        .into_iter()
        .filter(|l| l.logical_spot == candidate_group)
        .collect();
    let total = total_duration(&same_spot);
    if total > MAX_RESERVATION_LENGTH_MS {
        return Err(EngineError::RollingDurationExceeded { total });
    }
    Ok(())
}
