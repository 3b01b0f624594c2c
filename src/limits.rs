use crate::model::Ms;

pub const SECOND_MS: Ms = 1_000;
pub const MINUTE_MS: Ms = 60 * SECOND_MS;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Ceiling for a single reservation, and for an author's reduced upcoming total.
pub const MAX_RESERVATION_LENGTH_MS: Ms = 3 * HOUR_MS;

/// Non-privileged overbooking opens this long after a reservation starts.
pub const OVERBOOK_GRACE_MS: Ms = 10 * MINUTE_MS;

/// Own reservations closer than this to a new booking are merged with it.
pub const MERGE_GAP_TOLERANCE_MS: Ms = MINUTE_MS;

/// Leftovers of a clipped reservation keep this distance from the new window.
pub const CLIP_BUFFER_MS: Ms = MINUTE_MS;

/// Id of the in-flight reservation during rolling-duration accounting.
/// Persisted ids start at 1.
pub const CANDIDATE_ID: i64 = -1;

pub const MAX_SPOT_NAME_LEN: usize = 128;
pub const MAX_SPOTS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_SPOT: usize = 100_000;
pub const MAX_AUTHOR_NAME_LEN: usize = 256;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999; // 9999-12-31T23:59:59.999Z
