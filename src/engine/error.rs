use crate::limits::{MAX_RESERVATION_LENGTH_MS, OVERBOOK_GRACE_MS};
use crate::model::*;
use crate::repo::RepoError;

#[derive(Debug)]
pub enum EngineError {
    SpotNotFound(String),
    /// Start or end falls outside the representable calendar range.
    TimestampOutOfRange(Ms),
    /// End is not after start.
    EmptyWindow,
    DurationExceeded {
        duration: Ms,
    },
    /// Reduced total of the author's upcoming reservations, candidate included.
    RollingDurationExceeded {
        total: Ms,
    },
    SelfOverbook,
    GracePeriodNotElapsed {
        start_at: Ms,
    },
    /// Conflicts exist and no allowance applies. Carries the conflicts unchanged.
    InsufficientPermissions {
        conflicts: Vec<ClippedOrRemovedReservation>,
    },
    NotFound(ReservationId),
    /// Lookup succeeded but deletion failed; the snapshot is kept for a retry.
    DeleteFailed {
        snapshot: Box<ReservationWithSpot>,
        source: RepoError,
    },
    Repository {
        op: &'static str,
        source: RepoError,
    },
}

impl EngineError {
    pub(crate) fn repo(op: &'static str) -> impl FnOnce(RepoError) -> EngineError {
        move |source| EngineError::Repository { op, source }
    }

    /// Conflicts attached to a denial, for rendering.
    pub fn conflicts(&self) -> &[ClippedOrRemovedReservation] {
        match self {
            EngineError::InsufficientPermissions { conflicts } => conflicts,
            _ => &[],
        }
    }

    /// Policy violations the requester can fix by changing the request or waiting.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(
            self,
            EngineError::Repository { .. } | EngineError::DeleteFailed { .. }
        )
    }
}

fn hours(ms: Ms) -> String {
    format!("{:.2}h", ms as f64 / 3_600_000.0)
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SpotNotFound(name) => write!(f, "spot not found: {name}"),
            EngineError::TimestampOutOfRange(ms) => {
                write!(f, "timestamp out of supported range: {ms}")
            }
            EngineError::EmptyWindow => write!(f, "reservation must end after it starts"),
            EngineError::DurationExceeded { duration } => write!(
                f,
                "reservation of {} exceeds the maximum of {}",
                hours(*duration),
                hours(MAX_RESERVATION_LENGTH_MS)
            ),
            EngineError::RollingDurationExceeded { total } => write!(
                f,
                "your upcoming reservations would total {} on this spot, above the maximum of {}",
                hours(*total),
                hours(MAX_RESERVATION_LENGTH_MS)
            ),
            EngineError::SelfOverbook => write!(f, "you cannot overbook your own reservation"),
            EngineError::GracePeriodNotElapsed { start_at } => write!(
                f,
                "overbooking is only permitted starting {} minutes after a reservation's start ({})",
                OVERBOOK_GRACE_MS / 60_000,
                format_instant(*start_at)
            ),
            EngineError::InsufficientPermissions { conflicts } => write!(
                f,
                "spot is already reserved in this window ({} conflicting reservation(s))",
                conflicts.len()
            ),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::DeleteFailed { snapshot, source } => write!(
                f,
                "failed to delete reservation {}: {source}",
                snapshot.reservation.id
            ),
            EngineError::Repository { op, source } => write!(f, "{op} failed: {source}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::DeleteFailed { source, .. } | EngineError::Repository { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
