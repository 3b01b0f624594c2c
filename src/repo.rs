//! Collaborator contracts consumed by the engine.
//!
//! The engine never touches storage or delivery directly; it goes through
//! these traits. [`crate::store::Store`] and [`crate::notify::NotifyHub`] are
//! the in-tree implementations.

use async_trait::async_trait;

use crate::model::*;
use crate::notify::{ClipNotice, NotifyError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// Durable write failed; nothing was applied.
    Wal(String),
    NotFound(ReservationId),
    /// A declared conflict changed or vanished before the commit.
    Stale(ReservationId),
    /// An undeclared reservation overlaps the window (concurrent commit).
    Overlap(ReservationId),
    Limit(&'static str),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Wal(e) => write!(f, "WAL error: {e}"),
            RepoError::NotFound(id) => write!(f, "reservation not found: {id}"),
            RepoError::Stale(id) => {
                write!(f, "reservation {id} changed while the booking was being committed")
            }
            RepoError::Overlap(id) => write!(f, "window overlaps reservation {id}"),
            RepoError::Limit(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for RepoError {}

#[async_trait]
pub trait SpotLookup: Send + Sync {
    async fn all_spots(&self) -> Result<Vec<Spot>, RepoError>;

    /// Case-insensitive substring match on the spot name.
    async fn find_spots(&self, fragment: &str) -> Result<Vec<Spot>, RepoError>;

    /// Case-insensitive exact match on the spot name.
    async fn spot_by_name(&self, name: &str) -> Result<Option<Spot>, RepoError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Reservations of `author` in `guild` that have not ended at `now`, by start.
    async fn upcoming_for_author(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        now: Ms,
    ) -> Result<Vec<ReservationWithSpot>, RepoError>;

    /// Reservations in `guild` that have not ended at `now`, by start.
    async fn upcoming_for_guild(
        &self,
        guild_id: GuildId,
        now: Ms,
    ) -> Result<Vec<ReservationWithSpot>, RepoError>;

    /// Reservations on `spot` in `guild` whose window intersects `span`.
    async fn overlapping(
        &self,
        spot_id: SpotId,
        span: Span,
        guild_id: GuildId,
    ) -> Result<Vec<Reservation>, RepoError>;

    /// Create `new` and remove or clip every reservation in `conflicts`, as one
    /// all-or-nothing commit. Returns what happened to each conflict.
    async fn create_and_clip(
        &self,
        new: NewReservation,
        conflicts: &[Reservation],
    ) -> Result<(Reservation, Vec<ClippedOrRemovedReservation>), RepoError>;

    async fn update_window(&self, id: ReservationId, span: Span) -> Result<(), RepoError>;

    /// Lookup scoped to guild and author; ended reservations are not returned.
    async fn find_for_author(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        id: ReservationId,
        now: Ms,
    ) -> Result<Option<ReservationWithSpot>, RepoError>;

    /// Delete scoped to guild and author, only if not yet ended.
    /// Returns whether a reservation was deleted.
    async fn delete(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        id: ReservationId,
        now: Ms,
    ) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notice: &ClipNotice) -> Result<(), NotifyError>;
}
