use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub type SpotId = i64;
pub type ReservationId = i64;
pub type GuildId = u64;
pub type MemberId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Smallest span covering both.
    pub fn union(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A named bookable resource. Ids are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    pub id: SpotId,
    pub name: String,
    pub created_at: Ms,
}

/// The member making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
}

impl Member {
    pub fn new(id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// An exclusive claim on one spot for one window, within one guild.
///
/// Two reservations are the same only when their ids match; use
/// [`Reservation::same_as`] rather than `==` when asking that question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub author: String,
    pub author_id: MemberId,
    pub guild_id: GuildId,
    pub spot_id: SpotId,
    pub start_at: Ms,
    pub end_at: Ms,
    pub created_at: Ms,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.start_at, self.end_at)
    }

    pub fn same_as(&self, other: &Reservation) -> bool {
        self.id == other.id
    }

    pub fn has_started(&self, now: Ms) -> bool {
        self.start_at < now
    }

    pub fn has_ended(&self, now: Ms) -> bool {
        self.end_at < now
    }
}

/// A booking request that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub author: String,
    pub author_id: MemberId,
    pub guild_id: GuildId,
    pub spot_id: SpotId,
    pub span: Span,
}

/// Read-model join used wherever the spot name matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationWithSpot {
    pub reservation: Reservation,
    pub spot: Spot,
}

impl ReservationWithSpot {
    pub fn span(&self) -> Span {
        self.reservation.span()
    }
}

/// What happened to one formerly conflicting reservation.
///
/// No leftovers: removed entirely. One or two leftovers: clipped on one or
/// both sides of the new window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClippedOrRemovedReservation {
    pub original: Reservation,
    pub leftovers: Vec<Reservation>,
}

impl ClippedOrRemovedReservation {
    /// Zero-change record for a conflict that was left in place.
    pub fn unchanged(original: Reservation) -> Self {
        Self {
            leftovers: vec![original.clone()],
            original,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.leftovers.is_empty()
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self.leftovers.as_slice(), [only] if only.same_as(&self.original) && only.span() == self.original.span())
    }
}

/// WAL record format. Each variant is committed as a single record, so a
/// booking with all of its clipping is all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpotCreated {
        spot: Spot,
    },
    ReservationBooked {
        reservation: Reservation,
        removed: Vec<ReservationId>,
        leftovers: Vec<Reservation>,
    },
    WindowUpdated {
        id: ReservationId,
        span: Span,
    },
    ReservationDeleted {
        id: ReservationId,
    },
    ReservationsPruned {
        ids: Vec<ReservationId>,
    },
    /// Written by compaction so ids of pruned records are never reissued.
    Sequences {
        next_spot_id: SpotId,
        next_reservation_id: ReservationId,
    },
}

/// Render an instant for user-facing messages.
pub fn format_instant(ms: Ms) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| format!("{ms}ms"))
}
