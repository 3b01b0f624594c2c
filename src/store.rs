use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::clock::now_ms;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::repo::{RepoError, ReservationRepository, SpotLookup};
use crate::wal::{Wal, WalHandle};

pub type SharedLedger = Arc<RwLock<SpotLedger>>;

/// All reservations of one guild on one spot, sorted by `start_at`.
#[derive(Debug, Clone)]
pub struct SpotLedger {
    pub guild_id: GuildId,
    pub spot_id: SpotId,
    pub reservations: Vec<Reservation>,
}

impl SpotLedger {
    pub fn new(guild_id: GuildId, spot_id: SpotId) -> Self {
        Self {
            guild_id,
            spot_id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start_at <= reservation.start_at);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations whose window intersects `query`. Binary search skips
    /// everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.start_at < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end_at > query.start)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// Non-overlapping remainder of `original` once `window` is carved out,
/// keeping `buffer` distance from the window on both sides.
pub fn clip_leftovers(original: Span, window: Span, buffer: Ms) -> Vec<Span> {
    let mut pieces = Vec::with_capacity(2);
    if original.start < window.start {
        let end = original.end.min(window.start - buffer);
        if end > original.start {
            pieces.push(Span::new(original.start, end));
        }
    }
    if original.end > window.end {
        let start = original.start.max(window.end + buffer);
        if original.end > start {
            pieces.push(Span::new(start, original.end));
        }
    }
    pieces
}

/// Replay-time state, before ledgers are wrapped in locks.
#[derive(Default)]
struct Rebuild {
    spots: HashMap<SpotId, Spot>,
    ledgers: HashMap<(GuildId, SpotId), SpotLedger>,
    index: HashMap<ReservationId, (GuildId, SpotId)>,
    next_spot_id: SpotId,
    next_reservation_id: ReservationId,
}

impl Rebuild {
    fn insert(&mut self, reservation: Reservation) {
        let key = (reservation.guild_id, reservation.spot_id);
        self.next_reservation_id = self.next_reservation_id.max(reservation.id + 1);
        self.index.insert(reservation.id, key);
        self.ledgers
            .entry(key)
            .or_insert_with(|| SpotLedger::new(key.0, key.1))
            .insert(reservation);
    }

    fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let key = self.index.remove(&id)?;
        self.ledgers.get_mut(&key)?.remove(id)
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::SpotCreated { spot } => {
                self.next_spot_id = self.next_spot_id.max(spot.id + 1);
                self.spots.insert(spot.id, spot);
            }
            Event::ReservationBooked {
                reservation,
                removed,
                leftovers,
            } => {
                for id in removed {
                    self.remove(id);
                }
                for leftover in leftovers {
                    self.insert(leftover);
                }
                self.insert(reservation);
            }
            Event::WindowUpdated { id, span } => {
                if let Some(mut r) = self.remove(id) {
                    r.start_at = span.start;
                    r.end_at = span.end;
                    self.insert(r);
                }
            }
            Event::ReservationDeleted { id } => {
                self.remove(id);
            }
            Event::ReservationsPruned { ids } => {
                for id in ids {
                    self.remove(id);
                }
            }
            Event::Sequences {
                next_spot_id,
                next_reservation_id,
            } => {
                self.next_spot_id = self.next_spot_id.max(next_spot_id);
                self.next_reservation_id = self.next_reservation_id.max(next_reservation_id);
            }
        }
    }
}

/// WAL-backed reservation and spot store.
pub struct Store {
    wal: WalHandle,
    spots: DashMap<SpotId, Spot>,
    ledgers: DashMap<(GuildId, SpotId), SharedLedger>,
    /// Reverse lookup: reservation id → ledger key.
    index: DashMap<ReservationId, (GuildId, SpotId)>,
    next_spot_id: AtomicI64,
    next_reservation_id: AtomicI64,
    /// Serializes spot creation so names stay unique.
    spot_gate: Mutex<()>,
    /// Commits hold it shared; compaction holds it exclusively so the
    /// snapshot cannot miss a concurrent commit.
    commit_gate: RwLock<()>,
}

impl Store {
    /// Replay the WAL at `path` and start its writer task. Requires a tokio runtime.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let replayed = events.len();
        let mut rebuild = Rebuild {
            next_spot_id: 1,
            next_reservation_id: 1,
            ..Rebuild::default()
        };
        for event in events {
            rebuild.apply(event);
        }
        let wal = WalHandle::spawn(wal);

        let store = Self {
            wal,
            spots: rebuild.spots.into_iter().collect(),
            ledgers: rebuild
                .ledgers
                .into_iter()
                .map(|(k, ledger)| (k, Arc::new(RwLock::new(ledger))))
                .collect(),
            index: rebuild.index.into_iter().collect(),
            next_spot_id: AtomicI64::new(rebuild.next_spot_id),
            next_reservation_id: AtomicI64::new(rebuild.next_reservation_id),
            spot_gate: Mutex::new(()),
            commit_gate: RwLock::new(()),
        };
        info!(
            "store opened: {replayed} events, {} spots, {} reservations",
            store.spots.len(),
            store.index.len()
        );
        Ok(store)
    }

    fn next_reservation_id(&self) -> ReservationId {
        self.next_reservation_id.fetch_add(1, Ordering::SeqCst)
    }

    fn ledger(&self, key: (GuildId, SpotId)) -> Option<SharedLedger> {
        self.ledgers.get(&key).map(|e| e.value().clone())
    }

    fn ledger_or_create(&self, key: (GuildId, SpotId)) -> SharedLedger {
        self.ledgers
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(SpotLedger::new(key.0, key.1))))
            .value()
            .clone()
    }

    /// Ledgers matching `filter`, cloned out so no map shard is held across awaits.
    fn ledgers_where(&self, filter: impl Fn(&(GuildId, SpotId)) -> bool) -> Vec<SharedLedger> {
        self.ledgers
            .iter()
            .filter(|e| filter(e.key()))
            .map(|e| e.value().clone())
            .collect()
    }

    fn with_spot(&self, reservation: &Reservation) -> Option<ReservationWithSpot> {
        let spot = self.spots.get(&reservation.spot_id)?.value().clone();
        Some(ReservationWithSpot {
            reservation: reservation.clone(),
            spot,
        })
    }

    /// Upcoming reservations across `ledgers` passing `keep`, joined and sorted by start.
    async fn collect_upcoming(
        &self,
        ledgers: Vec<SharedLedger>,
        now: Ms,
        keep: impl Fn(&Reservation) -> bool,
    ) -> Vec<ReservationWithSpot> {
        let mut out = Vec::new();
        for ledger in ledgers {
            let guard = ledger.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| !r.has_ended(now) && keep(r))
                    .filter_map(|r| self.with_spot(r)),
            );
        }
        out.sort_by_key(|r| (r.reservation.start_at, r.reservation.id));
        out
    }

    /// Return the spot with this name (case-insensitive), creating it if missing.
    pub async fn ensure_spot(&self, name: &str) -> Result<Spot, RepoError> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_SPOT_NAME_LEN {
            return Err(RepoError::Limit("spot name length"));
        }
        let _gate = self.spot_gate.lock().await;
        if let Some(existing) = self.spot_by_name(name).await? {
            return Ok(existing);
        }
        if self.spots.len() >= MAX_SPOTS {
            return Err(RepoError::Limit("too many spots"));
        }
        let spot = Spot {
            id: self.next_spot_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            created_at: now_ms(),
        };
        let _commit = self.commit_gate.read().await;
        self.wal
            .append(Event::SpotCreated { spot: spot.clone() })
            .await?;
        self.spots.insert(spot.id, spot.clone());
        info!("spot {} created: {}", spot.id, spot.name);
        Ok(spot)
    }

    /// Drop reservations that ended before `before`. Returns how many went.
    pub async fn prune_ended(&self, before: Ms) -> Result<usize, RepoError> {
        let _commit = self.commit_gate.read().await;
        let mut pruned = 0;
        for ledger in self.ledgers_where(|_| true) {
            let mut guard = ledger.write().await;
            let ids: Vec<ReservationId> = guard
                .reservations
                .iter()
                .filter(|r| r.end_at < before)
                .map(|r| r.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            self.wal
                .append(Event::ReservationsPruned { ids: ids.clone() })
                .await?;
            for id in &ids {
                guard.remove(*id);
                self.index.remove(id);
            }
            pruned += ids.len();
        }
        if pruned > 0 {
            metrics::counter!(observability::RESERVATIONS_PRUNED_TOTAL).increment(pruned as u64);
        }
        Ok(pruned)
    }

    /// Rewrite the WAL with just the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), RepoError> {
        let _exclusive = self.commit_gate.write().await;

        let mut spots: Vec<Spot> = self.spots.iter().map(|e| e.value().clone()).collect();
        spots.sort_by_key(|s| s.id);
        let mut events = vec![Event::Sequences {
            next_spot_id: self.next_spot_id.load(Ordering::SeqCst),
            next_reservation_id: self.next_reservation_id.load(Ordering::SeqCst),
        }];
        events.extend(spots.into_iter().map(|spot| Event::SpotCreated { spot }));

        for ledger in self.ledgers_where(|_| true) {
            let guard = ledger.read().await;
            events.extend(guard.reservations.iter().map(|r| Event::ReservationBooked {
                reservation: r.clone(),
                removed: Vec::new(),
                leftovers: Vec::new(),
            }));
        }
        let count = events.len();
        self.wal.compact(events).await?;
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }

    pub fn reservation_count(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl SpotLookup for Store {
    async fn all_spots(&self) -> Result<Vec<Spot>, RepoError> {
        let mut spots: Vec<Spot> = self.spots.iter().map(|e| e.value().clone()).collect();
        spots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(spots)
    }

    async fn find_spots(&self, fragment: &str) -> Result<Vec<Spot>, RepoError> {
        let needle = fragment.to_lowercase();
        let mut spots: Vec<Spot> = self
            .spots
            .iter()
            .filter(|e| e.value().name.to_lowercase().contains(&needle))
            .map(|e| e.value().clone())
            .collect();
        spots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(spots)
    }

    async fn spot_by_name(&self, name: &str) -> Result<Option<Spot>, RepoError> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .spots
            .iter()
            .find(|e| e.value().name.to_lowercase() == wanted)
            .map(|e| e.value().clone()))
    }
}

#[async_trait]
impl ReservationRepository for Store {
    async fn upcoming_for_author(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        now: Ms,
    ) -> Result<Vec<ReservationWithSpot>, RepoError> {
        let ledgers = self.ledgers_where(|(g, _)| *g == guild_id);
        Ok(self
            .collect_upcoming(ledgers, now, |r| r.author_id == author_id)
            .await)
    }

    async fn upcoming_for_guild(
        &self,
        guild_id: GuildId,
        now: Ms,
    ) -> Result<Vec<ReservationWithSpot>, RepoError> {
        let ledgers = self.ledgers_where(|(g, _)| *g == guild_id);
        Ok(self.collect_upcoming(ledgers, now, |_| true).await)
    }

    async fn overlapping(
        &self,
        spot_id: SpotId,
        span: Span,
        guild_id: GuildId,
    ) -> Result<Vec<Reservation>, RepoError> {
        let Some(ledger) = self.ledger((guild_id, spot_id)) else {
            return Ok(Vec::new());
        };
        let guard = ledger.read().await;
        Ok(guard.overlapping(&span).cloned().collect())
    }

    async fn create_and_clip(
        &self,
        new: NewReservation,
        conflicts: &[Reservation],
    ) -> Result<(Reservation, Vec<ClippedOrRemovedReservation>), RepoError> {
        if new.author.len() > MAX_AUTHOR_NAME_LEN {
            return Err(RepoError::Limit("author name too long"));
        }
        if new.span.start < MIN_VALID_TIMESTAMP_MS || new.span.end > MAX_VALID_TIMESTAMP_MS {
            return Err(RepoError::Limit("timestamp out of range"));
        }
        let _commit = self.commit_gate.read().await;
        let ledger = self.ledger_or_create((new.guild_id, new.spot_id));
        let mut guard = ledger.write().await;
        if guard.len() >= MAX_RESERVATIONS_PER_SPOT {
            return Err(RepoError::Limit("too many reservations on spot"));
        }

        // The caller decided on a snapshot; refuse if that snapshot is out of date.
        for conflict in conflicts {
            match guard.get(conflict.id) {
                Some(current) if current.span() == conflict.span() => {}
                _ => return Err(RepoError::Stale(conflict.id)),
            }
        }
        if let Some(other) = guard
            .overlapping(&new.span)
            .find(|r| !conflicts.iter().any(|c| c.same_as(r)))
        {
            return Err(RepoError::Overlap(other.id));
        }

        let now = now_ms();
        let reservation = Reservation {
            id: self.next_reservation_id(),
            author: new.author,
            author_id: new.author_id,
            guild_id: new.guild_id,
            spot_id: new.spot_id,
            start_at: new.span.start,
            end_at: new.span.end,
            created_at: now,
        };
        let results: Vec<ClippedOrRemovedReservation> = conflicts
            .iter()
            .map(|original| ClippedOrRemovedReservation {
                original: original.clone(),
                leftovers: clip_leftovers(original.span(), new.span, CLIP_BUFFER_MS)
                    .into_iter()
                    .map(|span| Reservation {
                        id: self.next_reservation_id(),
                        start_at: span.start,
                        end_at: span.end,
                        created_at: now,
                        ..original.clone()
                    })
                    .collect(),
            })
            .collect();

        let removed: Vec<ReservationId> = conflicts.iter().map(|c| c.id).collect();
        let leftovers: Vec<Reservation> = results
            .iter()
            .flat_map(|r| r.leftovers.iter().cloned())
            .collect();
        self.wal
            .append(Event::ReservationBooked {
                reservation: reservation.clone(),
                removed: removed.clone(),
                leftovers: leftovers.clone(),
            })
            .await?;

        let key = (reservation.guild_id, reservation.spot_id);
        for id in &removed {
            guard.remove(*id);
            self.index.remove(id);
        }
        for leftover in leftovers {
            self.index.insert(leftover.id, key);
            guard.insert(leftover);
        }
        self.index.insert(reservation.id, key);
        guard.insert(reservation.clone());
        debug!(
            "reservation {} committed on spot {} ({} conflicts resolved)",
            reservation.id,
            reservation.spot_id,
            removed.len()
        );
        Ok((reservation, results))
    }

    async fn update_window(&self, id: ReservationId, span: Span) -> Result<(), RepoError> {
        let _commit = self.commit_gate.read().await;
        let key = self
            .index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(RepoError::NotFound(id))?;
        let ledger = self.ledger(key).ok_or(RepoError::NotFound(id))?;
        let mut guard = ledger.write().await;
        let author_id = guard.get(id).ok_or(RepoError::NotFound(id))?.author_id;
        // A window may only grow over the same author's reservations; those are
        // the ones a merge deletes right after.
        if let Some(other) = guard
            .overlapping(&span)
            .find(|r| r.id != id && r.author_id != author_id)
        {
            return Err(RepoError::Overlap(other.id));
        }

        self.wal.append(Event::WindowUpdated { id, span }).await?;
        if let Some(mut r) = guard.remove(id) {
            r.start_at = span.start;
            r.end_at = span.end;
            guard.insert(r);
        }
        Ok(())
    }

    async fn find_for_author(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        id: ReservationId,
        now: Ms,
    ) -> Result<Option<ReservationWithSpot>, RepoError> {
        let Some(key) = self.index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        if key.0 != guild_id {
            return Ok(None);
        }
        let Some(ledger) = self.ledger(key) else {
            return Ok(None);
        };
        let guard = ledger.read().await;
        Ok(guard
            .get(id)
            .filter(|r| r.author_id == author_id && !r.has_ended(now))
            .and_then(|r| self.with_spot(r)))
    }

    async fn delete(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        id: ReservationId,
        now: Ms,
    ) -> Result<bool, RepoError> {
        let _commit = self.commit_gate.read().await;
        let Some(key) = self.index.get(&id).map(|e| *e.value()) else {
            return Ok(false);
        };
        if key.0 != guild_id {
            return Ok(false);
        }
        let Some(ledger) = self.ledger(key) else {
            return Ok(false);
        };
        let mut guard = ledger.write().await;
        let owned_and_running = guard
            .get(id)
            .is_some_and(|r| r.author_id == author_id && !r.has_ended(now));
        if !owned_and_running {
            return Ok(false);
        }

        self.wal.append(Event::ReservationDeleted { id }).await?;
        guard.remove(id);
        self.index.remove(&id);
        Ok(true)
    }
}
