use crate::model::*;

use super::{Engine, EngineError};

/// Upcoming reservations of one spot, by start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotSchedule {
    pub spot: Spot,
    pub reservations: Vec<Reservation>,
}

impl Engine {
    /// All spots by name, or those whose name contains `filter` (any case).
    pub async fn spots(&self, filter: Option<&str>) -> Result<Vec<Spot>, EngineError> {
        let result = match filter.map(str::trim) {
            Some(fragment) if !fragment.is_empty() => self.spots.find_spots(fragment).await,
            _ => self.spots.all_spots().await,
        };
        let mut spots = result.map_err(EngineError::repo("spot lookup"))?;
        spots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(spots)
    }

    pub async fn member_reservations(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Vec<ReservationWithSpot>, EngineError> {
        self.reservations
            .upcoming_for_author(guild_id, member_id, self.clock.now())
            .await
            .map_err(EngineError::repo("upcoming reservations"))
    }

    /// Upcoming reservations of a guild, one entry per spot that has any.
    pub async fn guild_schedule(&self, guild_id: GuildId) -> Result<Vec<SpotSchedule>, EngineError> {
        let upcoming = self
            .reservations
            .upcoming_for_guild(guild_id, self.clock.now())
            .await
            .map_err(EngineError::repo("guild schedule"))?;

        let mut schedule: Vec<SpotSchedule> = Vec::new();
        for entry in upcoming {
            match schedule.iter_mut().find(|s| s.spot.id == entry.spot.id) {
                Some(existing) => existing.reservations.push(entry.reservation),
                None => schedule.push(SpotSchedule {
                    spot: entry.spot,
                    reservations: vec![entry.reservation],
                }),
            }
        }
        schedule.sort_by(|a, b| a.spot.name.cmp(&b.spot.name));
        for s in &mut schedule {
            s.reservations.sort_by_key(|r| (r.start_at, r.id));
        }
        Ok(schedule)
    }
}
