use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::model::*;
use crate::notify::ClipNotice;
use crate::observability::{self, outcome_label};

use super::conflict::{Verdict, evaluate};
use super::duration::{validate_duration, validate_rolling_duration};
use super::merge::calculate_merge;
use super::{Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub member: Member,
    pub guild_id: GuildId,
    pub spot_name: String,
    pub start_at: Ms,
    pub end_at: Ms,
    /// The member explicitly asked to displace existing reservations.
    pub overbook: bool,
    /// Pre-computed by the caller; the engine does not evaluate roles.
    pub elevated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor: ReservationId,
    pub span: Span,
    pub absorbed: Vec<ReservationId>,
}

struct Booked {
    reservation: Reservation,
    spot: Spot,
    clipped: Vec<ClippedOrRemovedReservation>,
}

impl Engine {
    /// Book a window, displacing conflicts when policy allows.
    ///
    /// Returns what happened to each displaced reservation. Notifications to
    /// their authors and a merge of the requester's adjacent reservations run
    /// afterwards on the dispatcher; their failures are only logged.
    pub async fn book(
        &self,
        request: BookingRequest,
    ) -> Result<Vec<ClippedOrRemovedReservation>, EngineError> {
        let started = Instant::now();
        let result = self.commit_booking(&request).await;
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        metrics::histogram!(observability::BOOK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(booked) => {
                self.dispatch_notices(&request, &booked.clipped);
                self.dispatch_merge(&request, &booked);
                Ok(booked.clipped)
            }
            Err(e) => {
                debug!(
                    "booking by {} on {:?} denied: {e}",
                    request.member.id, request.spot_name
                );
                Err(e)
            }
        }
    }

    async fn commit_booking(&self, request: &BookingRequest) -> Result<Booked, EngineError> {
        let spot = self
            .spots
            .spot_by_name(&request.spot_name)
            .await
            .map_err(EngineError::repo("spot lookup"))?
            .ok_or_else(|| EngineError::SpotNotFound(request.spot_name.clone()))?;
        let span = validate_duration(request.start_at, request.end_at)?;

        let now = self.clock.now();
        let upcoming = self
            .reservations
            .upcoming_for_author(request.guild_id, request.member.id, now)
            .await
            .map_err(EngineError::repo("upcoming reservations"))?;
        validate_rolling_duration(&upcoming, &spot, span, &request.member, request.guild_id)?;

        let conflicts = self
            .reservations
            .overlapping(spot.id, span, request.guild_id)
            .await
            .map_err(EngineError::repo("overlap query"))?;
        let verdict = evaluate(
            &conflicts,
            &request.member,
            request.overbook,
            request.elevated,
            now,
        )?;
        if let Verdict::Overbook(allowance) = verdict {
            info!(
                "member {} overbooking {} reservation(s) on {} ({allowance:?})",
                request.member.id,
                conflicts.len(),
                spot.name
            );
        }

        let new = NewReservation {
            author: request.member.display_name.clone(),
            author_id: request.member.id,
            guild_id: request.guild_id,
            spot_id: spot.id,
            span,
        };
        let (reservation, clipped) = self
            .reservations
            .create_and_clip(new, &conflicts)
            .await
            .map_err(EngineError::repo("create and clip"))?;
        info!(
            "reservation {} booked on {} by {} [{} - {}]",
            reservation.id,
            spot.name,
            request.member.id,
            format_instant(span.start),
            format_instant(span.end)
        );

        Ok(Booked {
            reservation,
            spot,
            clipped,
        })
    }

    fn dispatch_notices(&self, request: &BookingRequest, clipped: &[ClippedOrRemovedReservation]) {
        for detail in clipped {
            let kind = if detail.is_removed() { "removed" } else { "clipped" };
            metrics::counter!(observability::RESERVATIONS_CLIPPED_TOTAL, "kind" => kind)
                .increment(1);

            let notice = ClipNotice {
                recipient: detail.original.author_id,
                guild_id: request.guild_id,
                overbooked_by: request.member.clone(),
                detail: detail.clone(),
            };
            let notifier = self.notifier.clone();
            self.dispatcher.dispatch(
                "clip_notice",
                async move {
                    match notifier.notify(&notice).await {
                        Ok(()) => debug!("notified {}: {}", notice.recipient, notice.summary()),
                        Err(e) => {
                            metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL)
                                .increment(1);
                            warn!("clip notice for {} not delivered: {e}", notice.recipient);
                        }
                    }
                }
                .boxed(),
            );
        }
    }

    fn dispatch_merge(&self, request: &BookingRequest, booked: &Booked) {
        let engine = self.clone();
        let guild_id = request.guild_id;
        let member = request.member.clone();
        let spot_name = booked.spot.name.clone();
        let span = booked.reservation.span();
        self.dispatcher.dispatch(
            "merge",
            async move {
                match engine.merge_reservations(guild_id, &member, &spot_name, span).await {
                    Ok(Some(outcome)) => info!(
                        "merged {} reservation(s) of {} into {}",
                        outcome.absorbed.len() + 1,
                        member.id,
                        outcome.survivor
                    ),
                    Ok(None) => {}
                    Err(e) => warn!("merge for {} on {spot_name} skipped: {e}", member.id),
                }
            }
            .boxed(),
        );
    }

    /// Fold the member's own reservations on `spot_name` that touch `span`
    /// into one. `Ok(None)` when there is nothing to bridge.
    ///
    /// The merged window must pass the single-reservation cap or nothing is
    /// changed. The survivor is updated before the others are deleted; failed
    /// deletions are logged and not rolled back.
    pub async fn merge_reservations(
        &self,
        guild_id: GuildId,
        member: &Member,
        spot_name: &str,
        span: Span,
    ) -> Result<Option<MergeOutcome>, EngineError> {
        let now = self.clock.now();
        let upcoming = self
            .reservations
            .upcoming_for_author(guild_id, member.id, now)
            .await
            .map_err(EngineError::repo("upcoming reservations"))?;

        let plan = calculate_merge(&upcoming, spot_name, span);
        let survivor = match plan.survivor() {
            Some(id) if !plan.is_noop() => id,
            _ => return Ok(None),
        };
        validate_duration(plan.span.start, plan.span.end)?;

        self.reservations
            .update_window(survivor, plan.span)
            .await
            .map_err(EngineError::repo("update window"))?;
        for id in plan.absorbed() {
            match self.reservations.delete(guild_id, member.id, *id, now).await {
                Ok(true) => {}
                Ok(false) => warn!("merge: reservation {id} already gone"),
                Err(e) => warn!("merge: failed to delete reservation {id}: {e}"),
            }
        }
        metrics::counter!(observability::MERGES_TOTAL).increment(1);

        Ok(Some(MergeOutcome {
            survivor,
            span: plan.span,
            absorbed: plan.absorbed().to_vec(),
        }))
    }

    /// Delete one of the member's own reservations and return it as it was.
    pub async fn unbook(
        &self,
        guild_id: GuildId,
        member: &Member,
        id: ReservationId,
    ) -> Result<ReservationWithSpot, EngineError> {
        let result = self.remove_own(guild_id, member, id).await;
        metrics::counter!(observability::UNBOOKINGS_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        result
    }

    async fn remove_own(
        &self,
        guild_id: GuildId,
        member: &Member,
        id: ReservationId,
    ) -> Result<ReservationWithSpot, EngineError> {
        let now = self.clock.now();
        let snapshot = self
            .reservations
            .find_for_author(guild_id, member.id, id, now)
            .await
            .map_err(EngineError::repo("find reservation"))?
            .ok_or(EngineError::NotFound(id))?;

        match self.reservations.delete(guild_id, member.id, id, now).await {
            Ok(true) => {
                info!("reservation {id} on {} unbooked by {}", snapshot.spot.name, member.id);
                Ok(snapshot)
            }
            // Ended or removed between lookup and delete.
            Ok(false) => Err(EngineError::NotFound(id)),
            Err(source) => Err(EngineError::DeleteFailed {
                snapshot: Box::new(snapshot),
                source,
            }),
        }
    }
}
