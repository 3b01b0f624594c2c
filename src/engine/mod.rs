mod conflict;
mod duration;
mod error;
mod merge;
mod mutations;
mod queries;
mod reduce;

pub use conflict::{Allowance, Verdict, evaluate};
pub use duration::{validate_duration, validate_rolling_duration};
pub use error::EngineError;
pub use merge::{MergePlan, calculate_merge};
pub use mutations::{BookingRequest, MergeOutcome};
pub use queries::SpotSchedule;
pub use reduce::{
    LogicalSpan, logical_spot_name, reduce_by_longest_per_spot, same_logical_spot, total_duration,
};

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{Dispatcher, TokioDispatcher};
use crate::repo::{NotificationSink, ReservationRepository, SpotLookup};

/// Booking and unbooking orchestration over the collaborator traits.
///
/// Holds no reservation state; cloning is cheap and every clone talks to the
/// same collaborators.
#[derive(Clone)]
pub struct Engine {
    spots: Arc<dyn SpotLookup>,
    reservations: Arc<dyn ReservationRepository>,
    notifier: Arc<dyn NotificationSink>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Engine with detached tokio background tasks and the system clock.
    pub fn new(
        spots: Arc<dyn SpotLookup>,
        reservations: Arc<dyn ReservationRepository>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            spots,
            reservations,
            notifier,
            dispatcher: Arc::new(TokioDispatcher),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> crate::model::Ms {
        self.clock.now()
    }
}
