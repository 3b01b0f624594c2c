use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::*;
use crate::repo::NotificationSink;

const CHANNEL_CAPACITY: usize = 256;

/// Sent to the author of a reservation that was removed or clipped by
/// someone else's overbooking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipNotice {
    pub recipient: MemberId,
    pub guild_id: GuildId,
    pub overbooked_by: Member,
    pub detail: ClippedOrRemovedReservation,
}

impl ClipNotice {
    /// JSON payload delivered to subscribers.
    pub fn payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("failed to encode clip notice: {e}");
            String::new()
        })
    }

    /// One-line human summary, used in logs.
    pub fn summary(&self) -> String {
        let original = &self.detail.original;
        let window = format!(
            "{} - {}",
            format_instant(original.start_at),
            format_instant(original.end_at)
        );
        if self.detail.is_removed() {
            format!("reservation {} ({window}) removed by {}", original.id, self.overbooked_by.display_name)
        } else {
            format!(
                "reservation {} ({window}) clipped by {} into {} part(s)",
                original.id,
                self.overbooked_by.display_name,
                self.detail.leftovers.len()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Nobody is listening for this member.
    Undeliverable(MemberId),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Undeliverable(id) => write!(f, "no listener for member {id}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Broadcast hub for clip notices, one channel per member.
pub struct NotifyHub {
    channels: DashMap<MemberId, broadcast::Sender<String>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notices for a member. Creates the channel if needed.
    pub fn subscribe(&self, member_id: MemberId) -> broadcast::Receiver<String> {
        let sender = self
            .channels
            .entry(member_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a payload; fails when nobody is listening.
    pub fn send(&self, member_id: MemberId, payload: String) -> Result<(), NotifyError> {
        let sender = self
            .channels
            .get(&member_id)
            .ok_or(NotifyError::Undeliverable(member_id))?;
        sender
            .send(payload)
            .map(|_| ())
            .map_err(|_| NotifyError::Undeliverable(member_id))
    }
}

#[async_trait]
impl NotificationSink for NotifyHub {
    async fn notify(&self, notice: &ClipNotice) -> Result<(), NotifyError> {
        self.send(notice.recipient, notice.payload())
    }
}
