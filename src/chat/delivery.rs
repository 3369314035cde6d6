//! Delivery status simulation
//!
//! A cosmetic progression `sending -> sent -> delivered -> read` applied to a
//! single user message on fixed delays. It does not reflect real delivery and
//! is not coordinated with the agent reply.

use super::types::{Message, MessageStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delays between simulated status steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTiming {
    pub sent_after: Duration,
    pub delivered_after: Duration,
    pub read_after: Duration,
}

impl Default for DeliveryTiming {
    fn default() -> Self {
        Self {
            sent_after: Duration::from_millis(500),
            delivered_after: Duration::from_millis(1000),
            read_after: Duration::from_millis(1000),
        }
    }
}

impl DeliveryTiming {
    /// Absolute offset of each step from the moment the simulation starts
    pub fn schedule(&self) -> [(Duration, MessageStatus); 3] {
        let sent = self.sent_after;
        let delivered = sent + self.delivered_after;
        let read = delivered + self.read_after;
        [
            (sent, MessageStatus::Sent),
            (delivered, MessageStatus::Delivered),
            (read, MessageStatus::Read),
        ]
    }
}

/// Apply one simulated step to a message list.
///
/// Returns the full updated list, or `None` when the step has nothing to do:
/// the message is gone, already failed, or already at or past `status`.
pub fn advance_status(messages: &[Message], id: &str, status: MessageStatus) -> Option<Vec<Message>> {
    let target = status.rank()?;
    let current = messages.iter().find(|m| m.id == id)?;
    match current.status.rank() {
        Some(rank) if rank < target => {}
        _ => return None,
    }

    Some(
        messages
            .iter()
            .map(|m| {
                if m.id == id {
                    Message {
                        status,
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect(),
    )
}

/// Spawn the three status steps for `message_id`.
///
/// Each step is its own task; dropping the returned handles does not cancel
/// them. `on_step` must tolerate the message having disappeared.
pub fn simulate_delivery<F>(message_id: &str, timing: DeliveryTiming, on_step: F) -> Vec<JoinHandle<()>>
where
    F: Fn(&str, MessageStatus) + Send + Sync + 'static,
{
    let on_step = Arc::new(on_step);
    timing
        .schedule()
        .into_iter()
        .map(|(at, status)| {
            let on_step = Arc::clone(&on_step);
            let id = message_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(at).await;
                tracing::debug!(message_id = %id, status = status.label(), "Delivery step");
                on_step(&id, status);
            })
        })
        .collect()
}
