//! Chat session core
//!
//! A single-writer state machine over the message list. All changes go
//! through the pure reducer; async work (agent calls, delivery simulation,
//! persistence) runs as independent tasks that report back by id.

mod action;
mod delivery;
mod session;
mod types;

#[cfg(test)]
pub mod testing;

pub use action::{reduce, ChatAction, MessageUpdate};
pub use delivery::{advance_status, simulate_delivery, DeliveryTiming};
pub use session::{ChatSession, SessionTiming};
pub use types::{ChatState, MediaAction, Message, MessageStatus, RichMedia, Sender};

use crate::agent::RemoteAgent;
use crate::storage::{ChatStorage, KeyValueStore};
use std::sync::Arc;

/// Session wired to the production agent and store
pub type ProductionSession = ChatSession<Arc<dyn RemoteAgent>, ChatStorage<Arc<dyn KeyValueStore>>>;
