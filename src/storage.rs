//! Persistent storage for chat history and preferences
//!
//! Storage is a plain key-value blob store. `ChatStorage` layers the chat's
//! keys and JSON encoding on top of any `KeyValueStore`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::chat::Message;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const MESSAGES_KEY: &str = "@hyundai_chat_messages";
const LAST_SESSION_KEY: &str = "@hyundai_last_session";
const PREFERENCE_PREFIX: &str = "@hyundai_preference_";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String key-value store with get/set/remove semantics
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key).await
    }
}

/// Message persistence as seen by the chat session
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stored messages; empty when nothing is stored or the data is unreadable JSON.
    /// Only a failing backend is reported as an error.
    async fn load(&self) -> StoreResult<Vec<Message>>;

    /// Best-effort write of the full list. Failures are logged, never returned.
    async fn save(&self, messages: &[Message]);

    /// Best-effort removal of stored messages
    async fn clear(&self);
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn load(&self) -> StoreResult<Vec<Message>> {
        (**self).load().await
    }

    async fn save(&self, messages: &[Message]) {
        (**self).save(messages).await;
    }

    async fn clear(&self) {
        (**self).clear().await;
    }
}

/// Chat-specific view over a key-value store
#[derive(Clone)]
pub struct ChatStorage<K> {
    kv: K,
}

impl<K: KeyValueStore> ChatStorage<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Record now as the start of the latest session
    pub async fn store_last_session_time(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.kv.set(LAST_SESSION_KEY, &now.to_string()).await {
            tracing::error!(error = %e, "Error storing session time");
        }
    }

    /// Epoch millis of the previous session, if any
    pub async fn last_session_time(&self) -> Option<i64> {
        match self.kv.get(LAST_SESSION_KEY).await {
            Ok(value) => value.and_then(|v| serde_json::from_str(&v).ok()),
            Err(e) => {
                tracing::error!(error = %e, "Error getting session time");
                None
            }
        }
    }

    pub async fn store_preference<T: Serialize + Sync>(&self, name: &str, value: &T) {
        let key = format!("{PREFERENCE_PREFIX}{name}");
        let result = match serde_json::to_string(value) {
            Ok(json) => self.kv.set(&key, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!(preference = name, error = %e, "Error storing preference");
        }
    }

    pub async fn preference<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = format!("{PREFERENCE_PREFIX}{name}");
        match self.kv.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(preference = name, error = %e, "Discarding unreadable preference");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(preference = name, error = %e, "Error retrieving preference");
                None
            }
        }
    }
}

#[async_trait]
impl<K: KeyValueStore> MessageStore for ChatStorage<K> {
    async fn load(&self) -> StoreResult<Vec<Message>> {
        let Some(json) = self.kv.get(MESSAGES_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&json) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!(error = %e, "Stored messages unreadable, starting empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, messages: &[Message]) {
        let result = match serde_json::to_string(messages) {
            Ok(json) => self.kv.set(MESSAGES_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => tracing::debug!(count = messages.len(), "Messages stored"),
            Err(e) => tracing::error!(error = %e, "Error storing messages"),
        }
    }

    async fn clear(&self) {
        if let Err(e) = self.kv.remove(MESSAGES_KEY).await {
            tracing::error!(error = %e, "Error clearing messages");
        }
    }
}
