//! Chat data model
//!
//! Messages and rich media are plain data: they serialize to the same
//! camelCase JSON the store has always held, and carry no behavior.

use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Delivery status of a message
///
/// Only user messages move through the sequence; assistant messages are
/// created directly as `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Error,
}

impl MessageStatus {
    /// Position in the delivery sequence. `Error` sits outside it.
    pub fn rank(self) -> Option<u8> {
        match self {
            MessageStatus::Sending => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Error => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Error => "error",
        }
    }
}

/// Structured attachment on an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RichMedia {
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Link {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Button {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Accepted and stored, but has no rendering contract yet.
    Card {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

/// What a front end should do when a rich media item is activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaAction<'a> {
    ShowImage(&'a str),
    OpenUrl(&'a str),
}

impl RichMedia {
    /// Resolve the activation behavior from the variant tag. Items without a
    /// url have nothing to activate.
    pub fn action(&self) -> Option<MediaAction<'_>> {
        match self {
            RichMedia::Image { url, .. } => url.as_deref().map(MediaAction::ShowImage),
            RichMedia::Link { url, .. } | RichMedia::Button { url, .. } => {
                url.as_deref().map(MediaAction::OpenUrl)
            }
            RichMedia::Card { .. } => None,
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
    pub status: MessageStatus,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "media_lenient"
    )]
    pub rich_media: Vec<RichMedia>,
    /// Recorded audio rather than typed text; omitted from storage when false
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voice: bool,
}

/// Drop unreadable media items one by one so the message itself still loads
fn media_lenient<'de, D>(deserializer: D) -> Result<Vec<RichMedia>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(media) => Some(media),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unreadable rich media item");
                None
            }
        })
        .collect())
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::User,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status: MessageStatus::Sending,
            rich_media: Vec::new(),
            voice: false,
        }
    }

    /// Placeholder for a recorded clip while it is transcribed
    pub fn voice(text: impl Into<String>) -> Self {
        Self {
            voice: true,
            ..Self::user(text)
        }
    }

    pub fn assistant(text: impl Into<String>, rich_media: Vec<RichMedia>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::Assistant,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status: MessageStatus::Delivered,
            rich_media,
            voice: false,
        }
    }
}

/// Observable state of a chat session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub error: Option<String>,
}

impl ChatState {
    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}
