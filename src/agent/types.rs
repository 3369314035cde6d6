//! Agent reply and Direct Line wire types

use crate::chat::RichMedia;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply text used when the agent answers with an empty message
pub const EMPTY_REPLY_TEXT: &str = "I didn't understand that. Can you try again?";

/// Reply substituted when speech recognition fails
pub const SPEECH_APOLOGY_TEXT: &str =
    "I'm sorry, I couldn't understand the audio. Could you try again or type your message?";

/// Reply from the remote agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    pub rich_media: Vec<RichMedia>,
    /// Recognized text of a voice message, when recognition succeeded
    pub transcribed_text: Option<String>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_media(mut self, media: Vec<RichMedia>) -> Self {
        self.rich_media = media;
        self
    }

    pub fn with_transcription(mut self, transcribed: impl Into<String>) -> Self {
        self.transcribed_text = Some(transcribed.into());
        self
    }

    pub fn speech_apology() -> Self {
        Self::text(SPEECH_APOLOGY_TEXT)
    }
}

// ============================================================================
// Direct Line v3 wire format
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Activity {
    pub fn user_message(user_id: &str, text: &str, locale: &str) -> Self {
        Self {
            kind: "message".to_string(),
            id: None,
            from: ChannelAccount {
                id: user_id.to_string(),
                name: Some("User".to_string()),
            },
            text: Some(text.to_string()),
            locale: Some(locale.to_string()),
            reply_to_id: None,
            attachments: Vec::new(),
        }
    }

    pub fn is_message(&self) -> bool {
        self.kind == "message"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStart {
    pub conversation_id: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceResponse {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivitySet {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub watermark: Option<String>,
}

const HERO_CARD: &str = "application/vnd.microsoft.card.hero";

/// Map bot attachments to rich media; unsupported content types are dropped.
pub fn attachments_to_media(attachments: &[Attachment]) -> Vec<RichMedia> {
    attachments.iter().filter_map(attachment_to_media).collect()
}

fn attachment_to_media(attachment: &Attachment) -> Option<RichMedia> {
    match attachment.content_type.as_str() {
        "image/png" | "image/jpeg" => Some(RichMedia::Image {
            url: attachment.content_url.clone(),
            title: attachment.name.clone(),
        }),
        HERO_CARD => {
            let content = attachment.content.as_ref()?;
            let text = |v: &Value| v.as_str().map(String::from);
            let first_button = content.pointer("/buttons/0");
            Some(RichMedia::Card {
                title: content.get("title").and_then(text),
                description: content.get("text").and_then(text),
                image_url: content.pointer("/images/0/url").and_then(text),
                button_text: first_button.and_then(|b| b.get("title")).and_then(text),
                url: first_button.and_then(|b| b.get("value")).and_then(text),
            })
        }
        _ => None,
    }
}
