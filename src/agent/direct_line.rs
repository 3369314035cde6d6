//! Direct Line v3 text channel to the hosted conversational agent

use super::types::{
    attachments_to_media, Activity, ActivitySet, ConversationStart, ResourceResponse,
    EMPTY_REPLY_TEXT,
};
use super::{AgentError, AgentErrorKind, AgentReply};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Connection settings for the Direct Line channel
#[derive(Debug, Clone)]
pub struct DirectLineConfig {
    pub endpoint: String,
    pub secret: String,
    pub user_id: String,
    pub locale: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl DirectLineConfig {
    pub fn new(endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret: secret.into(),
            user_id: "user".to_string(),
            locale: "en-US".to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: 30,
        }
    }
}

/// Started conversation and the point at which it should be renewed
#[derive(Debug, Clone)]
struct ActiveConversation {
    start: ConversationStart,
    renew_at: Option<Instant>,
}

impl ActiveConversation {
    /// Renewal is due once nine tenths of the token lifetime has passed
    fn new(start: ConversationStart, now: Instant) -> Self {
        let renew_at = start
            .expires_in
            .map(|secs| now + Duration::from_secs(secs.saturating_mul(9) / 10));
        Self { start, renew_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.renew_at.is_some_and(|at| now >= at)
    }
}

/// Activities gathered across polls for one posted message
#[derive(Debug, Default)]
struct ReplyPoll {
    activities: Vec<Activity>,
    replies: usize,
}

impl ReplyPoll {
    /// Add one poll's activities, skipping ids already seen.
    ///
    /// Returns true once replies have arrived and this poll brought no more.
    fn absorb(&mut self, incoming: Vec<Activity>, user_id: &str, reply_to: &str) -> bool {
        let before = self.replies;
        for activity in incoming {
            let seen = activity
                .id
                .as_deref()
                .is_some_and(|id| self.activities.iter().any(|a| a.id.as_deref() == Some(id)));
            if seen {
                continue;
            }
            if is_reply(&activity, user_id, reply_to) {
                self.replies += 1;
            }
            self.activities.push(activity);
        }
        before > 0 && self.replies == before
    }
}

/// Direct Line client bound to one conversation at a time
pub struct DirectLineClient {
    client: Client,
    config: DirectLineConfig,
    conversation: Mutex<Option<ActiveConversation>>,
}

impl DirectLineClient {
    pub fn new(config: DirectLineConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            conversation: Mutex::new(None),
        })
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    /// Current conversation, started or renewed as needed
    async fn conversation(&self) -> Result<ConversationStart, AgentError> {
        let mut cached = self.conversation.lock().await;
        match cached.as_ref() {
            Some(active) if !active.is_expired(Instant::now()) => return Ok(active.start.clone()),
            Some(active) => tracing::info!(
                conversation_id = %active.start.conversation_id,
                "Direct Line conversation token expired, starting a new conversation"
            ),
            None => {}
        }
        let start = self.start_conversation().await?;
        *cached = Some(ActiveConversation::new(start.clone(), Instant::now()));
        Ok(start)
    }

    async fn forget_conversation(&self) {
        *self.conversation.lock().await = None;
    }

    async fn start_conversation(&self) -> Result<ConversationStart, AgentError> {
        let url = format!("{}/conversations", self.base_url());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret)
            .send()
            .await
            .map_err(|e| AgentError::from_transport(&e))?;
        let conversation: ConversationStart = read_json(response).await?;
        tracing::info!(conversation_id = %conversation.conversation_id, "Direct Line conversation started");
        Ok(conversation)
    }

    fn token<'a>(&'a self, conversation: &'a ConversationStart) -> &'a str {
        conversation.token.as_deref().unwrap_or(&self.config.secret)
    }

    async fn post_activity(
        &self,
        conversation: &ConversationStart,
        activity: &Activity,
    ) -> Result<String, AgentError> {
        let url = format!(
            "{}/conversations/{}/activities",
            self.base_url(),
            conversation.conversation_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token(conversation))
            .json(activity)
            .send()
            .await
            .map_err(|e| AgentError::from_transport(&e))?;
        let resource: ResourceResponse = read_json(response).await?;
        Ok(resource.id)
    }

    async fn fetch_activities(
        &self,
        conversation: &ConversationStart,
        watermark: Option<&str>,
    ) -> Result<ActivitySet, AgentError> {
        let url = format!(
            "{}/conversations/{}/activities",
            self.base_url(),
            conversation.conversation_id
        );
        let mut request = self.client.get(&url).bearer_auth(self.token(conversation));
        if let Some(watermark) = watermark {
            request = request.query(&[("watermark", watermark)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::from_transport(&e))?;
        read_json(response).await
    }

    /// Post `text` and wait for the agent's reply to it.
    ///
    /// A rejected token starts a new conversation and the message is sent once more.
    pub async fn send(&self, text: &str) -> Result<AgentReply, AgentError> {
        match self.exchange(text).await {
            Err(e) if e.kind == AgentErrorKind::Auth => {
                tracing::warn!(error = %e, "Direct Line rejected the conversation, starting a new one");
                self.forget_conversation().await;
                self.exchange(text).await
            }
            result => result,
        }
    }

    async fn exchange(&self, text: &str) -> Result<AgentReply, AgentError> {
        let conversation = self.conversation().await?;
        let user_id = &self.config.user_id;
        let activity = Activity::user_message(user_id, text, &self.config.locale);
        let activity_id = self.post_activity(&conversation, &activity).await?;

        // Replies can span several activities (text, then a card), so keep
        // polling until a poll after the first reply brings nothing new.
        let mut poll = ReplyPoll::default();
        let mut watermark: Option<String> = None;
        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;
            let set = self
                .fetch_activities(&conversation, watermark.as_deref())
                .await?;
            if set.watermark.is_some() {
                watermark = set.watermark;
            }
            if poll.absorb(set.activities, user_id, &activity_id) {
                break;
            }
        }

        collect_reply(&poll.activities, user_id, &activity_id).ok_or_else(|| {
            AgentError::invalid_response(format!(
                "No reply to activity {activity_id} after {} polls",
                self.config.max_polls
            ))
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AgentError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AgentError::network(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(AgentError::from_status(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        AgentError::invalid_response(format!("Failed to parse response: {e} - body: {body}"))
    })
}

/// Gather the agent's replies to `reply_to` out of an activity set.
///
/// The last non-empty text wins; attachments from every reply are kept.
pub fn collect_reply(activities: &[Activity], user_id: &str, reply_to: &str) -> Option<AgentReply> {
    let replies: Vec<&Activity> = activities
        .iter()
        .filter(|a| is_reply(a, user_id, reply_to))
        .collect();

    if replies.is_empty() {
        return None;
    }

    let text = replies
        .iter()
        .filter_map(|a| a.text.as_deref())
        .filter(|t| !t.trim().is_empty())
        .last()
        .unwrap_or(EMPTY_REPLY_TEXT);

    let media = replies
        .iter()
        .flat_map(|a| attachments_to_media(&a.attachments))
        .collect();

    Some(AgentReply::text(text).with_media(media))
}

fn is_reply(activity: &Activity, user_id: &str, reply_to: &str) -> bool {
    activity.is_message()
        && activity.from.id != user_id
        && activity.reply_to_id.as_deref() == Some(reply_to)
}
