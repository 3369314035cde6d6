//! Mock implementations for testing
//!
//! These mocks drive a real `ChatSession` without network or disk.

use super::session::{ChatSession, SessionTiming};
use crate::agent::{AgentError, AgentReply, RemoteAgent};
use crate::storage::{ChatStorage, MemoryStore};
use crate::voice::AudioHandle;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted Agent
// ============================================================================

/// Agent with scripted replies.
///
/// Text sends fail for texts registered with `fail_on`, otherwise take the
/// next queued reply or echo the input. Voice sends take the next queued
/// voice result or a default transcribed reply.
#[derive(Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<AgentReply>>,
    voice_results: Mutex<VecDeque<Result<AgentReply, AgentError>>>,
    failing: Mutex<HashSet<String>>,
    delay: Duration,
    /// Every text passed to `send_text`
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_reply(&self, reply: AgentReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_voice(&self, result: Result<AgentReply, AgentError>) {
        self.voice_results.lock().unwrap().push_back(result);
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn recover(&self, text: &str) {
        self.failing.lock().unwrap().remove(text);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteAgent for ScriptedAgent {
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError> {
        self.calls.lock().unwrap().push(text.to_string());
        let outcome = if self.failing.lock().unwrap().contains(text) {
            Err(AgentError::network("Connection failed"))
        } else {
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| AgentReply::text(format!("Echo: {text}"))))
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }

    async fn transcribe_and_send(&self, _audio: &AudioHandle) -> Result<AgentReply, AgentError> {
        let outcome = self.voice_results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(AgentReply::text("Voice reply").with_transcription("Voice transcript"))
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Test session
// ============================================================================

pub type TestStore = Arc<ChatStorage<Arc<MemoryStore>>>;
pub type TestSession = ChatSession<Arc<ScriptedAgent>, TestStore>;

/// Session plus handles to its collaborators
pub struct Harness {
    pub session: TestSession,
    pub agent: Arc<ScriptedAgent>,
    pub store: TestStore,
    pub kv: Arc<MemoryStore>,
}

impl Harness {
    pub async fn new(agent: ScriptedAgent) -> Self {
        Self::with_kv(agent, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_kv(agent: ScriptedAgent, kv: Arc<MemoryStore>) -> Self {
        let agent = Arc::new(agent);
        let store = Arc::new(ChatStorage::new(Arc::clone(&kv)));
        let session = ChatSession::start(
            Arc::clone(&agent),
            Arc::clone(&store),
            SessionTiming::default(),
        )
        .await;
        Self {
            session,
            agent,
            store,
            kv,
        }
    }
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentErrorKind;
    use crate::chat::session::{
        LOAD_FAILED, SEND_FAILED, VOICE_FAILED, VOICE_FAILED_TEXT, VOICE_PROCESSING_TEXT,
        VOICE_SENT_TEXT,
    };
    use crate::chat::{Message, MessageStatus, RichMedia, Sender};
    use crate::storage::{KeyValueStore, MessageStore};

    #[tokio::test]
    async fn test_scripted_agent() {
        let agent = ScriptedAgent::new();
        agent.queue_reply(AgentReply::text("first"));
        agent.fail_on("boom");

        assert_eq!(agent.send_text("a").await.unwrap().text, "first");
        assert_eq!(agent.send_text("b").await.unwrap().text, "Echo: b");
        let err = agent.send_text("boom").await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Network);
        assert_eq!(agent.recorded_calls(), vec!["a", "b", "boom"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_adds_trimmed_user_message() {
        let h = Harness::new(ScriptedAgent::new()).await;

        let id = h.session.send_message("  hello  ").await.unwrap();

        let messages = h.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].status, MessageStatus::Sending);
        assert!(h.session.is_typing());
        assert_eq!(h.agent.recorded_calls(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_message_is_ignored() {
        let h = Harness::new(ScriptedAgent::new()).await;

        assert!(h.session.send_message("").await.is_none());
        assert!(h.session.send_message(" \n\t ").await.is_none());

        assert!(h.session.messages().is_empty());
        assert!(!h.session.is_typing());
        assert!(h.agent.recorded_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_appended_after_presentation_delay() {
        let agent = ScriptedAgent::new();
        agent.queue_reply(AgentReply::text("The Tucson starts at SAR 99,900.").with_media(vec![
            RichMedia::Link {
                url: Some("https://example.com/tucson".to_string()),
                title: Some("Tucson".to_string()),
                description: None,
            },
        ]));
        let h = Harness::new(agent).await;

        let id = h.session.send_message("How much is the Tucson?").await.unwrap();

        advance(900).await;
        assert_eq!(h.session.messages().len(), 1);

        advance(200).await;
        let messages = h.session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].status, MessageStatus::Delivered);
        assert_eq!(messages[1].text, "The Tucson starts at SAR 99,900.");
        assert_eq!(messages[1].rich_media.len(), 1);
        assert!(!h.session.is_typing());
        assert!(h.session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_returns_once_reply_is_shown() {
        let h = Harness::new(ScriptedAgent::new()).await;
        h.session.wait_idle().await;

        h.session.send_message("hello").await.unwrap();
        assert!(h.session.is_typing());

        h.session.wait_idle().await;
        let messages = h.session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert!(!h.session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_status_progression() {
        let h = Harness::new(ScriptedAgent::new()).await;
        let id = h.session.send_message("hello").await.unwrap();
        let status = |h: &Harness| h.session.snapshot().find(&id).unwrap().status;

        assert_eq!(status(&h), MessageStatus::Sending);
        advance(600).await;
        assert_eq!(status(&h), MessageStatus::Sent);
        advance(1000).await;
        assert_eq!(status(&h), MessageStatus::Delivered);
        advance(1000).await;
        assert_eq!(status(&h), MessageStatus::Read);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_marks_message_and_sets_error() {
        let agent = ScriptedAgent::new();
        agent.fail_on("hello");
        let h = Harness::new(agent).await;

        let id = h.session.send_message("hello").await.unwrap();

        let messages = h.session.messages();
        let last = messages.last().unwrap();
        assert_eq!(last.id, id);
        assert_eq!(last.status, MessageStatus::Error);
        assert_eq!(h.session.error().as_deref(), Some(SEND_FAILED));
        assert!(!h.session.is_typing());

        // Simulated delivery steps never overwrite the failure.
        advance(3000).await;
        let messages = h.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_targets_its_own_message_under_concurrency() {
        let agent = ScriptedAgent::new().with_delay(Duration::from_millis(1000));
        agent.fail_on("first");
        let h = Harness::new(agent).await;

        let (first, second) = tokio::join!(
            h.session.send_message("first"),
            h.session.send_message("second")
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let state = h.session.snapshot();
        assert_eq!(state.messages[0].id, first);
        assert_eq!(state.messages[1].id, second);
        assert_eq!(state.find(&first).unwrap().status, MessageStatus::Error);
        assert_ne!(state.find(&second).unwrap().status, MessageStatus::Error);
        // The second reply is still pending.
        assert!(state.is_typing);

        advance(1100).await;
        let state = h.session.snapshot();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[2].text, "Echo: second");
        assert!(!state.is_typing);
        assert_eq!(state.find(&first).unwrap().status, MessageStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ignores_messages_not_in_error() {
        let h = Harness::new(ScriptedAgent::new()).await;
        let id = h.session.send_message("hello").await.unwrap();
        advance(3000).await;
        let before = h.session.snapshot();

        assert!(!h.session.retry_message(&id).await);
        assert!(!h.session.retry_message("no-such-id").await);

        assert_eq!(h.session.snapshot(), before);
        assert_eq!(h.agent.recorded_calls(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resends_in_place() {
        let agent = ScriptedAgent::new();
        agent.fail_on("hi");
        let h = Harness::new(agent).await;

        let id = h.session.send_message("hi").await.unwrap();
        assert_eq!(h.session.messages()[0].status, MessageStatus::Error);

        h.agent.recover("hi");
        assert!(h.session.retry_message(&id).await);

        let messages = h.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].text, "hi");
        assert_eq!(messages[0].status, MessageStatus::Sending);
        assert!(h.session.is_typing());

        advance(3000).await;
        let messages = h.session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].status, MessageStatus::Read);
        assert_eq!(messages[1].text, "Echo: hi");
        assert_eq!(h.agent.recorded_calls(), vec!["hi", "hi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_that_fails_again_returns_to_error() {
        let agent = ScriptedAgent::new();
        agent.fail_on("hi");
        let h = Harness::new(agent).await;

        let id = h.session.send_message("hi").await.unwrap();
        assert!(h.session.retry_message(&id).await);

        let messages = h.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Error);
        assert!(!h.session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_empties_and_persists() {
        let h = Harness::new(ScriptedAgent::new()).await;
        h.session.send_message("hello").await.unwrap();
        advance(3000).await;
        h.session.flush().await;
        assert_eq!(h.store.load().await.unwrap().len(), 2);

        h.session.clear_messages().await;

        assert!(h.session.messages().is_empty());
        assert!(h.store.load().await.unwrap().is_empty());
        assert_eq!(
            h.kv.get("@hyundai_chat_messages").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_late_reply_and_delivery() {
        let h = Harness::new(ScriptedAgent::new()).await;
        h.session.send_message("hello").await.unwrap();
        assert!(h.session.is_typing());

        h.session.clear_messages().await;
        assert!(!h.session.is_typing());

        advance(3000).await;
        h.session.flush().await;
        assert!(h.session.messages().is_empty());
        assert!(!h.session.is_typing());
        assert!(h.store.load().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_while_agent_in_flight() {
        let agent = ScriptedAgent::new().with_delay(Duration::from_millis(500));
        agent.fail_on("slow");
        let h = Harness::new(agent).await;

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.send_message("slow").await });
        advance(100).await;
        h.session.clear_messages().await;

        pending.await.unwrap();
        assert!(h.session.messages().is_empty());
        assert!(h.session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_change_is_persisted() {
        let h = Harness::new(ScriptedAgent::new()).await;
        h.session.send_message("hello").await.unwrap();
        advance(3000).await;
        h.session.flush().await;

        assert_eq!(h.store.load().await.unwrap(), h.session.messages());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_hydrates_from_store() {
        let kv = Arc::new(MemoryStore::new());
        let saved = vec![
            Message::user("Do you have hybrids?"),
            Message::assistant("Yes, the Tucson Hybrid.", vec![]),
        ];
        ChatStorage::new(Arc::clone(&kv)).save(&saved).await;

        let h = Harness::with_kv(ScriptedAgent::new(), kv).await;

        assert_eq!(h.session.messages(), saved);
        assert!(h.session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_unreadable_store_surfaces_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set_unavailable(true);

        let h = Harness::with_kv(ScriptedAgent::new(), Arc::clone(&kv)).await;

        assert!(h.session.messages().is_empty());
        assert_eq!(h.session.error().as_deref(), Some(LOAD_FAILED));

        // The session stays usable.
        kv.set_unavailable(false);
        h.session.send_message("hello").await.unwrap();
        assert_eq!(h.session.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_message_shows_transcription() {
        let agent = ScriptedAgent::new();
        agent.queue_voice(Ok(AgentReply::text("The Kona comes in three trims.")
            .with_transcription("Tell me about the Kona")));
        let h = Harness::new(agent).await;

        let mut updates = h.session.subscribe();
        let id = h
            .session
            .send_voice_message(&AudioHandle::new("/tmp/clip.wav"))
            .await;

        let first = updates.recv().await.unwrap();
        assert_eq!(first.messages[0].text, VOICE_PROCESSING_TEXT);

        let messages = h.session.messages();
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].text, "Tell me about the Kona");

        advance(1100).await;
        let messages = h.session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "The Kona comes in three trims.");
        assert!(!h.session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_without_transcription_uses_placeholder() {
        let agent = ScriptedAgent::new();
        agent.queue_voice(Ok(AgentReply::speech_apology()));
        let h = Harness::new(agent).await;

        h.session
            .send_voice_message(&AudioHandle::new("/tmp/clip.wav"))
            .await;

        assert_eq!(h.session.messages()[0].text, VOICE_SENT_TEXT);
        assert!(h.session.error().is_none());
        advance(1100).await;
        assert_eq!(h.session.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_failure_marks_message() {
        let agent = ScriptedAgent::new();
        agent.queue_voice(Err(AgentError::server("HTTP 503")));
        let h = Harness::new(agent).await;

        let id = h
            .session
            .send_voice_message(&AudioHandle::new("/tmp/clip.wav"))
            .await;

        let messages = h.session.messages();
        assert_eq!(messages[0].status, MessageStatus::Error);
        assert_eq!(messages[0].text, VOICE_FAILED_TEXT);
        assert_eq!(h.session.error().as_deref(), Some(VOICE_FAILED));
        assert!(!h.session.is_typing());

        assert!(!h.session.retry_message(&id).await);
        assert!(h.agent.recorded_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_text_send_with_voice_failure_wording_is_retryable() {
        let agent = ScriptedAgent::new();
        agent.fail_on(VOICE_FAILED_TEXT);
        let h = Harness::new(agent).await;

        let id = h.session.send_message(VOICE_FAILED_TEXT).await.unwrap();
        assert_eq!(h.session.messages()[0].status, MessageStatus::Error);

        h.agent.recover(VOICE_FAILED_TEXT);
        assert!(h.session.retry_message(&id).await);
        assert_eq!(
            h.agent.recorded_calls(),
            vec![VOICE_FAILED_TEXT, VOICE_FAILED_TEXT]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_failure_stays_unretryable_after_restart() {
        let agent = ScriptedAgent::new();
        agent.queue_voice(Err(AgentError::server("HTTP 503")));
        let h = Harness::new(agent).await;
        let id = h
            .session
            .send_voice_message(&AudioHandle::new("/tmp/clip.wav"))
            .await;
        h.session.flush().await;

        let restarted = Harness::with_kv(ScriptedAgent::new(), Arc::clone(&h.kv)).await;
        assert!(restarted.session.messages()[0].voice);
        assert!(!restarted.session.retry_message(&id).await);
        assert!(restarted.agent.recorded_calls().is_empty());
    }
}
