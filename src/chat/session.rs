//! Chat session: owns `ChatState` and orchestrates agent, store and delivery

use super::action::{reduce, ChatAction, MessageUpdate};
use super::delivery::{advance_status, simulate_delivery, DeliveryTiming};
use super::types::{ChatState, Message, MessageStatus, Sender};
use crate::agent::{AgentError, AgentReply, RemoteAgent};
use crate::storage::MessageStore;
use crate::voice::AudioHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

pub const LOAD_FAILED: &str = "Failed to load previous messages";
pub const SEND_FAILED: &str = "Failed to send message";
pub const VOICE_FAILED: &str = "Failed to process voice message";

pub const VOICE_PROCESSING_TEXT: &str = "🎤 Processing voice message...";
pub const VOICE_SENT_TEXT: &str = "🎤 Voice message sent";
pub const VOICE_FAILED_TEXT: &str = "Voice message processing failed";

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Fixed delays applied by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub delivery: DeliveryTiming,
    /// Pause between receiving an agent reply and showing it
    pub reply_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            delivery: DeliveryTiming::default(),
            reply_delay: Duration::from_millis(1000),
        }
    }
}

struct Shared {
    state: ChatState,
    /// Bumped by `clear_messages`; completions from older generations are dropped
    generation: u64,
    /// Agent requests whose reply has not been shown yet
    in_flight: usize,
}

enum PersistJob {
    Save {
        messages: Vec<Message>,
        done: Option<oneshot::Sender<()>>,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
enum RequestKind {
    Text,
    Voice,
}

struct SessionInner<A, M> {
    agent: A,
    timing: SessionTiming,
    shared: Mutex<Shared>,
    updates: broadcast::Sender<ChatState>,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
    store: Arc<M>,
}

/// Handle to a chat session. Clones share the same session.
pub struct ChatSession<A, M> {
    inner: Arc<SessionInner<A, M>>,
}

impl<A, M> Clone for ChatSession<A, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, M> ChatSession<A, M>
where
    A: RemoteAgent + 'static,
    M: MessageStore + 'static,
{
    /// Create an empty session. Must be called inside a Tokio runtime.
    pub fn new(agent: A, store: M, timing: SessionTiming) -> Self {
        let store = Arc::new(store);
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        tokio::spawn(run_persister(Arc::clone(&store), persist_rx));

        Self {
            inner: Arc::new(SessionInner {
                agent,
                timing,
                shared: Mutex::new(Shared {
                    state: ChatState::default(),
                    generation: 0,
                    in_flight: 0,
                }),
                updates,
                persist_tx,
                store,
            }),
        }
    }

    /// Create a session hydrated from the store
    pub async fn start(agent: A, store: M, timing: SessionTiming) -> Self {
        let session = Self::new(agent, store, timing);
        session.hydrate().await;
        session
    }

    async fn hydrate(&self) {
        match self.inner.store.load().await {
            Ok(messages) => {
                tracing::info!(count = messages.len(), "Loaded previous messages");
                self.apply(None, false, |_| vec![ChatAction::SetMessages(messages)]);
            }
            Err(e) => {
                tracing::error!(error = %e, "Error loading messages");
                self.apply(None, false, |_| {
                    vec![ChatAction::SetError(Some(LOAD_FAILED.to_string()))]
                });
            }
        }
    }

    // ==================== Client API ====================

    /// Send a text message. Returns the new message id, or `None` for blank input.
    pub async fn send_message(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("Ignoring blank message");
            return None;
        }

        let message = Message::user(text);
        let id = message.id.clone();
        let generation = self.begin_request(message);
        tracing::info!(message_id = %id, "Sending message");

        self.spawn_delivery(&id, generation);
        let result = self.inner.agent.send_text(text).await;
        self.finish_request(&id, generation, RequestKind::Text, result);
        Some(id)
    }

    /// Send a recorded voice message. Returns the id of its placeholder message.
    pub async fn send_voice_message(&self, audio: &AudioHandle) -> String {
        let message = Message::voice(VOICE_PROCESSING_TEXT);
        let id = message.id.clone();
        let generation = self.begin_request(message);
        tracing::info!(message_id = %id, audio = %audio, "Processing voice message");

        self.spawn_delivery(&id, generation);
        let result = self.inner.agent.transcribe_and_send(audio).await;
        self.finish_request(&id, generation, RequestKind::Voice, result);
        id
    }

    /// Resend a failed message in place. Returns false when `id` is not a
    /// retryable failed message.
    pub async fn retry_message(&self, id: &str) -> bool {
        let mut retry = None;
        self.commit(None, |shared| {
            let Some(message) = shared.state.find(id).filter(|m| is_retryable(m)) else {
                return Vec::new();
            };
            retry = Some((message.text.clone(), shared.generation));
            shared.in_flight += 1;
            vec![
                ChatAction::update(id, MessageUpdate::status(MessageStatus::Sending)),
                ChatAction::SetTyping(true),
            ]
        });

        let Some((text, generation)) = retry else {
            tracing::debug!(message_id = %id, "Retry ignored, message is not a failed send");
            return false;
        };
        tracing::info!(message_id = %id, "Retrying message");

        self.spawn_delivery(id, generation);
        let result = self.inner.agent.send_text(&text).await;
        self.finish_request(id, generation, RequestKind::Text, result);
        true
    }

    /// Drop every message and persist the empty list.
    ///
    /// Pending replies and delivery steps from before the clear are discarded.
    pub async fn clear_messages(&self) {
        self.commit(None, |shared| {
            shared.generation += 1;
            shared.in_flight = 0;
            vec![
                ChatAction::ClearMessages,
                ChatAction::SetTyping(false),
                ChatAction::SetError(None),
            ]
        });
        tracing::info!("Conversation cleared");
        self.save_now(Vec::new()).await;
    }

    /// Wait until every queued persistence write has completed
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.persist_tx.send(PersistJob::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until no agent request is still waiting for its reply to be shown
    pub async fn wait_idle(&self) {
        let mut updates = self.subscribe();
        loop {
            let busy = self.lock().in_flight > 0;
            if !busy {
                break;
            }
            if let Err(broadcast::error::RecvError::Closed) = updates.recv().await {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> ChatState {
        self.lock().state.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().state.messages.clone()
    }

    pub fn is_typing(&self) -> bool {
        self.lock().state.is_typing
    }

    pub fn error(&self) -> Option<String> {
        self.lock().state.error.clone()
    }

    /// Receive a snapshot after every committed change
    pub fn subscribe(&self) -> broadcast::Receiver<ChatState> {
        self.inner.updates.subscribe()
    }

    // ==================== Request pipeline ====================

    fn begin_request(&self, message: Message) -> u64 {
        let mut generation = 0;
        self.commit(None, |shared| {
            generation = shared.generation;
            shared.in_flight += 1;
            vec![ChatAction::AddMessage(message), ChatAction::SetTyping(true)]
        });
        generation
    }

    fn finish_request(
        &self,
        id: &str,
        generation: u64,
        kind: RequestKind,
        result: Result<AgentReply, AgentError>,
    ) {
        match result {
            Ok(reply) => {
                if let RequestKind::Voice = kind {
                    let text = reply
                        .transcribed_text
                        .clone()
                        .unwrap_or_else(|| VOICE_SENT_TEXT.to_string());
                    self.commit(Some(generation), |_| {
                        vec![ChatAction::update(id, MessageUpdate::text(text))]
                    });
                }
                self.schedule_reply(generation, reply);
            }
            Err(e) => {
                tracing::error!(message_id = %id, error = %e, ?kind, "Error sending message");
                let (update, error) = match kind {
                    RequestKind::Text => (MessageUpdate::status(MessageStatus::Error), SEND_FAILED),
                    RequestKind::Voice => (MessageUpdate::failed(VOICE_FAILED_TEXT), VOICE_FAILED),
                };
                let applied = self.commit(Some(generation), |shared| {
                    vec![
                        ChatAction::update(id, update),
                        end_request(shared),
                        ChatAction::SetError(Some(error.to_string())),
                    ]
                });
                if !applied {
                    tracing::debug!(message_id = %id, "Discarding failure from a cleared session");
                }
            }
        }
    }

    fn schedule_reply(&self, generation: u64, reply: AgentReply) {
        let session = self.clone();
        let delay = self.inner.timing.reply_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let message = Message::assistant(reply.text, reply.rich_media);
            let message_id = message.id.clone();
            let applied = session.commit(Some(generation), |shared| {
                vec![ChatAction::AddMessage(message), end_request(shared)]
            });
            if applied {
                tracing::debug!(message_id = %message_id, "Assistant reply shown");
            } else {
                tracing::debug!("Discarding reply from a cleared session");
            }
        });
    }

    fn spawn_delivery(&self, id: &str, generation: u64) {
        let session = self.clone();
        simulate_delivery(id, self.inner.timing.delivery, move |id, status| {
            session.commit(Some(generation), |shared| {
                advance_status(&shared.state.messages, id, status)
                    .map(ChatAction::SetMessages)
                    .into_iter()
                    .collect()
            });
        });
    }

    // ==================== State plumbing ====================

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit<F>(&self, guard: Option<u64>, f: F) -> bool
    where
        F: FnOnce(&mut Shared) -> Vec<ChatAction>,
    {
        self.apply(guard, true, f)
    }

    /// Run `f` under the state lock and reduce the actions it returns.
    ///
    /// With `guard` set, nothing happens unless the session generation still
    /// matches. Returns whether `f` ran.
    fn apply<F>(&self, guard: Option<u64>, persist: bool, f: F) -> bool
    where
        F: FnOnce(&mut Shared) -> Vec<ChatAction>,
    {
        let mut shared = self.lock();
        if guard.is_some_and(|g| g != shared.generation) {
            return false;
        }

        let actions = f(&mut shared);
        if actions.is_empty() {
            return true;
        }

        let touches_messages = actions.iter().any(ChatAction::touches_messages);
        let mut state = std::mem::take(&mut shared.state);
        for action in actions {
            state = reduce(state, action);
        }
        shared.state = state;

        // Queued under the lock so writes land in commit order.
        if persist && touches_messages && !shared.state.messages.is_empty() {
            let job = PersistJob::Save {
                messages: shared.state.messages.clone(),
                done: None,
            };
            if self.inner.persist_tx.send(job).is_err() {
                tracing::warn!("Persistence task stopped, change not saved");
            }
        }
        let _ = self.inner.updates.send(shared.state.clone());
        true
    }

    async fn save_now(&self, messages: Vec<Message>) {
        let (tx, rx) = oneshot::channel();
        let job = PersistJob::Save {
            messages,
            done: Some(tx),
        };
        if self.inner.persist_tx.send(job).is_ok() {
            let _ = rx.await;
        }
    }
}

fn end_request(shared: &mut Shared) -> ChatAction {
    shared.in_flight = shared.in_flight.saturating_sub(1);
    ChatAction::SetTyping(shared.in_flight > 0)
}

/// Only failed text sends can be retried; a failed voice message has no text to resend.
fn is_retryable(message: &Message) -> bool {
    message.sender == Sender::User && message.status == MessageStatus::Error && !message.voice
}

async fn run_persister<M: MessageStore>(store: Arc<M>, mut rx: mpsc::UnboundedReceiver<PersistJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            PersistJob::Save { messages, done } => {
                store.save(&messages).await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            PersistJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Persistence task stopped");
}
