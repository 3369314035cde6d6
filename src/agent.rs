//! Remote conversational agent
//!
//! The chat core only sees the `RemoteAgent` trait. Whether replies come from
//! canned mock data or the hosted agent is decided once at startup.

mod direct_line;
mod error;
mod live;
mod mock;
mod speech;
mod types;

pub use direct_line::{DirectLineClient, DirectLineConfig};
pub use error::{AgentError, AgentErrorKind};
pub use live::LiveAgent;
pub use mock::MockAgent;
pub use speech::{
    AzureSpeechRecognizer, SpeechConfig, SpeechToText, UnconfiguredSpeech, MAX_RECOGNITION_RETRIES,
};
pub use types::AgentReply;

use crate::voice::AudioHandle;
use async_trait::async_trait;
use std::sync::Arc;

/// Text-in/text-out conversational agent
#[async_trait]
pub trait RemoteAgent: Send + Sync {
    /// Send user text, get the assistant reply
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError>;

    /// Transcribe recorded audio and send the transcription.
    ///
    /// Implementations recover from recognition failures themselves and
    /// reply with an apology instead of an error.
    async fn transcribe_and_send(&self, audio: &AudioHandle) -> Result<AgentReply, AgentError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: RemoteAgent + ?Sized> RemoteAgent for Arc<T> {
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError> {
        (**self).send_text(text).await
    }

    async fn transcribe_and_send(&self, audio: &AudioHandle) -> Result<AgentReply, AgentError> {
        (**self).transcribe_and_send(audio).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for remote agents
pub struct LoggingAgent {
    inner: Arc<dyn RemoteAgent>,
}

impl LoggingAgent {
    pub fn new(inner: Arc<dyn RemoteAgent>) -> Self {
        Self { inner }
    }

    fn log_outcome(&self, op: &str, started: std::time::Instant, result: &Result<AgentReply, AgentError>) {
        let duration = started.elapsed();
        match result {
            Ok(reply) => {
                tracing::info!(
                    agent = %self.inner.name(),
                    op,
                    duration_ms = %duration.as_millis(),
                    media = reply.rich_media.len(),
                    transcribed = reply.transcribed_text.is_some(),
                    "Agent request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    agent = %self.inner.name(),
                    op,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Agent request failed"
                );
            }
        }
    }
}

#[async_trait]
impl RemoteAgent for LoggingAgent {
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError> {
        let started = std::time::Instant::now();
        let result = self.inner.send_text(text).await;
        self.log_outcome("send_text", started, &result);
        result
    }

    async fn transcribe_and_send(&self, audio: &AudioHandle) -> Result<AgentReply, AgentError> {
        let started = std::time::Instant::now();
        let result = self.inner.transcribe_and_send(audio).await;
        self.log_outcome("transcribe_and_send", started, &result);
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
