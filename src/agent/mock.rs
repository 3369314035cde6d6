//! Deterministic offline agent used when mock data is enabled

use super::{AgentError, AgentReply, RemoteAgent};
use crate::voice::AudioHandle;
use async_trait::async_trait;

const MOCK_TRANSCRIPTION: &str = "Tell me about Hyundai models";
const MOCK_VOICE_REPLY: &str =
    "I understand you're interested in Hyundai models. How can I help you today?";

/// Canned responses, no network
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAgent;

#[async_trait]
impl RemoteAgent for MockAgent {
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError> {
        tracing::debug!("Using mock data for text message");
        Ok(AgentReply::text(format!("This is a mock response to: \"{text}\"")))
    }

    async fn transcribe_and_send(&self, audio: &AudioHandle) -> Result<AgentReply, AgentError> {
        tracing::debug!(audio = %audio, "Using mock data for voice message");
        Ok(AgentReply::text(MOCK_VOICE_REPLY).with_transcription(MOCK_TRANSCRIPTION))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
