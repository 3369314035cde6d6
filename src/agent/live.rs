//! Live agent: Direct Line for text, a speech recognizer for voice

use super::direct_line::DirectLineClient;
use super::speech::SpeechToText;
use super::{AgentError, AgentReply, RemoteAgent};
use crate::voice::AudioHandle;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

pub struct LiveAgent {
    channel: DirectLineClient,
    speech: Arc<dyn SpeechToText>,
}

impl LiveAgent {
    pub fn new(channel: DirectLineClient, speech: Arc<dyn SpeechToText>) -> Self {
        Self { channel, speech }
    }
}

#[async_trait]
impl RemoteAgent for LiveAgent {
    async fn send_text(&self, text: &str) -> Result<AgentReply, AgentError> {
        self.channel.send(text).await
    }

    async fn transcribe_and_send(&self, audio: &AudioHandle) -> Result<AgentReply, AgentError> {
        transcribe_and_forward(self.speech.as_ref(), audio, |text| async move {
            self.channel.send(&text).await
        })
        .await
    }

    fn name(&self) -> &str {
        "direct-line"
    }
}

/// Transcribe `audio`, then hand the text to `forward`.
///
/// A recognition failure is not an error here: the caller gets an apology
/// reply without a transcription. Failures from `forward` propagate.
pub async fn transcribe_and_forward<F, Fut>(
    speech: &dyn SpeechToText,
    audio: &AudioHandle,
    forward: F,
) -> Result<AgentReply, AgentError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<AgentReply, AgentError>>,
{
    let transcribed = match speech.transcribe(audio).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(audio = %audio, error = %e, "Error processing voice message");
            return Ok(AgentReply::speech_apology());
        }
    };

    let reply = forward(transcribed.clone()).await?;
    Ok(reply.with_transcription(transcribed))
}
