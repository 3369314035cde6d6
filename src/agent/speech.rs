//! Speech-to-text for recorded voice messages

use super::AgentError;
use crate::voice::AudioHandle;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Extra recognition attempts after the first failure
pub const MAX_RECOGNITION_RETRIES: u32 = 3;

/// Converts recorded audio to text
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, AgentError>;
}

/// Settings for the speech recognition service
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub key: String,
    pub region: String,
    pub language: String,
    pub retries: u32,
}

/// Short-audio recognizer for the Azure speech REST endpoint
pub struct AzureSpeechRecognizer {
    client: Client,
    config: SpeechConfig,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResult {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

impl AzureSpeechRecognizer {
    pub fn new(config: SpeechConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::unknown(format!("Failed to create HTTP client: {e}")))?;
        let url = format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
            config.region
        );
        Ok(Self {
            client,
            config,
            url,
        })
    }

    async fn recognize_once(&self, audio: &[u8]) -> Result<String, AgentError> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("language", self.config.language.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.config.key)
            .header("Content-Type", "audio/wav; codecs=audio/pcm; samplerate=16000")
            .header("Accept", "application/json")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| AgentError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(AgentError::from_status(status, &body));
        }

        let result: RecognitionResult = serde_json::from_str(&body)
            .map_err(|e| AgentError::invalid_response(format!("Failed to parse recognition: {e}")))?;
        interpret(result)
    }
}

fn interpret(result: RecognitionResult) -> Result<String, AgentError> {
    match (result.recognition_status.as_str(), result.display_text) {
        ("Success", Some(text)) if !text.trim().is_empty() => Ok(text),
        (status, _) => Err(AgentError::speech(format!("Speech recognition failed: {status}"))),
    }
}

#[async_trait]
impl SpeechToText for AzureSpeechRecognizer {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, AgentError> {
        let bytes = tokio::fs::read(audio.path())
            .await
            .map_err(|e| AgentError::speech(format!("Failed to read audio {audio}: {e}")))?;

        let mut attempt = 0;
        loop {
            match self.recognize_once(&bytes).await {
                Ok(text) => {
                    tracing::info!(attempt, "Speech recognized");
                    return Ok(text);
                }
                Err(e) if e.kind.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max = self.config.retries,
                        error = %e,
                        "Retrying speech recognition"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Stand-in when no speech credentials are configured; every clip fails recognition
pub struct UnconfiguredSpeech;

#[async_trait]
impl SpeechToText for UnconfiguredSpeech {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, AgentError> {
        tracing::warn!(audio = %audio, "Speech recognition not configured");
        Err(AgentError::speech("Speech recognition is not configured"))
    }
}
