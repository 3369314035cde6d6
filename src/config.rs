//! Startup configuration from environment variables

use crate::agent::{DirectLineConfig, SpeechConfig, MAX_RECOGNITION_RETRIES};
use crate::chat::SessionTiming;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DIRECT_LINE_ENDPOINT: &str = "https://directline.botframework.com/v3/directline";
const DEFAULT_LANGUAGE: &str = "en-US";
const DEFAULT_BOT_NAME: &str = "Hyundai KSA Assistant";
const DEFAULT_MAX_RECORDING_SECS: u64 = 60;

/// Everything `main` needs to wire the production session
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Answer locally instead of calling the hosted agent
    pub use_mock_data: bool,
    pub db_path: PathBuf,
    /// Present only in live mode
    pub direct_line: Option<DirectLineConfig>,
    /// Present when a speech key and region are configured
    pub speech: Option<SpeechConfig>,
    pub max_recording: Duration,
    pub bot_name: String,
    pub timing: SessionTiming,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut use_mock_data = match var("SHOWROOM_USE_MOCK_DATA") {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "Unrecognized SHOWROOM_USE_MOCK_DATA, using mock data");
                true
            }),
            None => true,
        };

        let direct_line = if use_mock_data {
            None
        } else if let Some(secret) = var("DIRECT_LINE_SECRET") {
            let endpoint = var("DIRECT_LINE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_DIRECT_LINE_ENDPOINT.to_string());
            Some(DirectLineConfig::new(endpoint, secret))
        } else {
            tracing::warn!("Live mode requested without DIRECT_LINE_SECRET, falling back to mock data");
            use_mock_data = true;
            None
        };

        let speech = match (var("SPEECH_KEY"), var("SPEECH_REGION")) {
            (Some(key), Some(region)) => Some(SpeechConfig {
                key,
                region,
                language: var("SPEECH_RECOGNITION_LANGUAGE")
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
                retries: MAX_RECOGNITION_RETRIES,
            }),
            _ => None,
        };

        let db_path = var("SHOWROOM_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".showroom-chat").join("chat.db")
            },
            PathBuf::from,
        );

        let max_recording_secs = var("SHOWROOM_MAX_RECORDING_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_MAX_RECORDING_SECS);

        Self {
            use_mock_data,
            db_path,
            direct_line,
            speech,
            max_recording: Duration::from_secs(max_recording_secs),
            bot_name: var("SHOWROOM_BOT_NAME").unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            timing: SessionTiming::default(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
