//! Voice recording
//!
//! Recording itself is a platform collaborator behind `AudioRecorder`; this
//! module owns the client-side duration limit.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Reference to a finished recording on local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    path: PathBuf,
}

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Microphone permission denied")]
    PermissionDenied,
    #[error("Recorder failed: {0}")]
    Device(String),
}

/// Platform audio recorder
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn start(&self) -> Result<(), RecorderError>;
    async fn stop(&self) -> Result<AudioHandle, RecorderError>;
}

/// Recorder that "captures" a pre-recorded file, for hosts without a microphone
pub struct FileRecorder {
    path: PathBuf,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AudioRecorder for FileRecorder {
    async fn start(&self) -> Result<(), RecorderError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(RecorderError::Device(format!("{} is not a file", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(RecorderError::PermissionDenied)
            }
            Err(e) => Err(RecorderError::Device(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn stop(&self) -> Result<AudioHandle, RecorderError> {
        Ok(AudioHandle::new(self.path.clone()))
    }
}

/// How a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    MaxDuration,
}

/// Record until `stop` is cancelled, or auto-stop once `max` has elapsed.
pub async fn record_clip<R: AudioRecorder + ?Sized>(
    recorder: &R,
    stop: CancellationToken,
    max: Duration,
) -> Result<(AudioHandle, StopReason), RecorderError> {
    recorder.start().await?;
    tracing::debug!(max_secs = max.as_secs(), "Recording started");

    let reason = tokio::select! {
        () = stop.cancelled() => StopReason::User,
        () = tokio::time::sleep(max) => {
            tracing::info!(max_secs = max.as_secs(), "Auto-stopping recording");
            StopReason::MaxDuration
        }
    };

    let clip = recorder.stop().await?;
    tracing::info!(clip = %clip, ?reason, "Recording stopped");
    Ok((clip, reason))
}

/// Recording timer label, `m:ss`
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
