//! Audio devices behind traits.
//!
//! The controller only sees [`Microphone`], [`Playback`] and [`SpeechSynth`].
//! A terminal has no browser media stack, so the implementations here read
//! pre-recorded clips from disk and fetch prompt audio without rendering it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

#[async_trait]
pub trait Microphone: Send + Sync {
    /// Checks that capture is allowed before a hands-free call starts.
    async fn probe(&self) -> Result<()>;

    /// Captures until `stop` fires (or its sender is dropped) and returns the clip.
    async fn record(&self, stop: oneshot::Receiver<()>) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Playback: Send + Sync {
    /// Plays the clip at `url` to completion.
    async fn play(&self, url: &str) -> Result<()>;
}

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Speaks `text` to completion.
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Microphone that answers each capture with the next clip of a list of files.
#[derive(Debug)]
pub struct ClipMicrophone {
    clips: Mutex<VecDeque<PathBuf>>,
}

impl ClipMicrophone {
    pub fn new(clips: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            clips: Mutex::new(clips.into_iter().collect()),
        }
    }

    fn next_clip(&self) -> Result<PathBuf> {
        let mut clips = self
            .clips
            .lock()
            .map_err(|_| ClientError::Microphone("clip queue poisoned".to_string()))?;
        clips
            .pop_front()
            .ok_or_else(|| ClientError::Microphone("no clip left to record".to_string()))
    }
}

#[async_trait]
impl Microphone for ClipMicrophone {
    async fn probe(&self) -> Result<()> {
        let first = {
            let clips = self
                .clips
                .lock()
                .map_err(|_| ClientError::Microphone("clip queue poisoned".to_string()))?;
            clips.front().cloned()
        };
        match first {
            Some(path) => {
                tokio::fs::metadata(&path).await.map_err(|e| {
                    ClientError::Microphone(format!("{}: {e}", path.display()))
                })?;
                Ok(())
            }
            None => Err(ClientError::Microphone("no recording source".to_string())),
        }
    }

    async fn record(&self, stop: oneshot::Receiver<()>) -> Result<Vec<u8>> {
        let path = self.next_clip()?;
        debug!(clip = %path.display(), "capture started");
        let _ = stop.await;
        let audio = tokio::fs::read(&path).await?;
        info!(clip = %path.display(), bytes = audio.len(), "capture stopped");
        Ok(audio)
    }
}

/// Downloads prompt audio so unreachable clips fail like a broken player would.
#[derive(Debug, Clone, Default)]
pub struct FetchPlayback {
    http: reqwest::Client,
}

impl FetchPlayback {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Playback for FetchPlayback {
    async fn play(&self, url: &str) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Playback(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Playback(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Playback(e.to_string()))?;
        info!(url = %url, bytes = bytes.len(), "prompt audio played");
        Ok(())
    }
}

/// Speech "synthesis" for a terminal: the prompt is already printed as a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechSynth for SilentSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        debug!(chars = text.len(), "prompt spoken");
        Ok(())
    }
}
