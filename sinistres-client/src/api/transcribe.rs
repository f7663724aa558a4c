use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiClient, check};
use crate::error::{ClientError, Result};

const TRANSCRIBE_PATH: &str = "api/transcribe";
const UPLOAD_FIELD: &str = "file";
const UPLOAD_NAME: &str = "recording.wav";

/// Body returned by the transcription endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Speech-to-text over a recorded clip.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String>;
}

#[async_trait]
impl Transcriber for ApiClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let bytes = audio.len();
        let part = Part::bytes(audio)
            .file_name(UPLOAD_NAME)
            .mime_str("audio/wav")?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let url = self.settings().api_endpoint(TRANSCRIBE_PATH);
        let response = self.http.post(&url).multipart(form).send().await?;
        let body: Transcription = check(response).await?.json().await?;

        if !body.success {
            let reason = body
                .error
                .unwrap_or_else(|| "la transcription a échoué".to_string());
            warn!(bytes, reason = %reason, "transcription rejected");
            return Err(ClientError::Transcription(reason));
        }
        info!(bytes, chars = body.transcript.len(), "transcription received");
        Ok(body.transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_body_defaults() {
        let body: Transcription = serde_json::from_str(r#"{"success":true,"transcript":"bonjour"}"#).unwrap();
        assert!(body.success);
        assert_eq!(body.transcript, "bonjour");
        assert!(body.error.is_none());

        let failed: Transcription =
            serde_json::from_str(r#"{"success":false,"error":"fichier vide"}"#).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.transcript, "");
        assert_eq!(failed.error.as_deref(), Some("fichier vide"));
    }
}
