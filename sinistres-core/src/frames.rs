//! JSON frames exchanged with the conversational agent over the WebSocket.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A reply from the backend that may carry prompt text, synthesized audio and completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ResponseFrame {
    /// Text shown and spoken for this reply.
    ///
    /// A full acknowledgement (acknowledge + summary) wins over a plain message,
    /// which wins over a bare next question.
    pub fn text(&self) -> Option<String> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        if let (Some(ack), Some(summary)) = (non_empty(&self.acknowledge), non_empty(&self.summary)) {
            return Some(format!(
                "{}\n\n{}\n\n{}",
                ack,
                summary,
                self.next_question.as_deref().unwrap_or("")
            ));
        }
        non_empty(&self.message)
            .or_else(|| non_empty(&self.next_question))
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Greeting {
        claim_id: Option<String>,
        message: String,
        audio_url: Option<String>,
    },
    Response(ResponseFrame),
    /// The backend asks the client to end the current capture now.
    StopRecording,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    claim_id: Option<serde_json::Value>,
    #[serde(flatten)]
    response: ResponseFrame,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;

        match raw.kind.as_deref() {
            Some("greeting") => Ok(InboundFrame::Greeting {
                claim_id: raw.claim_id.and_then(|id| match id {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                }),
                message: raw.response.message.unwrap_or_default(),
                audio_url: raw.response.audio_url,
            }),
            Some("response") => Ok(InboundFrame::Response(raw.response)),
            Some("stop_recording") => Ok(InboundFrame::StopRecording),
            Some(other) => Err(CoreError::UnknownFrameType(other.to_string())),
            // Phase-tagged frames carry no type; they are conversational replies.
            None if raw.response.phase.is_some() || raw.response.message.is_some() => {
                Ok(InboundFrame::Response(raw.response))
            }
            None => Err(CoreError::MalformedFrame(
                "frame has neither type nor message".to_string(),
            )),
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        match self {
            InboundFrame::Greeting { audio_url, .. } => audio_url.as_deref(),
            InboundFrame::Response(response) => response.audio_url.as_deref(),
            InboundFrame::StopRecording => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    UserText { text: String },
    Close,
}

impl OutboundFrame {
    pub fn user_text(text: impl Into<String>) -> Self {
        OutboundFrame::UserText { text: text.into() }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Resolves a backend audio URL against the API origin. Absolute http(s) URLs pass through.
pub fn normalize_audio_url(api_base: &str, audio_url: Option<&str>) -> Option<String> {
    let url = audio_url.map(str::trim).filter(|u| !u.is_empty())?;
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }
    let base = api_base.trim_end_matches('/');
    if url.starts_with('/') {
        Some(format!("{base}{url}"))
    } else {
        Some(format!("{base}/{url}"))
    }
}

/// Session identifier for a new conversation, derived from the wall clock.
pub fn session_id(unix_millis: u128) -> String {
    format!("session-{unix_millis}")
}

pub fn conversation_path(session_id: &str) -> String {
    format!("/ws/conversation/{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_greeting() {
        let frame = InboundFrame::decode(
            r#"{"type":"greeting","claim_id":"CLM-1","message":"Bonjour","audio_url":"/audio/1.mp3"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Greeting {
                claim_id: Some("CLM-1".into()),
                message: "Bonjour".into(),
                audio_url: Some("/audio/1.mp3".into()),
            }
        );
        assert_eq!(frame.audio_url(), Some("/audio/1.mp3"));
    }

    #[test]
    fn test_numeric_claim_id_is_stringified() {
        let frame = InboundFrame::decode(r#"{"type":"greeting","claim_id":42,"message":"Salut"}"#)
            .unwrap();
        assert!(matches!(frame, InboundFrame::Greeting { claim_id: Some(id), .. } if id == "42"));
    }

    #[test]
    fn test_response_text_precedence() {
        let full = ResponseFrame {
            acknowledge: Some("Merci".into()),
            summary: Some("Collision à Rabat".into()),
            next_question: Some("Y avait-il un tiers ?".into()),
            message: Some("ignored".into()),
            ..Default::default()
        };
        assert_eq!(
            full.text().as_deref(),
            Some("Merci\n\nCollision à Rabat\n\nY avait-il un tiers ?")
        );

        let no_question = ResponseFrame {
            acknowledge: Some("Merci".into()),
            summary: Some("Résumé".into()),
            ..Default::default()
        };
        assert_eq!(no_question.text().as_deref(), Some("Merci\n\nRésumé\n\n"));

        let message = ResponseFrame {
            message: Some("Quelle heure ?".into()),
            next_question: Some("other".into()),
            ..Default::default()
        };
        assert_eq!(message.text().as_deref(), Some("Quelle heure ?"));

        let question = ResponseFrame {
            next_question: Some("Où ?".into()),
            ..Default::default()
        };
        assert_eq!(question.text().as_deref(), Some("Où ?"));

        assert_eq!(ResponseFrame::default().text(), None);
    }

    #[test]
    fn test_phase_tagged_frame_is_a_response() {
        let frame = InboundFrame::decode(
            r#"{"phase":"AUTHENTIFICATION","message":"Votre matricule ?","action":"demander_matricule"}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Response(response) => {
                assert_eq!(response.phase.as_deref(), Some("AUTHENTIFICATION"));
                assert_eq!(response.text().as_deref(), Some("Votre matricule ?"));
                assert!(!response.completed);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            InboundFrame::decode(r#"{"type":"weird"}"#),
            Err(CoreError::UnknownFrameType(t)) if t == "weird"
        ));
        assert!(matches!(
            InboundFrame::decode(r#"{"foo":1}"#),
            Err(CoreError::MalformedFrame(_))
        ));
        assert!(matches!(
            InboundFrame::decode("not json"),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_outbound_encoding() {
        assert_eq!(
            OutboundFrame::user_text("bonjour").encode().unwrap(),
            r#"{"type":"user_text","text":"bonjour"}"#
        );
        assert_eq!(OutboundFrame::Close.encode().unwrap(), r#"{"type":"close"}"#);
    }

    #[test]
    fn test_normalize_audio_url() {
        let base = "http://localhost:8000/";
        assert_eq!(normalize_audio_url(base, None), None);
        assert_eq!(normalize_audio_url(base, Some("")), None);
        assert_eq!(
            normalize_audio_url(base, Some("/static/a.mp3")).as_deref(),
            Some("http://localhost:8000/static/a.mp3")
        );
        assert_eq!(
            normalize_audio_url(base, Some("https://cdn.example.com/a.mp3")).as_deref(),
            Some("https://cdn.example.com/a.mp3")
        );
    }

    #[test]
    fn test_session_paths() {
        let id = session_id(1_700_000_000_000);
        assert_eq!(id, "session-1700000000000");
        assert_eq!(conversation_path(&id), "/ws/conversation/session-1700000000000");
    }
}
