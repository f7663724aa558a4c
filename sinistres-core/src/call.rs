//! Dialogue state machine of the conversational claim-filing client.
//!
//! The machine owns every piece of call state (wizard phase, mode, media
//! state, turn counter, transcript). Callers feed it [`CallEvent`]s, from
//! the user, the socket or a completed media/network task, and execute the
//! [`Effect`]s it returns. Effects that complete asynchronously carry the
//! [`Turn`] they were issued for; an event reporting an older turn is stale
//! and is ignored, so a late playback or capture callback can never act on a
//! newer prompt.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationMessage, Transcript};
use crate::frames::{InboundFrame, OutboundFrame, ResponseFrame, normalize_audio_url};

/// Capture window of a hands-free turn.
pub const RECORDING_WINDOW: Duration = Duration::from_secs(10);

/// Pause before listening when speech synthesis itself failed.
pub const SPEECH_FAILURE_GRACE: Duration = Duration::from_millis(500);

pub type Turn = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Manual text turns and manual record start/stop.
    Message,
    /// Hands-free loop: prompt, listen, transcribe, send.
    FullCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Welcome,
    Dialogue,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    PlayingPrompt,
    Recording,
    AwaitingTranscription,
    AwaitingBackend,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The microphone probe on full-call entry was refused.
    MicrophoneDenied(String),
    SocketClosed,
    FrameReceived(InboundFrame),
    PlaybackFinished(Turn),
    PlaybackFailed { turn: Turn, reason: String },
    SpeechFinished(Turn),
    SpeechFailed { turn: Turn, reason: String },
    RecordingFailed { turn: Turn, reason: String },
    RecordingCaptured { turn: Turn, audio: Vec<u8> },
    TranscriptionSucceeded { turn: Turn, transcript: String },
    TranscriptionFailed { turn: Turn, reason: String },
    /// Typed message from the user.
    UserText(String),
    StartRecording,
    StopRecording,
    /// A pre-recorded audio file picked by the user.
    AudioSubmitted(Vec<u8>),
    EndCall,
}

/// User-visible outcome of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PhaseChanged(Phase),
    ClaimAssigned(String),
    Message(ConversationMessage),
    Alert(String),
    Completed,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PlayAudio {
        turn: Turn,
        url: String,
    },
    Speak {
        turn: Turn,
        text: String,
    },
    StopPlayback,
    CancelSpeech,
    /// Open the microphone after `delay` and capture until `window` elapses or a stop arrives.
    OpenMicrophone {
        turn: Turn,
        window: Option<Duration>,
        delay: Duration,
    },
    StopRecording {
        turn: Turn,
    },
    Transcribe {
        turn: Turn,
        audio: Vec<u8>,
    },
    Send(OutboundFrame),
    CloseSocket,
    Notify(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptSource {
    Audio,
    Speech,
}

#[derive(Debug)]
pub struct CallMachine {
    mode: CallMode,
    phase: Phase,
    state: CallState,
    turn: Turn,
    claim_id: Option<String>,
    transcript: Transcript,
    api_base: String,
    recording_window: Duration,
    prompt_text: String,
    prompt_source: PromptSource,
    completed: bool,
}

impl CallMachine {
    pub fn new(mode: CallMode, api_base: impl Into<String>) -> Self {
        Self {
            mode,
            phase: Phase::Welcome,
            state: CallState::Idle,
            turn: 0,
            claim_id: None,
            transcript: Transcript::new(),
            api_base: api_base.into(),
            recording_window: RECORDING_WINDOW,
            prompt_text: String::new(),
            prompt_source: PromptSource::Speech,
            completed: false,
        }
    }

    pub fn with_recording_window(mut self, window: Duration) -> Self {
        self.recording_window = window;
        self
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn claim_id(&self) -> Option<&str> {
        self.claim_id.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_ended(&self) -> bool {
        self.state == CallState::Ended
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn handle(&mut self, event: CallEvent) -> Vec<Effect> {
        if self.state == CallState::Ended {
            debug!(?event, "call ended, event ignored");
            return Vec::new();
        }

        let mut effects = Vec::new();
        match event {
            CallEvent::MicrophoneDenied(reason) => {
                warn!(reason = %reason, "microphone permission refused");
                effects.push(alert(
                    "Permission microphone refusée. Autorisez le microphone pour utiliser l'appel complet.",
                ));
                self.finish(&mut effects);
            }
            CallEvent::SocketClosed => {
                warn!(turn = self.turn, "conversation socket closed");
                self.release_media(&mut effects);
                effects.push(alert("Connexion interrompue avec le serveur."));
                self.finish(&mut effects);
            }
            CallEvent::FrameReceived(frame) => self.on_frame(frame, &mut effects),
            CallEvent::PlaybackFinished(turn) | CallEvent::SpeechFinished(turn) => {
                if self.is_current(turn, CallState::PlayingPrompt) {
                    self.after_prompt(Duration::ZERO, &mut effects);
                }
            }
            CallEvent::PlaybackFailed { turn, reason } => {
                if self.is_current(turn, CallState::PlayingPrompt)
                    && self.prompt_source == PromptSource::Audio
                {
                    warn!(turn, reason = %reason, "audio playback failed, falling back to speech synthesis");
                    self.prompt_source = PromptSource::Speech;
                    effects.push(Effect::Speak {
                        turn,
                        text: self.prompt_text.clone(),
                    });
                }
            }
            CallEvent::SpeechFailed { turn, reason } => {
                if self.is_current(turn, CallState::PlayingPrompt) {
                    warn!(turn, reason = %reason, "speech synthesis failed");
                    self.after_prompt(SPEECH_FAILURE_GRACE, &mut effects);
                }
            }
            CallEvent::RecordingFailed { turn, reason } => {
                if self.is_current(turn, CallState::Recording) {
                    warn!(turn, reason = %reason, "recording failed");
                    effects.push(alert(format!("Erreur microphone: {reason}")));
                    self.state = CallState::Idle;
                }
            }
            CallEvent::RecordingCaptured { turn, audio } => {
                if self.is_current(turn, CallState::Recording) {
                    info!(turn, bytes = audio.len(), "recording captured, sending to transcription");
                    self.state = CallState::AwaitingTranscription;
                    effects.push(Effect::Transcribe { turn, audio });
                }
            }
            CallEvent::TranscriptionSucceeded { turn, transcript } => {
                if self.is_current(turn, CallState::AwaitingTranscription) {
                    let transcript = transcript.trim().to_string();
                    if transcript.is_empty() {
                        effects.push(alert("Aucune parole détectée dans l'enregistrement."));
                        self.state = CallState::Idle;
                    } else {
                        self.send_user_turn(transcript, true, &mut effects);
                    }
                }
            }
            CallEvent::TranscriptionFailed { turn, reason } => {
                if self.is_current(turn, CallState::AwaitingTranscription) {
                    warn!(turn, reason = %reason, "transcription failed");
                    effects.push(alert(format!("Erreur de transcription audio: {reason}")));
                    self.state = CallState::Idle;
                }
            }
            CallEvent::UserText(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return effects;
                }
                if self.capture_in_progress() {
                    effects.push(alert("Un enregistrement est en cours."));
                    return effects;
                }
                self.send_user_turn(text, false, &mut effects);
            }
            CallEvent::StartRecording => {
                if self.capture_in_progress() {
                    return effects;
                }
                self.interrupt_prompt(&mut effects);
                self.turn += 1;
                self.state = CallState::Recording;
                effects.push(Effect::OpenMicrophone {
                    turn: self.turn,
                    window: None,
                    delay: Duration::ZERO,
                });
            }
            CallEvent::StopRecording => {
                if self.state == CallState::Recording {
                    effects.push(Effect::StopRecording { turn: self.turn });
                }
            }
            CallEvent::AudioSubmitted(audio) => {
                if self.capture_in_progress() {
                    effects.push(alert("Un enregistrement est en cours."));
                    return effects;
                }
                self.interrupt_prompt(&mut effects);
                self.turn += 1;
                self.state = CallState::AwaitingTranscription;
                effects.push(Effect::Transcribe {
                    turn: self.turn,
                    audio,
                });
            }
            CallEvent::EndCall => {
                info!(turn = self.turn, claim_id = ?self.claim_id, "ending call");
                self.hang_up(&mut effects);
            }
        }
        effects
    }

    fn on_frame(&mut self, frame: InboundFrame, effects: &mut Vec<Effect>) {
        match frame {
            InboundFrame::Greeting {
                claim_id,
                message,
                audio_url,
            } => {
                info!(claim_id = ?claim_id, "greeting received");
                if let Some(id) = claim_id {
                    self.claim_id = Some(id.clone());
                    effects.push(Effect::Notify(Notice::ClaimAssigned(id)));
                }
                self.set_phase(Phase::Dialogue, effects);

                let message_entry = ConversationMessage::system(message.clone(), audio_url.clone());
                self.transcript.reset_with(message_entry.clone());
                effects.push(Effect::Notify(Notice::Message(message_entry)));

                self.play_prompt(message, audio_url.as_deref(), effects);
            }
            InboundFrame::Response(response) => self.on_response(response, effects),
            InboundFrame::StopRecording => {
                if self.state == CallState::Recording {
                    info!(turn = self.turn, "backend requested end of capture");
                    effects.push(Effect::StopRecording { turn: self.turn });
                }
            }
        }
    }

    fn on_response(&mut self, response: ResponseFrame, effects: &mut Vec<Effect>) {
        if response.completed {
            info!(claim_id = ?self.claim_id, "conversation completed");
            self.completed = true;
        }

        match response.text() {
            Some(text) => {
                let entry = ConversationMessage::system(text.clone(), response.audio_url.clone());
                self.transcript.push(entry.clone());
                effects.push(Effect::Notify(Notice::Message(entry)));
                self.play_prompt(text, response.audio_url.as_deref(), effects);
            }
            None => {
                if self.state == CallState::AwaitingBackend {
                    self.state = CallState::Idle;
                }
            }
        }

        if response.completed {
            self.set_phase(Phase::Summary, effects);
            effects.push(Effect::Notify(Notice::Completed));
            if self.mode == CallMode::FullCall && self.state != CallState::PlayingPrompt {
                self.hang_up(effects);
            }
        }
    }

    /// Starts a new prompt, cancelling whatever media the previous turn still holds.
    fn play_prompt(&mut self, text: String, audio_url: Option<&str>, effects: &mut Vec<Effect>) {
        self.interrupt_prompt(effects);
        if self.state == CallState::Recording {
            effects.push(Effect::StopRecording { turn: self.turn });
        }

        self.turn += 1;
        self.state = CallState::PlayingPrompt;
        self.prompt_text = text.clone();

        match normalize_audio_url(&self.api_base, audio_url) {
            Some(url) => {
                self.prompt_source = PromptSource::Audio;
                effects.push(Effect::PlayAudio {
                    turn: self.turn,
                    url,
                });
            }
            None => {
                self.prompt_source = PromptSource::Speech;
                effects.push(Effect::Speak {
                    turn: self.turn,
                    text,
                });
            }
        }
    }

    fn after_prompt(&mut self, delay: Duration, effects: &mut Vec<Effect>) {
        match (self.mode, self.completed) {
            (CallMode::FullCall, false) => {
                self.state = CallState::Recording;
                effects.push(Effect::OpenMicrophone {
                    turn: self.turn,
                    window: Some(self.recording_window),
                    delay,
                });
            }
            (CallMode::FullCall, true) => {
                info!(claim_id = ?self.claim_id, "summary played, hanging up");
                self.hang_up(effects);
            }
            (CallMode::Message, _) => self.state = CallState::Idle,
        }
    }

    fn hang_up(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Send(OutboundFrame::Close));
        effects.push(Effect::CloseSocket);
        self.release_media(effects);
        self.finish(effects);
    }

    fn send_user_turn(&mut self, text: String, spoken: bool, effects: &mut Vec<Effect>) {
        let entry = ConversationMessage::client(text.clone(), spoken);
        self.transcript.push(entry.clone());
        effects.push(Effect::Notify(Notice::Message(entry)));
        effects.push(Effect::Send(OutboundFrame::user_text(text)));
        self.state = CallState::AwaitingBackend;
    }

    fn interrupt_prompt(&mut self, effects: &mut Vec<Effect>) {
        if self.state == CallState::PlayingPrompt {
            effects.push(Effect::StopPlayback);
            effects.push(Effect::CancelSpeech);
        }
    }

    fn release_media(&mut self, effects: &mut Vec<Effect>) {
        if self.state == CallState::Recording {
            effects.push(Effect::StopRecording { turn: self.turn });
        }
        effects.push(Effect::StopPlayback);
        effects.push(Effect::CancelSpeech);
    }

    fn finish(&mut self, effects: &mut Vec<Effect>) {
        self.turn += 1;
        self.state = CallState::Ended;
        effects.push(Effect::Notify(Notice::Ended));
    }

    fn set_phase(&mut self, phase: Phase, effects: &mut Vec<Effect>) {
        if self.phase != phase {
            self.phase = phase;
            effects.push(Effect::Notify(Notice::PhaseChanged(phase)));
        }
    }

    fn capture_in_progress(&self) -> bool {
        matches!(
            self.state,
            CallState::Recording | CallState::AwaitingTranscription
        )
    }

    fn is_current(&self, turn: Turn, expected: CallState) -> bool {
        let current = turn == self.turn && self.state == expected;
        if !current {
            debug!(
                turn,
                current_turn = self.turn,
                state = ?self.state,
                "stale media event ignored"
            );
        }
        current
    }
}

fn alert(text: impl Into<String>) -> Effect {
    Effect::Notify(Notice::Alert(text.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8000";

    fn greeting(audio: Option<&str>) -> CallEvent {
        CallEvent::FrameReceived(InboundFrame::Greeting {
            claim_id: Some("CLM-77".into()),
            message: "Bonjour, quel est votre matricule ?".into(),
            audio_url: audio.map(str::to_string),
        })
    }

    fn response(message: &str, completed: bool) -> CallEvent {
        CallEvent::FrameReceived(InboundFrame::Response(ResponseFrame {
            message: Some(message.into()),
            completed,
            ..Default::default()
        }))
    }

    fn sends(effects: &[Effect]) -> Vec<&OutboundFrame> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_call_turn_protocol() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);

        let effects = machine.handle(greeting(Some("/static/tts/1.mp3")));
        assert_eq!(machine.phase(), Phase::Dialogue);
        assert_eq!(machine.claim_id(), Some("CLM-77"));
        assert_eq!(machine.state(), CallState::PlayingPrompt);
        let turn = machine.turn();
        assert!(effects.contains(&Effect::PlayAudio {
            turn,
            url: "http://localhost:8000/static/tts/1.mp3".into()
        }));
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::OpenMicrophone { .. })),
            "microphone must wait for playback to end"
        );

        let effects = machine.handle(CallEvent::PlaybackFinished(turn));
        assert_eq!(
            effects,
            vec![Effect::OpenMicrophone {
                turn,
                window: Some(RECORDING_WINDOW),
                delay: Duration::ZERO
            }]
        );
        assert_eq!(machine.state(), CallState::Recording);

        let effects = machine.handle(CallEvent::RecordingCaptured {
            turn,
            audio: b"RIFF".to_vec(),
        });
        assert_eq!(
            effects,
            vec![Effect::Transcribe {
                turn,
                audio: b"RIFF".to_vec()
            }]
        );
        assert!(sends(&effects).is_empty());

        let effects = machine.handle(CallEvent::TranscriptionSucceeded {
            turn,
            transcript: "M001".into(),
        });
        assert_eq!(sends(&effects), vec![&OutboundFrame::user_text("M001")]);
        assert_eq!(machine.state(), CallState::AwaitingBackend);
        assert_eq!(machine.transcript().len(), 2);
    }

    #[test]
    fn test_missing_audio_uses_speech_synthesis() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        let effects = machine.handle(greeting(None));
        assert!(effects.contains(&Effect::Speak {
            turn: machine.turn(),
            text: "Bonjour, quel est votre matricule ?".into()
        }));
    }

    #[test]
    fn test_playback_failure_falls_back_to_speech_once() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(Some("/a.mp3")));
        let turn = machine.turn();

        let effects = machine.handle(CallEvent::PlaybackFailed {
            turn,
            reason: "decode".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::Speak {
                turn,
                text: "Bonjour, quel est votre matricule ?".into()
            }]
        );
        // A second failure report for the same prompt is not a second fallback.
        assert!(
            machine
                .handle(CallEvent::PlaybackFailed {
                    turn,
                    reason: "again".into()
                })
                .is_empty()
        );

        let effects = machine.handle(CallEvent::SpeechFailed {
            turn,
            reason: "no voice".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::OpenMicrophone {
                turn,
                window: Some(RECORDING_WINDOW),
                delay: SPEECH_FAILURE_GRACE
            }]
        );
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(Some("/a.mp3")));
        let first = machine.turn();

        // A new prompt arrives before the first finished playing.
        let effects = machine.handle(response("Où était-ce ?", false));
        assert!(effects.contains(&Effect::StopPlayback));
        let second = machine.turn();
        assert!(second > first);

        assert!(machine.handle(CallEvent::PlaybackFinished(first)).is_empty());
        assert_eq!(machine.state(), CallState::PlayingPrompt);

        assert!(!machine.handle(CallEvent::SpeechFinished(second)).is_empty());
        assert_eq!(machine.state(), CallState::Recording);
    }

    #[test]
    fn test_new_prompt_stops_recording() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(None));
        let turn = machine.turn();
        machine.handle(CallEvent::SpeechFinished(turn));

        let effects = machine.handle(response("Pardon, je reprends.", false));
        assert!(effects.contains(&Effect::StopRecording { turn }));
        assert!(
            machine
                .handle(CallEvent::RecordingCaptured {
                    turn,
                    audio: vec![1]
                })
                .is_empty()
        );
    }

    #[test]
    fn test_backend_stop_signal() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(None));
        let turn = machine.turn();
        machine.handle(CallEvent::SpeechFinished(turn));

        let effects = machine.handle(CallEvent::FrameReceived(InboundFrame::StopRecording));
        assert_eq!(effects, vec![Effect::StopRecording { turn }]);
    }

    #[test]
    fn test_message_mode_does_not_auto_record() {
        let mut machine = CallMachine::new(CallMode::Message, BASE);
        machine.handle(greeting(Some("/a.mp3")));
        let effects = machine.handle(CallEvent::PlaybackFinished(machine.turn()));
        assert!(effects.is_empty());
        assert_eq!(machine.state(), CallState::Idle);

        assert!(machine.handle(CallEvent::UserText("   ".into())).is_empty());

        let effects = machine.handle(CallEvent::UserText("J'ai eu un accrochage".into()));
        assert_eq!(
            sends(&effects),
            vec![&OutboundFrame::user_text("J'ai eu un accrochage")]
        );
        assert_eq!(machine.state(), CallState::AwaitingBackend);
    }

    #[test]
    fn test_manual_recording_has_no_window() {
        let mut machine = CallMachine::new(CallMode::Message, BASE);
        machine.handle(greeting(None));

        let effects = machine.handle(CallEvent::StartRecording);
        let turn = machine.turn();
        assert!(effects.contains(&Effect::OpenMicrophone {
            turn,
            window: None,
            delay: Duration::ZERO
        }));

        // Typing while a capture runs is refused.
        let effects = machine.handle(CallEvent::UserText("texte".into()));
        assert!(sends(&effects).is_empty());

        assert_eq!(
            machine.handle(CallEvent::StopRecording),
            vec![Effect::StopRecording { turn }]
        );
    }

    #[test]
    fn test_transcription_failure_aborts_turn() {
        let mut machine = CallMachine::new(CallMode::Message, BASE);
        machine.handle(CallEvent::AudioSubmitted(vec![0, 1, 2]));
        let turn = machine.turn();
        assert_eq!(machine.state(), CallState::AwaitingTranscription);

        let effects = machine.handle(CallEvent::TranscriptionFailed {
            turn,
            reason: "HTTP 500".into(),
        });
        assert!(matches!(&effects[..], [Effect::Notify(Notice::Alert(_))]));
        assert_eq!(machine.state(), CallState::Idle);
    }

    #[test]
    fn test_completion_hangs_up_once_summary_is_spoken() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(None));

        let effects = machine.handle(response("Votre déclaration est enregistrée.", true));
        assert_eq!(machine.phase(), Phase::Summary);
        assert!(effects.contains(&Effect::Notify(Notice::Completed)));
        assert!(sends(&effects).is_empty());
        assert!(!effects.contains(&Effect::CloseSocket));
        assert_eq!(machine.state(), CallState::PlayingPrompt);

        let effects = machine.handle(CallEvent::SpeechFinished(machine.turn()));
        assert_eq!(effects[0], Effect::Send(OutboundFrame::Close));
        assert!(effects.contains(&Effect::CloseSocket));
        assert!(!effects.iter().any(|e| matches!(e, Effect::OpenMicrophone { .. })));
        assert!(machine.is_ended());
    }

    #[test]
    fn test_completion_in_message_mode_keeps_socket_open() {
        let mut machine = CallMachine::new(CallMode::Message, BASE);
        machine.handle(greeting(None));
        machine.handle(response("Votre déclaration est enregistrée.", true));

        let effects = machine.handle(CallEvent::SpeechFinished(machine.turn()));
        assert!(effects.is_empty());
        assert_eq!(machine.state(), CallState::Idle);
        assert!(!machine.is_ended());
    }

    #[test]
    fn test_end_call_releases_everything() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        machine.handle(greeting(None));
        let turn = machine.turn();
        machine.handle(CallEvent::SpeechFinished(turn));

        let effects = machine.handle(CallEvent::EndCall);
        assert_eq!(effects[0], Effect::Send(OutboundFrame::Close));
        assert!(effects.contains(&Effect::CloseSocket));
        assert!(effects.contains(&Effect::CancelSpeech));
        assert!(effects.contains(&Effect::StopRecording { turn }));
        assert!(machine.is_ended());

        assert!(machine.handle(response("trop tard", false)).is_empty());
        assert!(machine.handle(CallEvent::EndCall).is_empty());
    }

    #[test]
    fn test_microphone_denied_ends_before_start() {
        let mut machine = CallMachine::new(CallMode::FullCall, BASE);
        let effects = machine.handle(CallEvent::MicrophoneDenied("NotAllowedError".into()));
        assert!(matches!(effects[0], Effect::Notify(Notice::Alert(_))));
        assert!(machine.is_ended());
        assert_eq!(machine.phase(), Phase::Welcome);
    }
}
