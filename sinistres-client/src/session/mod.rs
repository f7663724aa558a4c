//! Conversational claim filing over the backend WebSocket.

mod controller;
pub mod media;
pub mod transport;

pub use controller::{Call, CallHandle, CallServices, start_call};
pub use media::{ClipMicrophone, FetchPlayback, Microphone, Playback, SilentSpeech, SpeechSynth};
pub use transport::{Connector, FrameSink, FrameStream, WsConnector};
