pub mod analysis;
pub mod analytics;
pub mod call;
pub mod conversation;
pub mod error;
pub mod frames;
pub mod models;
pub mod outbox;
pub mod search;

// Re-export commonly used types
pub use analysis::{Analysis, Emotion, EmotionalScore, SentenceKind, analyze, emotional_score};
pub use call::{CallEvent, CallMachine, CallMode, CallState, Effect, Notice, Phase, Turn};
pub use conversation::{ConversationMessage, Speaker, Transcript};
pub use error::{CoreError, Result};
pub use frames::{InboundFrame, OutboundFrame, ResponseFrame};
pub use models::{
    Client, ClientDraft, Conseiller, Contrat, ContratDraft, Escalade, EscaladeDraft,
    Remboursement, RemboursementDraft, Resource, Sinistre, SinistreDraft,
};
pub use outbox::Outbox;
pub use search::{Searchable, filter};
