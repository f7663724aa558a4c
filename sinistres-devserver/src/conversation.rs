//! Transcription stub and the scripted claim-filing conversation socket.

use axum::{
    Router,
    extract::{
        Multipart, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};

use sinistres_core::models::{Client, SinistreDraft, TypeSinistre};

use crate::AppState;
use crate::rest::{ApiResult, bad_request_error, insert_sinistre};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/transcribe", post(transcribe))
        .route("/ws/conversation/{session_id}", get(ws_handler))
}

/// Returns the uploaded `file` part as UTF-8 text.
async fn transcribe(mut multipart: Multipart) -> ApiResult<Value> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&e.to_string()))?;
        let transcript = String::from_utf8_lossy(&bytes).trim().to_string();
        debug!(bytes = bytes.len(), "transcription requested");

        if transcript.is_empty() {
            return Ok(Json(json!({
                "success": false,
                "transcript": "",
                "error": "Aucune parole détectée",
            })));
        }
        return Ok(Json(json!({
            "success": true,
            "transcript": transcript,
            "language": "fr",
            "confidence": 1.0,
        })));
    }
    Err(bad_request_error("fichier audio manquant"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Authentification,
    Confirmation,
    Description,
    Termine,
}

impl Step {
    fn phase(&self) -> &'static str {
        match self {
            Step::Authentification => "AUTHENTIFICATION",
            Step::Confirmation => "CONFIRMATION",
            Step::Description => "DESCRIPTION",
            Step::Termine => "TERMINE",
        }
    }
}

#[derive(Debug, PartialEq)]
enum Incoming {
    Text(String),
    Close,
    Ignored,
}

/// Accepts `{"type":"user_text","text":…}`, `{"type":"close"}`, `{"text":…}` or raw text.
fn parse_incoming(raw: &str) -> Incoming {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(frame)) => {
            if frame.get("type").and_then(Value::as_str) == Some("close") {
                return Incoming::Close;
            }
            match frame.get("text").and_then(Value::as_str) {
                Some(text) => Incoming::Text(text.to_string()),
                None => Incoming::Ignored,
            }
        }
        Ok(Value::String(text)) => Incoming::Text(text),
        Ok(_) => Incoming::Ignored,
        Err(_) => Incoming::Text(raw.to_string()),
    }
}

const POSITIVE: &[&str] = &[
    "oui",
    "yes",
    "ouais",
    "ok",
    "oui c est moi",
    "oui c est bien moi",
    "c est moi",
    "c est bien moi",
    "c est exact",
    "c est correct",
    "exact",
    "exactement",
    "tout a fait",
    "oui je confirme",
    "je confirme",
    "oui c est bien mon contrat",
    "vous avez la bonne personne",
    "oui vous avez la bonne personne",
    // Darija as transcribed
    "iyah",
    "iyah ana",
    "iyah ana howa",
    "iyah hadchi howa",
    "ana",
    "ana howa",
    "ana li",
    "mzyan",
    "sahih",
    "wakha",
    "na3am",
];
const NEGATIVE: &[&str] = &[
    "non",
    "pas moi",
    "ce n est pas moi",
    "c est pas moi",
    "vous n avez pas la bonne personne",
    "mauvaise personne",
    "erreur",
    // Darija as transcribed
    "la",
    "la machi ana",
    "machi ana",
    "mashi ana",
    "ghalat",
];

/// Lowercase, apostrophes and punctuation folded to single spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn guess_type(description: &str) -> TypeSinistre {
    let text = description.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
    if has(&["vol", "volé", "cambriol", "disparu"]) {
        TypeSinistre::Vol
    } else if has(&["incendie", "feu", "brûl"]) {
        TypeSinistre::Incendie
    } else if has(&["blessé", "blessure", "hôpital"]) {
        TypeSinistre::Blessure
    } else if has(&["collision", "accident", "accroch", "percut", "choc"]) {
        TypeSinistre::Collision
    } else if has(&["dégât", "fuite", "inondation"]) {
        TypeSinistre::Degats
    } else {
        TypeSinistre::Autre
    }
}

/// One caller's walk through matricule, identity confirmation and description.
pub struct Dialogue {
    claim_id: String,
    step: Step,
    client: Option<Client>,
}

impl Default for Dialogue {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialogue {
    pub fn new() -> Self {
        Self {
            claim_id: format!("CLM-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S")),
            step: Step::Authentification,
            client: None,
        }
    }

    pub fn claim_id(&self) -> &str {
        &self.claim_id
    }

    pub fn is_finished(&self) -> bool {
        self.step == Step::Termine
    }

    pub fn greeting(&self) -> Value {
        json!({
            "type": "greeting",
            "claim_id": self.claim_id,
            "message": "Assistant sinistre, Bonjour! Pouvez-vous me donner votre numéro de matricule?",
            "phase": self.step.phase(),
        })
    }

    fn respond(&self, message: &str) -> Value {
        json!({
            "type": "response",
            "message": message,
            "phase": self.step.phase(),
            "completed": false,
        })
    }

    pub fn reply(&mut self, state: &AppState, text: &str) -> Value {
        let text = text.trim();
        match self.step {
            Step::Authentification => match state.store.client_by_matricule(text) {
                Some(client) => {
                    self.step = Step::Confirmation;
                    let message =
                        format!("Merci! Vous êtes bien {} {}?", client.nom, client.prenom);
                    info!(matricule = %client.matricule, "caller identified");
                    self.client = Some(client);
                    self.respond(&message)
                }
                None => self.respond(
                    "Je n'ai pas trouvé ce numéro de matricule. Pouvez-vous vérifier et réessayer?",
                ),
            },
            Step::Confirmation => {
                let answer = normalize(text);
                if POSITIVE.contains(&answer.as_str()) {
                    self.step = Step::Description;
                    self.respond("Parfait! Pouvez-vous m'expliquer brièvement ce qui s'est passé?")
                } else if NEGATIVE.contains(&answer.as_str()) {
                    self.step = Step::Authentification;
                    self.client = None;
                    self.respond("D'accord, recommençons. Quel est votre numéro de matricule?")
                } else {
                    self.respond("Je n'ai pas bien compris. Pouvez-vous confirmer si c'est bien vous?")
                }
            }
            Step::Description => {
                let Some(client) = self.client.clone() else {
                    self.step = Step::Authentification;
                    return self.respond("Quel est votre numéro de matricule?");
                };
                if text.is_empty() {
                    return self.respond("Pouvez-vous décrire ce qui s'est passé?");
                }
                let sinistre = insert_sinistre(
                    state,
                    SinistreDraft {
                        client_id: client.id,
                        numero_sinistre: None,
                        type_sinistre: guess_type(text),
                        date_sinistre: String::new(),
                        lieu_sinistre: String::new(),
                        description: text.to_string(),
                        status_dossier: None,
                        type_traitement: None,
                        cci_score: None,
                        tiers_implique: false,
                        tiers_nom: None,
                        documents_complets: false,
                    },
                );
                self.step = Step::Termine;
                info!(claim_id = %self.claim_id, numero = %sinistre.numero_sinistre, "claim filed");
                json!({
                    "type": "response",
                    "acknowledge": "Merci pour ces informations.",
                    "summary": format!(
                        "Votre dossier {} ({}) est enregistré.",
                        sinistre.numero_sinistre, sinistre.type_sinistre
                    ),
                    "next_question": "Un conseiller vous contactera si nécessaire. Au revoir!",
                    "phase": self.step.phase(),
                    "completed": true,
                })
            }
            Step::Termine => self.respond("Votre déclaration est déjà enregistrée."),
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let span = info_span!("conversation", session_id = %session_id);
        handle_socket(socket, state).instrument(span)
    })
}

async fn send_json(socket: &mut WebSocket, frame: &Value) -> bool {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut dialogue = Dialogue::new();
    info!(claim_id = %dialogue.claim_id(), "conversation opened");
    if !send_json(&mut socket, &dialogue.greeting()).await {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let raw = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        match parse_incoming(&raw) {
            Incoming::Close => {
                debug!("client closed the conversation");
                break;
            }
            Incoming::Ignored => warn!(frame = %raw, "ignored frame"),
            Incoming::Text(text) => {
                let reply = dialogue.reply(&state, &text);
                if !send_json(&mut socket, &reply).await {
                    break;
                }
            }
        }
    }

    if let Err(e) = socket.send(Message::Close(None)).await {
        debug!(error = %e, "close frame not delivered");
    }
    info!(finished = dialogue.is_finished(), "conversation closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn state() -> AppState {
        AppState {
            store: Store::seeded(),
        }
    }

    #[test]
    fn test_parse_incoming() {
        assert_eq!(
            parse_incoming(r#"{"type":"user_text","text":"AB-4521-22"}"#),
            Incoming::Text("AB-4521-22".into())
        );
        assert_eq!(parse_incoming(r#"{"type":"close"}"#), Incoming::Close);
        assert_eq!(parse_incoming("bonjour"), Incoming::Text("bonjour".into()));
        assert_eq!(parse_incoming(r#"{"type":"ping"}"#), Incoming::Ignored);
    }

    #[test]
    fn test_dialogue_files_a_claim() {
        let state = state();
        let before = state.store.sinistres.len();
        let mut dialogue = Dialogue::new();
        assert_eq!(dialogue.greeting()["type"], "greeting");
        assert!(dialogue.claim_id().starts_with("CLM-"));

        let reply = dialogue.reply(&state, "XX-0000-00");
        assert_eq!(reply["phase"], "AUTHENTIFICATION");

        let reply = dialogue.reply(&state, "ab-4521-22");
        assert_eq!(reply["message"], "Merci! Vous êtes bien Dupont Jean?");

        let reply = dialogue.reply(&state, "Peut-être");
        assert_eq!(reply["phase"], "CONFIRMATION");

        let reply = dialogue.reply(&state, "Oui, c'est moi");
        assert_eq!(reply["phase"], "DESCRIPTION");

        let reply = dialogue.reply(&state, "On m'a volé mon scooter devant chez moi.");
        assert_eq!(reply["completed"], true);
        assert!(dialogue.is_finished());
        assert_eq!(state.store.sinistres.len(), before + 1);

        let filed = state.store.sinistres.list().remove(0);
        assert_eq!(filed.type_sinistre, TypeSinistre::Vol);
        assert!(filed.numero_sinistre.starts_with("SINS-"));
    }

    #[test]
    fn test_denied_identity_restarts() {
        let state = state();
        let mut dialogue = Dialogue::new();
        dialogue.reply(&state, "FC-7834-19");
        let reply = dialogue.reply(&state, "non");
        assert_eq!(reply["phase"], "AUTHENTIFICATION");
    }

    #[test]
    fn test_confirmation_variants() {
        let state = state();
        for answer in ["je confirme", "Ouais!", "C'est exact.", "iyah", "sahih"] {
            let mut dialogue = Dialogue::new();
            dialogue.reply(&state, "AB-4521-22");
            let reply = dialogue.reply(&state, answer);
            assert_eq!(reply["phase"], "DESCRIPTION", "{answer}");
        }
        for answer in ["la", "mashi ana", "ghalat", "Mauvaise personne"] {
            let mut dialogue = Dialogue::new();
            dialogue.reply(&state, "AB-4521-22");
            let reply = dialogue.reply(&state, answer);
            assert_eq!(reply["phase"], "AUTHENTIFICATION", "{answer}");
        }
    }
}
