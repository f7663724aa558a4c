use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use sinistres_core::models::{
    Client, ClientDraft, Conseiller, Contrat, ContratDraft, Escalade, EscaladeDraft,
    EscaladeQueue, QueuedEscalade, QueuedSinistre, Remboursement, RemboursementDraft, Sinistre,
    SinistreDraft, StatusDossier, TypeTraitement,
};

use crate::AppState;
use crate::analytics::estimate_cci;
use crate::store::{new_id, now_iso};

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": message })))
}

pub(crate) fn not_found_error(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": message })))
}

fn conflict_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "detail": message })))
}

fn deleted(message: &str) -> ApiResult<Value> {
    Ok(Json(json!({ "message": message })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{key}",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/contrats", get(list_contrats).post(create_contrat))
        .route(
            "/contrats/{id}",
            get(get_contrat).put(update_contrat).delete(delete_contrat),
        )
        .route("/sinistres", get(list_sinistres).post(create_sinistre))
        .route(
            "/sinistres/{id}",
            get(get_sinistre).put(update_sinistre).delete(delete_sinistre),
        )
        .route("/escalades", get(list_escalades).post(create_escalade))
        .route("/escalades/queue", get(escalade_queue))
        .route(
            "/escalades/{id}",
            get(get_escalade).put(update_escalade).delete(delete_escalade),
        )
        .route(
            "/remboursements",
            get(list_remboursements).post(create_remboursement),
        )
        .route(
            "/remboursements/{id}",
            get(get_remboursement)
                .put(update_remboursement)
                .delete(delete_remboursement),
        )
        .route("/conseillers", get(list_conseillers))
        .route("/conseillers/{id}", get(get_conseiller))
}

// Clients

async fn list_clients(State(state): State<AppState>) -> Json<Vec<Client>> {
    Json(state.store.clients.list())
}

/// Looks the key up as an id first, then as a matricule.
async fn get_client(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Client> {
    state
        .store
        .clients
        .get(&key)
        .or_else(|| state.store.client_by_matricule(&key))
        .map(Json)
        .ok_or_else(|| not_found_error(&format!("Client {key} non trouvé")))
}

async fn create_client(
    State(state): State<AppState>,
    Json(draft): Json<ClientDraft>,
) -> ApiResult<Client> {
    if draft.matricule.trim().is_empty() {
        return Err(bad_request_error("matricule requis"));
    }
    let id = new_id();
    let client = Client {
        id: id.clone(),
        matricule: draft.matricule,
        nom: draft.nom,
        prenom: draft.prenom,
        email: Some(draft.email),
        telephone: Some(draft.telephone),
        adresse: draft.adresse,
        civilite: draft.civilite,
        date_naissance: None,
        ville: draft.ville,
        code_postal: draft.code_postal,
        statut: Some("actif".to_string()),
        date_creation: Some(now_iso()),
    };
    if state.store.add_client(client.clone()).is_err() {
        warn!(matricule = %client.matricule, "duplicate matricule");
        return Err(conflict_error("Matricule déjà existant"));
    }
    info!(resource = "clients", id = %id, "created");
    Ok(Json(client))
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<ClientDraft>,
) -> ApiResult<Client> {
    if state.store.rename_matricule(&id, &draft.matricule).is_err() {
        warn!(matricule = %draft.matricule, "duplicate matricule");
        return Err(conflict_error("Matricule déjà existant"));
    }
    state
        .store
        .clients
        .update(&id, |client| {
            client.matricule = draft.matricule;
            client.nom = draft.nom;
            client.prenom = draft.prenom;
            client.email = Some(draft.email);
            client.telephone = Some(draft.telephone);
            client.adresse = draft.adresse;
            client.civilite = draft.civilite;
            client.ville = draft.ville;
            client.code_postal = draft.code_postal;
        })
        .map(Json)
        .ok_or_else(|| not_found_error("Client non trouvé"))
}

async fn delete_client(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let client = state
        .store
        .remove_client(&id)
        .ok_or_else(|| not_found_error("Client non trouvé"))?;
    info!(resource = "clients", id = %id, "deleted");
    deleted(&format!("Client {} supprimé", client.matricule))
}

// Contrats

async fn list_contrats(State(state): State<AppState>) -> Json<Vec<Contrat>> {
    let store = &state.store;
    Json(
        store
            .contrats
            .list()
            .into_iter()
            .map(|c| store.joined_contrat(c))
            .collect(),
    )
}

async fn get_contrat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Contrat> {
    state
        .store
        .contrats
        .get(&id)
        .map(|c| Json(state.store.joined_contrat(c)))
        .ok_or_else(|| not_found_error("Contrat non trouvé"))
}

fn require_client(state: &AppState, client_id: &str) -> Result<Client, ApiError> {
    if client_id.trim().is_empty() {
        return Err(bad_request_error("client_id requis"));
    }
    state
        .store
        .clients
        .get(client_id)
        .ok_or_else(|| not_found_error("Client non trouvé"))
}

fn apply_contrat(contrat: &mut Contrat, draft: ContratDraft) {
    contrat.numero_contrat = draft.numero_contrat;
    contrat.type_assurance = draft.type_assurance;
    contrat.date_debut = Some(draft.date_debut).filter(|d| !d.is_empty());
    contrat.date_fin = draft.date_fin;
    contrat.statut = Some(draft.statut);
    contrat.garantie_collision = draft.garantie_collision;
    contrat.garantie_vol = draft.garantie_vol;
    contrat.garantie_incendie = draft.garantie_incendie;
    contrat.garantie_responsabilite = draft.garantie_responsabilite;
    contrat.garantie_assistance = draft.garantie_assistance;
    contrat.franchise_collision = draft.franchise_collision;
    contrat.franchise_vol = draft.franchise_vol;
    contrat.franchise_incendie = draft.franchise_incendie;
    contrat.limite_responsabilite = draft.limite_responsabilite;
    contrat.limite_collision = draft.limite_collision;
    contrat.limite_vol = draft.limite_vol;
}

async fn create_contrat(
    State(state): State<AppState>,
    Json(draft): Json<ContratDraft>,
) -> ApiResult<Contrat> {
    let client = require_client(&state, &draft.client_id)?;
    let id = new_id();
    let mut contrat = Contrat {
        id: id.clone(),
        client_id: client.id,
        numero_contrat: String::new(),
        type_assurance: String::new(),
        date_debut: None,
        date_fin: None,
        statut: None,
        garantie_collision: false,
        garantie_vol: false,
        garantie_incendie: false,
        garantie_responsabilite: false,
        garantie_assistance: false,
        franchise_collision: 0.0,
        franchise_vol: 0.0,
        franchise_incendie: 0.0,
        limite_responsabilite: 0.0,
        limite_collision: 0.0,
        limite_vol: 0.0,
        client: None,
    };
    apply_contrat(&mut contrat, draft);
    if contrat.date_debut.is_none() {
        contrat.date_debut = Some(chrono::Utc::now().date_naive().to_string());
    }
    state.store.contrats.insert(id.clone(), contrat.clone());
    info!(resource = "contrats", id = %id, "created");
    Ok(Json(state.store.joined_contrat(contrat)))
}

async fn update_contrat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<ContratDraft>,
) -> ApiResult<Contrat> {
    if !draft.client_id.trim().is_empty() {
        require_client(&state, &draft.client_id)?;
    }
    state
        .store
        .contrats
        .update(&id, |contrat| {
            if !draft.client_id.trim().is_empty() {
                contrat.client_id = draft.client_id.clone();
            }
            apply_contrat(contrat, draft)
        })
        .map(|c| Json(state.store.joined_contrat(c)))
        .ok_or_else(|| not_found_error("Contrat non trouvé"))
}

async fn delete_contrat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state
        .store
        .contrats
        .remove(&id)
        .ok_or_else(|| not_found_error("Contrat non trouvé"))?;
    deleted("Contrat supprimé")
}

// Sinistres

async fn list_sinistres(State(state): State<AppState>) -> Json<Vec<Sinistre>> {
    let store = &state.store;
    Json(
        store
            .sinistres
            .list()
            .into_iter()
            .map(|s| store.joined_sinistre(s))
            .collect(),
    )
}

async fn get_sinistre(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sinistre> {
    state
        .store
        .sinistres
        .get(&id)
        .map(|s| Json(state.store.joined_sinistre(s)))
        .ok_or_else(|| not_found_error("Sinistre non trouvé"))
}

/// Claim number used when the form leaves it empty.
pub(crate) fn generated_numero() -> String {
    format!("SINS-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
}

/// Stores a new claim for `draft`, filling the backend-generated fields.
pub(crate) fn insert_sinistre(state: &AppState, draft: SinistreDraft) -> Sinistre {
    let id = new_id();
    let cci_score = draft.cci_score.unwrap_or_else(|| estimate_cci(&draft));
    let date_sinistre = Some(draft.date_sinistre)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| chrono::Utc::now().date_naive().to_string());
    let sinistre = Sinistre {
        id: id.clone(),
        client_id: draft.client_id,
        numero_sinistre: draft
            .numero_sinistre
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(generated_numero),
        type_sinistre: draft.type_sinistre,
        date_sinistre: Some(date_sinistre),
        lieu_sinistre: Some(draft.lieu_sinistre).filter(|l| !l.is_empty()),
        description: Some(draft.description),
        cci_score: Some(cci_score),
        status_dossier: draft.status_dossier.unwrap_or(StatusDossier::Nouveau),
        type_traitement: Some(draft.type_traitement.unwrap_or(TypeTraitement::Autonome)),
        documents_complets: Some(draft.documents_complets),
        tiers_implique: Some(draft.tiers_implique),
        tiers_nom: draft.tiers_nom,
        date_creation: Some(now_iso()),
        client: None,
    };
    state.store.sinistres.insert(id.clone(), sinistre.clone());
    info!(resource = "sinistres", id = %id, numero = %sinistre.numero_sinistre, cci_score, "created");
    state.store.joined_sinistre(sinistre)
}

async fn create_sinistre(
    State(state): State<AppState>,
    Json(draft): Json<SinistreDraft>,
) -> ApiResult<Sinistre> {
    require_client(&state, &draft.client_id)?;
    Ok(Json(insert_sinistre(&state, draft)))
}

async fn update_sinistre(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<SinistreDraft>,
) -> ApiResult<Sinistre> {
    state
        .store
        .sinistres
        .update(&id, |s| {
            s.type_sinistre = draft.type_sinistre;
            if !draft.date_sinistre.is_empty() {
                s.date_sinistre = Some(draft.date_sinistre);
            }
            s.lieu_sinistre = Some(draft.lieu_sinistre);
            s.description = Some(draft.description);
            if let Some(cci) = draft.cci_score {
                s.cci_score = Some(cci);
            }
            if let Some(status) = draft.status_dossier {
                s.status_dossier = status;
            }
            if let Some(traitement) = draft.type_traitement {
                s.type_traitement = Some(traitement);
            }
            s.tiers_implique = Some(draft.tiers_implique);
            s.tiers_nom = draft.tiers_nom;
            s.documents_complets = Some(draft.documents_complets);
        })
        .map(|s| Json(state.store.joined_sinistre(s)))
        .ok_or_else(|| not_found_error("Sinistre non trouvé"))
}

async fn delete_sinistre(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state
        .store
        .remove_sinistre(&id)
        .ok_or_else(|| not_found_error("Sinistre non trouvé"))?;
    info!(resource = "sinistres", id = %id, "deleted");
    deleted("Sinistre supprimé")
}

fn require_sinistre(state: &AppState, sinistre_id: &str) -> Result<Sinistre, ApiError> {
    if sinistre_id.trim().is_empty() {
        return Err(bad_request_error("sinistre_id requis"));
    }
    state
        .store
        .sinistres
        .get(sinistre_id)
        .ok_or_else(|| not_found_error("Sinistre non trouvé"))
}

// Escalades

async fn list_escalades(State(state): State<AppState>) -> Json<Vec<Escalade>> {
    let store = &state.store;
    Json(
        store
            .escalades
            .list()
            .into_iter()
            .map(|e| store.joined_escalade(e))
            .collect(),
    )
}

async fn get_escalade(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Escalade> {
    state
        .store
        .escalades
        .get(&id)
        .map(|e| Json(state.store.joined_escalade(e)))
        .ok_or_else(|| not_found_error("Escalade non trouvée"))
}

async fn create_escalade(
    State(state): State<AppState>,
    Json(draft): Json<EscaladeDraft>,
) -> ApiResult<Escalade> {
    let sinistre = require_sinistre(&state, &draft.sinistre_id)?;
    let id = new_id();
    let escalade = Escalade {
        id: id.clone(),
        sinistre_id: sinistre.id,
        conseiller_id: draft.conseiller_id.filter(|c| !c.is_empty()),
        raison_escalade: Some(draft.raison_escalade),
        cci_score_trigger: Some(draft.cci_score_trigger),
        status: draft.status,
        date_escalade: Some(now_iso()),
        date_transfert: None,
        date_completion: None,
        sinistre: None,
        conseiller: None,
    };
    state.store.escalades.insert(id.clone(), escalade.clone());
    info!(resource = "escalades", id = %id, "created");
    Ok(Json(state.store.joined_escalade(escalade)))
}

async fn update_escalade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<EscaladeDraft>,
) -> ApiResult<Escalade> {
    state
        .store
        .escalades
        .update(&id, |e| {
            e.conseiller_id = draft.conseiller_id.filter(|c| !c.is_empty());
            e.raison_escalade = Some(draft.raison_escalade);
            e.cci_score_trigger = Some(draft.cci_score_trigger);
            e.status = draft.status;
        })
        .map(|e| Json(state.store.joined_escalade(e)))
        .ok_or_else(|| not_found_error("Escalade non trouvée"))
}

async fn delete_escalade(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state
        .store
        .escalades
        .remove(&id)
        .ok_or_else(|| not_found_error("Escalade non trouvée"))?;
    deleted("Escalade supprimée")
}

async fn escalade_queue(State(state): State<AppState>) -> Json<EscaladeQueue> {
    let store = &state.store;
    let items: Vec<QueuedEscalade> = store
        .escalades
        .list()
        .into_iter()
        .filter(|e| e.status == "en_attente")
        .map(|e| {
            let sinistre = store.sinistres.get(&e.sinistre_id);
            QueuedEscalade {
                escalade_id: e.id,
                status: e.status,
                raison: e.raison_escalade,
                cci_score: e.cci_score_trigger,
                date_escalade: e.date_escalade,
                client: sinistre
                    .as_ref()
                    .and_then(|s| store.client_summary(&s.client_id)),
                sinistre: Some(QueuedSinistre {
                    id: sinistre.as_ref().map(|s| s.id.clone()),
                    numero: sinistre.as_ref().map(|s| s.numero_sinistre.clone()),
                    kind: sinistre.as_ref().map(|s| s.type_sinistre.to_string()),
                    status: sinistre.as_ref().map(|s| s.status_dossier.to_string()),
                }),
                conseiller: store.conseiller_summary(e.conseiller_id.as_deref()),
            }
        })
        .collect();
    Json(EscaladeQueue {
        count: items.len() as u64,
        items,
    })
}

// Remboursements

async fn list_remboursements(State(state): State<AppState>) -> Json<Vec<Remboursement>> {
    let store = &state.store;
    Json(
        store
            .remboursements
            .list()
            .into_iter()
            .map(|r| store.joined_remboursement(r))
            .collect(),
    )
}

async fn get_remboursement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Remboursement> {
    state
        .store
        .remboursements
        .get(&id)
        .map(|r| Json(state.store.joined_remboursement(r)))
        .ok_or_else(|| not_found_error("Remboursement non trouvé"))
}

fn apply_remboursement(r: &mut Remboursement, draft: RemboursementDraft) {
    r.montant_reclame = draft.montant_reclame;
    r.montant_accepte = draft.montant_accepte;
    r.franchise = draft.franchise;
    r.montant_net = draft.montant_net;
    r.status = draft.status;
    r.motif_rejet = draft.motif_rejet;
    r.date_paiement = draft.date_paiement;
    r.reference_paiement = draft.reference_paiement;
}

async fn create_remboursement(
    State(state): State<AppState>,
    Json(draft): Json<RemboursementDraft>,
) -> ApiResult<Remboursement> {
    let sinistre = require_sinistre(&state, &draft.sinistre_id)?;
    let id = new_id();
    let mut remboursement = Remboursement {
        id: id.clone(),
        sinistre_id: sinistre.id,
        montant_reclame: 0.0,
        montant_accepte: None,
        franchise: None,
        montant_net: None,
        status: draft.status.clone(),
        motif_rejet: None,
        date_paiement: None,
        reference_paiement: None,
        sinistre: None,
    };
    apply_remboursement(&mut remboursement, draft);
    state
        .store
        .remboursements
        .insert(id.clone(), remboursement.clone());
    info!(resource = "remboursements", id = %id, "created");
    Ok(Json(state.store.joined_remboursement(remboursement)))
}

async fn update_remboursement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<RemboursementDraft>,
) -> ApiResult<Remboursement> {
    state
        .store
        .remboursements
        .update(&id, |r| apply_remboursement(r, draft))
        .map(|r| Json(state.store.joined_remboursement(r)))
        .ok_or_else(|| not_found_error("Remboursement non trouvé"))
}

async fn delete_remboursement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    state
        .store
        .remboursements
        .remove(&id)
        .ok_or_else(|| not_found_error("Remboursement non trouvé"))?;
    deleted("Remboursement supprimé")
}

// Conseillers

async fn list_conseillers(State(state): State<AppState>) -> Json<Vec<Conseiller>> {
    Json(state.store.conseillers.list())
}

async fn get_conseiller(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Conseiller> {
    state
        .store
        .conseillers
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Conseiller non trouvé"))
}
