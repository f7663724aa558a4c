//! In-memory stand-in for the sinistres backend: REST CRUD under `/api/v1`,
//! the analytics and emotion dashboards, the transcription stub and the
//! scripted conversation socket.

pub mod analytics;
pub mod conversation;
pub mod rest;
pub mod store;
pub mod telemetry;

use axum::{Router, middleware::from_fn, response::Json, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use store::Store;
pub use telemetry::init_tracing;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Router over a freshly seeded store.
pub fn create_app() -> Router {
    build_router(AppState {
        store: Store::seeded(),
    })
}

/// Serves a freshly seeded backend on `listener` until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener) -> std::io::Result<()> {
    axum::serve(listener, create_app()).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", rest::routes().merge(analytics::routes()))
        .merge(conversation::routes())
        .layer(from_fn(telemetry::correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "sinistres-devserver",
        "endpoints": {
            "GET /health": "Health check",
            "/api/v1/{clients,contrats,sinistres,escalades,remboursements}": "CRUD",
            "GET /api/v1/escalades/queue": "Pending escalations",
            "GET /api/v1/analytics/overview": "Dashboard aggregates",
            "POST /api/transcribe": "Speech to text",
            "GET /ws/conversation/{session_id}": "Conversation socket"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sinistres_core::models::{Client, EscaladeQueue, Sinistre};
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn client_payload(matricule: &str) -> Value {
        json!({
            "matricule": matricule,
            "nom": "Alaoui",
            "prenom": "Yassine",
            "email": "yassine@mail.example",
            "telephone": "0611111111"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(create_app(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_correlation_id_is_echoed() {
        let request = Request::builder()
            .uri("/health")
            .header("x-correlation-id", "call-42")
            .body(Body::empty())
            .unwrap();
        let response = create_app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-correlation-id"], "call-42");

        let response = create_app().oneshot(get_req("/health")).await.unwrap();
        let minted = response.headers()["x-correlation-id"].to_str().unwrap();
        assert_eq!(minted.len(), 36);
    }

    #[tokio::test]
    async fn test_client_crud() {
        let app = create_app();

        let (status, created) = call(
            app.clone(),
            json_req("POST", "/api/v1/clients", client_payload("GH-1000-01")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, listed) = call(app.clone(), get_req("/api/v1/clients")).await;
        let clients: Vec<Client> = serde_json::from_value(listed).unwrap();
        assert_eq!(clients[0].matricule, "GH-1000-01");

        let (status, by_matricule) = call(app.clone(), get_req("/api/v1/clients/gh-1000-01")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_matricule["id"], id.as_str());

        let (status, body) = call(
            app.clone(),
            json_req("POST", "/api/v1/clients", client_payload("GH-1000-01")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["detail"], "Matricule déjà existant");

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/clients/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app.clone(), delete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Client GH-1000-01 supprimé");

        let (status, _) = call(app, get_req(&format!("/api/v1/clients/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sinistre_create_defaults() {
        let app = create_app();
        let (_, listed) = call(app.clone(), get_req("/api/v1/clients")).await;
        let client_id = listed[0]["id"].as_str().unwrap().to_string();

        let payload = json!({
            "client_id": client_id,
            "type_sinistre": "collision",
            "date_sinistre": "2024-05-01",
            "lieu_sinistre": "Rabat",
            "description": "Un camion a percuté ma voiture.",
            "tiers_implique": true,
            "documents_complets": false
        });
        let (status, body) = call(app.clone(), json_req("POST", "/api/v1/sinistres", payload)).await;
        assert_eq!(status, StatusCode::OK);
        let sinistre: Sinistre = serde_json::from_value(body).unwrap();
        assert!(sinistre.numero_sinistre.starts_with("SINS-"));
        assert_eq!(sinistre.numero_sinistre.len(), "SINS-".len() + 14);
        assert_eq!(sinistre.status_dossier.as_str(), "nouveau");
        assert!(sinistre.cci_score.is_some());
        assert!(sinistre.client.is_some());
    }

    #[tokio::test]
    async fn test_sinistre_requires_known_client() {
        let app = create_app();
        let payload = json!({
            "client_id": "",
            "type_sinistre": "vol",
            "date_sinistre": "",
            "lieu_sinistre": "",
            "description": "",
            "tiers_implique": false,
            "documents_complets": false
        });
        let (status, body) =
            call(app.clone(), json_req("POST", "/api/v1/sinistres", payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "client_id requis");

        let mut unknown = payload;
        unknown["client_id"] = json!("nope");
        let (status, _) = call(app, json_req("POST", "/api/v1/sinistres", unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_escalade_queue() {
        let (status, body) = call(create_app(), get_req("/api/v1/escalades/queue")).await;
        assert_eq!(status, StatusCode::OK);
        let queue: EscaladeQueue = serde_json::from_value(body).unwrap();
        assert_eq!(queue.count, 1);
        let item = &queue.items[0];
        assert_eq!(item.cci_score, Some(74));
        assert_eq!(
            item.sinistre.as_ref().and_then(|s| s.kind.as_deref()),
            Some("vol")
        );
    }

    #[tokio::test]
    async fn test_deleting_sinistre_drops_its_escalades() {
        let app = create_app();
        let (_, body) = call(app.clone(), get_req("/api/v1/escalades/queue")).await;
        let queue: EscaladeQueue = serde_json::from_value(body).unwrap();
        let sinistre_id = queue.items[0]
            .sinistre
            .as_ref()
            .and_then(|s| s.id.clone())
            .unwrap();

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/sinistres/{sinistre_id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app.clone(), delete).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(app.clone(), get_req("/api/v1/escalades/queue")).await;
        let queue: EscaladeQueue = serde_json::from_value(body).unwrap();
        assert_eq!(queue.count, 0);
        assert!(queue.items.is_empty());

        let (_, escalades) = call(app, get_req("/api/v1/escalades")).await;
        assert_eq!(escalades.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_contrat_moves_to_other_client() {
        let app = create_app();
        let (_, clients) = call(app.clone(), get_req("/api/v1/clients")).await;
        let (_, contrats) = call(app.clone(), get_req("/api/v1/contrats")).await;
        let contrat = &contrats[0];
        let owner = contrat["client_id"].as_str().unwrap();
        let other = clients
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .find(|id| *id != owner)
            .unwrap()
            .to_string();

        let mut payload = contrat.clone();
        payload["client_id"] = json!(other);
        let uri = format!("/api/v1/contrats/{}", contrat["id"].as_str().unwrap());
        let (status, updated) = call(app.clone(), json_req("PUT", &uri, payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["client_id"], other.as_str());
        assert_eq!(updated["client"]["id"], other.as_str());

        payload["client_id"] = json!("nope");
        let (status, _) = call(app, json_req("PUT", &uri, payload)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_overview_and_emotions() {
        let app = create_app();
        let (status, body) = call(app.clone(), get_req("/api/v1/analytics/overview")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kpis"]["sinistres_total"], 2);
        assert_eq!(body["cci_buckets"].as_array().unwrap().len(), 5);

        let (_, stats) = call(app, get_req("/api/v1/emotions/stats")).await;
        assert_eq!(stats["emotions_summary"]["stress"], 0);
        assert_eq!(stats["total_recordings"], 0);
    }

    #[tokio::test]
    async fn test_transcribe_echoes_upload() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"recording.wav\"\r\nContent-Type: audio/wav\r\n\r\nAB-4521-22\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/transcribe")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, body) = call(create_app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["transcript"], "AB-4521-22");
    }
}
