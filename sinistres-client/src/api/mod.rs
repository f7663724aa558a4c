//! REST client for the sinistres backend.

mod transcribe;

pub use transcribe::{Transcriber, Transcription};

use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use sinistres_core::analytics::{
    EmotionAlerts, EmotionDashboard, EmotionStats, Overview, RecentEmotions,
};
use sinistres_core::models::{Client, Conseiller, EscaladeQueue, Resource};

use crate::config::Settings;
use crate::error::{ClientError, Result};

const API_PREFIX: &str = "api/v1";

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: Settings,
}

impl ApiClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        self.settings
            .api_endpoint(&format!("{API_PREFIX}/{}", path.trim_start_matches('/')))
    }

    /// `{collection}/{key}` with `key` percent-encoded as one path segment.
    fn record_url(&self, collection: &str, key: &str) -> Result<Url> {
        let mut url =
            Url::parse(&self.url(collection)).map_err(|e| ClientError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("API URL cannot carry a path".to_string()))?
            .push(key);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(self.url(path)).await
    }

    async fn fetch<T, U>(&self, url: U) -> Result<T>
    where
        T: DeserializeOwned,
        U: reqwest::IntoUrl + std::fmt::Display,
    {
        debug!(url = %url, "GET");
        let response = self.http.get(url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn list<R: Resource>(&self) -> Result<Vec<R>> {
        let items: Vec<R> = self.get_json(R::COLLECTION).await?;
        debug!(resource = R::COLLECTION, count = items.len(), "fetched list");
        Ok(items)
    }

    pub async fn get<R: Resource>(&self, id: &str) -> Result<R> {
        self.fetch(self.record_url(R::COLLECTION, id)?).await
    }

    pub async fn create<R: Resource>(&self, draft: &R::Draft) -> Result<R> {
        let url = self.url(R::COLLECTION);
        let response = self.http.post(&url).json(draft).send().await?;
        let created: R = check(response).await?.json().await?;
        info!(resource = R::COLLECTION, id = %created.id(), "created");
        Ok(created)
    }

    pub async fn update<R: Resource>(&self, id: &str, draft: &R::Draft) -> Result<R> {
        let url = self.record_url(R::COLLECTION, id)?;
        let response = self.http.put(url).json(draft).send().await?;
        let updated: R = check(response).await?.json().await?;
        info!(resource = R::COLLECTION, id = %id, "updated");
        Ok(updated)
    }

    pub async fn delete<R: Resource>(&self, id: &str) -> Result<()> {
        let url = self.record_url(R::COLLECTION, id)?;
        let response = self.http.delete(url).send().await?;
        check(response).await?;
        info!(resource = R::COLLECTION, id = %id, "deleted");
        Ok(())
    }

    /// Looks a client up by matricule. `None` when the backend does not know it.
    pub async fn client_by_matricule(&self, matricule: &str) -> Result<Option<Client>> {
        match self.fetch(self.record_url("clients", matricule.trim())?).await {
            Ok(client) => Ok(Some(client)),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn conseillers(&self) -> Result<Vec<Conseiller>> {
        self.get_json("conseillers").await
    }

    pub async fn escalade_queue(&self) -> Result<EscaladeQueue> {
        self.get_json("escalades/queue").await
    }

    pub async fn overview(&self) -> Result<Overview> {
        self.get_json("analytics/overview").await
    }

    pub async fn emotion_stats(&self) -> Result<EmotionStats> {
        self.get_json("emotions/stats").await
    }

    pub async fn recent_emotions(&self) -> Result<RecentEmotions> {
        self.get_json("emotions/recent").await
    }

    pub async fn emotion_alerts(&self) -> Result<EmotionAlerts> {
        self.get_json("emotions/alerts").await
    }

    pub async fn emotion_dashboard(&self) -> Result<EmotionDashboard> {
        self.get_json("emotions/dashboard-summary").await
    }
}

/// Turns a non-success response into [`ClientError::Status`], keeping the body for the alert.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!(url = %url, status = status.as_u16(), "backend rejected request");
    Err(ClientError::Status {
        status: status.as_u16(),
        body: extract_detail(&body),
    })
}

/// Server message from a `{"detail": …}` or `{"error": …}` body, else the raw body.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|d| d.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
