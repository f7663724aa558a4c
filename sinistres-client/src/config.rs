use clap::Args;
use reqwest::Url;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Resolved connection settings shared by the REST client and the conversation session.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: Url,
    pub ws_url: Url,
    pub recording_window: Duration,
    pub send_timeout: Duration,
    pub http_timeout: Duration,
}

impl Settings {
    /// Settings for `api_url`, with the WebSocket origin derived from it.
    pub fn new(api_url: &str) -> Result<Self> {
        let api_url = parse_origin(api_url)?;
        let ws_url = derive_ws_url(&api_url)?;
        Ok(Self {
            api_url,
            ws_url,
            recording_window: sinistres_core::call::RECORDING_WINDOW,
            send_timeout: sinistres_core::outbox::DEFAULT_SEND_TIMEOUT,
            http_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> Result<Self> {
        let url = parse_origin(ws_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::Config(format!(
                "WebSocket URL must use ws or wss: {ws_url}"
            )));
        }
        self.ws_url = url;
        Ok(self)
    }

    /// API origin without trailing slash, used to resolve relative audio URLs.
    pub fn api_base(&self) -> String {
        self.api_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base(), path.trim_start_matches('/'))
    }

    pub fn conversation_url(&self, session_id: &str) -> String {
        format!(
            "{}{}",
            self.ws_url.as_str().trim_end_matches('/'),
            sinistres_core::frames::conversation_path(session_id)
        )
    }
}

/// Connection options, read from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Backend origin
    #[arg(long, env = "NEXT_PUBLIC_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// WebSocket origin; derived from the API URL when absent
    #[arg(long, env = "SINISTRES_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Capture window of a hands-free turn, in seconds
    #[arg(long, env = "SINISTRES_RECORDING_WINDOW_SECS", default_value_t = 10, global = true)]
    pub recording_window_secs: u64,

    /// How long an unsent frame is kept before it is reported lost, in seconds
    #[arg(long, env = "SINISTRES_SEND_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub send_timeout_secs: u64,

    #[arg(long, env = "SINISTRES_HTTP_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub http_timeout_secs: u64,
}

impl ConfigArgs {
    pub fn into_settings(self) -> Result<Settings> {
        let mut settings = Settings::new(&self.api_url)?;
        if let Some(ws_url) = self.ws_url.as_deref() {
            settings = settings.with_ws_url(ws_url)?;
        }
        if self.recording_window_secs == 0 {
            return Err(ClientError::Config(
                "recording window must be at least one second".to_string(),
            ));
        }
        settings.recording_window = Duration::from_secs(self.recording_window_secs);
        settings.send_timeout = Duration::from_secs(self.send_timeout_secs);
        settings.http_timeout = Duration::from_secs(self.http_timeout_secs);
        Ok(settings)
    }
}

fn parse_origin(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| ClientError::Config(format!("invalid URL {raw:?}: {e}")))
}

fn derive_ws_url(api_url: &Url) -> Result<Url> {
    let scheme = match api_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::Config(format!(
                "API URL must use http or https, got {other}"
            )));
        }
    };
    let mut ws_url = api_url.clone();
    ws_url
        .set_scheme(scheme)
        .map_err(|_| ClientError::Config(format!("cannot derive WebSocket URL from {api_url}")))?;
    Ok(ws_url)
}
