//! Pre-computed aggregates served by the backend for the dashboard views.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub clients_total: u64,
    pub sinistres_total: u64,
    pub escalades_total: u64,
    pub remboursements_total: u64,
    pub cci_avg: f64,
    pub cci_min: i64,
    pub cci_max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CciBucket {
    pub range: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemboursementSums {
    pub reclame: f64,
    pub accepte: f64,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveCard {
    pub sinistre_id: String,
    pub numero_sinistre: String,
    pub client: String,
    pub facts: u32,
    pub propositions: u32,
    pub ambiguities: u32,
    pub contradictions: u32,
    pub confidence: u32,
    pub cci_score: i64,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Response of `GET /api/v1/analytics/overview`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub kpis: Kpis,
    #[serde(default)]
    pub sinistres_by_status: Vec<NamedCount>,
    #[serde(default)]
    pub sinistres_by_type: Vec<NamedCount>,
    #[serde(default)]
    pub sinistres_by_day: Vec<DayCount>,
    #[serde(default)]
    pub cci_buckets: Vec<CciBucket>,
    #[serde(default)]
    pub escalades_by_status: Vec<NamedCount>,
    #[serde(default)]
    pub remboursements_by_status: Vec<NamedCount>,
    #[serde(default)]
    pub remboursements_sum: RemboursementSums,
    #[serde(default)]
    pub cognitive_cards: Vec<CognitiveCard>,
}

/// The five CCI ranges of the dashboard histogram, in display order.
pub const CCI_RANGES: [&str; 5] = ["0-20", "21-40", "41-60", "61-80", "81-100"];

/// Histogram label for a complexity score.
pub fn cci_range(score: i64) -> &'static str {
    match score {
        s if s <= 20 => CCI_RANGES[0],
        s if s <= 40 => CCI_RANGES[1],
        s if s <= 60 => CCI_RANGES[2],
        s if s <= 80 => CCI_RANGES[3],
        _ => CCI_RANGES[4],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionStats {
    pub total_recordings: u64,
    pub client_audios: u64,
    pub advisor_audios: u64,
    pub storage_mb: f64,
    #[serde(default)]
    pub emotions_summary: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAnalysis {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub dominant_emotion: Option<Value>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub audio_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentEmotions {
    pub count: u64,
    #[serde(default)]
    pub recent_analyses: Vec<RecentAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionAlert {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub emotion: String,
    pub confidence: f64,
    #[serde(default)]
    pub transcription: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub audio_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionAlerts {
    pub alert_count: u64,
    #[serde(default)]
    pub alerts: Vec<EmotionAlert>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DominantEmotion {
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionDashboard {
    pub total_analyses: u64,
    pub alert_count: u64,
    #[serde(default)]
    pub emotion_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub emotion_percentages: BTreeMap<String, f64>,
    #[serde(default)]
    pub dominant_emotion: Option<DominantEmotion>,
    #[serde(default)]
    pub recent_analyses: Vec<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Share of each emotion in the total, rounded to one decimal. An empty total gives zeros.
pub fn emotion_percentages(counts: &BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    let total: u64 = counts.values().sum();
    counts
        .iter()
        .map(|(label, count)| {
            let pct = if total == 0 {
                0.0
            } else {
                (*count as f64 * 1000.0 / total as f64).round() / 10.0
            };
            (label.clone(), pct)
        })
        .collect()
}
