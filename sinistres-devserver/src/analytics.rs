use axum::{Router, extract::State, response::Json, routing::get};
use std::collections::BTreeMap;

use sinistres_core::analytics::{
    CCI_RANGES, CciBucket, CognitiveCard, DayCount, EmotionAlerts, EmotionDashboard,
    EmotionStats, Kpis, NamedCount, Overview, RecentEmotions, RemboursementSums, cci_range,
};
use sinistres_core::models::{Sinistre, SinistreDraft, TypeSinistre};
use sinistres_core::{analyze, emotional_score};

use crate::AppState;
use crate::store::{Store, now_iso};

/// Emotion labels reported by the voice-analysis service.
const EMOTION_LABELS: [&str; 6] = ["anger", "stress", "sadness", "fear", "frustration", "neutral"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/overview", get(overview))
        .route("/emotions/stats", get(emotion_stats))
        .route("/emotions/recent", get(recent_emotions))
        .route("/emotions/alerts", get(emotion_alerts))
        .route("/emotions/dashboard-summary", get(emotion_dashboard))
}

async fn overview(State(state): State<AppState>) -> Json<Overview> {
    Json(build_overview(&state.store))
}

/// Counts keyed by `key`, in order of first appearance.
fn grouped<T>(items: &[T], key: impl Fn(&T) -> String) -> Vec<NamedCount> {
    let mut counts: Vec<NamedCount> = Vec::new();
    for item in items {
        let name = key(item);
        match counts.iter_mut().find(|c| c.name == name) {
            Some(count) => count.value += 1,
            None => counts.push(NamedCount { name, value: 1 }),
        }
    }
    counts
}

pub fn build_overview(store: &Store) -> Overview {
    let sinistres = store.sinistres.list();
    let escalades = store.escalades.list();
    let remboursements = store.remboursements.list();

    let scores: Vec<i64> = sinistres.iter().filter_map(|s| s.cci_score).collect();
    let cci_avg = if scores.is_empty() {
        0.0
    } else {
        let avg = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
        (avg * 100.0).round() / 100.0
    };

    let mut by_day: BTreeMap<String, u64> = BTreeMap::new();
    for s in &sinistres {
        if let Some(day) = s.date_creation.as_deref().and_then(|d| d.get(..10)) {
            *by_day.entry(day.to_string()).or_default() += 1;
        }
    }
    let skip = by_day.len().saturating_sub(14);
    let sinistres_by_day = by_day
        .into_iter()
        .skip(skip)
        .map(|(date, count)| DayCount { date, count })
        .collect();

    let mut buckets: BTreeMap<&str, u64> = CCI_RANGES.iter().map(|r| (*r, 0)).collect();
    for score in &scores {
        *buckets.entry(cci_range(*score)).or_default() += 1;
    }
    let cci_buckets = CCI_RANGES
        .iter()
        .map(|range| CciBucket {
            range: range.to_string(),
            value: buckets.get(range).copied().unwrap_or(0),
        })
        .collect();

    let remboursements_sum = RemboursementSums {
        reclame: remboursements.iter().map(|r| r.montant_reclame).sum(),
        accepte: remboursements.iter().filter_map(|r| r.montant_accepte).sum(),
        net: remboursements.iter().filter_map(|r| r.montant_net).sum(),
    };

    Overview {
        kpis: Kpis {
            clients_total: store.clients.len() as u64,
            sinistres_total: sinistres.len() as u64,
            escalades_total: escalades.len() as u64,
            remboursements_total: remboursements.len() as u64,
            cci_avg,
            cci_min: scores.iter().copied().min().unwrap_or(0),
            cci_max: scores.iter().copied().max().unwrap_or(0),
        },
        sinistres_by_status: grouped(&sinistres, |s| s.status_dossier.to_string()),
        sinistres_by_type: grouped(&sinistres, |s| s.type_sinistre.to_string()),
        sinistres_by_day,
        cci_buckets,
        escalades_by_status: grouped(&escalades, |e| e.status.clone()),
        remboursements_by_status: grouped(&remboursements, |r| r.status.to_string()),
        remboursements_sum,
        cognitive_cards: sinistres
            .iter()
            .take(8)
            .map(|s| cognitive_card(store, s))
            .collect(),
    }
}

fn cognitive_card(store: &Store, s: &Sinistre) -> CognitiveCard {
    let description = s.description.as_deref().filter(|d| !d.is_empty());
    let facts = [
        s.lieu_sinistre.as_deref().is_some_and(|l| !l.is_empty()),
        s.date_sinistre.is_some(),
        s.tiers_implique.is_some(),
        s.documents_complets.is_some(),
        description.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count() as u32;

    let propositions = description
        .map(|d| {
            let segments = d
                .split(['.', '!', '?'])
                .filter(|seg| !seg.trim().is_empty())
                .count() as u32;
            segments.max(1)
        })
        .unwrap_or(0);

    let cci = s.cci_score.unwrap_or(0);
    let confidence = (60 + facts as i64 * 6 + cci.max(0) / 5).min(98) as u32;

    CognitiveCard {
        sinistre_id: s.id.clone(),
        numero_sinistre: s.numero_sinistre.clone(),
        client: store
            .clients
            .get(&s.client_id)
            .map(|c| format!("{} {}", c.nom, c.prenom))
            .unwrap_or_default(),
        facts,
        propositions,
        ambiguities: 0,
        contradictions: 0,
        confidence,
        cci_score: cci,
        status: s.status_dossier.to_string(),
        kind: s.type_sinistre.to_string(),
        date: s.date_creation.clone(),
    }
}

/// Complexity index for a new claim when the caller supplies none.
///
/// Weighted sum of six factors on 0..=100: guarantees 15, third party 20,
/// missing documents 20, ambiguity 20, emotional stress 10, inconsistency 15.
pub fn estimate_cci(draft: &SinistreDraft) -> i64 {
    let analysis = analyze(&draft.description);
    let facts = analysis.facts().count();
    let suppositions = analysis.suppositions().count();

    let guarantees = match draft.type_sinistre {
        TypeSinistre::Collision => 30.0,
        TypeSinistre::Vol | TypeSinistre::Degats => 40.0,
        TypeSinistre::Blessure => 60.0,
        _ => 50.0,
    };
    let third_party = if draft.tiers_implique { 40.0 } else { 0.0 };
    let missing_docs = if draft.documents_complets { 0.0 } else { 50.0 };
    let ambiguity = (suppositions as f64 * 15.0).min(50.0);
    let emotional = emotional_score(&analysis).global;

    let mut inconsistency: f64 = 0.0;
    if facts == 0 {
        inconsistency += 40.0;
    } else if suppositions > facts {
        inconsistency += 30.0;
    }
    if draft.date_sinistre.trim().is_empty() {
        inconsistency += 25.0;
    }
    if draft.lieu_sinistre.trim().is_empty() {
        inconsistency += 25.0;
    }
    let inconsistency = inconsistency.min(100.0);

    let total = guarantees * 0.15
        + third_party * 0.20
        + missing_docs * 0.20
        + ambiguity * 0.20
        + emotional * 0.10
        + inconsistency * 0.15;
    total.round().clamp(0.0, 100.0) as i64
}

// The devserver records no voice analyses, so every emotion endpoint reports
// an empty but well-formed aggregate.

async fn emotion_stats() -> Json<EmotionStats> {
    Json(EmotionStats {
        emotions_summary: EMOTION_LABELS.iter().map(|l| (l.to_string(), 0)).collect(),
        ..Default::default()
    })
}

async fn recent_emotions() -> Json<RecentEmotions> {
    Json(RecentEmotions::default())
}

async fn emotion_alerts() -> Json<EmotionAlerts> {
    Json(EmotionAlerts::default())
}

async fn emotion_dashboard() -> Json<EmotionDashboard> {
    Json(EmotionDashboard {
        emotion_counts: EMOTION_LABELS.iter().map(|l| (l.to_string(), 0)).collect(),
        emotion_percentages: EMOTION_LABELS.iter().map(|l| (l.to_string(), 0.0)).collect(),
        timestamp: Some(now_iso()),
        ..Default::default()
    })
}
