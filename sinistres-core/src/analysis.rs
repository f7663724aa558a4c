//! Rule-based "Analyse Cognitive" of a claim description.
//!
//! A description is split into sentences and each sentence is tagged from a
//! fixed keyword table: factual statement, supposition (hedged statement) or
//! neutral, plus zero or more emotions. Nothing here is learned or
//! context-sensitive; the whole behaviour is the [`RuleTable`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("sentence break pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Stress,
    Colere,
    Tristesse,
    Peur,
}

impl Emotion {
    pub const ALL: [Emotion; 4] = [
        Emotion::Stress,
        Emotion::Colere,
        Emotion::Tristesse,
        Emotion::Peur,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Stress => "Stress",
            Emotion::Colere => "Colère",
            Emotion::Tristesse => "Tristesse",
            Emotion::Peur => "Peur",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceKind {
    #[serde(rename = "fait")]
    Fact,
    Supposition,
    #[serde(rename = "neutre")]
    Neutral,
}

impl SentenceKind {
    /// Fixed confidence shown for each category.
    pub fn confidence(&self) -> u8 {
        match self {
            SentenceKind::Supposition => 40,
            SentenceKind::Fact => 85,
            SentenceKind::Neutral => 65,
        }
    }
}

/// Keywords of one emotion and the score added per hit.
#[derive(Debug, Clone, Copy)]
pub struct EmotionRule {
    pub emotion: Emotion,
    pub keywords: &'static [&'static str],
    pub weight: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleTable {
    pub fact_indicators: &'static [&'static str],
    pub supposition_indicators: &'static [&'static str],
    pub emotions: &'static [EmotionRule],
}

/// The French rule table used by the advisor console.
pub const FRENCH_RULES: RuleTable = RuleTable {
    fact_indicators: &[
        "le", "la", "à", "dans", "sur", "date", "lieu", "heure", "numéro", "plaque",
    ],
    supposition_indicators: &[
        "peut-être",
        "probablement",
        "semble",
        "pourrait",
        "je pense",
        "je crois",
        "sans doute",
    ],
    emotions: &[
        EmotionRule {
            emotion: Emotion::Stress,
            keywords: &["urgent", "vite", "rapidement", "inquiet", "stressé", "anxieux"],
            weight: 20,
        },
        EmotionRule {
            emotion: Emotion::Colere,
            keywords: &["furieux", "énervé", "inacceptable", "scandaleux", "honteux"],
            weight: 25,
        },
        EmotionRule {
            emotion: Emotion::Tristesse,
            keywords: &["triste", "désolé", "malheureux", "difficile", "dur"],
            weight: 15,
        },
        EmotionRule {
            emotion: Emotion::Peur,
            keywords: &["peur", "effrayé", "inquiet", "angoissé", "crainte"],
            weight: 20,
        },
    ],
};

impl RuleTable {
    fn weight_of(&self, emotion: Emotion) -> u32 {
        self.emotions
            .iter()
            .find(|rule| rule.emotion == emotion)
            .map(|rule| rule.weight)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSentence {
    pub id: usize,
    pub texte: String,
    pub kind: SentenceKind,
    /// One entry per keyword hit, so a category can repeat.
    pub emotions: Vec<Emotion>,
    pub longueur: usize,
    pub confiance: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub sentences: Vec<ClassifiedSentence>,
}

impl Analysis {
    pub fn facts(&self) -> impl Iterator<Item = &ClassifiedSentence> {
        self.sentences.iter().filter(|s| s.kind == SentenceKind::Fact)
    }

    pub fn suppositions(&self) -> impl Iterator<Item = &ClassifiedSentence> {
        self.sentences
            .iter()
            .filter(|s| s.kind == SentenceKind::Supposition)
    }

    pub fn emotional(&self) -> impl Iterator<Item = &ClassifiedSentence> {
        self.sentences.iter().filter(|s| !s.emotions.is_empty())
    }
}

/// Per-emotion scores clamped to 0..=100, and their average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalScore {
    pub stress: u32,
    pub colere: u32,
    pub tristesse: u32,
    pub peur: u32,
    pub global: f64,
}

impl EmotionalScore {
    pub fn get(&self, emotion: Emotion) -> u32 {
        match emotion {
            Emotion::Stress => self.stress,
            Emotion::Colere => self.colere,
            Emotion::Tristesse => self.tristesse,
            Emotion::Peur => self.peur,
        }
    }
}

/// One axis of the cognitive radar profile, on a 0 to 10 scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileAxis {
    pub name: &'static str,
    pub value: f64,
    pub max: f64,
}

/// Splits on runs of `.`, `!` or `?` and drops segments that are empty after trimming.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn classify_sentence(id: usize, sentence: &str, rules: &RuleTable) -> ClassifiedSentence {
    let texte = sentence.trim().to_string();
    let lower = texte.to_lowercase();

    let is_supposition = rules
        .supposition_indicators
        .iter()
        .any(|hedge| lower.contains(hedge));
    let is_fact = !is_supposition
        && rules
            .fact_indicators
            .iter()
            .any(|indicator| lower.contains(indicator));

    let emotions = rules
        .emotions
        .iter()
        .flat_map(|rule| {
            rule.keywords
                .iter()
                .filter(|keyword| lower.contains(*keyword))
                .map(move |_| rule.emotion)
        })
        .collect();

    let kind = if is_supposition {
        SentenceKind::Supposition
    } else if is_fact {
        SentenceKind::Fact
    } else {
        SentenceKind::Neutral
    };

    ClassifiedSentence {
        id,
        longueur: texte.split_whitespace().count(),
        texte,
        kind,
        emotions,
        confiance: kind.confidence(),
    }
}

pub fn analyze_with(text: &str, rules: &RuleTable) -> Analysis {
    Analysis {
        sentences: split_sentences(text)
            .iter()
            .enumerate()
            .map(|(id, sentence)| classify_sentence(id, sentence, rules))
            .collect(),
    }
}

pub fn analyze(text: &str) -> Analysis {
    analyze_with(text, &FRENCH_RULES)
}

pub fn emotional_score_with(analysis: &Analysis, rules: &RuleTable) -> EmotionalScore {
    let raw = |emotion: Emotion| -> u32 {
        let hits = analysis
            .sentences
            .iter()
            .flat_map(|s| s.emotions.iter())
            .filter(|e| **e == emotion)
            .count() as u32;
        hits.saturating_mul(rules.weight_of(emotion)).min(100)
    };

    let stress = raw(Emotion::Stress);
    let colere = raw(Emotion::Colere);
    let tristesse = raw(Emotion::Tristesse);
    let peur = raw(Emotion::Peur);
    let global = (f64::from(stress + colere + tristesse + peur) / 4.0).min(100.0);

    EmotionalScore {
        stress,
        colere,
        tristesse,
        peur,
        global,
    }
}

pub fn emotional_score(analysis: &Analysis) -> EmotionalScore {
    emotional_score_with(analysis, &FRENCH_RULES)
}

pub fn cognitive_profile(analysis: &Analysis, cci_score: Option<i64>) -> Vec<ProfileAxis> {
    let facts = analysis.facts().count();
    let suppositions = analysis.suppositions().count();
    let axis = |name, value: f64| ProfileAxis {
        name,
        value,
        max: 10.0,
    };

    vec![
        axis("Faits", facts as f64),
        axis("Suppositions", suppositions as f64),
        axis("Émotions", analysis.emotional().count() as f64),
        axis("CCI", cci_score.unwrap_or(0) as f64 / 10.0),
        axis("Confiance", if facts > suppositions { 8.0 } else { 4.0 }),
    ]
}
