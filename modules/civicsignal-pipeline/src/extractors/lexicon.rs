//! Local text analysis without a model server.
//!
//! Category, sentiment and urgency come from keyword lexicons; the embedding is
//! a feature-hashed bag of words, so near-identical descriptions land close in
//! cosine space and unrelated ones stay near-orthogonal.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use civicsignal_common::config::ExtractorConfig;
use civicsignal_common::{category, Sentiment, SignalOutcome, TextSignal};

use super::TextAnalyzer;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("token regex is valid"));

/// Keyword lexicon per built-in category, in tie-break order.
const CATEGORY_LEXICON: &[(&str, &[&str])] = &[
    (
        category::POTHOLE,
        &["pothole", "potholes", "crater", "craters", "sinkhole", "pit"],
    ),
    (
        category::GARBAGE,
        &[
            "garbage", "trash", "waste", "litter", "rubbish", "dump", "dumping", "dumped",
            "overflowing", "stink", "stinking", "smell",
        ],
    ),
    (
        category::STREETLIGHT,
        &[
            "streetlight", "streetlights", "lamp", "lamppost", "light", "lights", "bulb", "dark",
        ],
    ),
    (
        category::WATER,
        &[
            "water", "leak", "leaking", "pipe", "pipeline", "burst", "sewage", "drain",
            "drainage", "waterlogging", "tap",
        ],
    ),
    (
        category::ROAD,
        &[
            "road", "roads", "street", "crack", "cracks", "asphalt", "pavement", "footpath",
            "sidewalk", "divider",
        ],
    ),
];

const NEGATIVE_WORDS: &[&str] = &[
    "broken", "bad", "terrible", "worst", "horrible", "awful", "dangerous", "danger", "damaged",
    "dirty", "unsafe", "angry", "frustrated", "problem", "poor", "collapsed", "injured",
    "accident", "stink", "stinking", "overflowing", "leaking", "flooding", "hazard", "ignored",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "thanks", "thank", "fixed", "resolved", "clean", "excellent", "appreciate",
    "happy", "quick", "helpful",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "on", "in", "at", "of", "to", "and", "or",
    "near", "this", "that", "it", "with", "for", "from", "by", "be", "has", "have",
];

const NO_MATCH_CONFIDENCE: f64 = 0.3;

pub struct LexiconTextAnalyzer {
    urgency_keywords: Vec<Vec<String>>,
    embedding_dim: usize,
}

impl LexiconTextAnalyzer {
    pub fn new(urgency_keywords: &[String], embedding_dim: usize) -> Self {
        Self {
            urgency_keywords: urgency_keywords
                .iter()
                .map(|k| tokenize(k))
                .filter(|t| !t.is_empty())
                .collect(),
            embedding_dim: embedding_dim.max(1),
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(&config.urgency_keywords, config.embedding_dim)
    }

    /// Synchronous analysis; the trait impl wraps this.
    pub fn analyze(&self, text: &str) -> SignalOutcome<TextSignal> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SignalOutcome::unavailable("no analysable text");
        }

        let (category, confidence) = classify(&tokens);
        let embedding = self.embed(&tokens);

        SignalOutcome::Signal(TextSignal {
            category,
            confidence,
            sentiment: sentiment(&tokens),
            urgency_keywords: self.urgency_hits(&tokens),
            embedding,
        })
    }

    /// Urgency phrases present in the tokens, in order of first appearance.
    fn urgency_hits(&self, tokens: &[String]) -> Vec<String> {
        let mut hits: Vec<(usize, String)> = Vec::new();
        for phrase in &self.urgency_keywords {
            let label = phrase.join(" ");
            if hits.iter().any(|(_, h)| *h == label) {
                continue;
            }
            if let Some(pos) = tokens
                .windows(phrase.len())
                .position(|w| w == phrase.as_slice())
            {
                hits.push((pos, label));
            }
        }
        hits.sort_by_key(|(pos, _)| *pos);
        hits.into_iter().map(|(_, label)| label).collect()
    }

    fn embed(&self, tokens: &[String]) -> Vec<f32> {
        let mut vector = vec![0f32; self.embedding_dim];
        for token in tokens.iter().filter(|t| !STOP_WORDS.contains(&t.as_str())) {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(head) % self.embedding_dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Vec::new();
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        vector
    }
}

#[async_trait]
impl TextAnalyzer for LexiconTextAnalyzer {
    async fn analyze_text(&self, text: &str) -> SignalOutcome<TextSignal> {
        self.analyze(text)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Most keyword hits wins; ties go to the earlier category in the lexicon.
fn classify(tokens: &[String]) -> (String, f64) {
    let mut best: Option<(&str, usize)> = None;
    for (name, words) in CATEGORY_LEXICON {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count();
        if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
            best = Some((*name, hits));
        }
    }

    match best {
        Some((name, hits)) => (name.to_string(), (0.5 + 0.15 * hits as f64).min(0.95)),
        None => (category::OTHER.to_string(), NO_MATCH_CONFIDENCE),
    }
}

fn sentiment(tokens: &[String]) -> Sentiment {
    let neg = tokens
        .iter()
        .filter(|t| NEGATIVE_WORDS.contains(&t.as_str()))
        .count();
    let pos = tokens
        .iter()
        .filter(|t| POSITIVE_WORDS.contains(&t.as_str()))
        .count();
    match neg.cmp(&pos) {
        std::cmp::Ordering::Greater => Sentiment::Negative,
        std::cmp::Ordering::Less => Sentiment::Positive,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}
