use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{category, normalize_category};

/// Pipeline configuration. Every field has a default so a missing file or a
/// partial TOML document is valid; env vars override the extractor backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub extractors: ExtractorConfig,
    pub dedup: DedupConfig,
    pub priority: PriorityConfig,
    pub hotspots: HotspotDefaults,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorBackend {
    /// Lexicon text analysis, no image model.
    #[default]
    Local,
    /// Pre-trained models behind the ML inference service.
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub backend: ExtractorBackend,
    pub ml_service_url: Option<String>,
    /// Upper bound for a single extractor call.
    pub timeout_ms: u64,
    pub max_images: usize,
    /// Dimension of the local feature-hashed embedding.
    pub embedding_dim: usize,
    pub urgency_keywords: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            backend: ExtractorBackend::Local,
            ml_service_url: None,
            timeout_ms: 5_000,
            max_images: 10,
            embedding_dim: 256,
            urgency_keywords: DEFAULT_URGENCY_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub const DEFAULT_URGENCY_KEYWORDS: &[&str] = &[
    "emergency",
    "urgent",
    "urgently",
    "immediately",
    "asap",
    "danger",
    "dangerous",
    "hazard",
    "unsafe",
    "accident",
    "injured",
    "broken",
    "collapsed",
    "flooding",
    "fire",
    "sparking",
    "blocked",
    "severe",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupConfig {
    /// Geospatial pre-filter radius. Must stay within the region-lock reach.
    pub radius_km: f64,
    pub geo_weight: f64,
    pub semantic_weight: f64,
    /// A candidate is a duplicate when its combined similarity exceeds this.
    pub threshold: f64,
    pub category_thresholds: HashMap<String, f64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            radius_km: 0.1,
            geo_weight: 0.4,
            semantic_weight: 0.6,
            threshold: 0.75,
            category_thresholds: HashMap::new(),
        }
    }
}

/// Region locks cover a geohash-5 cell and its neighbours; below the polar
/// band their east-west reach never drops under this.
pub const MAX_DEDUP_RADIUS_KM: f64 = 0.5;

impl DedupConfig {
    pub fn threshold_for(&self, category: &str) -> f64 {
        self.category_thresholds
            .get(&normalize_category(category))
            .copied()
            .unwrap_or(self.threshold)
    }

    /// Weights rescaled to sum to 1.
    pub fn normalized_weights(&self) -> (f64, f64) {
        let total = self.geo_weight + self.semantic_weight;
        (self.geo_weight / total, self.semantic_weight / total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriorityConfig {
    pub base_severity: BTreeMap<String, f64>,
    pub urgency_weight: f64,
    pub urgency_cap: usize,
    pub negative_sentiment_bonus: f64,
    pub risk_weight: f64,
    pub risk_radius_km: f64,
    /// `k` in `1 - exp(-k * density)`.
    pub risk_decay: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        let base_severity = [
            (category::POTHOLE, 2.5),
            (category::ROAD, 2.5),
            (category::WATER, 2.5),
            (category::STREETLIGHT, 2.0),
            (category::GARBAGE, 1.5),
            (category::OTHER, 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            base_severity,
            urgency_weight: 1.0,
            urgency_cap: 3,
            negative_sentiment_bonus: 0.5,
            risk_weight: 1.0,
            risk_radius_km: 0.5,
            risk_decay: 0.15,
        }
    }
}

impl PriorityConfig {
    /// Base weight for a category; unknown categories fall back to `other`.
    pub fn base_for(&self, category: &str) -> f64 {
        self.base_severity
            .get(&normalize_category(category))
            .or_else(|| self.base_severity.get(category::OTHER))
            .copied()
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HotspotDefaults {
    pub radius_km: f64,
    pub min_reports: usize,
}

impl Default for HotspotDefaults {
    fn default() -> Self {
        Self {
            radius_km: 1.0,
            min_reports: 5,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, apply `.env` and env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `CIVICSIGNAL_ML_SERVICE_URL` and `CIVICSIGNAL_EXTRACTOR_BACKEND`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CIVICSIGNAL_ML_SERVICE_URL").filter(|u| !u.trim().is_empty()) {
            self.extractors.ml_service_url = Some(url.trim().to_string());
        }
        match lookup("CIVICSIGNAL_EXTRACTOR_BACKEND")
            .map(|b| b.trim().to_lowercase())
            .as_deref()
        {
            Some("remote") => self.extractors.backend = ExtractorBackend::Remote,
            Some("local") => self.extractors.backend = ExtractorBackend::Local,
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ex = &self.extractors;
        if ex.timeout_ms == 0 {
            bail!("extractors.timeout_ms must be > 0");
        }
        if ex.embedding_dim == 0 {
            bail!("extractors.embedding_dim must be > 0");
        }
        if ex.backend == ExtractorBackend::Remote && ex.ml_service_url.is_none() {
            bail!("extractors.backend = \"remote\" requires extractors.ml_service_url");
        }

        let d = &self.dedup;
        if !(d.radius_km > 0.0 && d.radius_km <= MAX_DEDUP_RADIUS_KM) {
            bail!(
                "dedup.radius_km must be in (0, {MAX_DEDUP_RADIUS_KM}], got {}",
                d.radius_km
            );
        }
        if !(d.geo_weight >= 0.0 && d.semantic_weight >= 0.0)
            || !(d.geo_weight + d.semantic_weight > 0.0)
        {
            bail!("dedup weights must be non-negative with a positive sum");
        }
        if !(0.0..=1.0).contains(&d.threshold) {
            bail!("dedup.threshold must be in [0, 1], got {}", d.threshold);
        }
        for (cat, t) in &d.category_thresholds {
            if !(0.0..=1.0).contains(t) {
                bail!("dedup.category_thresholds.{cat} must be in [0, 1], got {t}");
            }
        }

        let p = &self.priority;
        if !(p.risk_decay > 0.0) || !(p.risk_radius_km > 0.0) {
            bail!("priority.risk_decay and priority.risk_radius_km must be > 0");
        }
        if p.urgency_weight < 0.0 || p.negative_sentiment_bonus < 0.0 || p.risk_weight < 0.0 {
            bail!("priority weights must be non-negative");
        }
        if p.base_severity.values().any(|v| !v.is_finite()) {
            bail!("priority.base_severity values must be finite");
        }

        let h = &self.hotspots;
        if !(h.radius_km > 0.0) || h.min_reports == 0 {
            bail!("hotspots.radius_km must be > 0 and hotspots.min_reports > 0");
        }
        Ok(())
    }

    /// Log the effective configuration. The service URL is the only
    /// deployment-specific value and carries no secret.
    pub fn log_summary(&self) {
        info!(
            backend = ?self.extractors.backend,
            ml_service_url = self.extractors.ml_service_url.as_deref().unwrap_or("-"),
            timeout_ms = self.extractors.timeout_ms,
            dedup_radius_km = self.dedup.radius_km,
            dedup_threshold = self.dedup.threshold,
            risk_radius_km = self.priority.risk_radius_km,
            hotspot_radius_km = self.hotspots.radius_km,
            hotspot_min_reports = self.hotspots.min_reports,
            "Pipeline config loaded"
        );
    }
}
