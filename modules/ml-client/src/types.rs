use serde::{Deserialize, Serialize};

/// Response of `POST /api/analyze/image`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageClassification {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub objects: Vec<String>,
}

/// Body of `POST /api/analyze/text`.
#[derive(Debug, Clone, Serialize)]
pub struct TextAnalysisRequest<'a> {
    pub text: &'a str,
}

/// Response of `POST /api/analyze/text`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextAnalysis {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub urgency_keywords: Vec<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsLoaded {
    #[serde(default)]
    pub image_classifier: bool,
    #[serde(default)]
    pub nlp_processor: bool,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub models_loaded: ModelsLoaded,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
