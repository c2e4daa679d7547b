//! Wire shapes exchanged with the intake/persistence collaborators.

use base64::Engine;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::types::{GeoPoint, HotspotCluster, RawReport, ReportAnalysis, Sentiment, SeverityLevel};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisRequest {
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Base64-encoded image payloads.
    #[serde(default)]
    pub images: Vec<String>,
}

impl AnalysisRequest {
    /// Decode image payloads and stamp a report id. Coordinate and text checks
    /// happen in the pipeline so every entry point shares them.
    pub fn into_raw_report(self) -> Result<RawReport, AnalysisError> {
        let images = self
            .images
            .iter()
            .enumerate()
            .map(|(i, encoded)| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map(Bytes::from)
                    .map_err(|e| AnalysisError::invalid(format!("image {i} is not valid base64: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RawReport::new(
            self.title,
            self.description,
            GeoPoint::new(self.latitude, self.longitude),
            images,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResponse {
    pub report_id: String,
    pub category: String,
    pub confidence: f64,
    pub priority_score: u8,
    pub severity_level: SeverityLevel,
    pub is_duplicate: bool,
    pub duplicate_report_id: Option<String>,
    pub detected_objects: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency_keywords: Vec<String>,
    pub location_risk_score: f64,
}

impl From<&ReportAnalysis> for AnalysisResponse {
    fn from(a: &ReportAnalysis) -> Self {
        Self {
            report_id: a.report_id.to_string(),
            category: a.category.clone(),
            confidence: a.confidence,
            priority_score: a.priority_score,
            severity_level: a.severity_level,
            is_duplicate: a.is_duplicate,
            duplicate_report_id: a.duplicate_of.map(|id| id.to_string()),
            detected_objects: a.detected_objects.clone(),
            sentiment: a.sentiment,
            urgency_keywords: a.urgency_keywords.clone(),
            location_risk_score: a.location_risk_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HotspotRequest {
    #[serde(default = "default_hotspot_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_min_reports")]
    pub min_reports: usize,
}

fn default_hotspot_radius_km() -> f64 {
    1.0
}

fn default_min_reports() -> usize {
    5
}

impl Default for HotspotRequest {
    fn default() -> Self {
        Self {
            radius_km: default_hotspot_radius_km(),
            min_reports: default_min_reports(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HotspotResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub report_count: usize,
    pub avg_severity: f64,
    pub dominant_category: String,
}

impl From<&HotspotCluster> for HotspotResponse {
    fn from(c: &HotspotCluster) -> Self {
        Self {
            latitude: c.centroid.lat,
            longitude: c.centroid.lng,
            report_count: c.report_count,
            avg_severity: c.avg_severity,
            dominant_category: c.dominant_category.clone(),
        }
    }
}
