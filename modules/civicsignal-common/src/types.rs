use bytes::Bytes;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1.0 for antipodal points.
    let c = 2.0 * a.min(1.0).sqrt().asin();
    EARTH_RADIUS_KM * c
}

// --- Categories ---

/// Built-in issue taxonomy, in tie-break order.
pub mod category {
    pub const POTHOLE: &str = "pothole";
    pub const GARBAGE: &str = "garbage";
    pub const STREETLIGHT: &str = "streetlight";
    pub const WATER: &str = "water";
    pub const ROAD: &str = "road";
    pub const OTHER: &str = "other";

    pub const BUILTIN: &[&str] = &[POTHOLE, GARBAGE, STREETLIGHT, WATER, ROAD, OTHER];
}

/// Lowercase and trim a category label. Blank labels become `other`.
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        category::OTHER.to_string()
    } else {
        trimmed
    }
}

// --- Enums ---

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    #[default]
    Neutral,
    Positive,
}

impl Sentiment {
    /// Lenient parse used for model output. Unknown labels are neutral.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "negative" | "neg" => Sentiment::Negative,
            "positive" | "pos" => Sentiment::Positive,
            _ => Sentiment::Neutral,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
            Sentiment::Positive => write!(f, "positive"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    /// Bucket a priority score: 1–2 low, 3 medium, 4 high, 5 critical.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0..=2 => SeverityLevel::Low,
            3 => SeverityLevel::Medium,
            4 => SeverityLevel::High,
            _ => SeverityLevel::Critical,
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityLevel::Low => write!(f, "low"),
            SeverityLevel::Medium => write!(f, "medium"),
            SeverityLevel::High => write!(f, "high"),
            SeverityLevel::Critical => write!(f, "critical"),
        }
    }
}

// --- Extracted signals ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSignal {
    pub category: String,
    pub confidence: f64,
    pub detected_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSignal {
    pub category: String,
    pub confidence: f64,
    pub sentiment: Sentiment,
    pub urgency_keywords: Vec<String>,
    pub embedding: Vec<f32>,
}

/// Result of one extractor call. `Unavailable` is a degraded input, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome<T> {
    Signal(T),
    Unavailable { reason: String },
}

impl<T> SignalOutcome<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SignalOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SignalOutcome::Signal(_))
    }

    pub fn as_signal(&self) -> Option<&T> {
        match self {
            SignalOutcome::Signal(s) => Some(s),
            SignalOutcome::Unavailable { .. } => None,
        }
    }

    pub fn into_signal(self) -> Option<T> {
        match self {
            SignalOutcome::Signal(s) => Some(s),
            SignalOutcome::Unavailable { .. } => None,
        }
    }
}

/// Clamp into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// --- Reports ---

/// A citizen report as handed to the pipeline. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct RawReport {
    pub report_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: GeoPoint,
    pub images: Vec<Bytes>,
    pub created_at: DateTime<Utc>,
}

impl RawReport {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        location: GeoPoint,
        images: Vec<Bytes>,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            location,
            images,
            created_at: Utc::now(),
        }
    }

    /// Title and description joined for text analysis.
    pub fn text(&self) -> String {
        format!("{} {}", self.title.trim(), self.description.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateIndexEntry {
    pub report_id: Uuid,
    pub location: GeoPoint,
    pub embedding: Vec<f32>,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Which inputs were missing when an analysis ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedSignals {
    /// Images submitted but not classified (timeout, decode failure, no model).
    pub image_failures: usize,
    pub text_unavailable: bool,
    pub index_unavailable: bool,
}

impl DegradedSignals {
    pub fn is_degraded(&self) -> bool {
        self.image_failures > 0 || self.text_unavailable || self.index_unavailable
    }
}

/// Final pipeline output for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub report_id: Uuid,
    pub category: String,
    pub confidence: f64,
    pub priority_score: u8,
    pub severity_level: SeverityLevel,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
    pub detected_objects: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency_keywords: Vec<String>,
    pub location_risk_score: f64,
    pub degraded: DegradedSignals,
}

// --- Hotspots ---

/// An open report as supplied by the persistence collaborator for hotspotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenReport {
    pub report_id: Uuid,
    pub location: GeoPoint,
    pub category: String,
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotCluster {
    pub centroid: GeoPoint,
    pub report_count: usize,
    pub avg_severity: f64,
    pub dominant_category: String,
    pub member_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_bengaluru_to_mysuru() {
        // ~125km as the crow flies
        let dist = haversine_km(12.9716, 77.5946, 12.2958, 76.6394);
        assert!(
            (dist - 125.0).abs() < 10.0,
            "Bengaluru to Mysuru should be ~125km, got {dist}"
        );
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let dist = haversine_km(12.9716, 77.5946, 12.9716, 77.5946);
        assert!(dist < 0.001, "Same point should be 0km, got {dist}");
    }

    #[test]
    fn haversine_antipodes_stays_finite() {
        let dist = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!(dist.is_finite());
        assert!((dist - 20015.0).abs() < 5.0, "got {dist}");
    }

    #[test]
    fn geo_point_validity() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(GeoPoint::new(-90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn severity_buckets() {
        assert_eq!(SeverityLevel::from_priority(1), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_priority(2), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_priority(3), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_priority(4), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_priority(5), SeverityLevel::Critical);
    }

    #[test]
    fn sentiment_parse_is_lenient() {
        assert_eq!(Sentiment::parse_lenient(" NEGATIVE "), Sentiment::Negative);
        assert_eq!(Sentiment::parse_lenient("positive"), Sentiment::Positive);
        assert_eq!(Sentiment::parse_lenient("mixed"), Sentiment::Neutral);
    }

    #[test]
    fn category_normalization() {
        assert_eq!(normalize_category("  Pothole "), "pothole");
        assert_eq!(normalize_category("   "), "other");
    }

    #[test]
    fn clamp_unit_handles_nan_and_bounds() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }

    #[test]
    fn report_text_joins_title_and_description() {
        let r = RawReport::new(" Pothole ", "road broken ", GeoPoint::new(0.0, 0.0), vec![]);
        assert_eq!(r.text(), "Pothole road broken");
        let r = RawReport::new("", "only body", GeoPoint::new(0.0, 0.0), vec![]);
        assert_eq!(r.text(), "only body");
    }

    #[test]
    fn severity_serializes_snake_case() {
        let json = serde_json::to_string(&SeverityLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }
}
