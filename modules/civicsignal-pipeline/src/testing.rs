//! Test doubles for extractors and the duplicate index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use civicsignal_common::config::DEFAULT_URGENCY_KEYWORDS;
use civicsignal_common::{
    AnalysisError, DuplicateIndexEntry, GeoPoint, ImageSignal, RawReport, Sentiment, SignalOutcome,
    TextSignal,
};

use crate::dedup::{DuplicateIndex, NearbyEntry};
use crate::extractors::{Extractors, ImageClassifier, LexiconTextAnalyzer, TextAnalyzer};

/// MG Road, Bengaluru.
pub const BENGALURU: GeoPoint = GeoPoint {
    lat: 12.9716,
    lng: 77.5946,
};

pub fn report_at(lat: f64, lng: f64, title: &str, description: &str) -> RawReport {
    RawReport::new(title, description, GeoPoint::new(lat, lng), Vec::new())
}

pub fn text_signal(category: &str, confidence: f64) -> TextSignal {
    TextSignal {
        category: category.into(),
        confidence,
        sentiment: Sentiment::Neutral,
        urgency_keywords: Vec::new(),
        embedding: vec![1.0, 0.0, 0.0],
    }
}

pub fn image_signal(category: &str, confidence: f64, objects: &[&str]) -> ImageSignal {
    ImageSignal {
        category: category.into(),
        confidence,
        detected_objects: objects.iter().map(|s| s.to_string()).collect(),
    }
}

// --- Extractors ---

/// Returns the same outcome for every image.
pub struct ScriptedImageClassifier {
    outcome: SignalOutcome<ImageSignal>,
    pub calls: AtomicUsize,
}

impl ScriptedImageClassifier {
    pub fn new(outcome: SignalOutcome<ImageSignal>) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageClassifier for ScriptedImageClassifier {
    async fn classify_image(&self, _image: &[u8]) -> SignalOutcome<ImageSignal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Returns the same outcome for every text.
pub struct ScriptedTextAnalyzer {
    outcome: SignalOutcome<TextSignal>,
}

impl ScriptedTextAnalyzer {
    pub fn new(outcome: SignalOutcome<TextSignal>) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl TextAnalyzer for ScriptedTextAnalyzer {
    async fn analyze_text(&self, _text: &str) -> SignalOutcome<TextSignal> {
        self.outcome.clone()
    }
}

/// Sleeps before delegating, to exercise extractor timeouts.
pub struct SlowTextAnalyzer<T> {
    pub delay: Duration,
    pub inner: T,
}

#[async_trait]
impl<T: TextAnalyzer> TextAnalyzer for SlowTextAnalyzer<T> {
    async fn analyze_text(&self, text: &str) -> SignalOutcome<TextSignal> {
        tokio::time::sleep(self.delay).await;
        self.inner.analyze_text(text).await
    }
}

pub struct SlowImageClassifier<T> {
    pub delay: Duration,
    pub inner: T,
}

#[async_trait]
impl<T: ImageClassifier> ImageClassifier for SlowImageClassifier<T> {
    async fn classify_image(&self, image: &[u8]) -> SignalOutcome<ImageSignal> {
        tokio::time::sleep(self.delay).await;
        self.inner.classify_image(image).await
    }
}

/// Never returns. Counts how many in-flight calls were dropped, so tests can
/// see whether abandoned extractions are torn down.
#[derive(Default)]
pub struct HangingTextAnalyzer {
    pub dropped: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextAnalyzer for HangingTextAnalyzer {
    async fn analyze_text(&self, _text: &str) -> SignalOutcome<TextSignal> {
        let _counter = DropCounter(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        SignalOutcome::unavailable("woke up")
    }
}

pub struct PanickingImageClassifier;

#[async_trait]
impl ImageClassifier for PanickingImageClassifier {
    async fn classify_image(&self, _image: &[u8]) -> SignalOutcome<ImageSignal> {
        panic!("classifier blew up");
    }
}

/// Scripted outcomes; `None` means the extractor reports Unavailable.
pub fn scripted_extractors(image: Option<ImageSignal>, text: Option<TextSignal>) -> Extractors {
    let image = image
        .map(SignalOutcome::Signal)
        .unwrap_or_else(|| SignalOutcome::unavailable("scripted outage"));
    let text = text
        .map(SignalOutcome::Signal)
        .unwrap_or_else(|| SignalOutcome::unavailable("scripted outage"));
    Extractors {
        image: Arc::new(ScriptedImageClassifier::new(image)),
        text: Arc::new(ScriptedTextAnalyzer::new(text)),
    }
}

/// The local text analyzer with default keywords and no image model.
pub fn lexicon_extractors() -> Extractors {
    let keywords: Vec<String> = DEFAULT_URGENCY_KEYWORDS.iter().map(|s| s.to_string()).collect();
    Extractors {
        image: Arc::new(crate::extractors::UnconfiguredImageClassifier),
        text: Arc::new(LexiconTextAnalyzer::new(&keywords, 256)),
    }
}

// --- Index ---

/// Every operation fails as if the backing store were down.
pub struct FailingIndex;

#[async_trait]
impl DuplicateIndex for FailingIndex {
    async fn insert(&self, _entry: DuplicateIndexEntry) -> Result<(), AnalysisError> {
        Err(AnalysisError::IndexUnavailable("connection refused".into()))
    }

    async fn query_nearby(
        &self,
        _location: GeoPoint,
        _radius_km: f64,
    ) -> Result<Vec<NearbyEntry>, AnalysisError> {
        Err(AnalysisError::IndexUnavailable("connection refused".into()))
    }

    async fn len(&self) -> Result<usize, AnalysisError> {
        Err(AnalysisError::IndexUnavailable("connection refused".into()))
    }
}

/// Delays queries so concurrent analyses overlap inside the dedup window.
pub struct DelayedIndex<I> {
    pub delay: Duration,
    pub inner: I,
}

#[async_trait]
impl<I: DuplicateIndex> DuplicateIndex for DelayedIndex<I> {
    async fn insert(&self, entry: DuplicateIndexEntry) -> Result<(), AnalysisError> {
        self.inner.insert(entry).await
    }

    async fn query_nearby(
        &self,
        location: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyEntry>, AnalysisError> {
        let found = self.inner.query_nearby(location, radius_km).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn len(&self) -> Result<usize, AnalysisError> {
        self.inner.len().await
    }
}
