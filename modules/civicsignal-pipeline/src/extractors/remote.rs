use async_trait::async_trait;
use tracing::warn;

use civicsignal_common::{clamp_unit, normalize_category, ImageSignal, Sentiment, SignalOutcome, TextSignal};
use ml_client::{ImageClassification, MlServiceClient, TextAnalysis};

use super::{ImageClassifier, TextAnalyzer};

/// Image classification via the ML inference service.
pub struct RemoteImageClassifier {
    client: MlServiceClient,
}

impl RemoteImageClassifier {
    pub fn new(client: MlServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageClassifier for RemoteImageClassifier {
    async fn classify_image(&self, image: &[u8]) -> SignalOutcome<ImageSignal> {
        if image.is_empty() {
            return SignalOutcome::unavailable("empty image payload");
        }
        match self.client.classify_image(image).await {
            Ok(resp) => SignalOutcome::Signal(image_signal(resp)),
            Err(e) => {
                warn!(error = %e, "Remote image classification failed");
                SignalOutcome::unavailable(e.to_string())
            }
        }
    }
}

/// Text analysis via the ML inference service.
pub struct RemoteTextAnalyzer {
    client: MlServiceClient,
}

impl RemoteTextAnalyzer {
    pub fn new(client: MlServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextAnalyzer for RemoteTextAnalyzer {
    async fn analyze_text(&self, text: &str) -> SignalOutcome<TextSignal> {
        if text.trim().is_empty() {
            return SignalOutcome::unavailable("no analysable text");
        }
        match self.client.analyze_text(text).await {
            Ok(resp) => SignalOutcome::Signal(text_signal(resp)),
            Err(e) => {
                warn!(error = %e, "Remote text analysis failed");
                SignalOutcome::unavailable(e.to_string())
            }
        }
    }
}

fn image_signal(resp: ImageClassification) -> ImageSignal {
    let mut objects: Vec<String> = Vec::new();
    for obj in resp.objects {
        let obj = obj.trim().to_lowercase();
        if !obj.is_empty() && !objects.contains(&obj) {
            objects.push(obj);
        }
    }
    ImageSignal {
        category: normalize_category(&resp.category),
        confidence: clamp_unit(resp.confidence),
        detected_objects: objects,
    }
}

fn text_signal(resp: TextAnalysis) -> TextSignal {
    let mut keywords: Vec<String> = Vec::new();
    for kw in resp.urgency_keywords {
        let kw = kw.trim().to_lowercase();
        if !kw.is_empty() && !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    let embedding = if resp.embedding.iter().all(|x| x.is_finite()) {
        resp.embedding
    } else {
        Vec::new()
    };
    TextSignal {
        category: normalize_category(&resp.category),
        confidence: clamp_unit(resp.confidence),
        sentiment: Sentiment::parse_lenient(&resp.sentiment),
        urgency_keywords: keywords,
        embedding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_response_is_normalized() {
        let signal = image_signal(ImageClassification {
            category: " Pothole".into(),
            confidence: 1.4,
            objects: vec!["Road".into(), "road".into(), " ".into(), "cone".into()],
        });
        assert_eq!(signal.category, "pothole");
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.detected_objects, vec!["road", "cone"]);
    }

    #[test]
    fn text_response_is_normalized() {
        let signal = text_signal(TextAnalysis {
            category: "".into(),
            confidence: -0.5,
            sentiment: "NEGATIVE".into(),
            urgency_keywords: vec!["Urgent".into(), "urgent".into()],
            embedding: vec![0.1, f32::NAN],
        });
        assert_eq!(signal.category, "other");
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.sentiment, Sentiment::Negative);
        assert_eq!(signal.urgency_keywords, vec!["urgent"]);
        assert!(signal.embedding.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_unavailable() {
        let analyzer = RemoteTextAnalyzer::new(MlServiceClient::new("http://127.0.0.1:9"));
        let outcome = analyzer.analyze_text("garbage pile").await;
        assert!(!outcome.is_available());
    }
}
