use civicsignal_common::{
    category, clamp_unit, normalize_category, ImageSignal, Sentiment, SignalOutcome, TextSignal,
};

/// Signals from every modality merged into one view of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedSignals {
    pub category: String,
    pub confidence: f64,
    pub detected_objects: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency_keywords: Vec<String>,
    pub embedding: Vec<f32>,
    /// At least one extractor produced a signal.
    pub has_signal: bool,
}

/// Category comes from the most confident signal. Images are considered
/// first and win ties, so text only overrides with strictly higher
/// confidence.
pub fn fuse(images: &[SignalOutcome<ImageSignal>], text: &SignalOutcome<TextSignal>) -> FusedSignals {
    let mut best: Option<(&str, f64)> = None;
    let mut detected_objects: Vec<String> = Vec::new();

    for image in images.iter().filter_map(SignalOutcome::as_signal) {
        let confidence = clamp_unit(image.confidence);
        if best.is_none_or(|(_, c)| confidence > c) {
            best = Some((image.category.as_str(), confidence));
        }
        for obj in &image.detected_objects {
            if !detected_objects.contains(obj) {
                detected_objects.push(obj.clone());
            }
        }
    }

    let text = text.as_signal();
    if let Some(t) = text {
        let confidence = clamp_unit(t.confidence);
        if best.is_none_or(|(_, c)| confidence > c) {
            best = Some((t.category.as_str(), confidence));
        }
    }

    let has_signal = best.is_some();
    let (chosen, confidence) = best.unwrap_or((category::OTHER, 0.0));

    FusedSignals {
        category: normalize_category(chosen),
        confidence,
        detected_objects,
        sentiment: text.map(|t| t.sentiment).unwrap_or_default(),
        urgency_keywords: text.map(|t| t.urgency_keywords.clone()).unwrap_or_default(),
        embedding: text.map(|t| t.embedding.clone()).unwrap_or_default(),
        has_signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(category: &str, confidence: f64, objects: &[&str]) -> SignalOutcome<ImageSignal> {
        SignalOutcome::Signal(ImageSignal {
            category: category.into(),
            confidence,
            detected_objects: objects.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn text(category: &str, confidence: f64) -> SignalOutcome<TextSignal> {
        SignalOutcome::Signal(TextSignal {
            category: category.into(),
            confidence,
            sentiment: Sentiment::Negative,
            urgency_keywords: vec!["urgent".into()],
            embedding: vec![0.6, 0.8],
        })
    }

    #[test]
    fn most_confident_signal_sets_category() {
        let fused = fuse(&[image("pothole", 0.6, &[])], &text("water", 0.9));
        assert_eq!(fused.category, "water");
        assert_eq!(fused.confidence, 0.9);
        assert_eq!(fused.embedding, vec![0.6, 0.8]);
        assert_eq!(fused.sentiment, Sentiment::Negative);
    }

    #[test]
    fn image_wins_ties() {
        let fused = fuse(&[image("pothole", 0.7, &[])], &text("road", 0.7));
        assert_eq!(fused.category, "pothole");
    }

    #[test]
    fn objects_are_unioned_in_order() {
        let fused = fuse(
            &[
                image("garbage", 0.5, &["bin", "bag"]),
                SignalOutcome::unavailable("timeout"),
                image("garbage", 0.8, &["bag", "dog"]),
            ],
            &SignalOutcome::unavailable("down"),
        );
        assert_eq!(fused.detected_objects, vec!["bin", "bag", "dog"]);
        assert_eq!(fused.confidence, 0.8);
        assert!(fused.embedding.is_empty());
        assert_eq!(fused.sentiment, Sentiment::Neutral);
        assert!(fused.urgency_keywords.is_empty());
    }

    #[test]
    fn category_is_normalized_and_confidence_clamped() {
        let fused = fuse(&[image(" Pothole ", 3.0, &[])], &text("road", f64::NAN));
        assert_eq!(fused.category, "pothole");
        assert_eq!(fused.confidence, 1.0);
    }

    #[test]
    fn nothing_available_is_other_with_zero_confidence() {
        let fused = fuse(&[SignalOutcome::unavailable("x")], &SignalOutcome::unavailable("y"));
        assert!(!fused.has_signal);
        assert_eq!(fused.category, "other");
        assert_eq!(fused.confidence, 0.0);
    }
}
