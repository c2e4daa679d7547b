//! Priority scoring.
//!
//! `score` is pure and total: every input maps to a priority in 1..=5 and a
//! location risk in [0, 1]. Density is looked up by the orchestrator and
//! passed in, so nothing here touches the index.

use civicsignal_common::config::PriorityConfig;
use civicsignal_common::{Sentiment, SeverityLevel};

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityInput<'a> {
    pub category: &'a str,
    pub urgency_count: usize,
    pub sentiment: Sentiment,
    /// Reports already indexed within `risk_radius_km`.
    pub nearby_density: usize,
    /// False when no extractor produced anything usable.
    pub has_signal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityAssessment {
    pub priority_score: u8,
    pub severity_level: SeverityLevel,
    pub location_risk_score: f64,
}

pub fn location_risk(density: usize, decay: f64) -> f64 {
    if !decay.is_finite() || decay <= 0.0 {
        return 0.0;
    }
    (1.0 - (-decay * density as f64).exp()).clamp(0.0, 1.0)
}

pub fn score(input: &PriorityInput<'_>, config: &PriorityConfig) -> PriorityAssessment {
    let risk = location_risk(input.nearby_density, config.risk_decay);

    if !input.has_signal {
        return PriorityAssessment {
            priority_score: 1,
            severity_level: SeverityLevel::Low,
            location_risk_score: risk,
        };
    }

    let urgency = input.urgency_count.min(config.urgency_cap) as f64 * config.urgency_weight;
    let sentiment_bonus = if input.sentiment == Sentiment::Negative {
        config.negative_sentiment_bonus
    } else {
        0.0
    };
    let raw = config.base_for(input.category) + urgency + sentiment_bonus + config.risk_weight * risk;

    let priority_score = round_to_priority(raw);
    PriorityAssessment {
        priority_score,
        severity_level: SeverityLevel::from_priority(priority_score),
        location_risk_score: risk,
    }
}

/// Round half up, then clamp into 1..=5. NaN lands on 1.
fn round_to_priority(raw: f64) -> u8 {
    let rounded = (raw + 0.5).floor();
    if rounded.is_nan() {
        return 1;
    }
    rounded.clamp(1.0, 5.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category: &str, urgency_count: usize, sentiment: Sentiment) -> PriorityInput<'_> {
        PriorityInput {
            category,
            urgency_count,
            sentiment,
            nearby_density: 0,
            has_signal: true,
        }
    }

    #[test]
    fn urgent_negative_pothole_is_critical() {
        // 2.5 + 2 + 0.5 = 5.0
        let a = score(&input("pothole", 2, Sentiment::Negative), &PriorityConfig::default());
        assert_eq!(a.priority_score, 5);
        assert_eq!(a.severity_level, SeverityLevel::Critical);
        assert_eq!(a.location_risk_score, 0.0);
    }

    #[test]
    fn quiet_garbage_report_is_low() {
        // 1.5 rounds half up to 2
        let a = score(&input("garbage", 0, Sentiment::Neutral), &PriorityConfig::default());
        assert_eq!(a.priority_score, 2);
        assert_eq!(a.severity_level, SeverityLevel::Low);
    }

    #[test]
    fn urgency_is_capped() {
        let config = PriorityConfig::default();
        let three = score(&input("other", 3, Sentiment::Neutral), &config);
        let ten = score(&input("other", 10, Sentiment::Neutral), &config);
        assert_eq!(three.priority_score, 4);
        assert_eq!(ten.priority_score, 4);
    }

    #[test]
    fn urgency_never_lowers_priority() {
        let config = PriorityConfig::default();
        for category in ["pothole", "garbage", "streetlight", "water", "road", "other", "graffiti"] {
            for sentiment in [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive] {
                for density in [0, 3, 40] {
                    let mut calm = input(category, 0, sentiment);
                    calm.nearby_density = density;
                    let mut urgent = calm.clone();
                    urgent.urgency_count = 3;
                    assert!(score(&urgent, &config).priority_score >= score(&calm, &config).priority_score);
                }
            }
        }
    }

    #[test]
    fn unknown_category_uses_other_base() {
        let config = PriorityConfig::default();
        assert_eq!(
            score(&input("graffiti", 1, Sentiment::Neutral), &config),
            score(&input("other", 1, Sentiment::Neutral), &config)
        );
    }

    #[test]
    fn density_raises_risk() {
        let config = PriorityConfig::default();
        let mut a = input("streetlight", 0, Sentiment::Neutral);
        a.nearby_density = 10;
        let assessed = score(&a, &config);
        // 1 - e^-1.5 ~ 0.777; 2.0 + 0.777 rounds to 3
        assert!((assessed.location_risk_score - 0.7769).abs() < 1e-3);
        assert_eq!(assessed.priority_score, 3);
        assert_eq!(assessed.severity_level, SeverityLevel::Medium);
    }

    #[test]
    fn no_signal_is_lowest_priority_but_reports_risk() {
        let mut a = input("pothole", 3, Sentiment::Negative);
        a.has_signal = false;
        a.nearby_density = 5;
        let assessed = score(&a, &PriorityConfig::default());
        assert_eq!(assessed.priority_score, 1);
        assert_eq!(assessed.severity_level, SeverityLevel::Low);
        assert!(assessed.location_risk_score > 0.0);
    }

    #[test]
    fn outputs_stay_in_range_for_extreme_config() {
        let mut config = PriorityConfig::default();
        config.urgency_weight = 100.0;
        config.base_severity.insert("other".into(), -50.0);
        let high = score(&input("pothole", 3, Sentiment::Negative), &config);
        let low = score(&input("other", 0, Sentiment::Neutral), &config);
        assert_eq!(high.priority_score, 5);
        assert_eq!(low.priority_score, 1);

        assert_eq!(location_risk(usize::MAX, 0.15), 1.0);
        assert_eq!(location_risk(10, 0.0), 0.0);
        assert_eq!(round_to_priority(f64::NAN), 1);
    }
}
