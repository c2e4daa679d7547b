use tracing::debug;
use uuid::Uuid;

use civicsignal_common::config::DedupConfig;
use civicsignal_common::{AnalysisError, GeoPoint};

use super::index::{DuplicateIndex, NearbyEntry};
use super::similarity::cosine_similarity;

#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    Novel,
    Duplicate { of: Uuid, similarity: f64 },
}

impl DedupVerdict {
    pub fn duplicate_of(&self) -> Option<Uuid> {
        match self {
            DedupVerdict::Duplicate { of, .. } => Some(*of),
            DedupVerdict::Novel => None,
        }
    }
}

/// Decides whether a report restates one already in the index. Candidates
/// come from a radius query; each is scored on proximity and embedding
/// similarity, and the best one above the category threshold wins.
pub struct DuplicateDetector {
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Query the index and decide. Index errors propagate; the caller owns
    /// the fail-open policy.
    pub async fn detect(
        &self,
        index: &dyn DuplicateIndex,
        location: GeoPoint,
        embedding: &[f32],
        category: &str,
    ) -> Result<DedupVerdict, AnalysisError> {
        let candidates = index.query_nearby(location, self.config.radius_km).await?;
        Ok(self.decide(embedding, category, &candidates))
    }

    pub fn decide(&self, embedding: &[f32], category: &str, candidates: &[NearbyEntry]) -> DedupVerdict {
        let threshold = self.config.threshold_for(category);
        let mut best: Option<(&NearbyEntry, f64)> = None;

        for candidate in candidates {
            if candidate.distance_km > self.config.radius_km {
                continue;
            }
            let score = self.combined_similarity(candidate.distance_km, embedding, &candidate.entry.embedding);
            if score <= threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((held, held_score)) => {
                    score > held_score
                        || (score == held_score && candidate.entry.created_at < held.entry.created_at)
                }
            };
            if better {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((candidate, similarity)) => {
                debug!(
                    of = %candidate.entry.report_id,
                    similarity,
                    distance_km = candidate.distance_km,
                    "Duplicate match"
                );
                DedupVerdict::Duplicate {
                    of: candidate.entry.report_id,
                    similarity,
                }
            }
            None => DedupVerdict::Novel,
        }
    }

    /// Weighted blend of proximity (1 at the same spot, 0 at the radius) and
    /// embedding cosine, in [0, 1].
    pub fn combined_similarity(&self, distance_km: f64, a: &[f32], b: &[f32]) -> f64 {
        let (geo_w, sem_w) = self.config.normalized_weights();
        let geo = if self.config.radius_km > 0.0 {
            (1.0 - distance_km / self.config.radius_km).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let semantic = cosine_similarity(a, b).clamp(0.0, 1.0);
        (geo_w * geo + sem_w * semantic).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use civicsignal_common::DuplicateIndexEntry;

    fn candidate(distance_km: f64, embedding: Vec<f32>, category: &str) -> NearbyEntry {
        NearbyEntry {
            entry: DuplicateIndexEntry {
                report_id: Uuid::new_v4(),
                location: GeoPoint::new(0.0, 0.0),
                embedding,
                category: category.into(),
                created_at: Utc::now(),
            },
            distance_km,
        }
    }

    fn detector() -> DuplicateDetector {
        DuplicateDetector::new(DedupConfig::default())
    }

    #[test]
    fn same_spot_same_text_is_duplicate() {
        let c = candidate(0.0, vec![1.0, 0.0], "pothole");
        let verdict = detector().decide(&[1.0, 0.0], "pothole", std::slice::from_ref(&c));
        assert_eq!(verdict.duplicate_of(), Some(c.entry.report_id));
    }

    #[test]
    fn same_spot_different_text_is_novel() {
        // geo 1.0 * 0.4 + semantic 0.0 * 0.6 = 0.4
        let c = candidate(0.0, vec![0.0, 1.0], "pothole");
        assert_eq!(detector().decide(&[1.0, 0.0], "pothole", &[c]), DedupVerdict::Novel);
    }

    #[test]
    fn same_text_at_radius_edge_is_novel() {
        // geo 0.0 + semantic 0.6 = 0.6
        let c = candidate(0.1, vec![1.0, 0.0], "pothole");
        assert_eq!(detector().decide(&[1.0, 0.0], "pothole", &[c]), DedupVerdict::Novel);
    }

    #[test]
    fn score_equal_to_threshold_is_not_duplicate() {
        let d = DuplicateDetector::new(DedupConfig {
            threshold: 0.4,
            ..DedupConfig::default()
        });
        let c = candidate(0.0, vec![0.0, 1.0], "pothole");
        assert_eq!(d.decide(&[1.0, 0.0], "pothole", &[c]), DedupVerdict::Novel);
    }

    #[test]
    fn category_threshold_override() {
        let mut config = DedupConfig::default();
        config.category_thresholds.insert("garbage".into(), 0.3);
        let d = DuplicateDetector::new(config);
        let c = candidate(0.0, vec![0.0, 1.0], "garbage");
        assert!(matches!(
            d.decide(&[1.0, 0.0], "garbage", std::slice::from_ref(&c)),
            DedupVerdict::Duplicate { .. }
        ));
        assert_eq!(d.decide(&[1.0, 0.0], "pothole", &[c]), DedupVerdict::Novel);
    }

    #[test]
    fn best_candidate_wins_and_ties_go_to_earliest() {
        let close = candidate(0.01, vec![1.0, 0.0], "pothole");
        let closer = candidate(0.0, vec![1.0, 0.0], "pothole");
        let verdict = detector().decide(&[1.0, 0.0], "pothole", &[close, closer.clone()]);
        assert_eq!(verdict.duplicate_of(), Some(closer.entry.report_id));

        let mut newer = candidate(0.0, vec![1.0, 0.0], "pothole");
        let mut older = candidate(0.0, vec![1.0, 0.0], "pothole");
        older.entry.created_at = newer.entry.created_at - Duration::hours(1);
        newer.entry.created_at = older.entry.created_at + Duration::hours(1);
        let verdict = detector().decide(&[1.0, 0.0], "pothole", &[newer, older.clone()]);
        assert_eq!(verdict.duplicate_of(), Some(older.entry.report_id));
    }

    #[test]
    fn candidates_outside_radius_are_ignored() {
        let c = candidate(0.2, vec![1.0, 0.0], "pothole");
        assert_eq!(detector().decide(&[1.0, 0.0], "pothole", &[c]), DedupVerdict::Novel);
    }

    #[test]
    fn empty_candidate_embedding_scores_geo_only() {
        let c = candidate(0.0, vec![], "pothole");
        let score = detector().combined_similarity(c.distance_km, &[1.0, 0.0], &c.entry.embedding);
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn anti_correlated_embeddings_clamp_to_zero() {
        let score = detector().combined_similarity(0.1, &[1.0, 0.0], &[-1.0, 0.0]);
        assert_eq!(score, 0.0);
    }
}
