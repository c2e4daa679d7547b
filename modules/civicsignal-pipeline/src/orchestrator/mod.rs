//! Per-report analysis.
//!
//! One `analyze` call validates the report, fans extraction out to tokio
//! tasks, fuses the signals, checks for duplicates under a region lock,
//! scores priority, and indexes novel reports. Extractor and index failures
//! degrade the result instead of failing it; only invalid input and internal
//! faults reach the caller.

pub mod fusion;
pub mod stage;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use typed_builder::TypedBuilder;

use civicsignal_common::config::PipelineConfig;
use civicsignal_common::{
    AnalysisError, DegradedSignals, DuplicateIndexEntry, HotspotCluster, ImageSignal, RawReport,
    ReportAnalysis, SignalOutcome, TextSignal,
};

use crate::dedup::similarity::is_usable_embedding;
use crate::dedup::{DedupVerdict, DuplicateDetector, DuplicateIndex, RegionLocks};
use crate::extractors::Extractors;
use crate::hotspot::{self, HotspotParams, OpenReportSource};
use crate::priority::{self, PriorityInput};

pub use fusion::{fuse, FusedSignals};
pub use stage::{AnalysisStage, StageTracker};
pub use stats::{PipelineStats, StatsSnapshot};

/// Long-lived collaborators for an `AnalysisPipeline`.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub extractors: Extractors,
    pub index: Arc<dyn DuplicateIndex>,
    #[builder(default)]
    pub config: PipelineConfig,
}

pub struct AnalysisPipeline {
    extractors: Extractors,
    index: Arc<dyn DuplicateIndex>,
    config: PipelineConfig,
    detector: DuplicateDetector,
    locks: RegionLocks,
    stats: PipelineStats,
}

struct Extraction {
    images: Vec<SignalOutcome<ImageSignal>>,
    text: SignalOutcome<TextSignal>,
}

impl AnalysisPipeline {
    pub fn new(deps: PipelineDeps) -> anyhow::Result<Self> {
        deps.config.validate()?;
        Ok(Self {
            detector: DuplicateDetector::new(deps.config.dedup.clone()),
            locks: RegionLocks::new(deps.config.dedup.radius_km),
            extractors: deps.extractors,
            index: deps.index,
            config: deps.config,
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn DuplicateIndex> {
        &self.index
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn analyze(&self, report: RawReport) -> Result<ReportAnalysis, AnalysisError> {
        if let Err(e) = self.validate(&report) {
            warn!(report_id = %report.report_id, error = %e, "Rejected report");
            self.stats.record_rejected();
            return Err(e);
        }

        let span = info_span!("analyze", report_id = %report.report_id);
        self.run(report).instrument(span).await
    }

    /// Cluster the open reports supplied by `source`. Falls back to the
    /// configured defaults when `params` is `None`.
    pub async fn hotspots(
        &self,
        source: &dyn OpenReportSource,
        params: Option<HotspotParams>,
    ) -> Result<Vec<HotspotCluster>, AnalysisError> {
        let params = params.unwrap_or_else(|| HotspotParams::from(&self.config.hotspots));
        params.validate()?;

        let reports = source
            .open_reports()
            .await
            .map_err(|e| AnalysisError::fault(format!("open report snapshot unavailable: {e:#}")))?;
        let clusters = hotspot::aggregate(&reports, &params)?;

        info!(
            reports = reports.len(),
            hotspots = clusters.len(),
            radius_km = params.radius_km,
            min_reports = params.min_reports,
            "Hotspots computed"
        );
        Ok(clusters)
    }

    fn validate(&self, report: &RawReport) -> Result<(), AnalysisError> {
        if !report.location.is_valid() {
            return Err(AnalysisError::invalid(format!(
                "location ({}, {}) is outside lat [-90, 90] / lng [-180, 180]",
                report.location.lat, report.location.lng
            )));
        }
        if report.text().is_empty() {
            return Err(AnalysisError::invalid("title and description are both blank"));
        }
        let max_images = self.config.extractors.max_images;
        if report.images.len() > max_images {
            return Err(AnalysisError::invalid(format!(
                "{} images submitted, at most {max_images} allowed",
                report.images.len()
            )));
        }
        Ok(())
    }

    async fn run(&self, report: RawReport) -> Result<ReportAnalysis, AnalysisError> {
        let mut stage = StageTracker::new();

        // --- Extracting ---

        let extraction = self.extract(&report).await?;
        let mut degraded = DegradedSignals {
            image_failures: extraction.images.iter().filter(|o| !o.is_available()).count(),
            text_unavailable: !extraction.text.is_available(),
            index_unavailable: false,
        };
        if degraded.image_failures > 0 {
            self.stats.record_image_failures(degraded.image_failures);
        }
        if degraded.text_unavailable {
            self.stats.record_text_unavailable();
        }
        let fused = fuse(&extraction.images, &extraction.text);

        // Held through the insert so two reports of the same issue cannot
        // both miss each other.
        let _region = self.locks.lock(report.location).await;

        // --- Deduping ---

        let mut verdict = DedupVerdict::Novel;
        if is_usable_embedding(&fused.embedding) {
            stage.advance(AnalysisStage::Deduping)?;
            match self
                .detector
                .detect(self.index.as_ref(), report.location, &fused.embedding, &fused.category)
                .await
            {
                Ok(v) => verdict = v,
                Err(e) => {
                    warn!(error = %e, "Duplicate check failed, treating report as novel");
                    self.stats.record_index_failure();
                    degraded.index_unavailable = true;
                }
            }
        }

        // --- Scoring ---

        stage.advance(AnalysisStage::Scoring)?;
        let density = match self
            .index
            .count_nearby(report.location, self.config.priority.risk_radius_km)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Density lookup failed, assuming no nearby reports");
                if !degraded.index_unavailable {
                    self.stats.record_index_failure();
                }
                degraded.index_unavailable = true;
                0
            }
        };

        let assessment = priority::score(
            &PriorityInput {
                category: &fused.category,
                urgency_count: fused.urgency_keywords.len(),
                sentiment: fused.sentiment,
                nearby_density: density,
                has_signal: fused.has_signal,
            },
            &self.config.priority,
        );

        let duplicate_of = verdict.duplicate_of();
        let analysis = ReportAnalysis {
            report_id: report.report_id,
            category: fused.category,
            confidence: fused.confidence,
            priority_score: assessment.priority_score,
            severity_level: assessment.severity_level,
            is_duplicate: duplicate_of.is_some(),
            duplicate_of,
            detected_objects: fused.detected_objects,
            sentiment: fused.sentiment,
            urgency_keywords: fused.urgency_keywords,
            location_risk_score: assessment.location_risk_score,
            degraded,
        };

        // --- Done ---

        stage.advance(AnalysisStage::Done)?;
        if !analysis.is_duplicate {
            let entry = DuplicateIndexEntry {
                report_id: report.report_id,
                location: report.location,
                embedding: fused.embedding,
                category: analysis.category.clone(),
                created_at: report.created_at,
            };
            if let Err(e) = self.index.insert(entry).await {
                warn!(error = %e, "Failed to index novel report");
                self.stats.record_insert_failure();
            }
        }

        self.stats.record_analysed(analysis.is_duplicate);
        info!(
            category = analysis.category.as_str(),
            priority = analysis.priority_score,
            severity = %analysis.severity_level,
            is_duplicate = analysis.is_duplicate,
            duplicate_of = ?analysis.duplicate_of,
            degraded = analysis.degraded.is_degraded(),
            "Report analysed"
        );
        Ok(analysis)
    }

    /// Run every extractor concurrently, each under the configured timeout.
    async fn extract(&self, report: &RawReport) -> Result<Extraction, AnalysisError> {
        let limit = Duration::from_millis(self.config.extractors.timeout_ms);

        let image_tasks: Vec<ExtractorTask<ImageSignal>> = report
            .images
            .iter()
            .cloned()
            .map(|bytes| {
                let classifier = self.extractors.image.clone();
                ExtractorTask(tokio::spawn(async move { classifier.classify_image(&bytes).await }))
            })
            .collect();

        let text_task = {
            let analyzer = self.extractors.text.clone();
            let text = report.text();
            ExtractorTask(tokio::spawn(async move { analyzer.analyze_text(&text).await }))
        };

        let (images, text) = tokio::join!(
            join_all(image_tasks.into_iter().map(|h| bounded(h, limit, "image"))),
            bounded(text_task, limit, "text"),
        );

        Ok(Extraction {
            images: images.into_iter().collect::<Result<Vec<_>, _>>()?,
            text: text?,
        })
    }
}

/// A spawned extractor call, aborted when dropped. Dropping the `analyze`
/// future drops these too, so abandoned analyses leave no tasks behind.
struct ExtractorTask<T>(JoinHandle<SignalOutcome<T>>);

impl<T> Drop for ExtractorTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Await an extractor task for at most `limit`. Timeouts abort the task and
/// come back as `Unavailable`; a panic is a fault.
async fn bounded<T>(
    mut task: ExtractorTask<T>,
    limit: Duration,
    extractor: &'static str,
) -> Result<SignalOutcome<T>, AnalysisError> {
    let outcome = match tokio::time::timeout(limit, &mut task.0).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) if e.is_panic() => {
            return Err(AnalysisError::fault(format!("{extractor} extractor panicked")));
        }
        Ok(Err(e)) => SignalOutcome::unavailable(format!("task cancelled: {e}")),
        Err(_) => SignalOutcome::unavailable(format!("timed out after {}ms", limit.as_millis())),
    };

    if let SignalOutcome::Unavailable { reason } = &outcome {
        let err = AnalysisError::ExtractorUnavailable {
            extractor,
            reason: reason.clone(),
        };
        warn!(error = %err, "Continuing without signal");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::InMemoryDuplicateIndex;
    use crate::testing::{report_at, scripted_extractors, text_signal};
    use civicsignal_common::GeoPoint;

    fn pipeline(extractors: Extractors) -> AnalysisPipeline {
        AnalysisPipeline::new(
            PipelineDeps::builder()
                .extractors(extractors)
                .index(Arc::new(InMemoryDuplicateIndex::new()))
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn out_of_range_location_is_rejected() {
        let p = pipeline(scripted_extractors(None, Some(text_signal("pothole", 0.8))));
        for (lat, lng) in [(91.0, 0.0), (0.0, -180.5), (f64::NAN, 0.0)] {
            let mut report = report_at(0.0, 0.0, "Pothole", "deep");
            report.location = GeoPoint::new(lat, lng);
            assert!(matches!(
                p.analyze(report).await,
                Err(AnalysisError::InvalidInput(_))
            ));
        }
        assert_eq!(p.stats().rejected, 3);
        assert_eq!(p.index().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let p = pipeline(scripted_extractors(None, Some(text_signal("pothole", 0.8))));
        let err = p.analyze(report_at(1.0, 1.0, "  ", "\n")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn too_many_images_is_rejected() {
        let p = pipeline(scripted_extractors(None, Some(text_signal("pothole", 0.8))));
        let mut report = report_at(1.0, 1.0, "Pothole", "deep");
        report.images = vec![bytes::Bytes::from_static(b"img"); 11];
        assert!(matches!(
            p.analyze(report).await,
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let mut config = PipelineConfig::default();
        config.dedup.radius_km = 5.0;
        let result = AnalysisPipeline::new(
            PipelineDeps::builder()
                .extractors(scripted_extractors(None, None))
                .index(Arc::new(InMemoryDuplicateIndex::new()))
                .config(config)
                .build(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn hotspots_use_configured_defaults() {
        let p = pipeline(scripted_extractors(None, None));
        let reports: Vec<civicsignal_common::OpenReport> = (0..5)
            .map(|i| civicsignal_common::OpenReport {
                report_id: uuid::Uuid::new_v4(),
                location: GeoPoint::new(12.9716 + i as f64 * 0.0002, 77.5946),
                category: "garbage".into(),
                severity: 2.0,
            })
            .collect();
        let clusters = p.hotspots(&reports, None).await.unwrap();
        assert_eq!(clusters.len(), 1);

        let err = p
            .hotspots(
                &reports,
                Some(HotspotParams {
                    radius_km: 1.0,
                    min_reports: 0,
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }
}
