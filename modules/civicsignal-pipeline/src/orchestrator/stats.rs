use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every analysis run through one pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    analysed: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    degraded_image_runs: AtomicU64,
    degraded_text_runs: AtomicU64,
    index_failures: AtomicU64,
    insert_failures: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_analysed(&self, is_duplicate: bool) {
        self.analysed.fetch_add(1, Ordering::Relaxed);
        if is_duplicate {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_image_failures(&self, count: usize) {
        self.degraded_image_runs.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_text_unavailable(&self) {
        self.degraded_text_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_failure(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert_failure(&self) {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            analysed: self.analysed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            degraded_image_runs: self.degraded_image_runs.load(Ordering::Relaxed),
            degraded_text_runs: self.degraded_text_runs.load(Ordering::Relaxed),
            index_failures: self.index_failures.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub analysed: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub degraded_image_runs: u64,
    pub degraded_text_runs: u64,
    pub index_failures: u64,
    pub insert_failures: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Analysis Summary ===")?;
        writeln!(f, "Reports analysed:   {}", self.analysed)?;
        writeln!(
            f,
            "Duplicates:         {} ({:.0}%)",
            self.duplicates,
            self.duplicates as f64 / self.analysed.max(1) as f64 * 100.0
        )?;
        writeln!(f, "Rejected:           {}", self.rejected)?;
        if self.degraded_image_runs + self.degraded_text_runs > 0 {
            writeln!(f, "\nDegraded extraction:")?;
            writeln!(f, "  Images failed:    {}", self.degraded_image_runs)?;
            writeln!(f, "  Text unavailable: {}", self.degraded_text_runs)?;
        }
        if self.index_failures + self.insert_failures > 0 {
            writeln!(f, "\nIndex:")?;
            writeln!(f, "  Query failures:   {}", self.index_failures)?;
            writeln!(f, "  Insert failures:  {}", self.insert_failures)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::default();
        stats.record_analysed(false);
        stats.record_analysed(true);
        stats.record_image_failures(2);
        stats.record_index_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.analysed, 2);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.degraded_image_runs, 2);
        assert_eq!(snap.index_failures, 1);
    }

    #[test]
    fn display_omits_empty_sections() {
        let clean = StatsSnapshot {
            analysed: 4,
            duplicates: 1,
            ..Default::default()
        };
        let text = clean.to_string();
        assert!(text.contains("Duplicates:         1 (25%)"));
        assert!(!text.contains("Degraded extraction"));
        assert!(!text.contains("Index:"));

        let degraded = StatsSnapshot {
            index_failures: 1,
            ..clean
        };
        assert!(degraded.to_string().contains("Query failures:   1"));
    }
}
