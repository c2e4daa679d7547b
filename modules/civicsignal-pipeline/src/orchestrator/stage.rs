use civicsignal_common::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisStage {
    Extracting,
    Deduping,
    Scoring,
    Done,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStage::Extracting => write!(f, "extracting"),
            AnalysisStage::Deduping => write!(f, "deduping"),
            AnalysisStage::Scoring => write!(f, "scoring"),
            AnalysisStage::Done => write!(f, "done"),
        }
    }
}

/// Forward-only stage progression for one analysis.
#[derive(Debug)]
pub struct StageTracker {
    current: AnalysisStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: AnalysisStage::Extracting,
        }
    }

    pub fn current(&self) -> AnalysisStage {
        self.current
    }

    /// Move to `next`. Staying put or moving backwards is a pipeline fault.
    pub fn advance(&mut self, next: AnalysisStage) -> Result<(), AnalysisError> {
        if next <= self.current {
            return Err(AnalysisError::fault(format!(
                "illegal stage transition {} -> {next}",
                self.current
            )));
        }
        tracing::debug!(from = %self.current, to = %next, "Stage transition");
        self.current = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_succeed() {
        let mut t = StageTracker::new();
        t.advance(AnalysisStage::Deduping).unwrap();
        t.advance(AnalysisStage::Scoring).unwrap();
        t.advance(AnalysisStage::Done).unwrap();
        assert_eq!(t.current(), AnalysisStage::Done);
    }

    #[test]
    fn skipping_dedup_is_allowed() {
        let mut t = StageTracker::new();
        t.advance(AnalysisStage::Scoring).unwrap();
        assert_eq!(t.current(), AnalysisStage::Scoring);
    }

    #[test]
    fn backward_and_repeat_transitions_fault() {
        let mut t = StageTracker::new();
        t.advance(AnalysisStage::Scoring).unwrap();
        assert!(matches!(
            t.advance(AnalysisStage::Deduping),
            Err(AnalysisError::PipelineFault(_))
        ));
        assert!(t.advance(AnalysisStage::Scoring).is_err());
        assert_eq!(t.current(), AnalysisStage::Scoring);
    }
}
