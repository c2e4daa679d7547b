pub mod dedup;
pub mod extractors;
pub mod hotspot;
pub mod orchestrator;
pub mod priority;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use orchestrator::{AnalysisPipeline, PipelineDeps};
