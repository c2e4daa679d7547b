pub mod api;
pub mod config;
pub mod error;
pub mod types;

pub use api::*;
pub use config::PipelineConfig;
pub use error::AnalysisError;
pub use types::*;
