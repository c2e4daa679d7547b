//! Signal extractor capabilities.
//!
//! ImageClassifier and TextAnalyzer are the only seams between the pipeline and
//! the models behind them. The orchestrator holds them as `Arc<dyn _>` and never
//! sees a concrete backend; `build_extractors` picks one from config.
//!
//! Extractors must not touch the duplicate index, and report failure as
//! `SignalOutcome::Unavailable` rather than an error.

pub mod lexicon;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use civicsignal_common::config::{ExtractorBackend, ExtractorConfig};
use civicsignal_common::{ImageSignal, SignalOutcome, TextSignal};
use ml_client::MlServiceClient;

pub use lexicon::LexiconTextAnalyzer;
pub use remote::{RemoteImageClassifier, RemoteTextAnalyzer};

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify_image(&self, image: &[u8]) -> SignalOutcome<ImageSignal>;
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze_text(&self, text: &str) -> SignalOutcome<TextSignal>;
}

/// Image classifier for deployments without a vision model.
pub struct UnconfiguredImageClassifier;

#[async_trait]
impl ImageClassifier for UnconfiguredImageClassifier {
    async fn classify_image(&self, _image: &[u8]) -> SignalOutcome<ImageSignal> {
        SignalOutcome::unavailable("no image model configured")
    }
}

/// The pair of capabilities injected into the orchestrator.
#[derive(Clone)]
pub struct Extractors {
    pub image: Arc<dyn ImageClassifier>,
    pub text: Arc<dyn TextAnalyzer>,
}

/// Select extractor implementations from configuration.
pub fn build_extractors(config: &ExtractorConfig) -> Result<Extractors> {
    match config.backend {
        ExtractorBackend::Local => {
            info!(embedding_dim = config.embedding_dim, "Using local lexicon extractors");
            Ok(Extractors {
                image: Arc::new(UnconfiguredImageClassifier),
                text: Arc::new(LexiconTextAnalyzer::from_config(config)),
            })
        }
        ExtractorBackend::Remote => {
            let client = ml_service_client(config)?;
            info!(url = client.base_url(), "Using remote ML inference extractors");
            Ok(Extractors {
                image: Arc::new(RemoteImageClassifier::new(client.clone())),
                text: Arc::new(RemoteTextAnalyzer::new(client)),
            })
        }
    }
}

/// HTTP client for the inference service. Requests time out with the
/// extractor budget so an abandoned call never outlives its analysis.
pub fn ml_service_client(config: &ExtractorConfig) -> Result<MlServiceClient> {
    let url = config
        .ml_service_url
        .as_deref()
        .context("remote extractor backend requires ml_service_url")?;
    MlServiceClient::with_timeout(url, Duration::from_millis(config.timeout_ms))
        .context("Failed to build ML service HTTP client")
}
