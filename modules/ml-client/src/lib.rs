pub mod error;
pub mod types;

pub use error::{MlClientError, Result};
pub use types::{HealthStatus, ImageClassification, ModelsLoaded, TextAnalysis};

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use types::TextAnalysisRequest;

/// Client for the ML inference service (image classifier + NLP processor).
#[derive(Clone)]
pub struct MlServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl MlServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client whose requests give up after `timeout`, connect included.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self::new(base_url).with_http_client(client))
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        read_json(resp).await
    }

    /// Classify a civic issue from raw image bytes.
    pub async fn classify_image(&self, image: &[u8]) -> Result<ImageClassification> {
        let url = format!("{}/api/analyze/image", self.base_url);
        let mime = sniff_image_mime(image);
        let part = Part::bytes(image.to_vec())
            .file_name(format!("report.{}", mime.trim_start_matches("image/")))
            .mime_str(mime)?;
        let form = Form::new().part("file", part);

        tracing::debug!(bytes = image.len(), mime, "ML image classification request");

        let resp = self.client.post(&url).multipart(form).send().await?;
        read_json(resp).await
    }

    /// Category, sentiment, urgency keywords and embedding for a text.
    pub async fn analyze_text(&self, text: &str) -> Result<TextAnalysis> {
        let url = format!("{}/api/analyze/text", self.base_url);

        tracing::debug!(chars = text.len(), "ML text analysis request");

        let resp = self
            .client
            .post(&url)
            .json(&TextAnalysisRequest { text })
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MlClientError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Pick a MIME type from the file magic. The service rejects non-image uploads,
/// so unknown payloads are labelled JPEG and left for the model to judge.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
