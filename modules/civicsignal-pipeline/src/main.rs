use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use civicsignal_common::api::{AnalysisRequest, AnalysisResponse, HotspotRequest, HotspotResponse};
use civicsignal_common::PipelineConfig;
use civicsignal_pipeline::dedup::InMemoryDuplicateIndex;
use civicsignal_pipeline::extractors::{build_extractors, ml_service_client};
use civicsignal_pipeline::hotspot::{HotspotParams, JsonSnapshotSource};
use civicsignal_pipeline::{AnalysisPipeline, PipelineDeps};

#[derive(Parser)]
#[command(name = "civicsignal", about = "Civic issue report analysis")]
struct Cli {
    /// Path to config TOML file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a JSON array of reports in order against one shared index
    Analyze {
        #[arg(long)]
        input: PathBuf,
    },
    /// Cluster a JSON snapshot of open reports into hotspots
    Hotspots {
        #[arg(long)]
        snapshot: PathBuf,
        /// JSON HotspotRequest; flags below override its fields
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        radius_km: Option<f64>,
        #[arg(long)]
        min_reports: Option<usize>,
    },
    /// Check that the remote ML service is up and its models are loaded
    Health,
    /// Print JSON schemas for the request and response types
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Command::Schema => {
            let schemas = serde_json::json!({
                "AnalysisRequest": schemars::schema_for!(AnalysisRequest),
                "AnalysisResponse": schemars::schema_for!(AnalysisResponse),
                "HotspotRequest": schemars::schema_for!(HotspotRequest),
                "HotspotResponse": schemars::schema_for!(HotspotResponse),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        Command::Health => {
            let config = PipelineConfig::load(cli.config.as_deref())?;
            let client = ml_service_client(&config.extractors)?;
            let health = client
                .health()
                .await
                .with_context(|| format!("ML service at {} is unreachable", client.base_url()))?;
            println!("{}", serde_json::to_string_pretty(&health)?);

            let models = &health.models_loaded;
            if !health.is_healthy() {
                bail!("ML service reports status {:?}", health.status);
            }
            if !models.image_classifier || !models.nlp_processor {
                warn!(
                    image_classifier = models.image_classifier,
                    nlp_processor = models.nlp_processor,
                    "ML service is up but some models are not loaded"
                );
            }
        }
        Command::Analyze { input } => {
            let pipeline = build_pipeline(cli.config.as_deref())?;
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let requests: Vec<AnalysisRequest> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", input.display()))?;

            info!(reports = requests.len(), "Analysing reports");
            let mut results = Vec::with_capacity(requests.len());
            for (i, request) in requests.into_iter().enumerate() {
                let outcome = match request.into_raw_report() {
                    Ok(report) => pipeline.analyze(report).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(analysis) => results.push(serde_json::to_value(AnalysisResponse::from(&analysis))?),
                    Err(e) => {
                        warn!(index = i, error = %e, "Report not analysed");
                        results.push(serde_json::json!({ "error": e.to_string() }));
                    }
                }
            }

            println!("{}", serde_json::to_string_pretty(&results)?);
            info!("{}", pipeline.stats());
        }
        Command::Hotspots {
            snapshot,
            request,
            radius_km,
            min_reports,
        } => {
            let pipeline = build_pipeline(cli.config.as_deref())?;
            let mut request = match request {
                Some(path) => {
                    let content = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str::<HotspotRequest>(&content)
                        .with_context(|| format!("Failed to parse {}", path.display()))?
                }
                None => {
                    let defaults = &pipeline.config().hotspots;
                    HotspotRequest {
                        radius_km: defaults.radius_km,
                        min_reports: defaults.min_reports,
                    }
                }
            };
            if let Some(r) = radius_km {
                request.radius_km = r;
            }
            if let Some(m) = min_reports {
                request.min_reports = m;
            }
            let params = HotspotParams::from(&request);

            let clusters = pipeline
                .hotspots(&JsonSnapshotSource::new(snapshot), Some(params))
                .await?;
            let responses: Vec<HotspotResponse> = clusters.iter().map(HotspotResponse::from).collect();
            println!("{}", serde_json::to_string_pretty(&responses)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("civicsignal=info"))?;
    // stdout carries the JSON results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn build_pipeline(config_path: Option<&std::path::Path>) -> Result<AnalysisPipeline> {
    let config = PipelineConfig::load(config_path)?;
    config.log_summary();

    let extractors = build_extractors(&config.extractors)?;
    AnalysisPipeline::new(
        PipelineDeps::builder()
            .extractors(extractors)
            .index(Arc::new(InMemoryDuplicateIndex::new()))
            .config(config)
            .build(),
    )
}
