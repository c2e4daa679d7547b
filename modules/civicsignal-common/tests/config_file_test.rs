//! Loads the example config shipped with the repo.
//!
//! Run with: cargo test -p civicsignal-common --test config_file_test

use std::path::PathBuf;

use civicsignal_common::config::ExtractorBackend;
use civicsignal_common::PipelineConfig;

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/civicsignal.example.toml")
}

#[test]
fn example_config_parses_and_validates() {
    let config = PipelineConfig::from_file(&example_path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.extractors.backend, ExtractorBackend::Local);
    assert_eq!(config.dedup.threshold_for("garbage"), 0.7);
    assert_eq!(config.dedup.threshold_for("pothole"), 0.75);
    assert_eq!(config.priority.base_for("streetlight"), 2.0);
    assert_eq!(config.hotspots.min_reports, 5);
}

#[test]
fn example_config_matches_defaults_elsewhere() {
    let config = PipelineConfig::from_file(&example_path()).unwrap();
    let defaults = PipelineConfig::default();
    assert_eq!(config.priority.base_severity, defaults.priority.base_severity);
    assert_eq!(config.extractors.urgency_keywords, defaults.extractors.urgency_keywords);
}

#[test]
fn missing_file_is_reported_with_path() {
    let err = PipelineConfig::from_file(&PathBuf::from("/nonexistent/civicsignal.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/civicsignal.toml"));
}
