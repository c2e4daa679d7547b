//! Hotspot aggregation over a snapshot of open reports.
//!
//! Clustering runs in two passes. The seed pass walks reports in input order
//! and opens a cluster wherever a report has at least `min_reports`
//! unclustered reports around it. The reachability pass then attaches every
//! leftover report that is density-covered (a core point, or within the
//! radius of one) to the cluster of its nearest clustered neighbour. The
//! absorbed set ends up equal to the density-covered set, which only grows as
//! the radius grows.
//!
//! Both passes work from per-report neighbourhoods found by bucketing reports
//! into geohash cells and scanning each report's neighbour ring.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use civicsignal_common::api::HotspotRequest;
use civicsignal_common::config::HotspotDefaults;
use civicsignal_common::{AnalysisError, GeoPoint, HotspotCluster, OpenReport};

use crate::dedup::index::{cell_key_at, cell_ring_at, ring_reach_km_at};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotspotParams {
    pub radius_km: f64,
    pub min_reports: usize,
}

impl HotspotParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(AnalysisError::invalid(format!(
                "radius_km must be positive, got {}",
                self.radius_km
            )));
        }
        if self.min_reports == 0 {
            return Err(AnalysisError::invalid("min_reports must be at least 1"));
        }
        Ok(())
    }
}

impl From<&HotspotDefaults> for HotspotParams {
    fn from(d: &HotspotDefaults) -> Self {
        Self {
            radius_km: d.radius_km,
            min_reports: d.min_reports,
        }
    }
}

impl From<&HotspotRequest> for HotspotParams {
    fn from(r: &HotspotRequest) -> Self {
        Self {
            radius_km: r.radius_km,
            min_reports: r.min_reports,
        }
    }
}

/// Supplies the open reports to aggregate.
#[async_trait]
pub trait OpenReportSource: Send + Sync {
    async fn open_reports(&self) -> Result<Vec<OpenReport>>;
}

/// Reads a JSON array of open reports from disk.
pub struct JsonSnapshotSource {
    path: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OpenReportSource for JsonSnapshotSource {
    async fn open_reports(&self) -> Result<Vec<OpenReport>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))
    }
}

#[async_trait]
impl OpenReportSource for Vec<OpenReport> {
    async fn open_reports(&self) -> Result<Vec<OpenReport>> {
        Ok(self.clone())
    }
}

pub fn aggregate(
    reports: &[OpenReport],
    params: &HotspotParams,
) -> Result<Vec<HotspotCluster>, AnalysisError> {
    params.validate()?;

    let reports: Vec<&OpenReport> = reports
        .iter()
        .filter(|r| {
            let ok = r.location.is_valid() && r.severity.is_finite();
            if !ok {
                warn!(report_id = %r.report_id, "Skipping open report with invalid location or severity");
            }
            ok
        })
        .collect();

    let n = reports.len();
    let neighbours = neighbourhoods(&reports, params.radius_km);
    let distance = |i: usize, j: usize| reports[i].location.distance_km(&reports[j].location);

    let mut assigned: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    // --- Seed pass ---

    for i in 0..n {
        if assigned[i].is_some() {
            continue;
        }
        let group: Vec<usize> = neighbours[i]
            .iter()
            .copied()
            .filter(|&j| assigned[j].is_none())
            .collect();
        if group.len() >= params.min_reports {
            let id = clusters.len();
            for &j in &group {
                assigned[j] = Some(id);
            }
            clusters.push(group);
        }
    }

    // --- Reachability pass ---

    let core: Vec<bool> = neighbours
        .iter()
        .map(|around| around.len() >= params.min_reports)
        .collect();
    let covered: Vec<bool> = (0..n)
        .map(|i| core[i] || neighbours[i].iter().any(|&j| core[j]))
        .collect();

    loop {
        let mut changed = false;
        for i in 0..n {
            if assigned[i].is_some() || !covered[i] {
                continue;
            }
            let nearest = neighbours[i]
                .iter()
                .copied()
                .filter(|&j| assigned[j].is_some())
                .min_by(|&a, &b| distance(i, a).total_cmp(&distance(i, b)));
            if let Some(id) = nearest.and_then(|j| assigned[j]) {
                assigned[i] = Some(id);
                clusters[id].push(i);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let hotspots: Vec<HotspotCluster> = clusters
        .into_iter()
        .map(|mut members| {
            members.sort_unstable();
            summarize(&members.iter().map(|&i| reports[i]).collect::<Vec<_>>())
        })
        .collect();

    debug!(
        reports = n,
        clusters = hotspots.len(),
        absorbed = assigned.iter().filter(|a| a.is_some()).count(),
        "Hotspot aggregation complete"
    );
    Ok(hotspots)
}

// --- Neighbourhoods ---

/// Finest geohash precision tried when bucketing.
const MAX_BUCKET_PRECISION: usize = 8;

/// For each report, the indices of every report within `radius_km` of it
/// (itself included), ascending.
fn neighbourhoods(reports: &[&OpenReport], radius_km: f64) -> Vec<Vec<usize>> {
    match bucket_precision(reports, radius_km).and_then(|p| bucketed_neighbourhoods(reports, radius_km, p)) {
        Some(neighbours) => neighbours,
        None => {
            debug!(reports = reports.len(), radius_km, "Falling back to all-pairs neighbourhood scan");
            all_pairs_neighbourhoods(reports, radius_km)
        }
    }
}

/// Finest precision whose neighbour ring covers the radius everywhere in the
/// snapshot, or `None` when no precision does.
fn bucket_precision(reports: &[&OpenReport], radius_km: f64) -> Option<usize> {
    let max_abs_lat = reports.iter().map(|r| r.location.lat.abs()).fold(0.0, f64::max);
    (1..=MAX_BUCKET_PRECISION)
        .rev()
        .find(|&p| ring_reach_km_at(max_abs_lat, p) >= radius_km)
}

/// `None` when any cell or ring fails to encode (poles, antimeridian).
fn bucketed_neighbourhoods(reports: &[&OpenReport], radius_km: f64, precision: usize) -> Option<Vec<Vec<usize>>> {
    let mut cells: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, r) in reports.iter().enumerate() {
        let key = cell_key_at(r.location, precision).ok()?;
        cells.entry(key).or_default().push(i);
    }

    let mut neighbours = Vec::with_capacity(reports.len());
    for r in reports {
        let mut around: Vec<usize> = cell_ring_at(r.location, precision)?
            .iter()
            .filter_map(|key| cells.get(key))
            .flatten()
            .copied()
            .filter(|&j| r.location.distance_km(&reports[j].location) <= radius_km)
            .collect();
        around.sort_unstable();
        around.dedup();
        neighbours.push(around);
    }
    Some(neighbours)
}

fn all_pairs_neighbourhoods(reports: &[&OpenReport], radius_km: f64) -> Vec<Vec<usize>> {
    reports
        .iter()
        .map(|r| {
            (0..reports.len())
                .filter(|&j| r.location.distance_km(&reports[j].location) <= radius_km)
                .collect()
        })
        .collect()
}

/// Members must be non-empty and in input order.
fn summarize(members: &[&OpenReport]) -> HotspotCluster {
    let count = members.len() as f64;
    let lat = members.iter().map(|r| r.location.lat).sum::<f64>() / count;
    let lng = members.iter().map(|r| r.location.lng).sum::<f64>() / count;
    let avg_severity = members.iter().map(|r| r.severity).sum::<f64>() / count;

    // Tally in first-appearance order so max_by_key ties keep the earliest.
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for r in members {
        let category = r.category.as_str();
        match tally.iter_mut().find(|entry| entry.0 == category) {
            Some(entry) => entry.1 += 1,
            None => tally.push((category, 1)),
        }
    }
    let mut dominant = tally[0];
    for entry in &tally[1..] {
        if entry.1 > dominant.1 {
            dominant = *entry;
        }
    }

    HotspotCluster {
        centroid: GeoPoint::new(lat, lng),
        report_count: members.len(),
        avg_severity,
        dominant_category: dominant.0.to_string(),
        member_ids: members.iter().map(|r| r.report_id).collect(),
    }
}
