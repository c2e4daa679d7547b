use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use civicsignal_common::{AnalysisError, DuplicateIndexEntry, GeoPoint};

/// Geohash precision for index buckets and region locks (~4.9km cells).
pub(crate) const CELL_PRECISION: usize = 5;

const KM_PER_DEGREE: f64 = 111.19;

/// A stored entry with its distance from the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyEntry {
    pub entry: DuplicateIndexEntry,
    pub distance_km: f64,
}

/// Spatial store of previously analysed reports, shared by every concurrent
/// analysis. Implementations must be safe under concurrent insert and query.
#[async_trait]
pub trait DuplicateIndex: Send + Sync {
    async fn insert(&self, entry: DuplicateIndexEntry) -> Result<(), AnalysisError>;

    /// Entries within `radius_km` of `location`, nearest first.
    async fn query_nearby(
        &self,
        location: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyEntry>, AnalysisError>;

    /// Number of entries within `radius_km`. Backends with a cheaper count
    /// should override this.
    async fn count_nearby(&self, location: GeoPoint, radius_km: f64) -> Result<usize, AnalysisError> {
        Ok(self.query_nearby(location, radius_km).await?.len())
    }

    async fn len(&self) -> Result<usize, AnalysisError>;
}

/// Process-local index bucketed by geohash-5 cell.
#[derive(Default)]
pub struct InMemoryDuplicateIndex {
    cells: RwLock<HashMap<String, Vec<DuplicateIndexEntry>>>,
}

impl InMemoryDuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a snapshot of previously analysed reports.
    pub fn from_entries(entries: impl IntoIterator<Item = DuplicateIndexEntry>) -> Result<Self, AnalysisError> {
        let index = Self::new();
        {
            let mut cells = index.cells.write().unwrap_or_else(PoisonError::into_inner);
            for entry in entries {
                let key = cell_key(entry.location)?;
                cells.entry(key).or_default().push(entry);
            }
        }
        Ok(index)
    }
}

#[async_trait]
impl DuplicateIndex for InMemoryDuplicateIndex {
    async fn insert(&self, entry: DuplicateIndexEntry) -> Result<(), AnalysisError> {
        let key = cell_key(entry.location)?;
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = cells.entry(key).or_default();
        // Re-inserting a report replaces its previous entry.
        bucket.retain(|e| e.report_id != entry.report_id);
        bucket.push(entry);
        Ok(())
    }

    async fn query_nearby(
        &self,
        location: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyEntry>, AnalysisError> {
        if !location.is_valid() || !radius_km.is_finite() || radius_km < 0.0 {
            return Err(AnalysisError::invalid(format!(
                "bad index query at ({}, {}) radius {radius_km}",
                location.lat, location.lng
            )));
        }

        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        let candidates: Vec<&DuplicateIndexEntry> = match scan_cells(location, radius_km) {
            Some(keys) => keys
                .iter()
                .filter_map(|k| cells.get(k))
                .flatten()
                .collect(),
            None => cells.values().flatten().collect(),
        };

        let mut nearby: Vec<NearbyEntry> = candidates
            .into_iter()
            .filter_map(|e| {
                let distance_km = location.distance_km(&e.location);
                (distance_km <= radius_km).then(|| NearbyEntry {
                    entry: e.clone(),
                    distance_km,
                })
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then(a.entry.created_at.cmp(&b.entry.created_at))
        });
        Ok(nearby)
    }

    async fn len(&self) -> Result<usize, AnalysisError> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cells.values().map(Vec::len).sum())
    }
}

// --- Cell helpers ---

pub(crate) fn cell_key(location: GeoPoint) -> Result<String, AnalysisError> {
    cell_key_at(location, CELL_PRECISION)
}

pub(crate) fn cell_key_at(location: GeoPoint, precision: usize) -> Result<String, AnalysisError> {
    geohash::encode(
        geohash::Coord {
            x: location.lng,
            y: location.lat,
        },
        precision,
    )
    .map_err(|e| AnalysisError::invalid(format!("cannot geohash ({}, {}): {e}", location.lat, location.lng)))
}

/// The cell containing `location` plus its eight neighbours, or `None` when the
/// ring fails to encode (poles, antimeridian).
pub(crate) fn cell_ring(location: GeoPoint) -> Option<Vec<String>> {
    cell_ring_at(location, CELL_PRECISION)
}

pub(crate) fn cell_ring_at(location: GeoPoint, precision: usize) -> Option<Vec<String>> {
    let center = cell_key_at(location, precision).ok()?;
    let n = geohash::neighbors(&center).ok()?;
    Some(vec![center, n.n, n.ne, n.e, n.se, n.s, n.sw, n.w, n.nw])
}

/// Minimum ground distance from a point to the far edge of its neighbour ring.
/// East-west reach shrinks with latitude, so measure at the poleward edge of
/// the ring.
pub(crate) fn ring_reach_km(lat: f64) -> f64 {
    ring_reach_km_at(lat, CELL_PRECISION)
}

pub(crate) fn ring_reach_km_at(lat: f64, precision: usize) -> f64 {
    let (lat_deg, lng_deg) = cell_size_deg(precision);
    let poleward = (lat.abs() + 2.0 * lat_deg).min(90.0);
    let north_south = lat_deg * KM_PER_DEGREE;
    let east_west = lng_deg * KM_PER_DEGREE * poleward.to_radians().cos();
    north_south.min(east_west)
}

/// Cell height and width in degrees. Geohash interleaves bits starting with
/// longitude, so odd bit counts give longitude the extra bit.
fn cell_size_deg(precision: usize) -> (f64, f64) {
    let bits = 5 * precision as i32;
    let lng_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lng_bits))
}

/// Cells to scan for a radius query, or `None` for a full scan.
fn scan_cells(location: GeoPoint, radius_km: f64) -> Option<Vec<String>> {
    if radius_km > ring_reach_km(location.lat) {
        return None;
    }
    cell_ring(location)
}
