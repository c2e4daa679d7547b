//! Mutual exclusion for duplicate checks in the same neighbourhood.
//!
//! The dedup query and the insert of a novel report must be atomic with
//! respect to other reports close enough to match it, or two concurrent
//! submissions of the same issue both come back novel. A lock covers a
//! geohash-5 cell plus its eight neighbours; any two points within the dedup
//! radius lock at least one common cell. Points near the poles or the
//! antimeridian, where the ring is unreliable, share a single edge lock.
//! Cells are acquired in sorted order so overlapping rings cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use civicsignal_common::config::MAX_DEDUP_RADIUS_KM;
use civicsignal_common::GeoPoint;

use super::index::cell_ring;

const EDGE_KEY: &str = "~edge";
const POLAR_LAT: f64 = 80.0;
const ANTIMERIDIAN_LNG: f64 = 179.5;
const KM_PER_DEGREE: f64 = 111.19;

/// Idle lock entries are dropped once the table grows past this.
const PRUNE_AT: usize = 1024;

pub struct RegionLocks {
    radius_km: f64,
    cells: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the dedup critical section; releases every cell on drop.
pub struct RegionGuard {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RegionGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl RegionLocks {
    pub fn new(radius_km: f64) -> Self {
        Self {
            radius_km: radius_km.clamp(0.0, MAX_DEDUP_RADIUS_KM),
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, location: GeoPoint) -> RegionGuard {
        let keys = self.lock_keys(location);
        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            if cells.len() > PRUNE_AT {
                cells.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|k| cells.entry(k.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for m in mutexes {
            guards.push(m.lock_owned().await);
        }
        debug!(cells = keys.len(), "Region lock acquired");

        RegionGuard {
            keys,
            _guards: guards,
        }
    }

    /// Sorted, deduplicated lock keys for a location.
    pub fn lock_keys(&self, location: GeoPoint) -> Vec<String> {
        let r_lat = self.radius_km / KM_PER_DEGREE;
        // Generous east-west margin: measured a full degree poleward.
        let cos = (location.lat.abs() + 1.0).min(89.0).to_radians().cos();
        let r_lng = self.radius_km / (KM_PER_DEGREE * cos);

        let lat = location.lat.abs();
        let lng = location.lng.abs();
        let near_edge = lat + r_lat > POLAR_LAT || lng + r_lng > ANTIMERIDIAN_LNG;
        let deep_in_edge = lat - r_lat > POLAR_LAT || lng - r_lng > ANTIMERIDIAN_LNG;

        let mut keys = Vec::new();
        if near_edge {
            keys.push(EDGE_KEY.to_string());
        }
        if !deep_in_edge {
            match cell_ring(location) {
                Some(ring) => keys.extend(ring),
                None => keys.push(EDGE_KEY.to_string()),
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shares_key(locks: &RegionLocks, a: GeoPoint, b: GeoPoint) -> bool {
        let ka = locks.lock_keys(a);
        locks.lock_keys(b).iter().any(|k| ka.contains(k))
    }

    #[test]
    fn nearby_points_share_a_cell() {
        let locks = RegionLocks::new(0.1);
        // Straddles a geohash-5 boundary
        assert!(shares_key(
            &locks,
            GeoPoint::new(12.9716, 77.6074),
            GeoPoint::new(12.9716, 77.6076)
        ));
        assert!(shares_key(
            &locks,
            GeoPoint::new(12.9716, 77.5946),
            GeoPoint::new(12.9717, 77.5947)
        ));
    }

    #[test]
    fn distant_points_are_independent() {
        let locks = RegionLocks::new(0.1);
        assert!(!shares_key(
            &locks,
            GeoPoint::new(12.9716, 77.5946),
            GeoPoint::new(13.0827, 80.2707)
        ));
    }

    #[test]
    fn polar_and_antimeridian_points_use_edge_lock() {
        let locks = RegionLocks::new(0.5);
        assert_eq!(locks.lock_keys(GeoPoint::new(89.9, 10.0)), vec![EDGE_KEY]);
        assert!(shares_key(
            &locks,
            GeoPoint::new(10.0, 179.999),
            GeoPoint::new(10.0, -179.999)
        ));
        // Just below the polar band: both the ring and the edge lock
        let keys = locks.lock_keys(GeoPoint::new(79.999, 10.0));
        assert!(keys.contains(&EDGE_KEY.to_string()));
        assert!(keys.len() > 1);
    }

    #[test]
    fn keys_are_sorted() {
        let locks = RegionLocks::new(0.1);
        let keys = locks.lock_keys(GeoPoint::new(12.9716, 77.5946));
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 9);
    }

    #[tokio::test]
    async fn overlapping_lock_waits_for_release() {
        let locks = Arc::new(RegionLocks::new(0.1));
        let here = GeoPoint::new(12.9716, 77.5946);
        let guard = locks.lock(here).await;
        assert_eq!(guard.keys().len(), 9);

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(GeoPoint::new(12.9717, 77.5947)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn distant_lock_does_not_wait() {
        let locks = RegionLocks::new(0.1);
        let _guard = locks.lock(GeoPoint::new(12.9716, 77.5946)).await;
        tokio::time::timeout(
            Duration::from_millis(200),
            locks.lock(GeoPoint::new(13.0827, 80.2707)),
        )
        .await
        .expect("unrelated region should not block");
    }
}
