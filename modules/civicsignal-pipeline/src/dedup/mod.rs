//! Duplicate index, region locks, and the duplicate decision.

pub mod detector;
pub mod index;
pub mod region_lock;
pub mod similarity;

pub use detector::{DedupVerdict, DuplicateDetector};
pub use index::{DuplicateIndex, InMemoryDuplicateIndex, NearbyEntry};
pub use region_lock::{RegionGuard, RegionLocks};
