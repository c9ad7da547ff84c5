//! Storage boundary for the shared distribution/boundary snapshot.
//!
//! Readers take an `Arc` to the current snapshot and keep computing against
//! it even if a newer one is published meanwhile. Publishing builds a whole
//! new snapshot and swaps the pointer, so no reader ever sees a distribution
//! paired with another epoch's boundaries.

use std::sync::{Arc, RwLock};

use crate::boundary::TierBoundaries;
use crate::distribution::PerformanceDistribution;
use crate::error::{MechanismError, Result};
use crate::logging::{self, obj, v_num, Domain, Level};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct MechanismSnapshot {
    pub distribution: Arc<PerformanceDistribution>,
    pub boundaries: TierBoundaries,
}

impl MechanismSnapshot {
    /// Fresh distribution with no boundaries solved yet.
    pub fn unsolved(distribution: PerformanceDistribution) -> Self {
        let epoch = distribution.epoch;
        Self {
            distribution: Arc::new(distribution),
            boundaries: TierBoundaries::invalid(epoch),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.boundaries.epoch.max(self.distribution.epoch)
    }
}

/// The storage collaborator: hands out the current snapshot and accepts
/// periodic updates.
pub trait SnapshotSource: Send + Sync {
    fn current(&self) -> Arc<MechanismSnapshot>;

    fn publish_boundaries(&self, upper_root: f64, lower_root: f64, epoch: u64) -> Result<()>;

    fn publish_distribution(&self, distribution: PerformanceDistribution) -> Result<()>;
}

pub struct InMemorySnapshotStore {
    inner: RwLock<Arc<MechanismSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new(distribution: PerformanceDistribution) -> Self {
        Self {
            inner: RwLock::new(Arc::new(MechanismSnapshot::unsolved(distribution))),
        }
    }

    fn swap(&self, f: impl FnOnce(&MechanismSnapshot) -> Result<MechanismSnapshot>) -> Result<()> {
        // A panicked writer never leaves a half-built snapshot behind, so a
        // poisoned lock still guards a consistent value.
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let next = f(&guard)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl SnapshotSource for InMemorySnapshotStore {
    fn current(&self) -> Arc<MechanismSnapshot> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Boundaries must carry the held distribution's epoch and are accepted
    /// once per distribution.
    fn publish_boundaries(&self, upper_root: f64, lower_root: f64, epoch: u64) -> Result<()> {
        let boundaries = TierBoundaries::published(upper_root, lower_root, epoch)?;
        self.swap(|current| {
            let held = current.distribution.epoch;
            if epoch != held {
                return Err(MechanismError::EpochMismatch {
                    distribution: held,
                    proposed: epoch,
                });
            }
            if current.boundaries.valid {
                return Err(MechanismError::StaleEpoch {
                    current: current.boundaries.epoch,
                    proposed: epoch,
                });
            }
            Ok(MechanismSnapshot {
                distribution: Arc::clone(&current.distribution),
                boundaries,
            })
        })?;
        logging::log(
            Level::Info,
            Domain::Snapshot,
            "boundaries_published",
            obj(&[
                ("epoch", json!(epoch)),
                ("upper_root", v_num(upper_root)),
                ("lower_root", v_num(lower_root)),
            ]),
        );
        Ok(())
    }

    /// Replaces the distribution and invalidates the boundaries solved for
    /// the previous one.
    fn publish_distribution(&self, distribution: PerformanceDistribution) -> Result<()> {
        let epoch = distribution.epoch;
        let digest = distribution.digest();
        self.swap(|current| {
            if epoch <= current.distribution.epoch {
                return Err(MechanismError::StaleEpoch {
                    current: current.distribution.epoch,
                    proposed: epoch,
                });
            }
            Ok(MechanismSnapshot::unsolved(distribution))
        })?;
        logging::log(
            Level::Info,
            Domain::Snapshot,
            "distribution_published",
            obj(&[("epoch", json!(epoch)), ("digest", json!(digest))]),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dist(epoch: u64) -> PerformanceDistribution {
        PerformanceDistribution::from_summary(90.0, 5.0, 75.0, 100.0, 10, epoch).unwrap()
    }

    #[test]
    fn test_new_store_is_unsolved() {
        let store = InMemorySnapshotStore::new(dist(1));
        let snap = store.current();
        assert!(!snap.boundaries.valid);
        assert_eq!(snap.epoch(), 1);
    }

    #[test]
    fn test_publish_boundaries_once_per_distribution() {
        let store = InMemorySnapshotStore::new(dist(4));
        store.publish_boundaries(92.0, 81.0, 4).unwrap();
        assert!(store.current().boundaries.valid);
        assert_eq!(store.current().boundaries.gap_width, 11.0);

        let err = store.publish_boundaries(93.0, 80.0, 4);
        assert!(matches!(err, Err(MechanismError::StaleEpoch { current: 4, proposed: 4 })));
        assert_eq!(store.current().boundaries.upper_root, 92.0);
    }

    #[test]
    fn test_boundaries_must_match_distribution_epoch() {
        let store = InMemorySnapshotStore::new(dist(4));
        let err = store.publish_boundaries(93.0, 80.0, 9);
        assert!(matches!(err, Err(MechanismError::EpochMismatch { distribution: 4, proposed: 9 })));
        assert!(store.publish_boundaries(93.0, 80.0, 3).is_err());
        assert!(!store.current().boundaries.valid);

        store.publish_boundaries(93.0, 80.0, 4).unwrap();
        let snap = store.current();
        assert_eq!(snap.boundaries.epoch, snap.distribution.epoch);
    }

    #[test]
    fn test_publish_distribution_resets_boundaries() {
        let store = InMemorySnapshotStore::new(dist(1));
        store.publish_boundaries(92.0, 81.0, 1).unwrap();
        store.publish_distribution(dist(2)).unwrap();
        let snap = store.current();
        assert_eq!(snap.distribution.epoch, 2);
        assert!(!snap.boundaries.valid);
        assert!(store.publish_distribution(dist(2)).is_err());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let store = InMemorySnapshotStore::new(dist(1));
        let held = store.current();
        store.publish_distribution(dist(2)).unwrap();
        assert_eq!(held.distribution.epoch, 1);
        assert_eq!(store.current().distribution.epoch, 2);
    }

    #[test]
    fn test_non_finite_roots_rejected() {
        let store = InMemorySnapshotStore::new(dist(1));
        assert!(store.publish_boundaries(f64::INFINITY, 80.0, 2).is_err());
        assert!(!store.current().boundaries.valid);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_pairs() {
        let store = Arc::new(InMemorySnapshotStore::new(dist(1)));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for epoch in 2..50u64 {
                    store.publish_distribution(dist(epoch)).unwrap();
                    store.publish_boundaries(90.0, 80.0, epoch).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = store.current();
                        // Boundaries always belong to the distribution beside them.
                        assert_eq!(snap.boundaries.epoch, snap.distribution.epoch);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
