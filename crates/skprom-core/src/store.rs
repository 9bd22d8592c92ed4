//! SampleStore: latest value per sample identity, with read-time eviction.
//!
//! Entries are only ever removed by `snapshot_and_evict` or `clear`; there
//! is no background sweeper. All three operations take the same mutex, so
//! an eviction pass never interleaves with an upsert or a clear.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::types::{Sample, SampleKey};

/// Thread-safe latest-value store, iterated in `SampleKey` order.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Mutex<BTreeMap<SampleKey, Sample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn samples(&self) -> MutexGuard<'_, BTreeMap<SampleKey, Sample>> {
        // A panic elsewhere cannot leave the map half-updated, so keep serving it.
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or unconditionally replace the sample under its identity key.
    ///
    /// Returns true if an existing sample was replaced.
    pub fn upsert(&self, sample: Sample) -> bool {
        let key = sample.key();
        let replaced = self.samples().insert(key, sample).is_some();
        trace!(replaced, "sample upserted");
        replaced
    }

    /// Return every live sample and drop the expired ones.
    ///
    /// A sample is expired when `now_ms - timestamp > max_age_ms`. Each entry
    /// is visited exactly once; afterwards the store holds exactly the
    /// returned samples.
    pub fn snapshot_and_evict(&self, max_age_ms: i64, now_ms: i64) -> Vec<Sample> {
        let mut samples = self.samples();
        let mut live = Vec::with_capacity(samples.len());
        let before = samples.len();

        samples.retain(|_, sample| {
            let keep = now_ms.saturating_sub(sample.timestamp) <= max_age_ms;
            if keep {
                live.push(sample.clone());
            }
            keep
        });

        let evicted = before - samples.len();
        if evicted > 0 {
            debug!(evicted, remaining = samples.len(), "expired samples evicted");
        }
        live
    }

    pub fn clear(&self) {
        let mut samples = self.samples();
        let cleared = samples.len();
        samples.clear();
        debug!(cleared, "sample store cleared");
    }

    pub fn get(&self, key: &SampleKey) -> Option<Sample> {
        self.samples().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples().is_empty()
    }
}
