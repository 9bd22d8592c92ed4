//! DeltaProcessor applies one delta to the sample store.
//!
//! Only the first update's timestamp and source are used, for every value
//! in every update of the delta. Multi-update deltas therefore collapse to
//! one timestamp/source; this is kept as observable behaviour.

use tracing::{debug, trace};

use crate::filter::PathFilter;
use crate::flatten::{FlattenMode, flatten};
use crate::store::SampleStore;
use crate::types::{Delta, SELF_CONTEXT_SENTINEL, Sample, epoch_millis};

/// Per-run processing settings: self context, gating, filtering, flattening.
#[derive(Debug, Clone)]
pub struct DeltaProcessor {
    self_context: String,
    filter: PathFilter,
    include_all_contexts: bool,
    mode: FlattenMode,
}

impl DeltaProcessor {
    pub fn new(
        self_context: impl Into<String>,
        filter: PathFilter,
        include_all_contexts: bool,
        mode: FlattenMode,
    ) -> Self {
        Self {
            self_context: self_context.into(),
            filter,
            include_all_contexts,
            mode,
        }
    }

    pub fn self_context(&self) -> &str {
        &self.self_context
    }

    /// Apply a delta, using the current time when it carries no usable
    /// timestamp. Returns the number of samples upserted.
    pub fn process(&self, delta: &Delta, store: &SampleStore) -> usize {
        self.process_at(delta, store, epoch_millis())
    }

    /// Apply a delta with an explicit receive time (epoch ms).
    pub fn process_at(&self, delta: &Delta, store: &SampleStore, received_at: i64) -> usize {
        let Some(updates) = delta.updates.as_deref().filter(|u| !u.is_empty()) else {
            trace!("delta without updates ignored");
            return 0;
        };

        let context = self.resolve_context(delta.context.as_deref());
        if context != self.self_context && !self.include_all_contexts {
            trace!(%context, "delta from other context ignored");
            return 0;
        }

        let first = &updates[0];
        let timestamp = first.timestamp_millis().unwrap_or(received_at);
        let source = first.source_label();

        let mut stored = 0;
        for value in updates.iter().flat_map(|u| u.values.iter().flatten()) {
            for (path, leaf) in flatten(&value.path, &value.value, self.mode) {
                if path.is_empty() {
                    trace!("leaf without path dropped");
                    continue;
                }
                if !self.filter.should_store(&path) {
                    trace!(%path, "leaf filtered");
                    continue;
                }
                store.upsert(Sample::from_leaf(path, leaf, context, &source, timestamp));
                stored += 1;
            }
        }

        debug!(%context, %source, stored, "delta processed");
        stored
    }

    /// Map the self sentinel (or a missing context) to the self context.
    fn resolve_context<'a>(&'a self, context: Option<&'a str>) -> &'a str {
        match context {
            None | Some(SELF_CONTEXT_SENTINEL) => &self.self_context,
            Some(other) => other,
        }
    }
}
