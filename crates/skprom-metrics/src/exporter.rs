//! Exporter: owned runtime state between `start` and `stop`.
//!
//! `start` builds the filter, gating flag, max age and an empty store, then
//! subscribes a handler to the delta source. `stop` drops that
//! subscription before clearing the store, so no upsert can land after a
//! stop returns.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::info;

use skprom_core::{
    Delta, DeltaHandler, DeltaProcessor, DeltaSource, ExporterConfig, MetricNaming, SampleStore,
    Subscription, epoch_millis,
};

use crate::prometheus::render_store;

/// Everything one running exporter owns.
#[derive(Debug)]
struct ExporterState {
    processor: DeltaProcessor,
    store: SampleStore,
    max_age_ms: i64,
    naming: MetricNaming,
}

/// Lifecycle wrapper shared between the delta handler and HTTP handlers.
#[derive(Debug, Default)]
pub struct Exporter {
    state: RwLock<Option<Arc<ExporterState>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start exporting deltas from `source`. Restarts if already running.
    pub fn start(&self, self_context: &str, config: &ExporterConfig, source: &dyn DeltaSource) {
        self.stop();

        let filter = config.path_filter();
        let permissive = filter.is_permissive();
        let state = Arc::new(ExporterState {
            processor: DeltaProcessor::new(
                self_context,
                filter,
                config.include_all_contexts(),
                config.flatten_mode(),
            ),
            store: SampleStore::new(),
            max_age_ms: config.max_age_ms(),
            naming: config.metric_naming,
        });

        let handler: DeltaHandler = {
            let state = Arc::clone(&state);
            Arc::new(move |delta: &Delta| {
                state.processor.process(delta, &state.store);
            })
        };

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
        let subscription = source.subscribe(handler);
        *self.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        info!(
            %self_context,
            all_contexts = config.include_all_contexts(),
            permissive,
            max_age_secs = config.max_age().as_secs_f64(),
            "exporter started"
        );
    }

    /// Unsubscribe and clear the store. No-op when not running.
    pub fn stop(&self) {
        let subscription = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(subscription) = subscription else {
            return;
        };
        subscription.cancel();

        if let Some(state) = self.state.write().unwrap_or_else(PoisonError::into_inner).take() {
            state.store.clear();
        }
        info!("exporter stopped");
    }

    pub fn is_running(&self) -> bool {
        self.current().is_some()
    }

    /// Self context of the running exporter.
    pub fn self_context(&self) -> Option<String> {
        self.current().map(|state| state.processor.self_context().to_string())
    }

    /// Render live samples now. Empty when stopped.
    pub fn render(&self) -> String {
        self.render_at(epoch_millis())
    }

    /// Render live samples as of `now_ms`, evicting expired ones.
    pub fn render_at(&self, now_ms: i64) -> String {
        match self.current() {
            Some(state) => render_store(&state.store, state.max_age_ms, now_ms, state.naming),
            None => String::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.current().map_or(0, |state| state.store.len())
    }

    fn current(&self) -> Option<Arc<ExporterState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        self.stop();
    }
}
