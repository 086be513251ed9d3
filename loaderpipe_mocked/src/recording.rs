//! Callback that records what was delivered to it

use std::sync::Arc;
use std::thread::ThreadId;

use loaderpipe::{Callback, Outcome, PipeError, ScopeBindable, ScopeKind, ScopeSlot};
use parking_lot::Mutex;

/// One handler call
#[derive(Debug, Clone)]
pub struct Delivery<V> {
    pub outcome: Outcome<V>,
    pub thread: ThreadId,
    /// Whether a scope was bound while the handler ran
    pub scope_bound: bool,
    /// Label of the bound `TestScope`, if any
    pub scope_label: Option<String>,
}

/// Records every `on_success` and `on_failure` call
///
/// `scoped(kind)` makes the callback scope-bindable through a `ScopeSlot`.
/// `panicking()` makes `on_success` panic after recording.
pub struct RecordingCallback<V> {
    deliveries: Mutex<Vec<Delivery<V>>>,
    slot: Option<ScopeSlot>,
    panic_on_success: bool,
}

impl<V: Send + 'static> Default for RecordingCallback<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + 'static> RecordingCallback<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            slot: None,
            panic_on_success: false,
        }
    }

    #[must_use]
    pub fn scoped(kind: ScopeKind) -> Self {
        Self {
            slot: Some(ScopeSlot::new(kind)),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panic_on_success = true;
        self
    }

    /// Wrap in the `Arc` the dispatch methods take
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[must_use]
    pub fn slot(&self) -> Option<&ScopeSlot> {
        self.slot.as_ref()
    }

    fn record(&self, outcome: Outcome<V>) {
        let (scope_bound, scope_label) = match &self.slot {
            Some(slot) => (
                slot.is_bound(),
                slot.with(|scope: &crate::TestScope| scope.label().to_string()),
            ),
            None => (false, None),
        };
        self.deliveries.lock().push(Delivery {
            outcome,
            thread: std::thread::current().id(),
            scope_bound,
            scope_label,
        });
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.deliveries.lock().len()
    }

    #[must_use]
    pub fn successes(&self) -> usize {
        self.deliveries.lock().iter().filter(|d| d.outcome.is_ok()).count()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<PipeError> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| d.outcome.as_ref().err().cloned())
            .collect()
    }
}

impl<V: Clone + Send + 'static> RecordingCallback<V> {
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery<V>> {
        self.deliveries.lock().clone()
    }

    /// Data of every successful call, in order
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| d.outcome.as_ref().ok().cloned())
            .collect()
    }
}

impl<V: Send + 'static> Callback<V> for RecordingCallback<V> {
    fn on_success(&self, data: V) {
        self.record(Ok(data));
        assert!(!self.panic_on_success, "recording callback told to panic");
    }

    fn on_failure(&self, error: PipeError) {
        self.record(Err(error));
    }

    fn scope_bindable(&self) -> Option<&dyn ScopeBindable> {
        self.slot.as_ref().map(|slot| slot as &dyn ScopeBindable)
    }
}
