//! Task manager that runs each unit on the thread that starts it
//!
//! `start` returns only after the completion hook has run, so a delivery is
//! already queued on the looper when the dispatch call returns.

use std::sync::atomic::{AtomicUsize, Ordering};

use loaderpipe::{CompletionHook, OperationId, OperationUnit, StartDisposition, TaskManager, UnitState};

#[derive(Default)]
pub struct InlineTaskManager {
    started: AtomicUsize,
    cancelled: AtomicUsize,
}

impl InlineTaskManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units executed so far
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls to `cancel_and_forget`
    #[must_use]
    pub fn cancel_requests(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl TaskManager for InlineTaskManager {
    fn start(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition {
        self.started.fetch_add(1, Ordering::SeqCst);
        on_complete(id, unit.execute());
        StartDisposition::Started
    }

    fn cancel_and_forget(&self, _id: OperationId) -> bool {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn state(&self, _id: OperationId) -> Option<UnitState> {
        None
    }
}
