//! Task manager: runs operation units off the consumer thread
//!
//! The `TaskManager` trait is the seam the adapter rides on. `LoaderManager`
//! is the tokio-backed implementation: every unit runs on the blocking pool,
//! starts for an identity that is still live attach to the existing run, and
//! a cancelled identity never reports a completion.
//!
//! # Unit lifecycle
//!
//! ```text
//!  start ──▶ Created ──spawned──▶ Running ──pipe call returns──▶ Completed
//!               │                    │                             │
//!               └──cancel_and_forget─┴──────▶ Cancelled            └─▶ hooks run, entry forgotten
//! ```
//!
//! The blocking pool cannot interrupt a pipe call in progress. A cancelled
//! run keeps going until the call returns and its result is then dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::idgen::{IdGen, Ticket};
use crate::identity::{OperationId, OperationKind};
use crate::unit::{CompletedUnit, OperationUnit};

/// Called on a worker thread once per awaiter when a unit completes
pub type CompletionHook = Box<dyn FnOnce(OperationId, CompletedUnit) + Send>;

/// Lifecycle state of a unit inside the task manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Running,
    Completed,
    Cancelled,
}

/// What `start` did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDisposition {
    /// A new run was scheduled
    Started,
    /// A run for the same identity was already live; the hook joined it
    Attached,
}

/// Asynchronous execution substrate
pub trait TaskManager: Send + Sync {
    /// Start `unit` under `id`, or attach `on_complete` to the live run of `id`
    fn start(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition;

    /// Cancel the run for `id` and forget it. Returns `false` if nothing was live.
    fn cancel_and_forget(&self, id: OperationId) -> bool;

    /// State of the live run for `id`, `None` once it completed or was cancelled
    fn state(&self, id: OperationId) -> Option<UnitState>;

    fn is_running(&self, id: OperationId) -> bool {
        self.state(id).is_some()
    }
}

struct Entry {
    ticket: Ticket,
    kind: OperationKind,
    state: UnitState,
    hooks: Vec<CompletionHook>,
}

type EntryTable = Arc<Mutex<HashMap<OperationId, Entry>>>;

/// Tokio-backed task manager
pub struct LoaderManager {
    runtime: tokio::runtime::Handle,
    entries: EntryTable,
    tickets: IdGen,
}

impl LoaderManager {
    /// Create a manager that schedules units on `runtime`'s blocking pool
    #[must_use]
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            entries: Arc::new(Mutex::new(HashMap::new())),
            tickets: IdGen::new(),
        }
    }

    /// Create a manager on the runtime the caller is running in
    ///
    /// # Errors
    /// Fails when called outside a tokio runtime
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        tokio::runtime::Handle::try_current().map(Self::new)
    }

    /// Number of live runs
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskManager for LoaderManager {
    fn start(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition {
        let kind = unit.kind();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&id) {
            if entry.kind != kind {
                warn!(id = %id, live = %entry.kind, requested = %kind, "identity shared by different operation kinds");
            }
            entry.hooks.push(on_complete);
            debug!(id = %id, state = ?entry.state, awaiters = entry.hooks.len(), "attached to live unit");
            return StartDisposition::Attached;
        }

        let ticket = self.tickets.next_ticket();
        entries.insert(
            id,
            Entry {
                ticket,
                kind,
                state: UnitState::Created,
                hooks: vec![on_complete],
            },
        );
        drop(entries);

        let entries = Arc::clone(&self.entries);
        self.runtime
            .spawn_blocking(move || run_unit(&entries, id, ticket, unit));
        trace!(id = %id, kind = %kind, ticket = ticket.id(), "unit scheduled");
        StartDisposition::Started
    }

    fn cancel_and_forget(&self, id: OperationId) -> bool {
        match self.entries.lock().remove(&id) {
            Some(entry) => {
                debug!(
                    id = %id,
                    was = ?entry.state,
                    now = ?UnitState::Cancelled,
                    dropped_awaiters = entry.hooks.len(),
                    "unit cancelled"
                );
                true
            }
            None => false,
        }
    }

    fn state(&self, id: OperationId) -> Option<UnitState> {
        self.entries.lock().get(&id).map(|entry| entry.state)
    }
}

/// Worker body: mark Running, execute, hand the result to every awaiter
fn run_unit(entries: &EntryTable, id: OperationId, ticket: Ticket, unit: Box<dyn OperationUnit>) {
    {
        let mut table = entries.lock();
        match table.get_mut(&id) {
            Some(entry) if entry.ticket == ticket => entry.state = UnitState::Running,
            _ => {
                debug!(id = %id, "unit cancelled before it ran");
                return;
            }
        }
    }

    let completed = unit.execute();

    let hooks = {
        let mut table = entries.lock();
        match table.get(&id) {
            Some(entry) if entry.ticket == ticket => {
                table.remove(&id).map(|entry| entry.hooks).unwrap_or_default()
            }
            _ => {
                debug!(id = %id, "unit finished after cancellation, result dropped");
                return;
            }
        }
    };

    trace!(id = %id, state = ?UnitState::Completed, awaiters = hooks.len(), "unit finished");
    for hook in hooks {
        hook(id, Arc::clone(&completed));
    }
}
