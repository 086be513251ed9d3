//! Operation units
//!
//! A unit is one read, save or remove, packaged so that the task manager can
//! run it on a worker without knowing the item type. Each unit makes exactly
//! one pipe call and yields exactly one outcome, erased behind `CompletedUnit`
//! until the adapter that dispatched it downcasts it back.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::trace;

use crate::callback::Callback;
use crate::error::{Outcome, PipeError};
use crate::filter::ReadFilter;
use crate::identity::OperationKind;
use crate::pipe::Pipe;

/// Type-erased result of a finished unit, shared by every awaiter
pub type CompletedUnit = Arc<dyn Any + Send + Sync>;

/// An executable operation
pub trait OperationUnit: Send + 'static {
    fn kind(&self) -> OperationKind;

    /// Run the pipe call. Blocks; called on a worker thread.
    fn execute(self: Box<Self>) -> CompletedUnit;
}

/// What a unit produces: the outcome together with the consumer awaiting it
pub enum Completion<T> {
    Read {
        callback: Arc<dyn Callback<Vec<T>>>,
        outcome: Outcome<Vec<T>>,
    },
    Save {
        callback: Arc<dyn Callback<T>>,
        outcome: Outcome<T>,
    },
    Remove {
        callback: Arc<dyn Callback<()>>,
        outcome: Outcome<()>,
    },
}

impl<T> Completion<T> {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read { .. } => OperationKind::Read,
            Self::Save { .. } => OperationKind::Save,
            Self::Remove { .. } => OperationKind::Remove,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Read { outcome, .. } => outcome.is_err(),
            Self::Save { outcome, .. } => outcome.is_err(),
            Self::Remove { outcome, .. } => outcome.is_err(),
        }
    }
}

/// Run a pipe call, turning a panic into a failure outcome
fn guarded<V>(call: impl FnOnce() -> Outcome<V>) -> Outcome<V> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(PipeError::Panicked(message))
    })
}

pub struct ReadUnit<T> {
    pipe: Arc<Pipe<T>>,
    filter: Option<ReadFilter>,
    callback: Arc<dyn Callback<Vec<T>>>,
}

impl<T> ReadUnit<T> {
    #[must_use]
    pub fn new(
        pipe: Arc<Pipe<T>>,
        filter: Option<ReadFilter>,
        callback: Arc<dyn Callback<Vec<T>>>,
    ) -> Self {
        Self {
            pipe,
            filter,
            callback,
        }
    }
}

impl<T: Send + Sync + 'static> OperationUnit for ReadUnit<T> {
    fn kind(&self) -> OperationKind {
        OperationKind::Read
    }

    fn execute(self: Box<Self>) -> CompletedUnit {
        let Self {
            pipe,
            filter,
            callback,
        } = *self;
        trace!(filtered = filter.is_some(), "read unit running");
        let outcome = guarded(|| pipe.read(filter.as_ref()));
        Arc::new(Completion::Read { callback, outcome })
    }
}

/// Save of an item that was encoded before dispatch
pub struct SaveUnit<T> {
    pipe: Arc<Pipe<T>>,
    payload: Vec<u8>,
    callback: Arc<dyn Callback<T>>,
}

impl<T> SaveUnit<T> {
    #[must_use]
    pub fn new(pipe: Arc<Pipe<T>>, payload: Vec<u8>, callback: Arc<dyn Callback<T>>) -> Self {
        Self {
            pipe,
            payload,
            callback,
        }
    }
}

impl<T: Send + Sync + 'static> OperationUnit for SaveUnit<T> {
    fn kind(&self) -> OperationKind {
        OperationKind::Save
    }

    fn execute(self: Box<Self>) -> CompletedUnit {
        let Self {
            pipe,
            payload,
            callback,
        } = *self;
        trace!(bytes = payload.len(), "save unit running");
        let outcome = guarded(|| {
            let stored = pipe.save(&payload)?;
            pipe.response_parser().handle_response(&stored)
        });
        Arc::new(Completion::Save { callback, outcome })
    }
}

pub struct RemoveUnit<T> {
    pipe: Arc<Pipe<T>>,
    target_id: String,
    callback: Arc<dyn Callback<()>>,
}

impl<T> RemoveUnit<T> {
    #[must_use]
    pub fn new(pipe: Arc<Pipe<T>>, target_id: String, callback: Arc<dyn Callback<()>>) -> Self {
        Self {
            pipe,
            target_id,
            callback,
        }
    }
}

impl<T: Send + Sync + 'static> OperationUnit for RemoveUnit<T> {
    fn kind(&self) -> OperationKind {
        OperationKind::Remove
    }

    fn execute(self: Box<Self>) -> CompletedUnit {
        let Self {
            pipe,
            target_id,
            callback,
        } = *self;
        trace!(target = %target_id, "remove unit running");
        let outcome = guarded(|| pipe.remove(&target_id));
        Arc::new(Completion::<T>::Remove { callback, outcome })
    }
}
