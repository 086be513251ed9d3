//! Operation identity
//!
//! An identity is the join key between a dispatch call and the task manager.
//! It is derived from the pipe name, the operation kind, the operation's
//! discriminator (filter, serialised item or target id) and the consumer
//! callback. Including the consumer keeps two callers that ask for the same
//! thing on separate executions, each with its own delivery.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::callback::Callback;

/// Kind of data-access operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Save,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Save => write!(f, "save"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Deduplication key for an in-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of a consumer callback: the address of its shared allocation.
///
/// Two clones of the same `Arc` have the same key; two separately allocated
/// callbacks never do while both are alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerKey(usize);

impl ConsumerKey {
    #[must_use]
    pub fn of<V>(callback: &Arc<dyn Callback<V>>) -> Self {
        Self(Arc::as_ptr(callback).cast::<()>() as usize)
    }
}

/// Compute the identity of an operation.
///
/// Pure: the same inputs give the same output on every call within a build,
/// which is what lets the task manager recognise a re-dispatch as already
/// running.
#[must_use]
pub fn identity<D: Hash + ?Sized>(
    pipe_name: &str,
    kind: OperationKind,
    discriminator: &D,
    consumer: ConsumerKey,
) -> OperationId {
    let mut hasher = DefaultHasher::new();
    pipe_name.hash(&mut hasher);
    kind.hash(&mut hasher);
    discriminator.hash(&mut hasher);
    consumer.hash(&mut hasher);
    OperationId(hasher.finish())
}
