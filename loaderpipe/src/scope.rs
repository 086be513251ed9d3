//! Owning scopes and the per-flavor operations adapters run through
//!
//! A scope is a lifecycle-bound owner such as an activity- or fragment-like
//! screen. Adapters never own it: `LifecycleOperations` keeps a weak reference
//! and upgrades it only for the duration of a delivery.
//!
//! There is one adapter type. What differs between a bare context, an
//! activity and a fragment is captured by the `ScopeOperations` handed to it.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::identity::OperationId;
use crate::task_manager::{CompletionHook, StartDisposition, TaskManager};
use crate::unit::OperationUnit;

/// Flavor of owning scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// No lifecycle owner, only the application context
    Context,
    Activity,
    Fragment,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "context"),
            Self::Activity => write!(f, "activity"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// A lifecycle owner callbacks may be bound to
pub trait Scope: Send + Sync + 'static {
    fn kind(&self) -> ScopeKind;

    fn as_any(&self) -> &dyn Any;
}

/// Per-flavor glue between an adapter and its task manager
pub trait ScopeOperations: Send + Sync {
    /// Flavor of this adapter
    fn kind(&self) -> ScopeKind;

    /// The owning scope, if the flavor has one and it is still alive
    fn scope(&self) -> Option<Arc<dyn Scope>>;

    fn start_or_attach(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition;

    fn cancel(&self, id: OperationId) -> bool;
}

/// Operations for adapters with no lifecycle owner
pub struct ContextOperations {
    manager: Arc<dyn TaskManager>,
}

impl ContextOperations {
    #[must_use]
    pub fn new(manager: Arc<dyn TaskManager>) -> Self {
        Self { manager }
    }
}

impl ScopeOperations for ContextOperations {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Context
    }

    fn scope(&self) -> Option<Arc<dyn Scope>> {
        None
    }

    fn start_or_attach(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition {
        self.manager.start(id, unit, on_complete)
    }

    fn cancel(&self, id: OperationId) -> bool {
        self.manager.cancel_and_forget(id)
    }
}

/// Operations for adapters owned by an activity- or fragment-like scope
pub struct LifecycleOperations {
    kind: ScopeKind,
    scope: Weak<dyn Scope>,
    manager: Arc<dyn TaskManager>,
}

impl LifecycleOperations {
    /// Borrow `scope` weakly; its flavor becomes the adapter flavor
    pub fn new<S: Scope>(scope: &Arc<S>, manager: Arc<dyn TaskManager>) -> Self {
        let kind = scope.kind();
        let erased: Arc<dyn Scope> = Arc::clone(scope) as Arc<dyn Scope>;
        Self {
            kind,
            scope: Arc::downgrade(&erased),
            manager,
        }
    }
}

impl ScopeOperations for LifecycleOperations {
    fn kind(&self) -> ScopeKind {
        self.kind
    }

    fn scope(&self) -> Option<Arc<dyn Scope>> {
        self.scope.upgrade()
    }

    fn start_or_attach(
        &self,
        id: OperationId,
        unit: Box<dyn OperationUnit>,
        on_complete: CompletionHook,
    ) -> StartDisposition {
        self.manager.start(id, unit, on_complete)
    }

    fn cancel(&self, id: OperationId) -> bool {
        self.manager.cancel_and_forget(id)
    }
}
