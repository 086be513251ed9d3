//! Consumer callbacks
//!
//! A consumer supplies `on_success` and `on_failure`; exactly one of them runs,
//! once per dispatch, on the consumer thread.
//!
//! Callbacks that need the owning scope while they run expose the
//! `ScopeBindable` capability. The relay binds the live scope right before the
//! handler runs and unbinds it right after, so a callback never keeps a scope
//! alive.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::PipeError;
use crate::scope::{Scope, ScopeKind};

/// Success/failure handler pair for one operation
pub trait Callback<T>: Send + Sync + 'static {
    fn on_success(&self, data: T);

    fn on_failure(&self, error: PipeError);

    /// Scope-binding capability, for callbacks that need their scope
    fn scope_bindable(&self) -> Option<&dyn ScopeBindable> {
        None
    }
}

/// Capability of a callback that must run with its scope attached
pub trait ScopeBindable: Send + Sync {
    /// Flavor of scope this callback belongs to
    fn scope_kind(&self) -> ScopeKind;

    fn bind_scope(&self, scope: Arc<dyn Scope>);

    fn unbind_scope(&self);
}

/// Binding cell that scope-bound callbacks embed
pub struct ScopeSlot {
    kind: ScopeKind,
    bound: Mutex<Option<Arc<dyn Scope>>>,
}

impl ScopeSlot {
    #[must_use]
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            bound: Mutex::new(None),
        }
    }

    /// The scope bound for the current delivery, if any
    #[must_use]
    pub fn scope(&self) -> Option<Arc<dyn Scope>> {
        self.bound.lock().clone()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Run `f` with the bound scope downcast to its concrete type
    pub fn with<S: Scope, R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let scope = self.scope()?;
        scope.as_any().downcast_ref::<S>().map(f)
    }
}

impl ScopeBindable for ScopeSlot {
    fn scope_kind(&self) -> ScopeKind {
        self.kind
    }

    fn bind_scope(&self, scope: Arc<dyn Scope>) {
        *self.bound.lock() = Some(scope);
    }

    fn unbind_scope(&self) {
        self.bound.lock().take();
    }
}

type SuccessFn<T> = Box<dyn Fn(T) + Send + Sync>;
type FailureFn = Box<dyn Fn(PipeError) + Send + Sync>;

/// Callback built from two closures
pub struct FnCallback<T> {
    success: SuccessFn<T>,
    failure: FailureFn,
}

impl<T: 'static> FnCallback<T> {
    pub fn new(
        on_success: impl Fn(T) + Send + Sync + 'static,
        on_failure: impl Fn(PipeError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            success: Box::new(on_success),
            failure: Box::new(on_failure),
        }
    }

    /// Same as `new`, already shared the way dispatch methods take it
    pub fn shared(
        on_success: impl Fn(T) + Send + Sync + 'static,
        on_failure: impl Fn(PipeError) + Send + Sync + 'static,
    ) -> Arc<dyn Callback<T>> {
        Arc::new(Self::new(on_success, on_failure))
    }
}

impl<T: 'static> Callback<T> for FnCallback<T> {
    fn on_success(&self, data: T) {
        (self.success)(data);
    }

    fn on_failure(&self, error: PipeError) {
        (self.failure)(error);
    }
}

type ScopedSuccessFn<T> = Box<dyn Fn(&dyn Scope, T) + Send + Sync>;
type ScopedFailureFn = Box<dyn Fn(&dyn Scope, PipeError) + Send + Sync>;

/// Callback whose closures receive the scope bound for the delivery
pub struct ScopedCallback<T> {
    slot: ScopeSlot,
    success: ScopedSuccessFn<T>,
    failure: ScopedFailureFn,
}

impl<T: 'static> ScopedCallback<T> {
    pub fn new(
        kind: ScopeKind,
        on_success: impl Fn(&dyn Scope, T) + Send + Sync + 'static,
        on_failure: impl Fn(&dyn Scope, PipeError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            slot: ScopeSlot::new(kind),
            success: Box::new(on_success),
            failure: Box::new(on_failure),
        }
    }

    #[must_use]
    pub fn slot(&self) -> &ScopeSlot {
        &self.slot
    }
}

impl<T: 'static> Callback<T> for ScopedCallback<T> {
    fn on_success(&self, data: T) {
        match self.slot.scope() {
            Some(scope) => (self.success)(scope.as_ref(), data),
            None => warn!(kind = %self.slot.kind, "scoped callback invoked without a bound scope"),
        }
    }

    fn on_failure(&self, error: PipeError) {
        match self.slot.scope() {
            Some(scope) => (self.failure)(scope.as_ref(), error),
            None => warn!(kind = %self.slot.kind, error = %error, "scoped callback invoked without a bound scope"),
        }
    }

    fn scope_bindable(&self) -> Option<&dyn ScopeBindable> {
        Some(&self.slot)
    }
}
