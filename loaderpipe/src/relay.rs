//! MainThreadRelay - hands finished operations to the consumer thread
//!
//! Protocol for one delivery, run on the looper thread:
//! 1. If the identity is no longer live (its pipe was reset), drop it.
//! 2. Log a failure outcome.
//! 3. For a scope-bindable callback, bind the live scope; if the scope is
//!    gone, drop the delivery.
//! 4. Call `on_success` or `on_failure`.
//! 5. Unbind the scope. A guard does this, so it also happens when the handler
//!    panics.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::callback::{Callback, ScopeBindable};
use crate::error::{Outcome, PipelineError};
use crate::identity::OperationId;
use crate::looper::MainHandler;
use crate::scope::Scope;
use crate::unit::{CompletedUnit, Completion};

/// Delivery-time view of the adapter that dispatched an operation
pub trait DeliveryTarget: Send + Sync {
    /// Pipe name, for logs
    fn name(&self) -> &str;

    /// Whether `id` may still be delivered
    fn is_live(&self, id: OperationId) -> bool;

    /// The owning scope, if there is one and it is alive
    fn scope(&self) -> Option<Arc<dyn Scope>>;
}

type Delivery = Box<dyn FnOnce(Option<Arc<dyn Scope>>) + Send>;

pub struct MainThreadRelay {
    handler: MainHandler,
}

impl MainThreadRelay {
    #[must_use]
    pub fn new(handler: MainHandler) -> Self {
        Self { handler }
    }

    #[must_use]
    pub fn handler(&self) -> &MainHandler {
        &self.handler
    }

    /// Schedule delivery of a finished unit to its consumer
    ///
    /// Called on a worker thread, once per awaiter.
    ///
    /// # Errors
    /// `InvariantViolation` if `completed` is not a `Completion<T>`. The
    /// violation is also logged and raised as a panic on the consumer thread.
    pub fn relay<T>(
        &self,
        target: Arc<dyn DeliveryTarget>,
        id: OperationId,
        completed: &CompletedUnit,
    ) -> Result<(), PipelineError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let Some(completion) = completed.downcast_ref::<Completion<T>>() else {
            let message = format!(
                "pipe '{}' is listening to a unit it doesn't support (id {id})",
                target.name()
            );
            error!(pipe = %target.name(), id = %id, "{message}");
            let raised = message.clone();
            self.handler.post(move || panic!("{raised}"));
            return Err(PipelineError::InvariantViolation(message));
        };

        if !target.is_live(id) {
            debug!(pipe = %target.name(), id = %id, "pipe was reset, outcome dropped");
            return Ok(());
        }

        let delivery = prepare(completion);
        let posted = self.handler.post(move || {
            if !target.is_live(id) {
                debug!(pipe = %target.name(), id = %id, "pipe was reset before delivery, outcome dropped");
                return;
            }
            delivery(target.scope());
        });
        if !posted {
            warn!(id = %id, "consumer looper is gone, outcome dropped");
        }
        Ok(())
    }
}

/// Clone the outcome out of the shared completion into a sendable delivery
fn prepare<T: Clone + Send + Sync + 'static>(completion: &Completion<T>) -> Delivery {
    match completion {
        Completion::Read { callback, outcome } => {
            let (callback, outcome) = (Arc::clone(callback), outcome.clone());
            Box::new(move |scope| {
                deliver(callback.as_ref(), outcome, scope);
            })
        }
        Completion::Save { callback, outcome } => {
            let (callback, outcome) = (Arc::clone(callback), outcome.clone());
            Box::new(move |scope| {
                deliver(callback.as_ref(), outcome, scope);
            })
        }
        Completion::Remove { callback, outcome } => {
            let (callback, outcome) = (Arc::clone(callback), outcome.clone());
            Box::new(move |scope| {
                deliver(callback.as_ref(), outcome, scope);
            })
        }
    }
}

/// Keeps a scope bound to a callback for as long as it lives
struct ScopeBinding<'a> {
    target: &'a dyn ScopeBindable,
}

impl<'a> ScopeBinding<'a> {
    fn attach(target: &'a dyn ScopeBindable, scope: Arc<dyn Scope>) -> Self {
        target.bind_scope(scope);
        Self { target }
    }
}

impl Drop for ScopeBinding<'_> {
    fn drop(&mut self) {
        self.target.unbind_scope();
    }
}

/// Deliver one outcome on the calling (consumer) thread
///
/// Returns `false` if the delivery was dropped because the callback needs a
/// scope and none is alive.
pub fn deliver<V: 'static>(
    callback: &dyn Callback<V>,
    outcome: Outcome<V>,
    scope: Option<Arc<dyn Scope>>,
) -> bool {
    if let Err(e) = &outcome {
        error!(error = %e, "operation failed");
    }

    let _binding = match callback.scope_bindable() {
        None => None,
        Some(bindable) => {
            let Some(scope) = scope else {
                warn!(kind = %bindable.scope_kind(), "scope is gone, outcome dropped");
                return false;
            };
            Some(ScopeBinding::attach(bindable, scope))
        }
    };

    match outcome {
        Ok(data) => callback.on_success(data),
        Err(e) => callback.on_failure(e),
    }
    true
}
