//! LoaderPipeline - hands out adapters that share one scope
//!
//! One pipeline per owning scope. All adapters it creates share its flavor,
//! its task manager and its name registry. Destroying the pipeline (or
//! dropping it) resets every name, which is how a scope's teardown cancels
//! its outstanding operations.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::{cancel_ids, DispatchAdapter};
use crate::looper::MainHandler;
use crate::pipe::Pipe;
use crate::registry::PipeNameRegistry;
use crate::scope::{ContextOperations, LifecycleOperations, Scope, ScopeKind, ScopeOperations};
use crate::task_manager::TaskManager;

pub struct LoaderPipeline {
    ops: Arc<dyn ScopeOperations>,
    registry: Arc<PipeNameRegistry>,
    handler: MainHandler,
}

impl LoaderPipeline {
    /// Pipeline for a bare context, with no lifecycle owner
    #[must_use]
    pub fn for_context(manager: Arc<dyn TaskManager>, handler: MainHandler) -> Self {
        Self::with_operations(Arc::new(ContextOperations::new(manager)), handler)
    }

    /// Pipeline owned by `scope`, which is borrowed weakly
    #[must_use]
    pub fn for_scope<S: Scope>(
        scope: &Arc<S>,
        manager: Arc<dyn TaskManager>,
        handler: MainHandler,
    ) -> Self {
        Self::with_operations(Arc::new(LifecycleOperations::new(scope, manager)), handler)
    }

    #[must_use]
    pub fn with_operations(ops: Arc<dyn ScopeOperations>, handler: MainHandler) -> Self {
        Self {
            ops,
            registry: Arc::new(PipeNameRegistry::new()),
            handler,
        }
    }

    /// Adapter for `pipe` under `name`
    pub fn pipe<T>(&self, name: impl Into<String>, pipe: Pipe<T>) -> DispatchAdapter<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.adapter(name, Arc::new(pipe))
    }

    /// Adapter for an already shared pipe
    pub fn adapter<T>(&self, name: impl Into<String>, pipe: Arc<Pipe<T>>) -> DispatchAdapter<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        DispatchAdapter::new(
            name,
            pipe,
            Arc::clone(&self.ops),
            Arc::clone(&self.registry),
            self.handler.clone(),
        )
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.ops.kind()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PipeNameRegistry> {
        &self.registry
    }

    /// Reset one name, as `DispatchAdapter::reset` would
    pub fn reset(&self, name: &str) -> usize {
        let ids = self.registry.take(name);
        cancel_ids(self.ops.as_ref(), &ids)
    }

    /// Reset every name; returns how many operations were still running
    pub fn destroy(&self) -> usize {
        let mut cancelled = 0;
        for (name, ids) in self.registry.take_all() {
            let n = cancel_ids(self.ops.as_ref(), &ids);
            debug!(pipe = %name, registered = ids.len(), cancelled = n, "pipe reset on teardown");
            cancelled += n;
        }
        cancelled
    }
}

impl Drop for LoaderPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
