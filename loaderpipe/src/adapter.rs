//! DispatchAdapter - the operation API for one named pipe
//!
//! Every call returns at once. The work runs on the task manager's workers
//! and the outcome reaches the callback later, on the consumer thread.
//! Identities are recorded in the scope's shared registry under the adapter's
//! name so that `reset` can cancel them as a group.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::callback::{Callback, ScopeBindable};
use crate::codec::{RequestBuilder, ResponseParser};
use crate::error::{ConfigurationError, PipelineError};
use crate::filter::ReadFilter;
use crate::identity::{identity, ConsumerKey, OperationId, OperationKind};
use crate::idgen::Ticket;
use crate::looper::MainHandler;
use crate::pipe::{Pipe, PipeHandler, PipeType};
use crate::registry::PipeNameRegistry;
use crate::relay::{DeliveryTarget, MainThreadRelay};
use crate::scope::{Scope, ScopeKind, ScopeOperations};
use crate::task_manager::CompletionHook;
use crate::unit::{OperationUnit, ReadUnit, RemoveUnit, SaveUnit};

/// Name, flavor and registry: everything delivery needs to know
struct AdapterCore {
    name: String,
    ops: Arc<dyn ScopeOperations>,
    registry: Arc<PipeNameRegistry>,
}

/// One dispatch as seen at delivery: live only while its listing is
struct Listed {
    core: Arc<AdapterCore>,
    generation: Option<Ticket>,
}

impl DeliveryTarget for Listed {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn is_live(&self, id: OperationId) -> bool {
        self.generation
            .is_some_and(|generation| self.core.registry.is_current(&self.core.name, id, generation))
    }

    fn scope(&self) -> Option<Arc<dyn Scope>> {
        self.core.ops.scope()
    }
}

/// Cancel `ids` through `ops`, returning how many were still live
pub(crate) fn cancel_ids(ops: &dyn ScopeOperations, ids: &[OperationId]) -> usize {
    ids.iter().filter(|id| ops.cancel(**id)).count()
}

pub struct DispatchAdapter<T> {
    core: Arc<AdapterCore>,
    pipe: Arc<Pipe<T>>,
    relay: Arc<MainThreadRelay>,
}

impl<T> Clone for DispatchAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            pipe: Arc::clone(&self.pipe),
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<T> DispatchAdapter<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pipe: Arc<Pipe<T>>,
        ops: Arc<dyn ScopeOperations>,
        registry: Arc<PipeNameRegistry>,
        handler: MainHandler,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore {
                name: name.into(),
                ops,
                registry,
            }),
            pipe,
            relay: Arc::new(MainThreadRelay::new(handler)),
        }
    }

    /// Read every item
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the callback does not fit this adapter
    pub fn read(&self, callback: Arc<dyn Callback<Vec<T>>>) -> Result<OperationId, PipelineError> {
        self.read_filtered(None, callback)
    }

    /// Read the items matching `filter`
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the callback does not fit this adapter
    pub fn read_with_filter(
        &self,
        filter: ReadFilter,
        callback: Arc<dyn Callback<Vec<T>>>,
    ) -> Result<OperationId, PipelineError> {
        self.read_filtered(Some(filter), callback)
    }

    /// Read with an optional filter; `None` is the same operation as `read`
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the callback does not fit this adapter
    pub fn read_filtered(
        &self,
        filter: Option<ReadFilter>,
        callback: Arc<dyn Callback<Vec<T>>>,
    ) -> Result<OperationId, PipelineError> {
        self.verify_callback(callback.scope_bindable())?;
        let id = identity(
            &self.core.name,
            OperationKind::Read,
            &filter.as_ref(),
            ConsumerKey::of(&callback),
        );
        let unit = ReadUnit::new(Arc::clone(&self.pipe), filter, callback);
        Ok(self.dispatch(id, Box::new(unit)))
    }

    /// Save `item`. The item is encoded here, before dispatch.
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the callback does not fit this adapter,
    /// `PipelineError::Encode` if the request builder rejects the item
    pub fn save(&self, item: &T, callback: Arc<dyn Callback<T>>) -> Result<OperationId, PipelineError> {
        self.verify_callback(callback.scope_bindable())?;
        let payload = self
            .pipe
            .request_builder()
            .body(item)
            .map_err(PipelineError::Encode)?;
        let id = identity(
            &self.core.name,
            OperationKind::Save,
            payload.as_slice(),
            ConsumerKey::of(&callback),
        );
        let unit = SaveUnit::new(Arc::clone(&self.pipe), payload, callback);
        Ok(self.dispatch(id, Box::new(unit)))
    }

    /// Remove the item identified by `target_id`
    ///
    /// # Errors
    /// `PipelineError::Configuration` if the callback does not fit this adapter
    pub fn remove(
        &self,
        target_id: impl Into<String>,
        callback: Arc<dyn Callback<()>>,
    ) -> Result<OperationId, PipelineError> {
        self.verify_callback(callback.scope_bindable())?;
        let target_id = target_id.into();
        let id = identity(
            &self.core.name,
            OperationKind::Remove,
            target_id.as_str(),
            ConsumerKey::of(&callback),
        );
        let unit = RemoveUnit::new(Arc::clone(&self.pipe), target_id, callback);
        Ok(self.dispatch(id, Box::new(unit)))
    }

    fn dispatch(&self, id: OperationId, unit: Box<dyn OperationUnit>) -> OperationId {
        let kind = unit.kind();
        let generation = self.core.registry.register(&self.core.name, id);

        let target: Arc<dyn DeliveryTarget> = Arc::new(Listed {
            core: Arc::clone(&self.core),
            generation,
        });
        let relay = Arc::clone(&self.relay);
        let on_complete: CompletionHook = Box::new(move |id, completed| {
            if let Err(e) = relay.relay::<T>(target, id, &completed) {
                // Already logged and raised on the consumer thread
                trace!(id = %id, error = %e, "relay refused the unit");
            }
        });

        let disposition = self.core.ops.start_or_attach(id, unit, on_complete);
        debug!(pipe = %self.core.name, id = %id, kind = %kind, ?disposition, "dispatched");
        id
    }
}

impl<T> DispatchAdapter<T> {
    /// Cancel and forget every identity registered under this adapter's name
    ///
    /// Returns how many were still running. Identities under other names are
    /// left alone; a second call is a no-op.
    pub fn reset(&self) -> usize {
        let ids = self.core.registry.take(&self.core.name);
        let cancelled = cancel_ids(self.core.ops.as_ref(), &ids);
        debug!(pipe = %self.core.name, registered = ids.len(), cancelled, "pipe reset");
        cancelled
    }

    /// Check a callback's scope requirement against this adapter's flavor
    fn verify_callback(&self, bindable: Option<&dyn ScopeBindable>) -> Result<(), ConfigurationError> {
        let Some(bindable) = bindable else {
            return Ok(());
        };
        let required = bindable.scope_kind();
        let adapter = self.core.ops.kind();
        if required != adapter {
            return Err(ConfigurationError::ForeignScope { required, adapter });
        }
        if self.core.ops.scope().is_none() {
            return Err(ConfigurationError::MissingScope { required });
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    #[must_use]
    pub fn scope_kind(&self) -> ScopeKind {
        self.core.ops.kind()
    }

    /// Identities currently registered under this adapter's name
    #[must_use]
    pub fn registered_ids(&self) -> Vec<OperationId> {
        self.core.registry.ids(&self.core.name)
    }

    #[must_use]
    pub fn pipe(&self) -> &Arc<Pipe<T>> {
        &self.pipe
    }

    #[must_use]
    pub fn pipe_type(&self) -> &PipeType {
        self.pipe.pipe_type()
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.pipe.url()
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn PipeHandler> {
        self.pipe.handler()
    }

    #[must_use]
    pub fn request_builder(&self) -> &Arc<dyn RequestBuilder<T>> {
        self.pipe.request_builder()
    }

    #[must_use]
    pub fn response_parser(&self) -> &Arc<dyn ResponseParser<T>> {
        self.pipe.response_parser()
    }
}
