pub mod adapter;
pub mod callback;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod idgen;
pub mod looper;
pub mod pipe;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod scope;
pub mod task_manager;
pub mod unit;

// Re-export the operation API for convenience
pub use adapter::DispatchAdapter;
pub use pipeline::LoaderPipeline;

// Re-export callback types
pub use callback::{Callback, FnCallback, ScopeBindable, ScopeSlot, ScopedCallback};

// Re-export pipe and codec types
pub use codec::{JsonRequestBuilder, JsonResponseParser, RequestBuilder, ResponseParser};
pub use filter::ReadFilter;
pub use pipe::{Pipe, PipeHandler, PipeType};

// Re-export error types
pub use error::{ConfigurationError, Outcome, PipeError, PipelineError};

// Re-export identity types
pub use identity::{identity, ConsumerKey, OperationId, OperationKind};

// Re-export scope and task manager types
pub use scope::{ContextOperations, LifecycleOperations, Scope, ScopeKind, ScopeOperations};
pub use task_manager::{CompletionHook, LoaderManager, StartDisposition, TaskManager, UnitState};
pub use unit::{CompletedUnit, Completion, OperationUnit, ReadUnit, RemoveUnit, SaveUnit};

// Re-export consumer-thread types
pub use looper::{MainHandler, MainLooper};
pub use registry::PipeNameRegistry;
pub use relay::{deliver, DeliveryTarget, MainThreadRelay};

pub use config::PipelineConfig;
