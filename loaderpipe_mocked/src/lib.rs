//! Test doubles for `loaderpipe`
//!
//! - `MemoryPipeHandler`: in-memory document store with failure injection
//!   and a gate that holds handler calls
//! - `RecordingCallback`: records each delivery, its thread and its scope
//! - `InlineTaskManager`: runs units synchronously on the dispatching thread
//! - `TestScope`: an activity- or fragment-like owner
//! - `Widget`: a serde item type

pub mod inline_manager;
pub mod memory_handler;
pub mod recording;
pub mod test_scope;
pub mod widget;

pub use inline_manager::InlineTaskManager;
pub use memory_handler::MemoryPipeHandler;
pub use recording::{Delivery, RecordingCallback};
pub use test_scope::TestScope;
pub use widget::{two_widgets, Widget};
