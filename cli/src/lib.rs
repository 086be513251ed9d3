pub mod script;
pub mod sqlite_handler;

pub use script::{Script, ScriptRunner, Step, StepReport};
pub use sqlite_handler::{SqlitePipeHandler, SqliteStore};
