//! Shared setup: the test thread is the consumer thread
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use loaderpipe::{LoaderManager, MainHandler, MainLooper, TaskManager};
use tokio::runtime::Runtime;

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(200);

pub struct Harness {
    pub manager: Arc<LoaderManager>,
    pub looper: MainLooper,
    pub handler: MainHandler,
    // Dropped last so that workers outlive the manager
    _runtime: Runtime,
}

impl Harness {
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let manager = Arc::new(LoaderManager::new(runtime.handle().clone()));
        let (looper, handler) = MainLooper::new().unwrap();
        Self {
            manager,
            looper,
            handler,
            _runtime: runtime,
        }
    }

    pub fn task_manager(&self) -> Arc<dyn TaskManager> {
        Arc::clone(&self.manager) as Arc<dyn TaskManager>
    }

    /// Run one delivery, waiting up to `WAIT`
    pub fn pump_one(&mut self) -> usize {
        self.looper.pump(1, WAIT)
    }

    /// Check that nothing arrives for a while
    pub fn pump_quiet(&mut self) -> usize {
        self.looper.pump(usize::MAX, QUIET)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
