//! Operation scripts
//!
//! A script is a JSON list of steps, run one after another. Each step is
//! dispatched through the pipe's adapter and the consumer looper is pumped
//! until its outcome arrives.
//!
//! ```json
//! {"steps": [
//!   {"op": "save", "pipe": "widgets", "item": {"name": "gear"}},
//!   {"op": "read", "pipe": "widgets", "filter": {"where": {"name": "gear"}}},
//!   {"op": "remove", "pipe": "widgets", "id": "1"},
//!   {"op": "reset", "pipe": "widgets"}
//! ]}
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use loaderpipe::{
    DispatchAdapter, FnCallback, LoaderPipeline, MainLooper, OperationId, Pipe, PipeError,
    PipeHandler, PipeType, PipelineError, ReadFilter,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::sqlite_handler::SqliteStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Read {
        pipe: String,
        #[serde(default)]
        filter: Option<ReadFilter>,
    },
    Save {
        pipe: String,
        item: Value,
    },
    Remove {
        pipe: String,
        id: String,
    },
    Reset {
        pipe: String,
    },
}

impl Step {
    #[must_use]
    pub fn pipe(&self) -> &str {
        match self {
            Self::Read { pipe, .. }
            | Self::Save { pipe, .. }
            | Self::Remove { pipe, .. }
            | Self::Reset { pipe } => pipe,
        }
    }

    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Save { .. } => "save",
            Self::Remove { .. } => "remove",
            Self::Reset { .. } => "reset",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    /// # Errors
    /// Returns an error if the JSON is not a valid script
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, String> {
        serde_json::from_reader(reader).map_err(|e| format!("Failed to parse script JSON: {e}"))
    }
}

/// What one step produced, printed as a JSON line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub pipe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type Slot = Arc<Mutex<Option<Result<Value, PipeError>>>>;

fn callback<V: 'static>(slot: &Slot, to_json: fn(V) -> Value) -> Arc<FnCallback<V>> {
    let (ok, failed) = (Arc::clone(slot), Arc::clone(slot));
    Arc::new(FnCallback::new(
        move |data| *ok.lock() = Some(Ok(to_json(data))),
        move |e| *failed.lock() = Some(Err(e)),
    ))
}

/// Runs scripts against SQLite-backed pipes on the calling thread
pub struct ScriptRunner<'a> {
    pipeline: &'a LoaderPipeline,
    store: SqliteStore,
    looper: &'a mut MainLooper,
    timeout: Duration,
    adapters: HashMap<String, DispatchAdapter<Value>>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(
        pipeline: &'a LoaderPipeline,
        store: SqliteStore,
        looper: &'a mut MainLooper,
        timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            store,
            looper,
            timeout,
            adapters: HashMap::new(),
        }
    }

    fn adapter(&mut self, name: &str) -> DispatchAdapter<Value> {
        if let Some(adapter) = self.adapters.get(name) {
            return adapter.clone();
        }
        let handler: Arc<dyn PipeHandler> = Arc::new(self.store.collection(name));
        let adapter = self.pipeline.pipe(name, Pipe::json(PipeType::Local, handler));
        self.adapters.insert(name.to_string(), adapter.clone());
        adapter
    }

    /// Run every step, in order
    pub fn run(&mut self, script: &Script) -> Vec<StepReport> {
        script
            .steps
            .iter()
            .enumerate()
            .map(|(n, step)| self.run_step(n + 1, step))
            .collect()
    }

    pub fn run_step(&mut self, n: usize, step: &Step) -> StepReport {
        let adapter = self.adapter(step.pipe());
        let mut report = StepReport {
            step: n,
            op: step.op(),
            pipe: step.pipe().to_string(),
            id: None,
            data: None,
            error: None,
        };

        let slot: Slot = Arc::new(Mutex::new(None));
        let dispatched: Result<OperationId, PipelineError> = match step {
            Step::Read { filter, .. } => {
                adapter.read_filtered(filter.clone(), callback::<Vec<Value>>(&slot, Value::Array))
            }
            Step::Save { item, .. } => adapter.save(item, callback::<Value>(&slot, |v| v)),
            Step::Remove { id, .. } => adapter.remove(id.clone(), callback::<()>(&slot, |()| Value::Null)),
            Step::Reset { .. } => {
                let cancelled = adapter.reset();
                report.data = Some(Value::from(cancelled));
                info!(step = n, pipe = %report.pipe, cancelled, "reset");
                return report;
            }
        };

        let id = match dispatched {
            Ok(id) => id,
            Err(e) => {
                warn!(step = n, pipe = %report.pipe, error = %e, "dispatch rejected");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.id = Some(id.to_string());

        if self.looper.pump(1, self.timeout) == 0 {
            warn!(step = n, id = %id, timeout = ?self.timeout, "no outcome in time");
        }
        match slot.lock().take() {
            Some(Ok(data)) => report.data = Some(data),
            Some(Err(e)) => report.error = Some(e.to_string()),
            None => report.error = Some("no outcome delivered".to_string()),
        }
        info!(step = n, op = report.op, pipe = %report.pipe, ok = report.error.is_none(), "step done");
        report
    }
}
