//! Pipeline configuration, read from JSON

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads of the runtime hosting the task manager
    pub worker_threads: usize,
    /// How long a consumer pumps its looper waiting for one outcome
    pub delivery_timeout_ms: u64,
    /// Default `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
    /// SQLite file for the SQLite-backed pipe handler
    pub database: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            delivery_timeout_ms: 5000,
            log_filter: "info".to_string(),
            database: "loaderpipe.sqlite".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Read a configuration from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The JSON input is invalid or malformed
    /// - There are I/O errors reading from the provided reader
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, String> {
        serde_json::from_reader(reader).map_err(|e| format!("Failed to parse pipeline config JSON: {e}"))
    }

    /// Read a configuration from a JSON string
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        Self::from_reader(json.as_bytes())
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Build the multi-thread runtime that hosts `LoaderManager` workers
    ///
    /// # Errors
    /// Returns the runtime builder's I/O error
    pub fn build_runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads.max(1))
            .thread_name("loaderpipe-worker")
            .enable_all()
            .build()
    }
}
