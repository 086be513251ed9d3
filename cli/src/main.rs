//! Runs an operation script against SQLite-backed pipes
//!
//! Usage: `loaderpipe-cli <script.json> [config.json]`
//!
//! Each step's outcome is printed to stdout as one JSON line. The main thread
//! is the consumer thread; pipe calls run on the configured worker pool.

use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Script, ScriptRunner, SqliteStore};
use loaderpipe::{LoaderManager, LoaderPipeline, MainLooper, PipelineConfig, TaskManager};
use tracing::{error, info};

fn load_config(path: Option<&str>) -> Result<PipelineConfig, String> {
    match path {
        None => Ok(PipelineConfig::default()),
        Some(path) => {
            let file = File::open(path).map_err(|e| format!("Failed to open config '{path}': {e}"))?;
            PipelineConfig::from_reader(file)
        }
    }
}

fn run(script_path: &str, config: &PipelineConfig) -> Result<usize, String> {
    let file = File::open(script_path).map_err(|e| format!("Failed to open script '{script_path}': {e}"))?;
    let script = Script::from_reader(file)?;

    let runtime = config
        .build_runtime()
        .map_err(|e| format!("Failed to build worker runtime: {e}"))?;
    let manager: Arc<dyn TaskManager> = Arc::new(LoaderManager::new(runtime.handle().clone()));
    let (mut looper, handler) =
        MainLooper::new().map_err(|e| format!("Failed to create consumer looper: {e}"))?;
    let store = SqliteStore::open(&config.database)
        .map_err(|e| format!("Failed to open database '{}': {e}", config.database))?;
    let pipeline = LoaderPipeline::for_context(manager, handler);

    info!(steps = script.steps.len(), database = %config.database, "running script");
    let reports = ScriptRunner::new(&pipeline, store, &mut looper, config.delivery_timeout()).run(&script);

    let mut failed = 0;
    for report in &reports {
        if report.error.is_some() {
            failed += 1;
        }
        let line = serde_json::to_string(report).map_err(|e| format!("Failed to encode report: {e}"))?;
        println!("{line}");
    }
    let cancelled = pipeline.destroy();
    info!(failed, cancelled, "script completed");
    Ok(failed)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let Some(script_path) = args.get(1) else {
        eprintln!("usage: loaderpipe-cli <script.json> [config.json]");
        return ExitCode::from(2);
    };

    let config = match load_config(args.get(2).map(String::as_str)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(script_path, &config) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}
