//! Parameter sweep with provenance logging
//!
//! Samples a learning-rate / batch-size sweep, "trains" a toy model per
//! trial, saves each result under a fresh run ID and prints the run log.
//!
//! Run with: cargo run --example parameter_sweep
//! Set RUST_LOG=runledger=debug to see allocation and logging events.

use std::fs;

use anyhow::Context;
use runledger::experiment::RunLog;
use runledger::manager::{ExperimentConfig, ExperimentManager};
use runledger::params::ParameterSet;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const TRIALS: usize = 5;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let root = std::env::temp_dir().join("runledger-demo");
    let config = ExperimentConfig::builder(&root, "toy", "lr_sweep")
        .build()
        .context("invalid experiment config")?;
    let mut manager = ExperimentManager::open_batched(config)?;

    let store = manager.configs();
    let mut params = if store.path_for("sweep").exists() {
        store.load_set("sweep").context("sweep.json exists but does not load")?
    } else {
        let params = ParameterSet::from_json(json!({
            "lr": "!uni(0.0001, 0.1)",
            "batch": "!rint(16, 129)",
            "layers": [64, 32],
            "seed": 42,
        }))?;
        store.save("sweep", &params)?;
        params
    };

    for trial in 0..TRIALS {
        let lr = params.resolve("lr")?.as_f64().unwrap_or_default();
        let batch = params.resolve("batch")?.as_i64().unwrap_or_default();
        params.resolve("layers")?;
        params.resolve("seed")?;

        #[allow(clippy::cast_precision_loss)]
        let loss = (1.0 - lr).powi(100) + 1.0 / batch as f64;
        let path = manager.save_path("loss.txt", &params)?;
        fs::write(&path, format!("{loss}\n")).with_context(|| format!("writing {}", path.display()))?;
        println!("trial {trial}: lr={lr:.5} batch={batch} loss={loss:.4} -> {}", path.display());
    }

    manager.flush_logs()?;

    let log = RunLog::open(manager.log_file())?;
    println!("\n{} runs logged in {}", log.len(), manager.log_file().display());
    println!("columns: {}", log.columns().collect::<Vec<_>>().join(", "));
    Ok(())
}
