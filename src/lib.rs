//! # runledger: Versioned Experiment Outputs with Parameter Provenance
//!
//! **Version**: 0.1.0
//!
//! runledger helps run repeated numerical experiments whose outputs are
//! versioned by a monotonically increasing run ID, with the exact parameter
//! values sampled for every run logged under that ID.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: Malformed directives fail at construction, not mid-sweep
//! - **Jidoka**: One unparseable result filename aborts ID allocation instead of mis-numbering runs
//! - **Genchi Genbutsu**: The result directory itself is the source of truth for run IDs
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use runledger::manager::{ExperimentConfig, ExperimentManager};
//! use runledger::params::ParameterSet;
//! use serde_json::json;
//!
//! let config = ExperimentConfig::builder("/data/experiments", "vision", "lr_sweep").build()?;
//! let mut manager = ExperimentManager::open(config)?;
//!
//! let mut params = ParameterSet::from_json(json!({"lr": "!uni(0.0001, 0.1)", "seed": 42}))?;
//! let _lr = params.resolve("lr")?;
//! let _seed = params.resolve("seed")?;
//!
//! // 0001_model.pt, logged with id, name, time_created, lr, seed
//! let path = manager.save_path("model.pt", &params)?;
//! println!("saving to {}", path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod manager;
pub mod params;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use experiment::{BatchedLogger, ImmediateLogger, RunId, RunLogger, RunRecord, RunRegistry};
pub use manager::{ExperimentConfig, ExperimentManager};
pub use params::{ParameterMap, ParameterSet, ParameterSpec};
