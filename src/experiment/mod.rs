//! Run Registry & Provenance Logging
//!
//! ## Schema Overview
//!
//! ```text
//! result dir: 0001_model.pt, 0002_model.pt, ...   (RunRegistry)
//!                 │
//!                 └── logs/<experiment>.csv        (RunLog, one RunRecord per ID)
//!                     id, name, time_created, <flattened parameters...>
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use runledger::experiment::{ImmediateLogger, RunLogger, RunRecord, RunRegistry};
//! use runledger::params::ParameterMap;
//!
//! # fn main() -> runledger::Result<()> {
//! # let results = tempfile::tempdir()?;
//! # let logs = tempfile::tempdir()?;
//! let registry = RunRegistry::new(results.path());
//! let mut logger = ImmediateLogger::new(logs.path().join("first_exp.csv"));
//!
//! let lock = registry.lock()?;
//! let id = registry.allocate(&lock)?;
//! logger.append(RunRecord::new(id, "model", &ParameterMap::new()))?;
//! registry.commit(&lock, id)?;
//!
//! assert_eq!(registry.filename(id, "model.pt"), "0001_model.pt");
//! # Ok(())
//! # }
//! ```

mod log;
mod logger;
mod registry;
mod run_record;

pub use log::RunLog;
pub use logger::{BatchedLogger, ImmediateLogger, RunLogger};
pub use registry::{
    format_filename, next_id, RunLock, RunRegistry, DEFAULT_ID_WIDTH, DEFAULT_IGNORE,
    DEFAULT_LOCK_TIMEOUT, REGISTRY_FILE_PREFIX,
};
pub use run_record::{
    flatten, render_cell, RunId, RunRecord, ID_COLUMN, METADATA_COLUMNS, NAME_COLUMN,
    TIME_COLUMN, TIME_FORMAT,
};
