//! Provenance loggers - immediate and batched persistence of run records
//!
//! Both variants share the [`RunLogger`] contract. The flush obligation of
//! batched logging lives in the type: rows appended to a [`BatchedLogger`]
//! reach disk only on [`RunLogger::flush`].

use std::path::{Path, PathBuf};

use super::{RunLog, RunRecord};
use crate::Result;

/// Append/flush contract shared by the logger variants.
pub trait RunLogger {
    /// Append one record to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing log cannot be read or written.
    fn append(&mut self, record: RunRecord) -> Result<()>;

    /// Persist any rows not yet on disk. No-op when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    fn flush(&mut self) -> Result<()>;

    /// Location of the persisted log.
    fn path(&self) -> &Path;
}

/// Loads, appends and rewrites the whole log on every call.
#[derive(Debug, Clone)]
pub struct ImmediateLogger {
    path: PathBuf,
}

impl ImmediateLogger {
    /// Create a logger writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RunLogger for ImmediateLogger {
    fn append(&mut self, record: RunRecord) -> Result<()> {
        let mut log = RunLog::open(&self.path)?;
        log.push(&record);
        log.save(&self.path)?;
        tracing::debug!(id = record.id(), path = %self.path.display(), "logged run");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Accumulates records in memory until an explicit flush.
///
/// The persisted log is loaded on the first append and kept for the
/// logger's lifetime. Dropping the logger with pending rows loses them.
#[derive(Debug)]
pub struct BatchedLogger {
    path: PathBuf,
    log: Option<RunLog>,
    pending: usize,
}

impl BatchedLogger {
    /// Create a logger writing to `path` on flush.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            log: None,
            pending: 0,
        }
    }

    /// Number of rows appended since the last flush.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Accumulated log, including pending rows.
    #[must_use]
    pub const fn log(&self) -> Option<&RunLog> {
        self.log.as_ref()
    }
}

impl RunLogger for BatchedLogger {
    fn append(&mut self, record: RunRecord) -> Result<()> {
        let log = match self.log.take() {
            Some(log) => log,
            None => RunLog::open(&self.path)?,
        };
        self.log.insert(log).push(&record);
        self.pending += 1;
        tracing::debug!(id = record.id(), pending = self.pending, "buffered run");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        if let Some(log) = &self.log {
            log.save(&self.path)?;
        }
        self.pending = 0;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BatchedLogger {
    fn drop(&mut self) {
        if self.pending > 0 {
            tracing::warn!(
                pending = self.pending,
                path = %self.path.display(),
                "batched run log dropped without flush, rows lost"
            );
        }
    }
}
