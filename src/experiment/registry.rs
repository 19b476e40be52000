//! Run Registry - monotonic run-ID allocation from on-disk state
//!
//! Result files are named `<zero-padded id>_<filename>`. The filename scan is
//! the source of truth for the next ID; a counter file next to the results
//! keeps IDs monotonic when a caller never writes the file it asked a path
//! for, and an advisory lock on a lock file serializes scan → allocate → log
//! across processes. The OS drops the lock when its holder exits, so a
//! crashed writer never blocks later saves.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::RunId;
use crate::{Error, Result};

/// Default zero-padded width of run IDs in filenames.
pub const DEFAULT_ID_WIDTH: usize = 4;

/// Default ignore substrings for incidental filesystem artifacts.
pub const DEFAULT_IGNORE: &[&str] = &[".DS"];

/// Default time to wait for the run lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of the registry's own bookkeeping files, never scanned.
pub const REGISTRY_FILE_PREFIX: &str = ".runledger";

const LOCK_FILE: &str = ".runledger.lock";
const COUNTER_FILE: &str = ".runledger.counter";
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Scan `result_dir` and return `max(prefix) + 1`, or `0` when no
/// non-ignored file exists.
///
/// A filename is ignored if it contains any of `ignore`. The prefix is the
/// text before the first `_`.
///
/// # Errors
///
/// Returns `NonIntegerPrefix` for the first non-ignored file whose prefix is
/// not an integer, `IdExhausted` if the largest prefix is `u64::MAX`, or an
/// IO error if the directory cannot be read.
pub fn next_id<S: AsRef<str>>(result_dir: &Path, ignore: &[S]) -> Result<RunId> {
    let mut max: Option<RunId> = None;
    for entry in fs::read_dir(result_dir)? {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(REGISTRY_FILE_PREFIX)
            || ignore.iter().any(|i| file_name.contains(i.as_ref()))
        {
            continue;
        }

        let prefix = file_name.split('_').next().unwrap_or_default();
        let id: RunId = prefix.parse().map_err(|_| Error::NonIntegerPrefix {
            file: file_name.to_string(),
            dir: result_dir.to_path_buf(),
        })?;
        max = Some(max.map_or(id, |m| m.max(id)));
    }
    max.map_or(Ok(0), |m| successor(m, result_dir))
}

fn successor(id: RunId, dir: &Path) -> Result<RunId> {
    id.checked_add(1)
        .ok_or_else(|| Error::IdExhausted(dir.to_path_buf()))
}

/// Render `<zero-padded id>_<base_name>`.
#[must_use]
pub fn format_filename(id: RunId, width: usize, base_name: &str) -> String {
    format!("{id:0width$}_{base_name}")
}

/// Exclusive lock on a result directory, released on drop or process exit.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

/// Allocates run IDs for one result directory.
#[derive(Debug, Clone)]
pub struct RunRegistry {
    dir: PathBuf,
    ignore: Vec<String>,
    width: usize,
    lock_timeout: Duration,
}

impl RunRegistry {
    /// Create a registry over `dir` with default width, ignore list and timeout.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ignore: DEFAULT_IGNORE.iter().map(ToString::to_string).collect(),
            width: DEFAULT_ID_WIDTH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the ignore substrings.
    #[must_use]
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Set the zero-padded ID width.
    #[must_use]
    pub const fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Set how long [`lock`](Self::lock) waits.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Result directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Zero-padded ID width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Scan the result directory, see [`next_id`].
    ///
    /// # Errors
    ///
    /// See [`next_id`].
    pub fn next_id(&self) -> Result<RunId> {
        next_id(&self.dir, self.ignore.as_slice())
    }

    /// Acquire the directory lock, polling until the timeout.
    ///
    /// The lock file itself is left in place; only the advisory lock on it
    /// is exclusive.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if another holder keeps the lock, or an IO error.
    pub fn lock(&self) -> Result<RunLock> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let contended = fs2::lock_contended_error().kind();
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(RunLock { path, file }),
                Err(e) if e.kind() == contended => {
                    if start.elapsed() >= self.lock_timeout {
                        return Err(Error::LockTimeout(path));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Last ID recorded in the counter file, if readable.
    #[must_use]
    pub fn last_allocated(&self) -> Option<RunId> {
        let path = self.dir.join(COUNTER_FILE);
        let text = fs::read_to_string(&path).ok()?;
        match text.trim().parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable run counter");
                None
            }
        }
    }

    /// Compute the ID for the next save: `max(next_id, counter + 1, 1)`.
    ///
    /// Nothing is persisted until [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// See [`next_id`]; `IdExhausted` also when the counter is at `u64::MAX`.
    pub fn allocate(&self, _lock: &RunLock) -> Result<RunId> {
        let scanned = self.next_id()?;
        let counted = match self.last_allocated() {
            Some(id) => successor(id, &self.dir)?,
            None => 0,
        };
        let id = scanned.max(counted).max(1);
        tracing::debug!(id, scanned, counted, dir = %self.dir.display(), "allocated run id");
        Ok(id)
    }

    /// Record `id` as the last allocated ID.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the counter file cannot be written.
    pub fn commit(&self, _lock: &RunLock, id: RunId) -> Result<()> {
        let path = self.dir.join(COUNTER_FILE);
        let tmp = self.dir.join(format!("{COUNTER_FILE}.tmp"));
        fs::write(&tmp, format!("{id}\n"))?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Filename for `id` under this registry's width.
    #[must_use]
    pub fn filename(&self, id: RunId, base_name: &str) -> String {
        format_filename(id, self.width, base_name)
    }

    /// Full result path for `id`.
    #[must_use]
    pub fn path_for(&self, id: RunId, base_name: &str) -> PathBuf {
        self.dir.join(self.filename(id, base_name))
    }
}
