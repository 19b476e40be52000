//! Experiment Manager - directory layout and the save-path control flow
//!
//! ```text
//! <root>/global_configs/                 configs shared by every project
//! <root>/projects/<project>/configs/     project configs
//! <root>/projects/<project>/logs/        <experiment>.csv run logs
//! <root>/projects/<project>/<experiment>/ 0001_<file>, 0002_<file>, ...
//! ```
//!
//! Requesting a save path locks the result directory, allocates the next
//! run ID, logs the parameters used for that run under the ID and returns
//! the ID-qualified path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigStore;
use crate::experiment::{
    BatchedLogger, ImmediateLogger, RunId, RunLogger, RunRecord, RunRegistry, DEFAULT_ID_WIDTH,
    DEFAULT_IGNORE, DEFAULT_LOCK_TIMEOUT,
};
use crate::params::{CompileOptions, ParameterMap, ParameterSet};
use crate::{Error, Result};

/// Experiment configuration. The root directory is always explicit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentConfig {
    root: PathBuf,
    project: String,
    experiment: String,
    id_width: usize,
    ignore: Vec<String>,
    lock_timeout_ms: u64,
    allow_eval: bool,
}

impl ExperimentConfig {
    /// Create a builder with the required fields.
    #[must_use]
    pub fn builder(
        root: impl Into<PathBuf>,
        project: impl Into<String>,
        experiment: impl Into<String>,
    ) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::new(root, project, experiment)
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Zero-padded run-ID width.
    #[must_use]
    pub const fn id_width(&self) -> usize {
        self.id_width
    }

    /// Ignore substrings for the result-directory scan.
    #[must_use]
    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    /// Run lock timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Whether configs loaded through the manager may use `!eval`.
    #[must_use]
    pub const fn allow_eval(&self) -> bool {
        self.allow_eval
    }
}

/// Builder for `ExperimentConfig`.
#[derive(Debug)]
pub struct ExperimentConfigBuilder {
    config: ExperimentConfig,
}

impl ExperimentConfigBuilder {
    /// Create a new builder with required fields and defaults.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        project: impl Into<String>,
        experiment: impl Into<String>,
    ) -> Self {
        Self {
            config: ExperimentConfig {
                root: root.into(),
                project: project.into(),
                experiment: experiment.into(),
                id_width: DEFAULT_ID_WIDTH,
                ignore: DEFAULT_IGNORE.iter().map(ToString::to_string).collect(),
                lock_timeout_ms: u64::try_from(DEFAULT_LOCK_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                allow_eval: false,
            },
        }
    }

    /// Set the zero-padded run-ID width.
    #[must_use]
    pub const fn id_width(mut self, width: usize) -> Self {
        self.config.id_width = width;
        self
    }

    /// Replace the ignore substrings.
    #[must_use]
    pub fn ignore<I, S>(mut self, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ignore = ignore.into_iter().map(Into::into).collect();
        self
    }

    /// Set the run lock timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Allow `!eval` in configs loaded through the manager.
    #[must_use]
    pub const fn allow_eval(mut self, allow: bool) -> Self {
        self.config.allow_eval = allow;
        self
    }

    /// Validate and build the config.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an empty or path-like project/experiment name, or
    /// a zero ID width.
    pub fn build(self) -> Result<ExperimentConfig> {
        let config = self.config;
        for (what, name) in [("project", &config.project), ("experiment", &config.experiment)] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(Error::Config(format!("invalid {what} name '{name}'")));
            }
        }
        if matches!(config.experiment.as_str(), "configs" | "logs") {
            return Err(Error::Config(format!(
                "experiment name '{}' clashes with the project layout",
                config.experiment
            )));
        }
        if config.id_width == 0 {
            return Err(Error::Config("id_width must be at least 1".to_string()));
        }
        Ok(config)
    }
}

/// Directory layout derived from an `ExperimentConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLayout {
    /// `<root>`
    pub root: PathBuf,
    /// `<root>/global_configs`
    pub global_configs: PathBuf,
    /// `<root>/projects`
    pub projects: PathBuf,
    /// `<root>/projects/<project>`
    pub project: PathBuf,
    /// `<root>/projects/<project>/configs`
    pub project_configs: PathBuf,
    /// `<root>/projects/<project>/logs`
    pub logs: PathBuf,
    /// `<root>/projects/<project>/logs/<experiment>.csv`
    pub log_file: PathBuf,
    /// `<root>/projects/<project>/<experiment>`
    pub results: PathBuf,
}

impl ExperimentLayout {
    /// Compute the layout without touching the filesystem.
    #[must_use]
    pub fn new(config: &ExperimentConfig) -> Self {
        let root = config.root.clone();
        let projects = root.join("projects");
        let project = projects.join(&config.project);
        let logs = project.join("logs");
        Self {
            global_configs: root.join("global_configs"),
            project_configs: project.join("configs"),
            log_file: logs.join(format!("{}.csv", config.experiment)),
            results: project.join(&config.experiment),
            root,
            projects,
            project,
            logs,
        }
    }

    /// Create every directory of the layout.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a directory cannot be created.
    pub fn create_all(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.global_configs,
            &self.projects,
            &self.project,
            &self.project_configs,
            &self.logs,
            &self.results,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Manages one experiment's configs, result paths and run log.
///
/// The logger type decides when rows reach disk: the default
/// [`ImmediateLogger`] writes on every save, a [`BatchedLogger`] manager
/// must call [`flush_logs`](Self::flush_logs).
#[derive(Debug)]
pub struct ExperimentManager<L: RunLogger = ImmediateLogger> {
    config: ExperimentConfig,
    layout: ExperimentLayout,
    registry: RunRegistry,
    logger: L,
}

impl ExperimentManager<ImmediateLogger> {
    /// Bootstrap the layout and log every save immediately.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the layout cannot be created.
    pub fn open(config: ExperimentConfig) -> Result<Self> {
        Self::with_logger(config, |path| ImmediateLogger::new(path))
    }
}

impl ExperimentManager<BatchedLogger> {
    /// Bootstrap the layout and buffer log rows until [`flush_logs`](Self::flush_logs).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the layout cannot be created.
    pub fn open_batched(config: ExperimentConfig) -> Result<Self> {
        Self::with_logger(config, |path| BatchedLogger::new(path))
    }

    /// Rows saved but not yet flushed.
    #[must_use]
    pub const fn pending_logs(&self) -> usize {
        self.logger.pending()
    }
}

impl<L: RunLogger> ExperimentManager<L> {
    /// Bootstrap the layout with a custom logger built from the log path.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the layout cannot be created.
    pub fn with_logger(config: ExperimentConfig, make_logger: impl FnOnce(PathBuf) -> L) -> Result<Self> {
        let layout = ExperimentLayout::new(&config);
        layout.create_all()?;
        let registry = RunRegistry::new(&layout.results)
            .with_ignore(config.ignore.clone())
            .with_width(config.id_width)
            .with_lock_timeout(config.lock_timeout());
        let logger = make_logger(layout.log_file.clone());
        tracing::debug!(root = %layout.root.display(), project = %config.project, experiment = %config.experiment, "opened experiment");
        Ok(Self {
            config,
            layout,
            registry,
            logger,
        })
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Directory layout.
    #[must_use]
    pub const fn layout(&self) -> &ExperimentLayout {
        &self.layout
    }

    /// Result directory of this experiment.
    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.layout.results
    }

    /// Run log file of this experiment.
    #[must_use]
    pub fn log_file(&self) -> &Path {
        &self.layout.log_file
    }

    /// Run registry over the result directory.
    #[must_use]
    pub const fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Logger.
    #[must_use]
    pub const fn logger(&self) -> &L {
        &self.logger
    }

    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            allow_eval: self.config.allow_eval,
        }
    }

    /// Configs shared across projects.
    #[must_use]
    pub fn global_configs(&self) -> ConfigStore {
        ConfigStore::new(&self.layout.global_configs).with_options(self.compile_options())
    }

    /// Configs of this project.
    #[must_use]
    pub fn configs(&self) -> ConfigStore {
        ConfigStore::new(&self.layout.project_configs).with_options(self.compile_options())
    }

    /// Allocate a run ID, log the last sampled values of `params` under it and
    /// return the ID-qualified path for `filename`.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerPrefix` for a stray result file, `IdExhausted`,
    /// `LockTimeout`, or a counter or log IO error. Nothing is logged on error.
    pub fn save_path(&mut self, filename: &str, params: &ParameterSet) -> Result<PathBuf> {
        self.save_path_with(filename, &params.last_sample())
    }

    /// Like [`save_path`](Self::save_path) with an explicit parameter map.
    ///
    /// # Errors
    ///
    /// See [`save_path`](Self::save_path).
    pub fn save_path_with(&mut self, filename: &str, params: &ParameterMap) -> Result<PathBuf> {
        let id = self.log_run(filename, params)?;
        Ok(self.registry.path_for(id, filename))
    }

    /// Allocate and log a run without parameters.
    ///
    /// # Errors
    ///
    /// See [`save_path`](Self::save_path).
    pub fn save_path_untracked(&mut self, filename: &str) -> Result<PathBuf> {
        tracing::warn!(filename, "saving without parameters, this run cannot be replicated");
        self.save_path_with(filename, &ParameterMap::new())
    }

    fn log_run(&mut self, filename: &str, params: &ParameterMap) -> Result<RunId> {
        let lock = self.registry.lock()?;
        let id = self.registry.allocate(&lock)?;
        // Committed first: a failed append skips `id`, it never reuses it.
        self.registry.commit(&lock, id)?;
        self.logger
            .append(RunRecord::new(id, base_name(filename), params))?;
        tracing::debug!(id, filename, "saved run");
        Ok(id)
    }

    /// Persist buffered log rows; a no-op for immediate logging.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the log cannot be written.
    pub fn flush_logs(&mut self) -> Result<()> {
        self.logger.flush()
    }
}

fn base_name(filename: &str) -> String {
    Path::new(filename).file_stem().map_or_else(
        || filename.to_string(),
        |stem| stem.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExperimentConfig::builder("/data", "proj", "exp").build().unwrap();
        assert_eq!(config.id_width(), 4);
        assert_eq!(config.ignore(), [".DS".to_string()]);
        assert!(!config.allow_eval());
    }

    #[test]
    fn test_config_rejects_bad_names() {
        assert!(ExperimentConfig::builder("/data", "", "exp").build().is_err());
        assert!(ExperimentConfig::builder("/data", "proj", "a/b").build().is_err());
        assert!(ExperimentConfig::builder("/data", "proj", "exp")
            .id_width(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_layout_paths() {
        let config = ExperimentConfig::builder("/data", "proj", "exp").build().unwrap();
        let layout = ExperimentLayout::new(&config);
        assert_eq!(layout.results, Path::new("/data/projects/proj/exp"));
        assert_eq!(layout.log_file, Path::new("/data/projects/proj/logs/exp.csv"));
        assert_eq!(layout.global_configs, Path::new("/data/global_configs"));
        assert_eq!(layout.project_configs, Path::new("/data/projects/proj/configs"));
    }

    #[test]
    fn test_base_name_strips_extension() {
        assert_eq!(base_name("model.pt"), "model");
        assert_eq!(base_name("archive.tar.gz"), "archive.tar");
        assert_eq!(base_name("plain"), "plain");
    }
}
