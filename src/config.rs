//! Config Store - named parameter specs as JSON files in a directory
//!
//! Each `<name>.json` file holds one raw parameter spec (a JSON object of
//! literals and directive strings). Only raw specs are ever written, never
//! sampled values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::params::{CompileOptions, ParameterSet, ParameterSpec};
use crate::{Error, Result};

const EXTENSION: &str = "json";

/// Directory of named parameter specs.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    options: CompileOptions,
}

impl ConfigStore {
    /// Create a store over `dir`. The directory is not created.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            options: CompileOptions::default(),
        }
    }

    /// Compile options for sets loaded from this store.
    #[must_use]
    pub const fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory backing the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for `name`, appending `.json` when missing.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file = if Path::new(name).extension().is_some_and(|ext| ext == EXTENSION) {
            name.to_string()
        } else {
            format!("{name}.{EXTENSION}")
        };
        self.dir.join(file)
    }

    /// Names of every stored spec, sorted.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be read.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load the raw spec stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file is missing or is not a JSON object.
    pub fn load(&self, name: &str) -> Result<ParameterSpec> {
        let path = self.path_for(name);
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{} is not a parameter spec: {e}", path.display())))
    }

    /// Load and compile the spec stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an unreadable file, otherwise any compile error.
    pub fn load_set(&self, name: &str) -> Result<ParameterSet> {
        ParameterSet::builder()
            .options(self.options)
            .build(self.load(name)?)
    }

    /// Load and compile every stored spec, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns the first load or compile error.
    pub fn load_all(&self) -> Result<BTreeMap<String, ParameterSet>> {
        self.names()?
            .into_iter()
            .map(|name| {
                let set = self.load_set(&name)?;
                Ok((name, set))
            })
            .collect()
    }

    /// Write a raw spec under `name`, returning the file path.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if the file cannot be written.
    pub fn save_spec(&self, name: &str, spec: &ParameterSpec) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        fs::write(&path, serde_json::to_string_pretty(spec)?)?;
        tracing::debug!(path = %path.display(), "saved parameter spec");
        Ok(path)
    }

    /// Write the exported spec of `params` under `name`.
    ///
    /// # Errors
    ///
    /// See [`save_spec`](Self::save_spec).
    pub fn save(&self, name: &str, params: &ParameterSet) -> Result<PathBuf> {
        self.save_spec(name, params.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_for_appends_extension_once() {
        let store = ConfigStore::new("/tmp/configs");
        assert_eq!(store.path_for("sweep"), Path::new("/tmp/configs/sweep.json"));
        assert_eq!(store.path_for("sweep.json"), Path::new("/tmp/configs/sweep.json"));
    }

    #[test]
    fn test_save_and_load_roundtrip_keeps_directives() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let mut params =
            ParameterSet::from_json(json!({"lr": "!uni(0.001,0.1)", "layers": [64, 64]})).unwrap();
        params.resolve("lr").unwrap();
        store.save("base", &params).unwrap();

        let spec = store.load("base").unwrap();
        assert_eq!(spec["lr"], json!("!uni(0.001,0.1)"));
        assert_eq!(spec.keys().collect::<Vec<_>>(), vec!["lr", "layers"]);
        assert_eq!(store.names().unwrap(), vec!["base"]);
    }

    #[test]
    fn test_load_all_and_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store
            .save_spec("a", &serde_json::from_value(json!({"x": 1})).unwrap())
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all["a"].contains("x"));

        fs::write(dir.path().join("broken.json"), "[1, 2]").unwrap();
        assert!(matches!(store.load("broken"), Err(Error::Config(_))));
        assert!(matches!(store.load("missing"), Err(Error::Config(_))));
    }
}
