//! Parameter Resolution Engine
//!
//! A [`ParameterSet`] owns a serializable raw spec (literals and directive
//! strings) next to the samplers compiled from it. Every resolution draws a
//! fresh value and records it as the parameter's last sample, so the exact
//! inputs of a run can be logged alongside its results.
//!
//! ## Usage
//!
//! ```rust
//! use runledger::params::ParameterSet;
//! use serde_json::json;
//!
//! let mut params = ParameterSet::from_json(json!({
//!     "lr": "!uni(0.0001, 0.1)",
//!     "seed": 42,
//! }))?;
//!
//! let lr = params.resolve("lr")?;
//! assert_eq!(params.resolve("seed")?, json!(42));
//! assert_eq!(params.last_sample()["lr"], lr);
//! # Ok::<(), runledger::Error>(())
//! ```

pub mod expr;
mod sampler;

pub use sampler::{compile, compile_with, CompileOptions, Directive, Sampler, SENTINEL};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{Error, Result};

/// Ordered mapping from parameter name to a JSON value.
pub type ParameterMap = IndexMap<String, Value>;

/// Raw, serializable parameter specification (literals and directive strings).
pub type ParameterSpec = ParameterMap;

/// Identifiers of the `ParameterSet` surface that cannot be used as parameter names.
pub const RESERVED_NAMES: &[&str] = &[
    "add_or_replace",
    "builder",
    "contains",
    "dict",
    "export",
    "from_json",
    "get",
    "is_empty",
    "items",
    "keys",
    "last_sample",
    "len",
    "names",
    "new",
    "options",
    "raw",
    "resolve",
    "resolve_or",
    "sampler",
];

/// Whether `name` is in [`RESERVED_NAMES`].
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Named collection of raw specs and their compiled samplers.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    spec: ParameterSpec,
    samplers: FxHashMap<String, Sampler>,
    last_sample: FxHashMap<String, Value>,
    options: CompileOptions,
}

impl ParameterSet {
    /// Build a set from a spec with default options (`!eval` disabled).
    ///
    /// # Errors
    ///
    /// Returns `ReservedName` or any directive compile error for the first
    /// offending entry.
    pub fn new<K, I>(spec: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::builder().build(spec)
    }

    /// Build a set from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `value` is not an object, otherwise as [`ParameterSet::new`].
    pub fn from_json(value: Value) -> Result<Self> {
        Self::builder().build_json(value)
    }

    /// Create a builder for sets with non-default compile options.
    #[must_use]
    pub fn builder() -> ParameterSetBuilder {
        ParameterSetBuilder::default()
    }

    /// Compile options used for every add.
    #[must_use]
    pub const fn options(&self) -> CompileOptions {
        self.options
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spec.len()
    }

    /// Whether the set has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spec.is_empty()
    }

    /// Whether `name` was added.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.spec.contains_key(name)
    }

    /// Parameter names in spec order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spec.keys().map(String::as_str)
    }

    /// Raw spec value for `name`.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.spec.get(name)
    }

    /// Compiled sampler for `name`.
    #[must_use]
    pub fn sampler(&self, name: &str) -> Option<&Sampler> {
        self.samplers.get(name)
    }

    /// Compile `raw` and install it under `name`, replacing any previous spec.
    ///
    /// The last sample of other parameters is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ReservedName` for a reserved identifier, or a directive error;
    /// on error the set is unchanged.
    pub fn add_or_replace(&mut self, name: impl Into<String>, raw: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(Error::ReservedName(name));
        }
        let raw = raw.into();
        let sampler = compile_with(&raw, self.options)?;
        tracing::debug!(parameter = %name, raw = %raw, "compiled parameter");

        self.samplers.insert(name.clone(), sampler);
        self.spec.insert(name, raw);
        Ok(())
    }

    /// Draw a fresh value for `name` and record it as its last sample.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParameter` if `name` was never added, or `Evaluation`
    /// if an expression fails.
    pub fn resolve(&mut self, name: &str) -> Result<Value> {
        let sampler = self
            .samplers
            .get(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
        let value = sampler.sample()?;
        self.last_sample.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Like [`resolve`](Self::resolve), but returns `default` for an unknown name.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if an expression fails.
    pub fn resolve_or(&mut self, name: &str, default: impl Into<Value>) -> Result<Value> {
        if self.contains(name) {
            self.resolve(name)
        } else {
            Ok(default.into())
        }
    }

    /// Resolve every parameter once, in spec order.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if an expression fails.
    pub fn items(&mut self) -> Result<Vec<(String, Value)>> {
        let names: Vec<String> = self.spec.keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let value = self.resolve(&name)?;
                Ok((name, value))
            })
            .collect()
    }

    /// Raw spec, never the compiled samplers.
    #[must_use]
    pub const fn export(&self) -> &ParameterSpec {
        &self.spec
    }

    /// Most recent value per resolved parameter, in spec order.
    ///
    /// Parameters never resolved are absent.
    #[must_use]
    pub fn last_sample(&self) -> ParameterMap {
        self.spec
            .keys()
            .filter_map(|name| {
                self.last_sample
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }
}

/// Builder for [`ParameterSet`].
#[derive(Debug, Default)]
pub struct ParameterSetBuilder {
    options: CompileOptions,
}

impl ParameterSetBuilder {
    /// Allow `!eval` directives (restricted expression evaluator).
    #[must_use]
    pub const fn allow_eval(mut self, allow: bool) -> Self {
        self.options.allow_eval = allow;
        self
    }

    /// Set compile options wholesale.
    #[must_use]
    pub const fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Compile every entry of `spec` into a new set.
    ///
    /// # Errors
    ///
    /// Returns the first `ReservedName` or directive compile error.
    pub fn build<K, I>(self, spec: I) -> Result<ParameterSet>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut set = ParameterSet {
            options: self.options,
            ..ParameterSet::default()
        };
        for (name, raw) in spec {
            set.add_or_replace(name, raw)?;
        }
        Ok(set)
    }

    /// Compile a JSON object into a new set.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `value` is not an object, otherwise as [`build`](Self::build).
    pub fn build_json(self, value: Value) -> Result<ParameterSet> {
        match value {
            Value::Object(map) => self.build(map),
            other => Err(Error::Config(format!(
                "parameter spec must be a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_resolves_unchanged() {
        let mut params = ParameterSet::from_json(json!({"a": 1, "opt": "adam"})).unwrap();
        for _ in 0..10 {
            assert_eq!(params.resolve("a").unwrap(), json!(1));
            assert_eq!(params.resolve("opt").unwrap(), json!("adam"));
        }
    }

    #[test]
    fn test_reserved_name_rejected() {
        let err = ParameterSet::from_json(json!({"items": 1})).unwrap_err();
        assert!(matches!(err, Error::ReservedName(ref n) if n == "items"));

        let mut params = ParameterSet::default();
        assert!(params.add_or_replace("resolve", 1).is_err());
        assert!(params.add_or_replace("options", 1).is_err());
        assert!(params.is_empty());
    }

    #[test]
    fn test_unknown_parameter() {
        let mut params = ParameterSet::default();
        assert!(matches!(
            params.resolve("missing"),
            Err(Error::UnknownParameter(_))
        ));
        assert_eq!(params.resolve_or("missing", 7).unwrap(), json!(7));
        assert!(params.last_sample().is_empty());
    }

    #[test]
    fn test_replace_recompiles_and_keeps_other_samples() {
        let mut params = ParameterSet::from_json(json!({"a": 1, "b": 2})).unwrap();
        params.resolve("a").unwrap();
        params.resolve("b").unwrap();

        params.add_or_replace("b", "!rint(10,11)").unwrap();
        assert_eq!(params.last_sample()["a"], json!(1));
        assert_eq!(params.resolve("b").unwrap(), json!(10));
        assert_eq!(params.export()["b"], json!("!rint(10,11)"));
    }

    #[test]
    fn test_failed_add_leaves_set_unchanged() {
        let mut params = ParameterSet::from_json(json!({"a": "!uni(0,1)"})).unwrap();
        assert!(params.add_or_replace("a", "!uni(1)").is_err());
        assert_eq!(params.export()["a"], json!("!uni(0,1)"));
    }

    #[test]
    fn test_last_sample_in_spec_order() {
        let mut params = ParameterSet::from_json(json!({"lr": 0.1, "seed": 42})).unwrap();
        params.resolve("seed").unwrap();
        params.resolve("lr").unwrap();
        let names: Vec<_> = params.last_sample().keys().cloned().collect();
        assert_eq!(names, vec!["lr", "seed"]);
    }

    #[test]
    fn test_items_resolves_everything() {
        let mut params = ParameterSet::from_json(json!({"a": 1, "b": "!rint(0,2)"})).unwrap();
        let items = params.items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(params.last_sample().len(), 2);
    }

    #[test]
    fn test_eval_through_builder() {
        assert!(ParameterSet::from_json(json!({"x": "!eval(2 * 3)"})).is_err());

        let mut params = ParameterSet::builder()
            .allow_eval(true)
            .build_json(json!({"x": "!eval(2 * 3)"}))
            .unwrap();
        assert_eq!(params.resolve("x").unwrap(), json!(6.0));
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(matches!(
            ParameterSet::from_json(json!([1, 2])),
            Err(Error::Config(_))
        ));
    }
}
