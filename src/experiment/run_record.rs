//! Run Record - one provenance row per allocated run ID

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::ParameterMap;

/// Run identifier, unique and strictly increasing within one result directory.
pub type RunId = u64;

/// Column holding the run ID.
pub const ID_COLUMN: &str = "id";
/// Column holding the result base name.
pub const NAME_COLUMN: &str = "name";
/// Column holding the creation timestamp.
pub const TIME_COLUMN: &str = "time_created";
/// Metadata columns, always first in a run log.
pub const METADATA_COLUMNS: [&str; 3] = [ID_COLUMN, NAME_COLUMN, TIME_COLUMN];

/// Timestamp format used in run logs.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Expand list and mapping values one level into scalar-named entries.
///
/// `[a, b]` under `key` becomes `key_0`, `key_1`; `{x: ..}` becomes `key_x`.
/// Everything else passes through. Values nested deeper than one level are
/// kept as-is in the expanded entry.
///
/// Lossy cases, each logged as a warning:
/// - an empty list or mapping expands to no entry at all
/// - an expanded name equal to an earlier entry (`{"b": [1], "b_0": 5}`)
///   overwrites it; the later value wins and keeps the earlier position
#[must_use]
pub fn flatten(params: &ParameterMap) -> ParameterMap {
    let mut flat = ParameterMap::with_capacity(params.len());
    for (name, value) in params {
        match value {
            Value::Array(items) if items.is_empty() => {
                tracing::warn!(param = %name, "empty list parameter has no log column");
            }
            Value::Object(entries) if entries.is_empty() => {
                tracing::warn!(param = %name, "empty mapping parameter has no log column");
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    put(&mut flat, format!("{name}_{i}"), item.clone());
                }
            }
            Value::Object(entries) => {
                for (key, item) in entries {
                    put(&mut flat, format!("{name}_{key}"), item.clone());
                }
            }
            _ => put(&mut flat, name.clone(), value.clone()),
        }
    }
    flat
}

fn put(flat: &mut ParameterMap, column: String, value: Value) {
    if flat.contains_key(&column) {
        tracing::warn!(column = %column, "flattened parameter column collides, later value kept");
    }
    flat.insert(column, value);
}

/// Render a value as a log cell; `null` is an absent cell.
#[must_use]
pub fn render_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Run Record: the run ID, result name, creation time and flattened
/// parameter values used for that run.
///
/// Records are created once when a save path is requested and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    id: RunId,
    name: String,
    time_created: DateTime<Utc>,
    params: ParameterMap,
}

impl RunRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(id: RunId, name: impl Into<String>, params: &ParameterMap) -> Self {
        Self::record(id, name, params, Utc::now())
    }

    /// Create a record from nested parameter values and an explicit timestamp.
    ///
    /// Parameters are flattened; a flattened column that collides with a
    /// metadata column is dropped.
    #[must_use]
    pub fn record(
        id: RunId,
        name: impl Into<String>,
        params: &ParameterMap,
        time_created: DateTime<Utc>,
    ) -> Self {
        let mut params = flatten(params);
        params.retain(|column, _| {
            let clash = METADATA_COLUMNS.contains(&column.as_str());
            if clash {
                tracing::warn!(column = %column, "parameter column shadows run metadata, dropped");
            }
            !clash
        });
        Self {
            id,
            name: name.into(),
            time_created,
            params,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Get the result base name (extension stripped).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn time_created(&self) -> DateTime<Utc> {
        self.time_created
    }

    /// Get the flattened parameter values.
    #[must_use]
    pub const fn params(&self) -> &ParameterMap {
        &self.params
    }

    /// All cells of this row as `(column, cell)`, metadata first.
    pub fn cells(&self) -> impl Iterator<Item = (&str, Option<String>)> + '_ {
        let metadata: [(&str, Option<String>); 3] = [
            (ID_COLUMN, Some(self.id.to_string())),
            (NAME_COLUMN, Some(self.name.clone())),
            (
                TIME_COLUMN,
                Some(self.time_created.format(TIME_FORMAT).to_string()),
            ),
        ];
        metadata.into_iter().chain(
            self.params
                .iter()
                .map(|(column, value)| (column.as_str(), render_cell(value))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ParameterMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_flatten_list_and_scalar() {
        let flat = flatten(&map(json!({"a": 1, "b": [10, 20]})));
        assert_eq!(flat, map(json!({"a": 1, "b_0": 10, "b_1": 20})));
    }

    #[test]
    fn test_flatten_mapping_one_level() {
        let flat = flatten(&map(json!({"opt": {"name": "adam", "betas": [0.9, 0.99]}})));
        assert_eq!(flat["opt_name"], json!("adam"));
        assert_eq!(flat["opt_betas"], json!([0.9, 0.99]));
    }

    #[test]
    fn test_flatten_drops_empty_containers() {
        let flat = flatten(&map(json!({"a": [], "b": {}, "c": 1})));
        assert_eq!(flat, map(json!({"c": 1})));
    }

    #[test]
    fn test_flatten_collision_keeps_later_value() {
        let flat = flatten(&map(json!({"b": [1], "b_0": 5, "z": 0})));
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["b_0"], json!(5));
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["b_0", "z"]);
    }

    #[test]
    fn test_record_cells_order() {
        let record = RunRecord::new(3, "model", &map(json!({"lr": 0.01, "seed": 42})));
        let columns: Vec<_> = record.cells().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["id", "name", "time_created", "lr", "seed"]);
        assert_eq!(record.id(), 3);
        assert_eq!(record.name(), "model");
    }

    #[test]
    fn test_metadata_wins_over_params() {
        let record = RunRecord::new(1, "run", &map(json!({"id": 99, "x": 1})));
        assert!(!record.params().contains_key("id"));
        assert_eq!(record.params()["x"], json!(1));
    }

    #[test]
    fn test_render_cell() {
        assert_eq!(render_cell(&json!("a")), Some("a".to_string()));
        assert_eq!(render_cell(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(render_cell(&json!(true)), Some("true".to_string()));
        assert_eq!(render_cell(&json!(null)), None);
        assert_eq!(render_cell(&json!([1, 2])), Some("[1,2]".to_string()));
    }
}
