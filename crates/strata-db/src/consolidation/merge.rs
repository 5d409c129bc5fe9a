//! The merge fold: turns a run of observations sharing a consolidation key
//! into one row.
//!
//! Pure functions over already loaded rows. The engine applies the
//! resulting plans under optimistic version checks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use strata_core::entities::Observation;

use super::classify::ClassificationTable;
use crate::helpers::timestamp;

/// Key under which a consolidated row records how it was produced.
pub const CONSOLIDATED_KEY: &str = "_consolidated";

/// What to write for one consolidation key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPlan {
    pub consolidation_key: String,
    /// Newest row. Rewritten in place with `value`.
    pub keep: Observation,
    /// Older rows, archived with `superseded_by = keep.id`.
    pub archive: Vec<Observation>,
    pub value: Value,
    pub merge_count: u32,
}

/// Whether a stored value was produced by a previous merge.
#[must_use]
pub fn is_consolidated(value: &Value) -> bool {
    value.get(CONSOLIDATED_KEY).is_some()
}

/// The metric carried by an observation value.
///
/// Consolidated rows carry it under `value`. Raw object values are read at
/// the consolidation key first, then at `value`. Anything else is the metric
/// itself.
#[must_use]
pub fn metric_of(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) if is_consolidated(value) => {
            map.get("value").cloned().unwrap_or(Value::Null)
        }
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.get("value"))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Percentage change from `previous` to `latest`, rounded to 0.1.
///
/// `None` unless both are numbers and `previous` is non-zero.
#[must_use]
pub fn percent_delta(previous: &Value, latest: &Value) -> Option<f64> {
    let previous = previous.as_f64()?;
    let latest = latest.as_f64()?;
    if previous.abs() < f64::EPSILON {
        return None;
    }
    let pct = (latest - previous) / previous.abs() * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

struct Fold {
    value: Value,
    previous: Option<Value>,
    first_recorded_at: String,
    last_updated_at: String,
    merge_count: u32,
}

impl Fold {
    fn seed(row: &Observation, key: &str) -> Self {
        let first_recorded_at = row
            .value
            .get("first_recorded_at")
            .and_then(Value::as_str)
            .map_or_else(|| timestamp(&row.created_at), str::to_string);
        Self {
            value: metric_of(&row.value, key),
            previous: row.value.get("previous").filter(|_| is_consolidated(&row.value)).cloned(),
            first_recorded_at,
            last_updated_at: timestamp(&row.created_at),
            merge_count: prior_merge_count(row),
        }
    }

    fn absorb(&mut self, row: &Observation, key: &str) {
        let latest = metric_of(&row.value, key);
        self.previous = Some(std::mem::replace(&mut self.value, latest));
        self.last_updated_at = timestamp(&row.created_at);
        self.merge_count += prior_merge_count(row);
    }

    fn into_value(self, key: &str, table_version: u32, now: DateTime<Utc>) -> Value {
        let mut out = Map::new();
        // Opaque values are replaced outright; only numbers carry history.
        let numeric = self.value.is_number();
        let previous = self.previous.filter(|p| numeric && p.is_number());
        if let Some(delta) = previous.as_ref().and_then(|p| percent_delta(p, &self.value)) {
            out.insert("delta".into(), Value::from(delta));
        }
        out.insert("value".into(), self.value);
        if let Some(previous) = previous {
            out.insert("previous".into(), previous);
        }
        out.insert("first_recorded_at".into(), Value::String(self.first_recorded_at));
        out.insert("last_updated_at".into(), Value::String(self.last_updated_at));
        out.insert("merge_count".into(), Value::from(self.merge_count));
        out.insert("consolidation_key".into(), Value::String(key.to_string()));
        out.insert(
            CONSOLIDATED_KEY.into(),
            serde_json::json!({ "table_version": table_version, "at": timestamp(&now) }),
        );
        Value::Object(out)
    }
}

fn prior_merge_count(row: &Observation) -> u32 {
    if !is_consolidated(&row.value) {
        return 1;
    }
    row.value
        .get("merge_count")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1)
}

/// Plan merges for every consolidation key with more than one active row.
///
/// Only active, keyed rows of statistical kinds take part. A key with a
/// single active row (consolidated or not) needs nothing, which is what
/// makes a second pass a no-op.
#[must_use]
pub fn plan_merges(
    observations: &[Observation],
    table: &ClassificationTable,
    now: DateTime<Utc>,
) -> Vec<KeyPlan> {
    let mut groups: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        if !obs.is_active() || !table.is_statistical(&obs.observation_kind) {
            continue;
        }
        if let Some(key) = obs.consolidation_key.as_deref() {
            groups.entry(key).or_default().push(obs);
        }
    }

    let mut plans = Vec::new();
    for (key, mut rows) in groups {
        if rows.len() < 2 {
            continue;
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut fold = Fold::seed(rows[0], key);
        for row in &rows[1..] {
            fold.absorb(row, key);
        }
        let merge_count = fold.merge_count;
        let Some((keep, older)) = rows.split_last() else {
            continue;
        };
        plans.push(KeyPlan {
            consolidation_key: key.to_string(),
            keep: (*keep).clone(),
            archive: older.iter().map(|o| (*o).clone()).collect(),
            value: fold.into_value(key, table.version, now),
            merge_count,
        });
    }
    plans
}
