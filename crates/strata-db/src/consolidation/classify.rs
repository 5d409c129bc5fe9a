//! Observation classification for consolidation.
//!
//! Classification is an explicit lookup by observation kind. Values are
//! never inspected to decide whether something is a metric.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Kinds that are always appended, whatever table or flags say.
pub const NEVER_CONSOLIDATE: [&str; 5] = [
    "learning",
    "insight",
    "pattern_discovery",
    "error_analysis",
    "optimization_result",
];

/// How observations of a kind evolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationClass {
    /// A series of measurements: newer values replace older ones.
    Statistical,
    /// Independent facts: every row is kept.
    Append,
}

/// Versioned mapping from observation kind to [`ObservationClass`].
///
/// The version is stamped into every consolidated row, so a later table
/// change can be told apart from rows merged under an older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTable {
    pub version: u32,
    statistical: BTreeSet<String>,
}

impl ClassificationTable {
    /// A table with no statistical kinds.
    #[must_use]
    pub const fn empty(version: u32) -> Self {
        Self {
            version,
            statistical: BTreeSet::new(),
        }
    }

    /// Builder: mark `kind` as statistical.
    ///
    /// Never-consolidate kinds are accepted but still classify as `Append`.
    #[must_use]
    pub fn with_statistical(mut self, kind: impl Into<String>) -> Self {
        self.statistical.insert(kind.into());
        self
    }

    #[must_use]
    pub fn classify(&self, observation_kind: &str) -> ObservationClass {
        if NEVER_CONSOLIDATE.contains(&observation_kind) {
            return ObservationClass::Append;
        }
        if self.statistical.contains(observation_kind) {
            ObservationClass::Statistical
        } else {
            ObservationClass::Append
        }
    }

    #[must_use]
    pub fn is_statistical(&self, observation_kind: &str) -> bool {
        self.classify(observation_kind) == ObservationClass::Statistical
    }

    /// Statistical kinds, sorted.
    pub fn statistical_kinds(&self) -> impl Iterator<Item = &str> {
        self.statistical.iter().map(String::as_str)
    }
}

impl Default for ClassificationTable {
    /// Version 1: the metric-like kinds the memory service has always merged.
    fn default() -> Self {
        [
            "metric",
            "performance_metric",
            "engagement_metric",
            "statistic",
            "measurement",
            "kpi",
        ]
        .into_iter()
        .fold(Self::empty(1), Self::with_statistical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("metric", ObservationClass::Statistical)]
    #[case("engagement_metric", ObservationClass::Statistical)]
    #[case("kpi", ObservationClass::Statistical)]
    #[case("note", ObservationClass::Append)]
    #[case("learning", ObservationClass::Append)]
    fn default_table(#[case] kind: &str, #[case] expected: ObservationClass) {
        assert_eq!(ClassificationTable::default().classify(kind), expected);
    }

    #[rstest]
    #[case("learning")]
    #[case("insight")]
    #[case("pattern_discovery")]
    #[case("error_analysis")]
    #[case("optimization_result")]
    fn never_list_beats_the_table(#[case] kind: &str) {
        let table = ClassificationTable::empty(2).with_statistical(kind);
        assert_eq!(table.classify(kind), ObservationClass::Append);
    }

    #[test]
    fn custom_table_keeps_its_version() {
        let table = ClassificationTable::empty(7).with_statistical("latency_ms");
        assert_eq!(table.version, 7);
        assert!(table.is_statistical("latency_ms"));
        assert!(!table.is_statistical("metric"));
        assert_eq!(table.statistical_kinds().collect::<Vec<_>>(), vec!["latency_ms"]);
    }
}
