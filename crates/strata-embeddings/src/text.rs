//! The text an entity is embedded from.
//!
//! Format: `Entity: {name} | Type: {kind} | {obs_kind}: {value} | ...`.
//! Non-default sources and observation context entries are appended after
//! their observation.

use strata_core::entities::{DEFAULT_SOURCE, Metadata, NewObservation, Observation};

/// The parts of an observation that contribute to embedding text.
pub trait ObservationText {
    fn kind(&self) -> &str;
    fn value(&self) -> &serde_json::Value;
    fn source(&self) -> &str;
    fn context(&self) -> &Metadata;
}

impl ObservationText for Observation {
    fn kind(&self) -> &str {
        &self.observation_kind
    }
    fn value(&self) -> &serde_json::Value {
        &self.value
    }
    fn source(&self) -> &str {
        &self.source
    }
    fn context(&self) -> &Metadata {
        &self.context
    }
}

impl ObservationText for NewObservation {
    fn kind(&self) -> &str {
        &self.observation_kind
    }
    fn value(&self) -> &serde_json::Value {
        &self.value
    }
    fn source(&self) -> &str {
        &self.source
    }
    fn context(&self) -> &Metadata {
        &self.context
    }
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the embedding input for an entity and its observations.
#[must_use]
pub fn entity_text<O: ObservationText>(name: &str, kind: &str, observations: &[O]) -> String {
    let mut parts = vec![format!("Entity: {name}"), format!("Type: {kind}")];
    for obs in observations {
        parts.push(format!("{}: {}", obs.kind(), plain(obs.value())));
        if !obs.source().is_empty() && obs.source() != DEFAULT_SOURCE {
            parts.push(format!("Source: {}", obs.source()));
        }
        for (key, value) in obs.context() {
            parts.push(format!("{key}: {}", plain(value)));
        }
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn formats_entity_with_observations() {
        let mut context = Metadata::new();
        context.insert("channel".into(), json!("blog"));
        let observations = vec![
            NewObservation::new("procedure", "Outline first"),
            NewObservation::new("engagement_rate", 0.032)
                .with_source("analytics")
                .with_context(context),
        ];

        assert_eq!(
            entity_text("blog_writing_sop_v4", "sop", &observations),
            "Entity: blog_writing_sop_v4 | Type: sop | procedure: Outline first | \
             engagement_rate: 0.032 | Source: analytics | channel: blog"
        );
    }

    #[test]
    fn entity_without_observations() {
        let none: Vec<NewObservation> = Vec::new();
        assert_eq!(entity_text("x", "note", &none), "Entity: x | Type: note");
    }
}
