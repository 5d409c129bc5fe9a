pub mod consolidate;
pub mod dispatch;
pub mod resolve;
pub mod schema;
pub mod stats;
pub mod validate;

use anyhow::{Context, bail};
use strata_core::entities::Metadata;

/// Read a JSON file that must hold an object.
pub fn read_json_object(path: &str) -> anyhow::Result<Metadata> {
    match read_json(path)? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("{path} must hold a JSON object, found {}", json_type(&other)),
    }
}

/// Read and parse a JSON file.
pub fn read_json(path: &str) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("{path} is not valid JSON"))
}

const fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn non_object_metadata_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        let err = read_json_object(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn object_metadata_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"owner": "content"}}"#).unwrap();
        let metadata = read_json_object(file.path().to_str().unwrap()).unwrap();
        assert_eq!(metadata["owner"], "content");
    }
}
