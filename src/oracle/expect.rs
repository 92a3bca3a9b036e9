//! Expected-value table and structural body validation

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::common::{Error, Result, Verdict};

/// Expected metric movement for one field
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MetricExpectation {
    pub field: String,
    /// Integer, or a string holding one
    pub expected_diff: Value,
}

/// Declarative expected values keyed by test or assertion id
#[derive(Debug, Clone, Default)]
pub struct ExpectationTable {
    entries: Map<String, Value>,
}

impl ExpectationTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str(content)? {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(Error::Config(
                "expected values must be a JSON object keyed by id".to_string(),
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// `<test_id>.metrics_to_validate`, empty when absent
    pub fn metric_expectations(&self, test_id: &str) -> Result<Vec<MetricExpectation>> {
        match self
            .entries
            .get(test_id)
            .and_then(|entry| entry.get("metrics_to_validate"))
        {
            Some(list) => Ok(Vec::<MetricExpectation>::deserialize(list)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Recursive exact match of `expected` against an API body.
///
/// Every missing key and mismatched leaf is logged with its dotted path;
/// extra keys in `actual` are ignored.
pub fn validate_body(expected: &Value, actual: &Value) -> Verdict {
    let Some(actual) = actual.as_object() else {
        error!("[Invalid Result] Expected an object but got: {}", kind(actual));
        return Verdict::Fail;
    };
    let Some(expected) = expected.as_object() else {
        error!("[Invalid Expectation] Expected values must be an object");
        return Verdict::Fail;
    };
    Verdict::from_bool(validate_object(expected, actual, ""))
}

fn validate_object(expected: &Map<String, Value>, actual: &Map<String, Value>, parent: &str) -> bool {
    let mut success = true;
    for (key, want) in expected {
        let path = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}.{key}")
        };
        match (want, actual.get(key)) {
            (_, None) => {
                error!("[Missing Key] '{}' not found in result", path);
                success = false;
            }
            (Value::Object(want), Some(Value::Object(got))) => {
                success &= validate_object(want, got, &path);
            }
            (want, Some(got)) if want == got => {
                info!("[Match] '{}' = {}", path, want);
            }
            (want, Some(got)) => {
                error!("[Mismatch] '{}': Expected={}, Got={}", path, want, got);
                success = false;
            }
        }
    }
    success
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_body_nested() {
        let expected = json!({"status": "ok", "rules": {"count": 2, "mode": "allow"}});
        let actual = json!({"status": "ok", "rules": {"count": 2, "mode": "allow", "extra": 1}, "id": 7});
        assert_eq!(validate_body(&expected, &actual), Verdict::Pass);

        let wrong = json!({"status": "ok", "rules": {"count": 3, "mode": "allow"}});
        assert_eq!(validate_body(&expected, &wrong), Verdict::Fail);

        let missing = json!({"rules": {"count": 2, "mode": "allow"}});
        assert_eq!(validate_body(&expected, &missing), Verdict::Fail);
    }

    #[test]
    fn test_validate_body_type_mismatch() {
        let expected = json!({"rules": {"count": 2}});
        assert_eq!(validate_body(&expected, &json!({"rules": [2]})), Verdict::Fail);
        assert_eq!(validate_body(&expected, &json!("plain text")), Verdict::Fail);
    }

    #[test]
    fn test_metric_expectations() {
        let table = ExpectationTable::parse(
            r#"{
                "DTAL-291": {"metrics_to_validate": [
                    {"field": "alg_connections_total{dir=\"up\"}", "expected_diff": 1},
                    {"field": "alg_frames_total", "expected_diff": "4"}
                ]},
                "get_filter_rules": {"status": "ok"}
            }"#,
        )
        .unwrap();

        let list = table.metric_expectations("DTAL-291").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].field, "alg_connections_total{dir=\"up\"}");
        assert_eq!(list[1].expected_diff, json!("4"));

        assert!(table.metric_expectations("get_filter_rules").unwrap().is_empty());
        assert!(table.metric_expectations("unknown").unwrap().is_empty());
        assert_eq!(table.get("get_filter_rules"), Some(&json!({"status": "ok"})));
    }

    #[test]
    fn test_table_must_be_object() {
        assert!(matches!(ExpectationTable::parse("[]"), Err(Error::Config(_))));
    }
}
